/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use anyhow::anyhow;
use http::{Method, StatusCode};
use log::{debug, warn};
use openssl::error::ErrorStack;
use openssl::ssl::SslVerifyMode;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use hget_http::client::{HttpClientResponse, HttpResponseParseError};
use hget_http::multipart::{MultipartReadError, MultipartReader};
use hget_http::{HttpBodyReader, HttpBodyType};

use super::connect::{BoxFetchReader, FetchConnection};
use super::opts::FetchArgs;
use super::request::RequestTemplate;

const BODY_LINE_MAX_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connect to {peer} failed: {error:?}")]
    ConnectFailed {
        peer: SocketAddr,
        #[source]
        error: io::Error,
    },
    #[error("timeout to connect to {0}")]
    ConnectTimeout(SocketAddr),
    #[error("tls setup failed: {0}")]
    TlsSetup(#[from] ErrorStack),
    #[error("tls handshake with {name} failed: {error}")]
    TlsHandshake {
        name: String,
        #[source]
        error: openssl::ssl::Error,
    },
    #[error("failed to send request: {0:?}")]
    SendRequest(#[source] io::Error),
    #[error("failed to read response: {0}")]
    RecvResponse(#[source] HttpResponseParseError),
    #[error("timeout to read response headers")]
    ResponseTimeout,
    #[error("failed to drain response body: {0:?}")]
    Drain(#[source] io::Error),
    #[error("body transfer failed: {0:?}")]
    Transfer(#[source] io::Error),
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartReadError),
}

#[derive(Debug, Error)]
pub(super) enum ExchangeError {
    #[error("failed to send request: {0:?}")]
    SendFailed(io::Error),
    #[error("failed to read response: {0}")]
    RecvFailed(HttpResponseParseError),
    #[error("timeout to read response headers")]
    ResponseTimeout,
}

impl ExchangeError {
    /// whether the connection can no longer carry further exchanges
    pub(super) fn connection_poisoned(&self) -> bool {
        match self {
            ExchangeError::SendFailed(_) => true,
            ExchangeError::RecvFailed(e) => matches!(
                e,
                HttpResponseParseError::RemoteClosed | HttpResponseParseError::IoFailed(_)
            ),
            ExchangeError::ResponseTimeout => false,
        }
    }
}

impl From<ExchangeError> for FetchError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::SendFailed(e) => FetchError::SendRequest(e),
            ExchangeError::RecvFailed(e) => FetchError::RecvResponse(e),
            ExchangeError::ResponseTimeout => FetchError::ResponseTimeout,
        }
    }
}

pub(super) struct HttpExchange<'a> {
    conn: &'a mut FetchConnection,
    rsp: HttpClientResponse,
    method: Method,
}

impl HttpExchange<'_> {
    fn status(&self) -> u16 {
        self.rsp.code
    }

    fn body_type(&self) -> Option<HttpBodyType> {
        self.rsp.body_type(&self.method)
    }

    fn multipart_boundary(&self) -> Option<Option<String>> {
        let mime = self.rsp.content_type()?;
        if mime.type_() != mime::MULTIPART {
            return None;
        }
        Some(
            mime.get_param(mime::BOUNDARY)
                .map(|b| b.as_str().to_string()),
        )
    }

    fn body_reader(
        &mut self,
        body_type: HttpBodyType,
    ) -> HttpBodyReader<'_, BufReader<BoxFetchReader>> {
        HttpBodyReader::new(&mut self.conn.reader, body_type, BODY_LINE_MAX_SIZE)
    }

    /// drain whatever is left of the response body so the connection can
    /// carry another exchange
    async fn finish(self) -> Result<(), FetchError> {
        if let Some(body_type) = self.body_type() {
            let mut body_reader =
                HttpBodyReader::new(&mut self.conn.reader, body_type, BODY_LINE_MAX_SIZE);
            let mut sink = tokio::io::sink();
            tokio::io::copy(&mut body_reader, &mut sink)
                .await
                .map_err(FetchError::Drain)?;
        }
        Ok(())
    }

    /// abort the exchange, the connection read position is undefined afterwards
    fn cancel(self) {
        self.conn.invalidate();
    }
}

pub struct FetchTask {
    args: FetchArgs,
    peer: SocketAddr,
}

impl FetchTask {
    pub fn new(args: FetchArgs) -> anyhow::Result<Self> {
        let peer = args
            .peer()
            .ok_or_else(|| anyhow!("target address has not been resolved"))?;
        Ok(FetchTask { args, peer })
    }

    async fn establish(&self) -> Result<FetchConnection, FetchError> {
        let peer = self.peer;
        let stream = match tokio::time::timeout(
            self.args.connect_timeout,
            self.args.new_tcp_connection(peer),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(FetchError::ConnectFailed { peer, error: e }),
            Err(_) => return Err(FetchError::ConnectTimeout(peer)),
        };
        debug!("connected to {peer}");

        if self.args.tls_enabled() {
            let tls_stream = self.tls_connect(stream).await?;
            let (r, w) = tokio::io::split(tls_stream);
            Ok(FetchConnection::new(Box::new(r), Box::new(w)))
        } else {
            let (r, w) = stream.into_split();
            Ok(FetchConnection::new(Box::new(r), Box::new(w)))
        }
    }

    async fn tls_connect(&self, stream: TcpStream) -> Result<SslStream<TcpStream>, FetchError> {
        let tls_name = self.args.tls_name();
        let connector = self.args.build_tls_connector()?;
        let mut config = connector.configure()?;
        if self.args.tls_no_verify() {
            config.set_verify(SslVerifyMode::NONE);
            config.set_verify_hostname(false);
        }
        let ssl = config.into_ssl(tls_name)?;
        let mut tls_stream = SslStream::new(ssl, stream)?;
        Pin::new(&mut tls_stream)
            .connect()
            .await
            .map_err(|e| FetchError::TlsHandshake {
                name: tls_name.to_string(),
                error: e,
            })?;
        debug!("tls handshake with {tls_name} done");
        Ok(tls_stream)
    }

    async fn send_exchange<'a>(
        &self,
        conn: &'a mut FetchConnection,
        req: &RequestTemplate,
    ) -> Result<HttpExchange<'a>, ExchangeError> {
        if conn.is_broken() {
            return Err(ExchangeError::SendFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection has been invalidated",
            )));
        }

        let header = req.serialize();
        conn.writer
            .write_all(&header)
            .await
            .map_err(ExchangeError::SendFailed)?;
        conn.writer
            .flush()
            .await
            .map_err(ExchangeError::SendFailed)?;

        let rsp = match tokio::time::timeout(
            self.args.timeout,
            HttpClientResponse::parse(&mut conn.reader, &self.args.method, self.args.max_header_size),
        )
        .await
        {
            Ok(Ok(rsp)) => rsp,
            Ok(Err(e)) => return Err(ExchangeError::RecvFailed(e)),
            Err(_) => return Err(ExchangeError::ResponseTimeout),
        };

        Ok(HttpExchange {
            conn,
            rsp,
            method: self.args.method.clone(),
        })
    }

    pub async fn run_to<W>(&self, out: &mut W) -> Result<(), FetchError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut req = RequestTemplate::new(&self.args);
        let mut conn = self.establish().await?;
        let mut exchange = self
            .send_exchange(&mut conn, &req)
            .await
            .map_err(FetchError::from)?;
        debug!("got response status {}", exchange.status());

        if exchange.status() == StatusCode::PROXY_AUTHENTICATION_REQUIRED.as_u16()
            && let Some(auth) = &self.args.proxy_auth
        {
            exchange.finish().await?;
            req.set_proxy_authorization(auth);
            debug!("answering proxy auth challenge for user {}", auth.username());
            match self.send_exchange(&mut conn, &req).await {
                Ok(x) => exchange = x,
                Err(e) if e.connection_poisoned() => {
                    warn!("connection lost while answering proxy auth challenge, reconnecting: {e}");
                    // one fresh connection to the same peer, then give up
                    conn = self.establish().await?;
                    exchange = self.send_exchange(&mut conn, &req).await?;
                }
                Err(e) => return Err(e.into()),
            }
            debug!("got response status {} after proxy auth", exchange.status());
        }

        if exchange.status() == StatusCode::UNAUTHORIZED.as_u16()
            && let Some(auth) = &self.args.www_auth
        {
            exchange.finish().await?;
            req.set_authorization(auth);
            debug!("answering www auth challenge for user {}", auth.username());
            // no reconnect fallback here, any failure is final
            exchange = self.send_exchange(&mut conn, &req).await?;
            debug!("got response status {} after www auth", exchange.status());
        }

        let Some(body_type) = exchange.body_type() else {
            return Ok(());
        };

        let r = match exchange.multipart_boundary() {
            Some(Some(boundary)) => {
                copy_multipart(&mut exchange, body_type, &boundary, out).await
            }
            Some(None) => Err(FetchError::Multipart(MultipartReadError::MissingBoundary)),
            None => copy_single(&mut exchange, body_type, out).await,
        };
        if let Err(e) = r {
            // unwind the read state before surfacing the failure
            exchange.cancel();
            return Err(e);
        }
        Ok(())
    }
}

async fn copy_single<W>(
    exchange: &mut HttpExchange<'_>,
    body_type: HttpBodyType,
    out: &mut W,
) -> Result<(), FetchError>
where
    W: AsyncWrite + Unpin,
{
    let mut body_reader = exchange.body_reader(body_type);
    tokio::io::copy(&mut body_reader, out)
        .await
        .map_err(FetchError::Transfer)?;
    Ok(())
}

async fn copy_multipart<W>(
    exchange: &mut HttpExchange<'_>,
    body_type: HttpBodyType,
    boundary: &str,
    out: &mut W,
) -> Result<(), FetchError>
where
    W: AsyncWrite + Unpin,
{
    let mut body_reader = exchange.body_reader(body_type);
    let mut multipart = MultipartReader::new(&mut body_reader, boundary);
    let mut part_index: usize = 0;
    while let Some(part) = multipart.next_part().await? {
        debug!("copying part {part_index} ({} header(s))", part.headers.len());
        let mut part_body = multipart.part_body();
        tokio::io::copy(&mut part_body, out)
            .await
            .map_err(FetchError::Transfer)?;
        part_index += 1;
    }
    Ok(())
}
