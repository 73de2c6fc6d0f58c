/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::str::FromStr;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use mime::Mime;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::HttpResponseParseError;
use crate::{HttpBodyType, HttpHeaderLine, HttpLineParseError, HttpStatusLine};

pub struct HttpClientResponse {
    pub version: Version,
    pub code: u16,
    pub reason: String,
    pub headers: HeaderMap,
    keep_alive: bool,
    content_length: u64,
    has_content_length: bool,
    chunked_transfer: bool,
    has_transfer_encoding: bool,
}

impl HttpClientResponse {
    fn new(version: Version, code: u16, reason: String) -> Self {
        // we always request keep-alive, the headers may still revoke it
        let keep_alive = version != Version::HTTP_10;
        HttpClientResponse {
            version,
            code,
            reason,
            headers: HeaderMap::default(),
            keep_alive,
            content_length: 0,
            has_content_length: false,
            chunked_transfer: false,
            has_transfer_encoding: false,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    fn expect_no_body(&self, method: &Method) -> bool {
        self.code < 200 || self.code == 204 || self.code == 304 || method.eq(&Method::HEAD)
    }

    pub fn body_type(&self, method: &Method) -> Option<HttpBodyType> {
        // see https://datatracker.ietf.org/doc/html/rfc9112#section-6.3 for Message Body Length
        if self.expect_no_body(method) {
            None
        } else if self.chunked_transfer {
            Some(HttpBodyType::Chunked)
        } else if self.has_content_length {
            if self.content_length > 0 {
                Some(HttpBodyType::ContentLength(self.content_length))
            } else {
                None
            }
        } else {
            Some(HttpBodyType::ReadUntilEnd)
        }
    }

    pub fn content_type(&self) -> Option<Mime> {
        let value = self.headers.get(http::header::CONTENT_TYPE)?;
        let s = value.to_str().ok()?;
        Mime::from_str(s).ok()
    }

    pub async fn parse<R>(
        reader: &mut R,
        method: &Method,
        max_header_size: usize,
    ) -> Result<Self, HttpResponseParseError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line_buf = Vec::<u8>::with_capacity(1024);
        let mut header_size: usize = 0;

        let (found, nr) = limited_read_until(reader, max_header_size, &mut line_buf).await?;
        if nr == 0 {
            return Err(HttpResponseParseError::RemoteClosed);
        }
        if !found {
            return if nr < max_header_size {
                Err(HttpResponseParseError::RemoteClosed)
            } else {
                Err(HttpResponseParseError::TooLargeHeader(max_header_size))
            };
        }
        header_size += nr;

        let mut rsp = HttpClientResponse::build_from_status_line(line_buf.as_ref())?;

        loop {
            if header_size >= max_header_size {
                return Err(HttpResponseParseError::TooLargeHeader(max_header_size));
            }
            line_buf.clear();
            let max_len = max_header_size - header_size;
            let (found, nr) = limited_read_until(reader, max_len, &mut line_buf).await?;
            if nr == 0 {
                return Err(HttpResponseParseError::RemoteClosed);
            }
            if !found {
                return if nr < max_len {
                    Err(HttpResponseParseError::RemoteClosed)
                } else {
                    Err(HttpResponseParseError::TooLargeHeader(max_header_size))
                };
            }
            header_size += nr;
            if (line_buf.len() == 1 && line_buf[0] == b'\n')
                || (line_buf.len() == 2 && line_buf[0] == b'\r' && line_buf[1] == b'\n')
            {
                // header end line
                break;
            }

            rsp.parse_header_line(line_buf.as_ref())?;
        }

        rsp.post_check_and_fix(method);
        Ok(rsp)
    }

    /// do some necessary check and fix
    fn post_check_and_fix(&mut self, method: &Method) {
        if !self.chunked_transfer && !self.has_content_length && !self.expect_no_body(method) {
            // read to end and close the connection
            self.keep_alive = false;
        }
    }

    fn build_from_status_line(line_buf: &[u8]) -> Result<Self, HttpResponseParseError> {
        let status =
            HttpStatusLine::parse(line_buf).map_err(HttpResponseParseError::InvalidStatusLine)?;
        Ok(HttpClientResponse::new(
            status.version,
            status.code,
            status.reason.to_string(),
        ))
    }

    fn parse_header_line(&mut self, line_buf: &[u8]) -> Result<(), HttpResponseParseError> {
        let header =
            HttpHeaderLine::parse(line_buf).map_err(HttpResponseParseError::InvalidHeaderLine)?;
        self.handle_header(header)
    }

    fn handle_header(&mut self, header: HttpHeaderLine<'_>) -> Result<(), HttpResponseParseError> {
        let name = HeaderName::from_str(header.name).map_err(|_| {
            HttpResponseParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderName)
        })?;

        match name.as_str() {
            "connection" | "proxy-connection" => {
                // proxy-connection is not standard, but at least curl use it
                let value = header.value.to_lowercase();

                for v in value.as_str().split(',') {
                    match v.trim() {
                        "keep-alive" => self.keep_alive = true,
                        "close" => self.keep_alive = false,
                        _ => {}
                    }
                }

                // connection options are not part of the payload headers
                return Ok(());
            }
            "transfer-encoding" => {
                self.has_transfer_encoding = true;
                if self.has_content_length {
                    // delete content-length
                    self.headers.remove(http::header::CONTENT_LENGTH);
                    self.content_length = 0;
                    self.has_content_length = false;
                    self.keep_alive = false; // according to rfc9112 Section 6.1
                }

                let v = header.value.to_lowercase();
                if v.ends_with("chunked") {
                    self.chunked_transfer = true;
                } else if v.contains("chunked") {
                    return Err(HttpResponseParseError::InvalidChunkedTransferEncoding);
                }
            }
            "content-length" => {
                if self.has_transfer_encoding {
                    // ignore content-length
                    self.keep_alive = false; // according to rfc9112 Section 6.1
                    return Ok(());
                }

                let content_length = u64::from_str(header.value)
                    .map_err(|_| HttpResponseParseError::InvalidContentLength)?;

                if self.has_content_length && self.content_length != content_length {
                    return Err(HttpResponseParseError::InvalidContentLength);
                }
                self.has_content_length = true;
                self.content_length = content_length;
            }
            _ => {}
        }

        let value = HeaderValue::from_str(header.value).map_err(|_| {
            HttpResponseParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderValue)
        })?;
        self.headers.append(name, value);
        Ok(())
    }
}

async fn limited_read_until<R>(
    reader: &mut R,
    max_len: usize,
    buf: &mut Vec<u8>,
) -> io::Result<(bool, usize)>
where
    R: AsyncBufRead + Unpin,
{
    let mut nr: usize = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok((false, nr));
        }
        let limit = max_len - nr;
        let len = available.len().min(limit);
        match memchr::memchr(b'\n', &available[..len]) {
            Some(offset) => {
                buf.extend_from_slice(&available[..=offset]);
                reader.consume(offset + 1);
                nr += offset + 1;
                return Ok((true, nr));
            }
            None => {
                buf.extend_from_slice(&available[..len]);
                reader.consume(len);
                nr += len;
                if nr >= max_len {
                    return Ok((false, nr));
                }
            }
        }
    }
}
