/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll, ready};

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use super::MultipartReadError;
use crate::{HttpHeaderLine, HttpLineParseError};

const READ_CHUNK_SIZE: usize = 8192;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PartState {
    Preamble,
    InPart,
    AtDelimiter,
    Closed,
}

pub struct MultipartPart {
    pub headers: HeaderMap,
}

/// A lazy, single pass reader over the parts of one multipart body.
///
/// Parts come out strictly in wire order. An unread part body is skipped
/// when the next part is requested. The epilogue after the close delimiter
/// is left unread.
pub struct MultipartReader<'a, R> {
    stream: &'a mut R,
    buf: BytesMut,
    delimiter: Vec<u8>,
    state: PartState,
    line_max_len: usize,
}

impl<'a, R> MultipartReader<'a, R>
where
    R: AsyncRead + Unpin,
{
    const DEFAULT_LINE_MAX_LEN: usize = 8192;

    pub fn new(stream: &'a mut R, boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(4 + boundary.len());
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());
        MultipartReader {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            delimiter,
            state: PartState::Preamble,
            line_max_len: Self::DEFAULT_LINE_MAX_LEN,
        }
    }

    /// the dash-boundary, without the leading CRLF of the full delimiter
    fn dash_boundary(&self) -> &[u8] {
        &self.delimiter[2..]
    }

    pub async fn next_part(&mut self) -> Result<Option<MultipartPart>, MultipartReadError> {
        loop {
            match self.state {
                PartState::Closed => return Ok(None),
                PartState::InPart => self.skip_part_body().await?,
                PartState::Preamble => {
                    let line = self.read_line().await?;
                    let trimmed = trim_line_end(line.as_ref());
                    let Some(tail) = trimmed.strip_prefix(self.dash_boundary()) else {
                        // a preamble line, discard
                        continue;
                    };
                    if tail.starts_with(b"--") {
                        self.state = PartState::Closed;
                        return Ok(None);
                    }
                    if !tail.is_empty() {
                        continue;
                    }
                    let headers = self.read_part_headers().await?;
                    self.state = PartState::InPart;
                    return Ok(Some(MultipartPart { headers }));
                }
                PartState::AtDelimiter => {
                    // the delimiter itself is consumed, the rest of the
                    // boundary line decides close vs next part
                    let line = self.read_line().await?;
                    if line.as_ref().starts_with(b"--") {
                        self.state = PartState::Closed;
                        return Ok(None);
                    }
                    if !trim_line_end(line.as_ref()).is_empty() {
                        return Err(MultipartReadError::InvalidBoundaryLine);
                    }
                    let headers = self.read_part_headers().await?;
                    self.state = PartState::InPart;
                    return Ok(Some(MultipartPart { headers }));
                }
            }
        }
    }

    /// Stream the body of the most recently returned part.
    ///
    /// Reads return EOF once the part's delimiter is reached.
    pub fn part_body(&mut self) -> MultipartBodyReader<'_, 'a, R> {
        MultipartBodyReader { multipart: self }
    }

    async fn skip_part_body(&mut self) -> Result<(), MultipartReadError> {
        loop {
            if let Some(p) = memchr::memmem::find(&self.buf, &self.delimiter) {
                self.buf.advance(p + self.delimiter.len());
                self.state = PartState::AtDelimiter;
                return Ok(());
            }
            let keep = self.delimiter.len() - 1;
            if self.buf.len() > keep {
                let drop_len = self.buf.len() - keep;
                self.buf.advance(drop_len);
            }
            let nr = self.stream.read_buf(&mut self.buf).await?;
            if nr == 0 {
                return Err(MultipartReadError::UnexpectedEnd);
            }
        }
    }

    async fn read_part_headers(&mut self) -> Result<HeaderMap, MultipartReadError> {
        let mut headers = HeaderMap::new();
        let mut header_size: usize = 0;
        loop {
            let line = self.read_line().await?;
            if matches!(line.as_ref(), b"\r\n" | b"\n") {
                return Ok(headers);
            }
            header_size += line.len();
            if header_size > self.line_max_len {
                return Err(MultipartReadError::TooLargeHeader(self.line_max_len));
            }

            let header = HttpHeaderLine::parse(line.as_ref())
                .map_err(MultipartReadError::InvalidHeaderLine)?;
            let name = HeaderName::from_str(header.name).map_err(|_| {
                MultipartReadError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderName)
            })?;
            let value = HeaderValue::from_str(header.value).map_err(|_| {
                MultipartReadError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderValue)
            })?;
            headers.append(name, value);
        }
    }

    async fn read_line(&mut self) -> Result<BytesMut, MultipartReadError> {
        loop {
            if let Some(p) = memchr::memchr(b'\n', &self.buf) {
                return Ok(self.buf.split_to(p + 1));
            }
            if self.buf.len() > self.line_max_len {
                return Err(MultipartReadError::LineTooLong(self.line_max_len));
            }
            let nr = self.stream.read_buf(&mut self.buf).await?;
            if nr == 0 {
                return Err(MultipartReadError::UnexpectedEnd);
            }
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r' | b' ' | b'\t') {
        end -= 1;
    }
    &line[..end]
}

pub struct MultipartBodyReader<'r, 'a, R> {
    multipart: &'r mut MultipartReader<'a, R>,
}

impl<R> AsyncRead for MultipartBodyReader<'_, '_, R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self.get_mut().multipart;

        if me.state != PartState::InPart || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if let Some(p) = memchr::memmem::find(&me.buf, &me.delimiter) {
                if p == 0 {
                    me.buf.advance(me.delimiter.len());
                    me.state = PartState::AtDelimiter;
                    return Poll::Ready(Ok(()));
                }
                let to_copy = p.min(buf.remaining());
                buf.put_slice(&me.buf[..to_copy]);
                me.buf.advance(to_copy);
                return Poll::Ready(Ok(()));
            }

            // hold back a possible delimiter prefix at the buffer tail
            let keep = me.delimiter.len() - 1;
            if me.buf.len() > keep {
                let to_copy = (me.buf.len() - keep).min(buf.remaining());
                buf.put_slice(&me.buf[..to_copy]);
                me.buf.advance(to_copy);
                return Poll::Ready(Ok(()));
            }

            let nr =
                ready!(tokio_util::io::poll_read_buf(Pin::new(&mut *me.stream), cx, &mut me.buf))?;
            if nr == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "multipart body closed before boundary",
                )));
            }
        }
    }
}
