/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use super::HttpBodyType;
use crate::HttpChunkedLine;

const TRAILER_MAX_SIZE: usize = 8192;

#[derive(Clone, Copy)]
enum ReadState {
    UntilEnd,
    FixedLength(u64),
    ChunkHead,
    ChunkData(u64),
    ChunkDataEndCr,
    ChunkDataEndLf,
    Trailer,
    Finished,
}

/// A decoding reader for one response body.
///
/// Chunked transfer coding is de-framed, and the trailer section is consumed
/// through its terminating empty line, so that a fully read body leaves the
/// underlying stream positioned at the start of the next response.
pub struct HttpBodyReader<'a, R> {
    stream: &'a mut R,
    state: ReadState,
    body_line_max_len: usize,
    line_cache: Vec<u8>,
    trailer_size: usize,
}

impl<'a, R> HttpBodyReader<'a, R>
where
    R: AsyncBufRead + Unpin,
{
    const DEFAULT_LINE_SIZE: usize = 64;

    pub fn new(stream: &'a mut R, body_type: HttpBodyType, body_line_max_len: usize) -> Self {
        let state = match body_type {
            HttpBodyType::ContentLength(size) => ReadState::FixedLength(size),
            HttpBodyType::Chunked => ReadState::ChunkHead,
            HttpBodyType::ReadUntilEnd => ReadState::UntilEnd,
        };
        HttpBodyReader {
            stream,
            state,
            body_line_max_len,
            line_cache: Vec::with_capacity(Self::DEFAULT_LINE_SIZE),
            trailer_size: 0,
        }
    }

    pub fn finished(&self) -> bool {
        matches!(self.state, ReadState::Finished)
    }

    fn poll_body(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            match self.state {
                ReadState::Finished => return Poll::Ready(Ok(())),
                ReadState::UntilEnd => {
                    let old_remaining = buf.remaining();
                    ready!(Pin::new(&mut *self.stream).poll_read(cx, buf))?;
                    if buf.remaining() == old_remaining {
                        // io closed, which indicate the end of body
                        self.state = ReadState::Finished;
                    }
                    return Poll::Ready(Ok(()));
                }
                ReadState::FixedLength(left) => {
                    if left == 0 {
                        self.state = ReadState::Finished;
                        continue;
                    }
                    if buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    let nr = ready!(self.poll_data(cx, buf, left))?;
                    let left = left - nr as u64;
                    self.state = if left == 0 {
                        ReadState::Finished
                    } else {
                        ReadState::FixedLength(left)
                    };
                    return Poll::Ready(Ok(()));
                }
                ReadState::ChunkHead => {
                    ready!(self.poll_line(cx))?;
                    let chunk = HttpChunkedLine::parse(self.line_cache.as_slice())
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    self.line_cache.clear();
                    self.state = if chunk.chunk_size == 0 {
                        ReadState::Trailer
                    } else {
                        ReadState::ChunkData(chunk.chunk_size)
                    };
                }
                ReadState::ChunkData(left) => {
                    if buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    let nr = ready!(self.poll_data(cx, buf, left))?;
                    let left = left - nr as u64;
                    if left == 0 {
                        self.state = ReadState::ChunkDataEndCr;
                    } else {
                        self.state = ReadState::ChunkData(left);
                        return Poll::Ready(Ok(()));
                    }
                }
                ReadState::ChunkDataEndCr => {
                    let char = ready!(self.poll_end_char(cx))?;
                    match char {
                        b'\n' => self.state = ReadState::ChunkHead,
                        b'\r' => self.state = ReadState::ChunkDataEndLf,
                        _ => {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "invalid chunk data ending",
                            )));
                        }
                    }
                }
                ReadState::ChunkDataEndLf => {
                    let char = ready!(self.poll_end_char(cx))?;
                    if char != b'\n' {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "invalid chunk data ending",
                        )));
                    }
                    self.state = ReadState::ChunkHead;
                }
                ReadState::Trailer => {
                    ready!(self.poll_line(cx))?;
                    let line = self.line_cache.as_slice();
                    if matches!(line, b"\r\n" | b"\n") {
                        self.state = ReadState::Finished;
                    } else {
                        self.trailer_size += line.len();
                        if self.trailer_size > TRAILER_MAX_SIZE {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "trailer section too large",
                            )));
                        }
                    }
                    self.line_cache.clear();
                }
            }
        }
    }

    fn poll_data(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
        left: u64,
    ) -> Poll<io::Result<usize>> {
        let to_read = usize::try_from(left).unwrap_or(usize::MAX).min(buf.remaining());
        let mut limited_buf = ReadBuf::new(buf.initialize_unfilled_to(to_read));
        ready!(Pin::new(&mut *self.stream).poll_read(cx, &mut limited_buf))?;
        let nr = limited_buf.filled().len();
        if nr == 0 {
            // io closed unexpectedly
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "reader closed while reading body data",
            )));
        }
        buf.advance(nr);
        Poll::Ready(Ok(nr))
    }

    fn poll_end_char(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<u8>> {
        let mut reader = Pin::new(&mut *self.stream);
        let cache = ready!(reader.as_mut().poll_fill_buf(cx))?;
        if cache.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "reader closed while reading chunk data ending",
            )));
        }
        let char = cache[0];
        reader.consume(1);
        Poll::Ready(Ok(char))
    }

    fn poll_line(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let mut reader = Pin::new(&mut *self.stream);
            let cache = ready!(reader.as_mut().poll_fill_buf(cx))?;
            if cache.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "reader closed while reading body line",
                )));
            }
            match memchr::memchr(b'\n', cache) {
                Some(p) => {
                    self.line_cache.extend_from_slice(&cache[0..=p]);
                    reader.consume(p + 1);
                    return Poll::Ready(Ok(()));
                }
                None => {
                    let len = cache.len();
                    if self.line_cache.len() + len > self.body_line_max_len {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("body line too long (> {})", self.body_line_max_len),
                        )));
                    }
                    self.line_cache.extend_from_slice(cache);
                    reader.consume(len);
                }
            }
        }
    }
}

impl<R> AsyncRead for HttpBodyReader<'_, R>
where
    R: AsyncBufRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;

        let old_remaining = buf.remaining();
        match me.poll_body(cx, buf) {
            Poll::Pending => {
                if old_remaining > buf.remaining() {
                    Poll::Ready(Ok(()))
                } else {
                    Poll::Pending
                }
            }
            Poll::Ready(r) => Poll::Ready(r),
        }
    }
}
