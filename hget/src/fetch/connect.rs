/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub(super) type BoxFetchReader = Box<dyn AsyncRead + Send + Unpin>;
pub(super) type BoxFetchWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(super) struct FetchConnection {
    pub(super) reader: BufReader<BoxFetchReader>,
    pub(super) writer: BoxFetchWriter,
    broken: bool,
}

impl FetchConnection {
    pub(super) fn new(reader: BoxFetchReader, writer: BoxFetchWriter) -> Self {
        FetchConnection {
            reader: BufReader::new(reader),
            writer,
            broken: false,
        }
    }

    /// the read position is no longer at an exchange boundary, no further
    /// exchange may use this connection
    pub(super) fn invalidate(&mut self) {
        self.broken = true;
    }

    pub(super) fn is_broken(&self) -> bool {
        self.broken
    }
}
