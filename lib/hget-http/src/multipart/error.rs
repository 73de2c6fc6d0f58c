/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

use crate::HttpLineParseError;

#[derive(Debug, Error)]
pub enum MultipartReadError {
    #[error("io failed: {0:?}")]
    IoFailed(#[from] io::Error),
    #[error("unexpected end of multipart body")]
    UnexpectedEnd,
    #[error("too long line (> {0})")]
    LineTooLong(usize),
    #[error("invalid boundary line")]
    InvalidBoundaryLine,
    #[error("invalid part header line: {0}")]
    InvalidHeaderLine(HttpLineParseError),
    #[error("too large part header, should be less than {0}")]
    TooLargeHeader(usize),
    #[error("no boundary parameter in content-type")]
    MissingBoundary,
}
