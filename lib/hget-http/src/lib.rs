/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod parse;
pub use parse::{HttpChunkedLine, HttpHeaderLine, HttpLineParseError, HttpStatusLine};

pub mod client;

mod body;
pub use body::{HttpBodyReader, HttpBodyType};

pub mod multipart;

mod auth;
pub use auth::{AuthParseError, HttpBasicAuth};
