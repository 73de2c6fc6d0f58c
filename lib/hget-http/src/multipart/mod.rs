/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::MultipartReadError;

mod reader;
pub use reader::{MultipartBodyReader, MultipartPart, MultipartReader};
