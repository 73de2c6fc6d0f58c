/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use base64::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthParseError {
    #[error("invalid base64 encoding")]
    InvalidBase64Encoding,
    #[error("invalid utf-8 encoding")]
    InvalidUtf8Encoding,
    #[error("no delimiter found")]
    NoDelimiterFound,
}

#[derive(Clone)]
pub struct HttpBasicAuth {
    username: String,
    password: String,
    encoded_value: String,
}

impl HttpBasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        let mut buf = Vec::with_capacity(username.len() + 1 + password.len());
        buf.extend_from_slice(username.as_bytes());
        buf.push(b':');
        buf.extend_from_slice(password.as_bytes());

        let encoded_value = BASE64_STANDARD.encode(buf);

        HttpBasicAuth {
            username: username.to_string(),
            password: password.to_string(),
            encoded_value,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    #[inline]
    pub fn encoded_value(&self) -> &str {
        &self.encoded_value
    }
}

impl FromStr for HttpBasicAuth {
    type Err = AuthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded_value = s.trim(); // tolerate surrounding whitespace

        let decoded = BASE64_STANDARD
            .decode(encoded_value)
            .map_err(|_| AuthParseError::InvalidBase64Encoding)?;
        let value =
            std::str::from_utf8(&decoded).map_err(|_| AuthParseError::InvalidUtf8Encoding)?;

        match memchr::memchr(b':', value.as_bytes()) {
            Some(i) => Ok(HttpBasicAuth {
                username: value[0..i].to_string(),
                password: value[i + 1..].to_string(),
                encoded_value: encoded_value.to_string(),
            }),
            None => Err(AuthParseError::NoDelimiterFound),
        }
    }
}
