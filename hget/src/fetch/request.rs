/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};

use http::Method;

use hget_http::HttpBasicAuth;

use super::opts::FetchArgs;

pub(super) struct RequestTemplate {
    method: Method,
    absolute_form: bool,
    scheme: String,
    host: String,
    path_and_query: String,
    authorization: Option<String>,
    proxy_authorization: Option<String>,
}

impl RequestTemplate {
    pub(super) fn new(args: &FetchArgs) -> Self {
        let url = &args.target_url;

        let mut host = args.origin_host().to_string();
        if let Some(port) = url.port() {
            host.push(':');
            host.push_str(&port.to_string());
        }

        let mut path_and_query = url.path().to_string();
        if let Some(q) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(q);
        }

        RequestTemplate {
            method: args.method.clone(),
            absolute_form: args.use_proxy(),
            scheme: url.scheme().to_string(),
            host,
            path_and_query,
            authorization: None,
            proxy_authorization: None,
        }
    }

    /// replaces any previous value, reapplying for the same challenge is safe
    pub(super) fn set_authorization(&mut self, auth: &HttpBasicAuth) {
        self.authorization = Some(auth.encoded_value().to_string());
    }

    pub(super) fn set_proxy_authorization(&mut self, auth: &HttpBasicAuth) {
        self.proxy_authorization = Some(auth.encoded_value().to_string());
    }

    pub(super) fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::<u8>::with_capacity(512);
        // writes to a Vec cannot fail
        let _ = self.write_header(&mut buf);
        buf
    }

    fn write_request_line<W: io::Write>(&self, buf: &mut W) -> io::Result<()> {
        write!(buf, "{} ", self.method)?;
        if self.absolute_form {
            write!(buf, "{}://{}", self.scheme, self.host)?;
        }
        buf.write_all(self.path_and_query.as_bytes())?;
        buf.write_all(b" HTTP/1.1\r\n")?;
        Ok(())
    }

    fn write_header<W: io::Write>(&self, buf: &mut W) -> io::Result<()> {
        self.write_request_line(buf)?;

        write!(buf, "Host: {}\r\n", self.host)?;
        buf.write_all(b"Connection: keep-alive\r\n")?;

        if let Some(v) = &self.proxy_authorization {
            write!(buf, "Proxy-Authorization: Basic {v}\r\n")?;
        }
        if let Some(v) = &self.authorization {
            write!(buf, "Authorization: Basic {v}\r\n")?;
        }

        buf.write_all(b"\r\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    use super::super::opts::{add_fetch_args, parse_fetch_args};

    fn template_for(argv: &[&str]) -> RequestTemplate {
        let matches = add_fetch_args(Command::new("hget"))
            .try_get_matches_from(argv)
            .unwrap();
        let args = parse_fetch_args(&matches).unwrap();
        RequestTemplate::new(&args)
    }

    #[test]
    fn origin_form() {
        let req = template_for(&["hget", "http://example.com/foo?a=b"]);
        let header = String::from_utf8(req.serialize()).unwrap();
        assert!(header.starts_with("GET /foo?a=b HTTP/1.1\r\n"));
        assert!(header.contains("Host: example.com\r\n"));
        assert!(header.contains("Connection: keep-alive\r\n"));
        assert!(header.ends_with("\r\n\r\n"));
    }

    #[test]
    fn origin_form_with_port() {
        let req = template_for(&["hget", "http://example.com:8080/foo"]);
        let header = String::from_utf8(req.serialize()).unwrap();
        assert!(header.starts_with("GET /foo HTTP/1.1\r\n"));
        assert!(header.contains("Host: example.com:8080\r\n"));
    }

    #[test]
    fn absolute_form_with_proxy() {
        let req = template_for(&["hget", "http://example.com/foo", "proxy.local:3128"]);
        let header = String::from_utf8(req.serialize()).unwrap();
        assert!(header.starts_with("GET http://example.com/foo HTTP/1.1\r\n"));
        assert!(header.contains("Host: example.com\r\n"));
    }

    #[test]
    fn authorization_reapply_is_idempotent() {
        let mut req = template_for(&["hget", "http://example.com/"]);
        let auth = HttpBasicAuth::new("root", "toor");
        req.set_authorization(&auth);
        req.set_authorization(&auth);
        let header = String::from_utf8(req.serialize()).unwrap();
        assert_eq!(header.matches("Authorization: Basic ").count(), 1);
        assert!(header.contains("Authorization: Basic cm9vdDp0b29y\r\n"));
    }

    #[test]
    fn proxy_authorization() {
        let mut req = template_for(&["hget", "http://example.com/", "proxy.local"]);
        let auth = HttpBasicAuth::new("puser", "ppass");
        req.set_proxy_authorization(&auth);
        let header = String::from_utf8(req.serialize()).unwrap();
        assert!(header.contains(&format!(
            "Proxy-Authorization: Basic {}\r\n",
            auth.encoded_value()
        )));
    }
}
