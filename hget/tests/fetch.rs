/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use clap::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use hget_http::HttpBasicAuth;

async fn fetch(argv: &[String]) -> anyhow::Result<Vec<u8>> {
    let matches = hget::fetch::add_fetch_args(Command::new("hget"))
        .try_get_matches_from(argv)
        .map_err(anyhow::Error::new)?;
    let mut out = Vec::new();
    hget::fetch::run_to(&matches, &mut out).await?;
    Ok(out)
}

fn argv(args: &[&str]) -> Vec<String> {
    let mut v = vec!["hget".to_string()];
    for a in args {
        v.push(a.to_string());
    }
    v
}

async fn read_request_header(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn plain_get() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = read_request_header(&mut stream).await;
        assert!(req.starts_with("GET /foo HTTP/1.1\r\n"));
        assert!(req.contains(&format!("Host: 127.0.0.1:{}\r\n", addr.port())));
        assert!(req.contains("Connection: keep-alive\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello")
            .await
            .unwrap();
    });

    let url = format!("http://127.0.0.1:{}/foo", addr.port());
    let body = fetch(&argv(&[&url])).await.unwrap();
    assert_eq!(body, b"hello");
    server.await.unwrap();
}

#[tokio::test]
async fn scheme_less_url() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = read_request_header(&mut stream).await;
        assert!(req.starts_with("GET /foo HTTP/1.1\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .unwrap();
    });

    let target = format!("127.0.0.1:{}/foo", addr.port());
    let body = fetch(&argv(&[&target])).await.unwrap();
    assert_eq!(body, b"ok");
    server.await.unwrap();
}

#[tokio::test]
async fn chunked_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_header(&mut stream).await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            )
            .await
            .unwrap();
    });

    let url = format!("http://127.0.0.1:{}/", addr.port());
    let body = fetch(&argv(&[&url])).await.unwrap();
    assert_eq!(body, b"hello world");
    server.await.unwrap();
}

#[tokio::test]
async fn head_without_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = read_request_header(&mut stream).await;
        assert!(req.starts_with("HEAD / HTTP/1.1\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
            .await
            .unwrap();
    });

    let url = format!("http://127.0.0.1:{}/", addr.port());
    let body = fetch(&argv(&[&url, "--method", "HEAD"])).await.unwrap();
    assert!(body.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn proxy_absolute_form() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = read_request_header(&mut stream).await;
        assert!(req.starts_with("GET http://example.com/x HTTP/1.1\r\n"));
        assert!(req.contains("Host: example.com\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nvia")
            .await
            .unwrap();
    });

    let proxy = format!("127.0.0.1:{}", addr.port());
    let body = fetch(&argv(&["http://example.com/x", &proxy]))
        .await
        .unwrap();
    assert_eq!(body, b"via");
    server.await.unwrap();
}

#[tokio::test]
async fn proxy_auth_retry_on_same_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let proxy_credential = HttpBasicAuth::new("puser", "ppass").encoded_value().to_string();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let req1 = read_request_header(&mut stream).await;
        assert!(!req1.contains("Proxy-Authorization"));
        stream
            .write_all(
                b"HTTP/1.1 407 Proxy Authentication Required\r\n\
                Proxy-Authenticate: Basic realm=\"proxy\"\r\n\
                Content-Length: 6\r\n\r\ndenied",
            )
            .await
            .unwrap();

        // the retry must arrive on this same connection
        let req2 = read_request_header(&mut stream).await;
        assert!(req2.contains(&format!("Proxy-Authorization: Basic {proxy_credential}\r\n")));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\ngranted")
            .await
            .unwrap();
    });

    let proxy = format!("127.0.0.1:{}", addr.port());
    let body = fetch(&argv(&[
        "http://example.com/x",
        &proxy,
        "",
        "",
        "puser",
        "ppass",
    ]))
    .await
    .unwrap();
    assert_eq!(body, b"granted");
    server.await.unwrap();
}

#[tokio::test]
async fn proxy_auth_reconnect_exactly_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req1 = read_request_header(&mut stream).await;
        assert!(!req1.contains("Proxy-Authorization"));
        stream
            .write_all(
                b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n",
            )
            .await
            .unwrap();
        // poison the connection before the retry can be answered
        drop(stream);

        let (mut stream, _) = listener.accept().await.unwrap();
        let req2 = read_request_header(&mut stream).await;
        assert!(req2.contains("Proxy-Authorization: Basic "));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nagain")
            .await
            .unwrap();
    });

    let proxy = format!("127.0.0.1:{}", addr.port());
    let body = fetch(&argv(&[
        "http://example.com/x",
        &proxy,
        "",
        "",
        "puser",
        "ppass",
    ]))
    .await
    .unwrap();
    assert_eq!(body, b"again");
    server.await.unwrap();
}

#[tokio::test]
async fn www_auth_retry_on_same_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let credential = HttpBasicAuth::new("user", "pass").encoded_value().to_string();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let req1 = read_request_header(&mut stream).await;
        assert!(!req1.contains("Authorization"));
        stream
            .write_all(
                b"HTTP/1.1 401 Unauthorized\r\n\
                WWW-Authenticate: Basic realm=\"origin\"\r\n\
                Content-Length: 6\r\n\r\ndenied",
            )
            .await
            .unwrap();

        let req2 = read_request_header(&mut stream).await;
        assert!(req2.contains(&format!("Authorization: Basic {credential}\r\n")));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nsecret")
            .await
            .unwrap();
    });

    let url = format!("http://127.0.0.1:{}/private", addr.port());
    let body = fetch(&argv(&[&url, "user", "pass"])).await.unwrap();
    assert_eq!(body, b"secret");
    server.await.unwrap();
}

#[tokio::test]
async fn www_auth_failure_has_no_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_header(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        drop(stream);

        // the origin challenge branch never reconnects
        let second = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
        assert!(second.is_err());
    });

    let url = format!("http://127.0.0.1:{}/private", addr.port());
    let r = fetch(&argv(&[&url, "user", "pass"])).await;
    assert!(r.is_err());
    server.await.unwrap();
}

#[tokio::test]
async fn multipart_parts_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_header(&mut stream).await;
        let body: &[u8] = b"preamble\r\n\
            --sep\r\nContent-Type: text/plain\r\n\r\nAAA\r\n\
            --sep\r\n\r\nBBBB\r\n\
            --sep\r\nX-Last: 1\r\n\r\nC\r\n\
            --sep--\r\nepilogue";
        let header = format!(
            "HTTP/1.1 200 OK\r\n\
            Content-Type: multipart/mixed; boundary=sep\r\n\
            Content-Length: {}\r\n\r\n",
            body.len()
        );
        stream.write_all(header.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
    });

    let url = format!("http://127.0.0.1:{}/parts", addr.port());
    let body = fetch(&argv(&[&url])).await.unwrap();
    assert_eq!(body, b"AAABBBBC");
    server.await.unwrap();
}

#[tokio::test]
async fn truncated_body_keeps_partial_output() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_header(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhell")
            .await
            .unwrap();
        // close before the promised 10 bytes are delivered
    });

    let url = format!("http://127.0.0.1:{}/", addr.port());
    let matches = hget::fetch::add_fetch_args(Command::new("hget"))
        .try_get_matches_from(["hget", url.as_str()])
        .unwrap();
    let mut out = Vec::new();
    let r = hget::fetch::run_to(&matches, &mut out).await;
    assert!(r.is_err());
    // whatever was already written stays written
    assert_eq!(out, b"hell");
    server.await.unwrap();
}

#[tokio::test]
async fn challenge_body_without_credentials_is_streamed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_header(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 9\r\n\r\nforbidden")
            .await
            .unwrap();
    });

    // no credentials supplied, the 401 body is just the response body
    let url = format!("http://127.0.0.1:{}/", addr.port());
    let body = fetch(&argv(&[&url])).await.unwrap();
    assert_eq!(body, b"forbidden");
    server.await.unwrap();
}
