//! End-to-end HTTP framing and static-file behavior, driven against a real
//! `Server` over a loopback `TcpStream` (see `tests/common`).

mod common;

use common::{default_route, roundtrip, server_config, spawn_server, unique_temp_dir};
use originserve::http::Method;

fn status_line(response: &[u8]) -> String {
    String::from_utf8_lossy(response)
        .lines()
        .next()
        .unwrap_or("")
        .to_string()
}

#[test]
fn get_serves_static_file_with_explicit_length() {
    let root = unique_temp_dir("http-static");
    std::fs::write(root.join("index.html"), "hello").unwrap();

    let cfg = server_config(19081, "t.test", root.to_str().unwrap());
    spawn_server(vec![cfg]);

    let res = roundtrip(
        19081,
        b"GET /index.html HTTP/1.1\r\nHost: t.test\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&res);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.to_ascii_lowercase().contains("content-type: text/html"));
    assert!(text.contains("Content-Length: 5\r\n") || text.contains("content-length: 5\r\n"));
    assert!(text.ends_with("hello"));
}

#[test]
fn missing_file_is_404() {
    let root = unique_temp_dir("http-404");
    let cfg = server_config(19082, "t.test", root.to_str().unwrap());
    spawn_server(vec![cfg]);

    let res = roundtrip(19082, b"GET /nope.html HTTP/1.1\r\nHost: t.test\r\n\r\n");
    assert_eq!(status_line(&res), "HTTP/1.1 404 Not Found");
}

#[test]
fn content_length_request_is_read_in_full_even_when_sent_in_two_writes() {
    let root = unique_temp_dir("http-split");
    std::fs::create_dir_all(root.join("up")).unwrap();

    let mut upload_route = default_route("/up", vec![Method::Post]);
    upload_route.upload_dir = Some(".".to_string());
    upload_route.root = Some(root.join("up").to_str().unwrap().to_string());

    let mut cfg = server_config(19083, "t.test", root.to_str().unwrap());
    cfg.locations = vec![upload_route];
    spawn_server(vec![cfg]);

    use std::io::{Read, Write};
    use std::net::TcpStream;
    let mut stream = TcpStream::connect("127.0.0.1:19083").unwrap();
    stream
        .set_read_timeout(Some(std::time::Duration::from_secs(2)))
        .unwrap();

    stream
        .write_all(b"POST /up/f.bin HTTP/1.1\r\nHost: t.test\r\nContent-Length: 4\r\n\r\nAB")
        .unwrap();
    // The request is not complete yet: Content-Length - 2 bytes are still
    // missing, so the server must not respond until the rest arrives.
    stream.set_nonblocking(true).unwrap();
    let mut probe = [0u8; 16];
    let premature = stream.read(&mut probe);
    assert!(premature.is_err() || matches!(premature, Ok(0)));
    stream.set_nonblocking(false).unwrap();

    stream.write_all(b"CD").unwrap();
    let res = common::read_response(&mut stream);
    assert_eq!(status_line(&res), "HTTP/1.1 201 Created");

    assert_eq!(std::fs::read(root.join("up/f.bin")).unwrap(), b"ABCD");
}

#[test]
fn empty_chunked_body_completes_immediately() {
    let root = unique_temp_dir("http-chunk-empty");
    std::fs::create_dir_all(root.join("up")).unwrap();

    let mut upload_route = default_route("/up", vec![Method::Post]);
    upload_route.root = Some(root.join("up").to_str().unwrap().to_string());

    let mut cfg = server_config(19084, "t.test", root.to_str().unwrap());
    cfg.locations = vec![upload_route];
    spawn_server(vec![cfg]);

    let res = roundtrip(
        19084,
        b"POST /up/empty.bin HTTP/1.1\r\nHost: t.test\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n",
    );
    assert_eq!(status_line(&res), "HTTP/1.1 201 Created");
    assert_eq!(std::fs::read(root.join("up/empty.bin")).unwrap(), b"");
}

#[test]
fn body_over_max_size_is_413() {
    let root = unique_temp_dir("http-413");
    std::fs::write(root.join("index.html"), "x").unwrap();

    let mut cfg = server_config(19085, "t.test", root.to_str().unwrap());
    cfg.client_max_body_size = 1024;
    spawn_server(vec![cfg]);

    let body = vec![b'a'; 2048];
    let req = format!(
        "POST /large HTTP/1.1\r\nHost: t.test\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    use std::io::{Read, Write};
    use std::net::TcpStream;
    let mut stream = TcpStream::connect("127.0.0.1:19085").unwrap();
    stream
        .set_read_timeout(Some(std::time::Duration::from_secs(2)))
        .unwrap();
    stream.write_all(req.as_bytes()).unwrap();
    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(status_line(&buf[..n]), "HTTP/1.1 413 Payload Too Large");
}

#[test]
fn method_not_in_allow_set_is_405_even_though_file_exists() {
    let root = unique_temp_dir("http-405");
    std::fs::write(root.join("secret.txt"), "shh").unwrap();

    let mut cfg = server_config(19086, "t.test", root.to_str().unwrap());
    cfg.locations = vec![default_route("/", vec![Method::Get])];
    spawn_server(vec![cfg]);

    let res = roundtrip(
        19086,
        b"DELETE /secret.txt HTTP/1.1\r\nHost: t.test\r\n\r\n",
    );
    assert_eq!(status_line(&res), "HTTP/1.1 405 Method Not Allowed");
}
