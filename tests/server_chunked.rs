//! Chunked body assembly, pipelining, and a split-across-writes chunked
//! upload, all driven against a real `Server` over a loopback `TcpStream`.

mod common;

use common::{default_route, server_config, spawn_server, unique_temp_dir};
use originserve::http::Method;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

fn status_line(response: &[u8]) -> String {
    String::from_utf8_lossy(response)
        .lines()
        .next()
        .unwrap_or("")
        .to_string()
}

#[test]
fn chunked_body_split_across_several_writes_assembles_correctly() {
    let root = unique_temp_dir("chunked-split-root");
    std::fs::create_dir_all(root.join("uploads")).unwrap();

    let mut upload_route = default_route("/upload", vec![Method::Post]);
    upload_route.upload_dir = Some("uploads".to_string());

    let mut cfg = server_config(19111, "t.test", root.to_str().unwrap());
    cfg.locations = vec![upload_route];
    spawn_server(vec![cfg]);

    let mut stream = TcpStream::connect("127.0.0.1:19111").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    stream
        .write_all(
            b"POST /upload/test.txt HTTP/1.1\r\nHost: t.test\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"5\r\nHello\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"7\r\n World!\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"0\r\n\r\n").unwrap();

    let res = common::read_response(&mut stream);
    assert_eq!(status_line(&res), "HTTP/1.1 201 Created");

    assert_eq!(
        std::fs::read(root.join("uploads/test.txt")).unwrap(),
        b"Hello World!"
    );
}

#[test]
fn pipelined_requests_on_one_connection_both_get_served() {
    let root = unique_temp_dir("pipeline-root");
    std::fs::write(root.join("index.html"), "Hello").unwrap();

    let cfg = server_config(19112, "t.test", root.to_str().unwrap());
    spawn_server(vec![cfg]);

    let mut stream = TcpStream::connect("127.0.0.1:19112").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let pipeline = "GET /index.html HTTP/1.1\r\nHost: t.test\r\n\r\n\
                    GET /index.html HTTP/1.1\r\nHost: t.test\r\n\r\n";
    stream.write_all(pipeline.as_bytes()).unwrap();

    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    // Two full responses is "HTTP/1.1" appearing twice; keep reading until
    // we have both or the read times out.
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                if String::from_utf8_lossy(&out).matches("HTTP/1.1").count() >= 2 {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let text = String::from_utf8_lossy(&out);
    assert_eq!(text.matches("200 OK").count(), 2);
    assert_eq!(text.matches("Hello").count(), 2);
}

#[test]
fn chunk_size_line_and_data_arriving_in_separate_writes_still_completes() {
    let root = unique_temp_dir("chunked-trickle-root");
    std::fs::create_dir_all(root.join("uploads")).unwrap();

    let mut upload_route = default_route("/upload", vec![Method::Post]);
    upload_route.upload_dir = Some("uploads".to_string());

    let mut cfg = server_config(19113, "t.test", root.to_str().unwrap());
    cfg.locations = vec![upload_route];
    spawn_server(vec![cfg]);

    let mut stream = TcpStream::connect("127.0.0.1:19113").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    stream
        .write_all(
            b"POST /upload/stream.txt HTTP/1.1\r\nHost: t.test\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    stream.write_all(b"B\r\n").unwrap(); // hex B = 11 bytes
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"Rust Stream").unwrap();
    stream.write_all(b"\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));

    stream.write_all(b"0\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"\r\n").unwrap();

    let res = common::read_response(&mut stream);
    assert_eq!(status_line(&res), "HTTP/1.1 201 Created");
    assert_eq!(
        std::fs::read(root.join("uploads/stream.txt")).unwrap(),
        b"Rust Stream"
    );
}
