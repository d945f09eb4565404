//! Shared scaffolding for integration tests: spin up a real `Server` on a
//! loopback port in a background thread, then drive it with a raw
//! `TcpStream`, the same way this crate's own test suite works per its
//! test-tooling design (no mock HTTP client, no snapshot testing).

use originserve::config::{RouteConfig, ServerConfig};
use originserve::server::Server;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Spawns `configs` on their configured ports and gives the listener a
/// moment to come up before returning. The server thread is daemon-like: it
/// runs until the test process exits, since nothing in this harness ever
/// sends it a shutdown signal.
pub fn spawn_server(configs: Vec<ServerConfig>) {
    thread::spawn(move || {
        let mut server = Server::new(configs).expect("server should bind");
        let _ = server.run();
    });
    thread::sleep(Duration::from_millis(150));
}

pub fn default_route(path: &str, methods: Vec<originserve::http::Method>) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        methods,
        ..Default::default()
    }
}

/// Builds a `ServerConfig` with a catch-all `/` location allowing GET, POST
/// and DELETE, so tests that only care about framing/static-file/body
/// behavior don't also have to wire up routing. Tests exercising routing
/// itself override `.locations` afterwards.
pub fn server_config(port: u16, name: &str, root: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        ports: vec![port],
        server_name: name.to_string(),
        default_server: true,
        root: root.to_string(),
        index: "index.html".to_string(),
        locations: vec![default_route(
            "/",
            vec![
                originserve::http::Method::Get,
                originserve::http::Method::Post,
                originserve::http::Method::Delete,
            ],
        )],
        ..Default::default()
    }
}

/// Connects, writes `request` in one shot, and reads the full response:
/// headers up to the CRLFCRLF boundary, then exactly `Content-Length` more
/// bytes if the header is present. Good enough for the single
/// request/response exchanges these tests drive.
pub fn roundtrip(port: u16, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect should succeed");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream.write_all(request).unwrap();
    read_response(&mut stream)
}

pub fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    let mut header_end = None;

    loop {
        if let Some(end) = header_end {
            let want = content_length(&out[..end]).unwrap_or(0);
            if out.len() >= end + want {
                break;
            }
        }
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                if header_end.is_none() {
                    header_end = find_subsequence(&out, b"\r\n\r\n").map(|p| p + 4);
                }
                if let Some(end) = header_end {
                    let want = content_length(&out[..end]).unwrap_or(0);
                    if out.len() >= end + want {
                        break;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn content_length(header_block: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(header_block);
    for line in text.lines() {
        if let Some((k, v)) = line.split_once(':') {
            if k.trim().eq_ignore_ascii_case("content-length") {
                return v.trim().parse().ok();
            }
        }
    }
    None
}

pub fn unique_temp_dir(label: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "originserve-it-{}-{}-{}",
        label,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
