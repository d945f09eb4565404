//! End-to-end routing behavior: redirect precedence, virtual host selection,
//! and the 404/405 distinction, driven against a real `Server` (the
//! tie-break algorithm itself is unit-tested in `src/router.rs`).

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
fn redirect_location_wins_even_when_the_path_also_has_a_static_file() {
    let root = unique_temp_dir("router-redirect");
    std::fs::write(root.join("old.html"), "stale").unwrap();

    let mut redirecting = default_route("/old.html", vec![Method::Get]);
    redirecting.redirect = Some((302, "/new.html".to_string()));

    let mut cfg = server_config(19091, "t.test", root.to_str().unwrap());
    cfg.locations = vec![redirecting];
    spawn_server(vec![cfg]);

    let res = roundtrip(19091, b"GET /old.html HTTP/1.1\r\nHost: t.test\r\n\r\n");
    let text = String::from_utf8_lossy(&res);
    assert_eq!(status_line(&res), "HTTP/1.1 302 Found");
    assert!(text.contains("Location: /new.html") || text.contains("location: /new.html"));
}

#[test]
fn host_header_selects_virtual_server_over_default() {
    let root_a = unique_temp_dir("router-vhost-a");
    let root_b = unique_temp_dir("router-vhost-b");
    std::fs::write(root_a.join("index.html"), "a-site").unwrap();
    std::fs::write(root_b.join("index.html"), "b-site").unwrap();

    let mut default_cfg = server_config(19092, "a.test", root_a.to_str().unwrap());
    default_cfg.default_server = true;

    let mut named_cfg = server_config(19092, "b.test", root_b.to_str().unwrap());
    named_cfg.default_server = false;

    spawn_server(vec![default_cfg, named_cfg]);

    let res_b = roundtrip(19092, b"GET /index.html HTTP/1.1\r\nHost: b.test\r\n\r\n");
    assert!(String::from_utf8_lossy(&res_b).ends_with("b-site"));

    let res_a = roundtrip(19092, b"GET /index.html HTTP/1.1\r\nHost: unknown.test\r\n\r\n");
    assert!(String::from_utf8_lossy(&res_a).ends_with("a-site"));
}

#[test]
fn unmatched_path_is_404_but_wrong_method_on_a_matched_path_is_405() {
    let root = unique_temp_dir("router-404-405");
    std::fs::write(root.join("only_get.txt"), "x").unwrap();

    let mut cfg = server_config(19093, "t.test", root.to_str().unwrap());
    cfg.locations = vec![default_route("/only_get.txt", vec![Method::Get])];
    spawn_server(vec![cfg]);

    let missing = roundtrip(19093, b"GET /nowhere HTTP/1.1\r\nHost: t.test\r\n\r\n");
    assert_eq!(status_line(&missing), "HTTP/1.1 404 Not Found");

    let wrong_method = roundtrip(
        19093,
        b"DELETE /only_get.txt HTTP/1.1\r\nHost: t.test\r\n\r\n",
    );
    assert_eq!(status_line(&wrong_method), "HTTP/1.1 405 Method Not Allowed");
}

#[test]
fn suffix_location_serves_even_under_a_narrower_allowing_prefix() {
    let root = unique_temp_dir("router-suffix");
    std::fs::create_dir_all(root.join("scripts")).unwrap();
    std::fs::write(root.join("scripts/report.txt"), "plain").unwrap();

    let mut cfg = server_config(19094, "t.test", root.to_str().unwrap());
    cfg.locations = vec![
        default_route("/scripts", vec![Method::Get]),
        default_route("*.txt", vec![Method::Get]),
    ];
    spawn_server(vec![cfg]);

    let res = roundtrip(
        19094,
        b"GET /scripts/report.txt HTTP/1.1\r\nHost: t.test\r\n\r\n",
    );
    assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
}
