//! End-to-end tests of `load_config` against real nginx-style `.conf` files
//! on disk (unit tests for the lexer/parser/validator grammar details live
//! alongside those modules in `src/config/`).

mod common;

use originserve::config::load_config;
use originserve::http::Method;
use std::io::Write;

fn write_conf(label: &str, body: &str) -> std::path::PathBuf {
    let dir = common::unique_temp_dir(label);
    let path = dir.join("site.conf");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn loads_a_minimal_single_server_file() {
    let root = common::unique_temp_dir("cfg-minimal-root");
    let conf = write_conf(
        "cfg-minimal",
        &format!(
            r#"
            server {{
                listen 127.0.0.1:19101;
                server_name t.test;
                root {};
                index index.html;
                max_size 1m;
                location / {{
                    methods GET;
                }}
            }}
            "#,
            root.to_str().unwrap()
        ),
    );

    let servers = load_config(&conf).unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].server_name, "t.test");
    assert_eq!(servers[0].ports, vec![19101]);
    assert_eq!(servers[0].locations.len(), 1);
    assert!(servers[0].locations[0].allows(&Method::Get));
}

#[test]
fn two_server_blocks_parse_independently_with_distinct_locations() {
    let root_a = common::unique_temp_dir("cfg-multi-a");
    let root_b = common::unique_temp_dir("cfg-multi-b");
    let conf = write_conf(
        "cfg-multi",
        &format!(
            r#"
            server {{
                listen 127.0.0.1:19102;
                server_name a.test;
                root {};
                index index.html;
                max_size 1m;
                location / {{
                    methods GET;
                }}
            }}
            server {{
                listen 127.0.0.1:19103;
                server_name b.test;
                root {};
                index index.html;
                max_size 2m;
                location / {{
                    methods GET POST;
                }}
                location /up {{
                    methods POST;
                    upload_path uploads;
                }}
            }}
            "#,
            root_a.to_str().unwrap(),
            root_b.to_str().unwrap()
        ),
    );

    let servers = load_config(&conf).unwrap();
    assert_eq!(servers.len(), 2);
    let b = servers.iter().find(|s| s.server_name == "b.test").unwrap();
    assert_eq!(b.locations.len(), 2);
    let up = b.locations.iter().find(|l| l.path == "/up").unwrap();
    assert_eq!(up.upload_dir.as_deref(), Some("uploads"));
}

#[test]
fn missing_required_directive_is_rejected() {
    let conf = write_conf(
        "cfg-missing-index",
        r#"
        server {
            listen 127.0.0.1:19104;
            server_name t.test;
            root /tmp;
            max_size 1m;
            location / {
                methods GET;
            }
        }
        "#,
    );
    assert!(load_config(&conf).is_err());
}

#[test]
fn invalid_error_page_status_drops_the_offending_server_block() {
    let root = common::unique_temp_dir("cfg-bad-status-root");
    let conf = write_conf(
        "cfg-bad-status",
        &format!(
            r#"
            server {{
                listen 127.0.0.1:19105;
                server_name t.test;
                root {};
                index index.html;
                max_size 1m;
                error_page 999 /missing.html;
                location / {{
                    methods GET;
                }}
            }}
            "#,
            root.to_str().unwrap()
        ),
    );

    let servers = load_config(&conf).unwrap();
    assert!(servers.is_empty());
}

#[test]
fn served_config_drives_a_real_server_end_to_end() {
    let root = common::unique_temp_dir("cfg-e2e-root");
    std::fs::write(root.join("index.html"), "from-conf").unwrap();
    let conf = write_conf(
        "cfg-e2e",
        &format!(
            r#"
            server {{
                listen 127.0.0.1:19106;
                server_name t.test;
                root {};
                index index.html;
                max_size 1m;
                location / {{
                    methods GET;
                }}
            }}
            "#,
            root.to_str().unwrap()
        ),
    );

    let servers = load_config(&conf).unwrap();
    common::spawn_server(servers);

    let res = common::roundtrip(19106, b"GET /index.html HTTP/1.1\r\nHost: t.test\r\n\r\n");
    assert!(String::from_utf8_lossy(&res).starts_with("HTTP/1.1 200 OK\r\n"));
}
