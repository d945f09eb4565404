use std::collections::{HashMap, HashSet};

use proxy_log::warn;

use crate::config::types::ServerConfig;

pub fn validate_configs(configs: Vec<ServerConfig>) -> Vec<ServerConfig> {
    let mut conflict_indices = HashSet::new();

    // Exact (host, port, server_name) duplicates.
    let mut usage_map: HashMap<(String, u16, String), Vec<usize>> = HashMap::new();
    for (idx, config) in configs.iter().enumerate() {
        for port in &config.ports {
            let key = (config.host.clone(), *port, config.server_name.clone());
            usage_map.entry(key).or_default().push(idx);
        }
    }
    for ((host, port, server_name), indices) in usage_map {
        if indices.len() > 1 {
            warn!(
                "conflict: multiple servers bind {}:{} with name '{}', dropping both",
                host, port, server_name
            );
            conflict_indices.extend(indices);
        }
    }

    // Wildcard vs. specific-address bind conflicts on the same port.
    let mut port_hosts: HashMap<u16, HashSet<String>> = HashMap::new();
    for config in &configs {
        for port in &config.ports {
            port_hosts.entry(*port).or_default().insert(config.host.clone());
        }
    }
    for (port, hosts) in port_hosts {
        if hosts.contains("0.0.0.0") && hosts.len() > 1 {
            warn!(
                "bind conflict: port {} mixes wildcard 0.0.0.0 with specific addresses {:?}",
                port, hosts
            );
            for (idx, config) in configs.iter().enumerate() {
                if config.ports.contains(&port) {
                    conflict_indices.insert(idx);
                }
            }
        }
    }

    // Per-server sanity: status codes and filesystem references.
    for (idx, config) in configs.iter().enumerate() {
        let mut valid = true;

        if config.ports.contains(&0) {
            warn!(
                "server '{}' has an invalid port 0, port must be in [1, 65535]",
                config.server_name
            );
            valid = false;
        }

        for (code, path) in &config.error_pages {
            if !(100..=599).contains(code) {
                warn!(
                    "server '{}' has invalid error_page status code {}",
                    config.server_name, code
                );
                valid = false;
            }
            if std::fs::File::open(path).is_err() {
                warn!(
                    "server '{}' refers to missing error page '{}' for code {}",
                    config.server_name,
                    path.display(),
                    code
                );
                valid = false;
            }
        }

        if config.locations.is_empty() {
            warn!("server '{}' declares no locations", config.server_name);
            valid = false;
        }

        for route in &config.locations {
            let root = route.root.as_deref().unwrap_or(&config.root);
            if std::fs::read_dir(root).is_err() {
                warn!(
                    "server '{}' location '{}' refers to invalid root directory '{}'",
                    config.server_name, route.path, root
                );
                valid = false;
            }
        }

        if !valid {
            conflict_indices.insert(idx);
        }
    }

    let dropped = conflict_indices.len();
    let valid_configs: Vec<ServerConfig> = configs
        .into_iter()
        .enumerate()
        .filter_map(|(idx, config)| if conflict_indices.contains(&idx) { None } else { Some(config) })
        .collect();

    if dropped > 0 {
        warn!("{} server block(s) dropped due to validation failures", dropped);
    }

    valid_configs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RouteConfig;

    fn make_config(host: &str, ports: Vec<u16>, name: &str) -> ServerConfig {
        let mut c = ServerConfig::default();
        c.host = host.to_string();
        c.ports = ports;
        c.server_name = name.to_string();
        c.locations.push(RouteConfig::default());
        c
    }

    #[test]
    fn test_validate_no_conflicts() {
        let configs = vec![
            make_config("127.0.0.1", vec![8001], "s1"),
            make_config("127.0.0.1", vec![8002], "s2"),
        ];
        assert_eq!(validate_configs(configs).len(), 2);
    }

    #[test]
    fn test_validate_virtual_hosts_ok() {
        let configs = vec![
            make_config("127.0.0.1", vec![8080], "example.com"),
            make_config("127.0.0.1", vec![8080], "api.example.com"),
        ];
        assert_eq!(validate_configs(configs).len(), 2);
    }

    #[test]
    fn test_validate_conflict_drops_both() {
        let configs = vec![
            make_config("127.0.0.1", vec![8080], "same.com"),
            make_config("127.0.0.1", vec![8080], "same.com"),
            make_config("127.0.0.1", vec![8081], "other.com"),
        ];
        let valid = validate_configs(configs);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].server_name, "other.com");
    }

    #[test]
    fn test_validate_multi_port_partial_conflict() {
        let configs = vec![
            make_config("127.0.0.1", vec![80, 81], "foo"),
            make_config("127.0.0.1", vec![80], "foo"),
        ];
        assert_eq!(validate_configs(configs).len(), 0);
    }

    #[test]
    fn test_validate_wildcard_conflict() {
        let configs = vec![
            make_config("0.0.0.0", vec![8080], "s1"),
            make_config("127.0.0.1", vec![8080], "s2"),
        ];
        assert_eq!(validate_configs(configs).len(), 0);
    }

    #[test]
    fn test_validate_wildcard_no_conflict() {
        let configs = vec![
            make_config("0.0.0.0", vec![8080], "s1"),
            make_config("0.0.0.0", vec![8080], "s2"),
        ];
        assert_eq!(validate_configs(configs).len(), 2);
    }

    #[test]
    fn test_validate_invalid_status_code() {
        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.error_pages.insert(99, "exists".into());
        assert_eq!(validate_configs(vec![config]).len(), 0);
    }

    #[test]
    fn test_validate_port_zero_is_rejected() {
        let config = make_config("127.0.0.1", vec![0], "s1");
        assert_eq!(validate_configs(vec![config]).len(), 0);
    }

    #[test]
    fn test_validate_missing_files() {
        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.error_pages.insert(404, "/non/existent/path/err.html".into());
        assert_eq!(validate_configs(vec![config]).len(), 0);
    }

    #[test]
    fn test_validate_missing_root() {
        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.locations[0].root = Some("/non/existent/dir".to_string());
        assert_eq!(validate_configs(vec![config]).len(), 0);
    }

    #[test]
    fn test_validate_valid_files() {
        let temp_dir = std::env::temp_dir();
        let file_path = temp_dir.join("originserve_test_err.html");
        std::fs::write(&file_path, "error").unwrap();

        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.error_pages.insert(404, file_path.clone());
        config.locations[0].root = Some(temp_dir.to_str().unwrap().to_string());

        assert_eq!(validate_configs(vec![config]).len(), 1);
        let _ = std::fs::remove_file(file_path);
    }
}
