use crate::http::Method;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";
pub const SOFT_CONNECTION_CAP: usize = 800;
pub const CLIENT_IDLE_TIMEOUT_SECS: u64 = 60;
pub const CGI_TIMEOUT_SECS: u64 = 5;
pub const REQUEST_CAP_PER_CONNECTION: usize = 1000;

/// A routing rule scoped within a virtual server: matched by path prefix or
/// by an extension suffix (`*.py`), never both.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<Method>,
    pub root: Option<String>,
    pub index: Option<String>,
    pub autoindex: bool,
    pub cgi_ext: Vec<String>,
    pub upload_dir: Option<String>,
    pub redirect: Option<(u16, String)>,
}

impl RouteConfig {
    pub fn is_suffix_pattern(&self) -> bool {
        self.path.starts_with('*')
    }

    pub fn suffix(&self) -> &str {
        &self.path[1..]
    }

    pub fn allows(&self, method: &Method) -> bool {
        !self.methods.is_empty() && self.methods.contains(method)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec![Method::Get],
            root: None,
            index: None,
            autoindex: false,
            cgi_ext: Vec::new(),
            upload_dir: None,
            redirect: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub root: String,
    pub index: String,
    pub client_max_body_size: usize,
    pub error_pages: HashMap<u16, PathBuf>,
    pub locations: Vec<RouteConfig>,
}

impl ServerConfig {
    pub fn matches_host(&self, host_header: &str) -> bool {
        let name = host_header.split(':').next().unwrap_or(host_header);
        self.server_name == name
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            root: DEFAULT_ROOT.to_string(),
            index: DEFAULT_FILE.to_string(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_pages: HashMap::new(),
            locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
}

/// Parses a human body-size literal such as `5k`, `50m`, `1g`, or a bare
/// number of bytes. Suffix is case-insensitive; `k`/`m`/`g` are powers of
/// 1024, matching how the rest of the server counts bytes.
pub fn parse_size(raw: &str) -> Result<usize, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty size literal".to_string());
    }
    let (digits, mult) = match raw.chars().last().unwrap().to_ascii_lowercase() {
        'k' => (&raw[..raw.len() - 1], 1024usize),
        'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        'g' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    digits
        .parse::<usize>()
        .map(|n| n * mult)
        .map_err(|e| format!("invalid size literal '{}': {}", raw, e))
}
