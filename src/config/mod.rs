mod display;
mod lexer;
mod parser;
mod types;
mod validate;

pub use display::display_config;
pub use parser::{parse_config, ConfigError, ConfigParser, ParseResult};
pub use types::{
    parse_size, Config, RouteConfig, ServerConfig, CGI_TIMEOUT_SECS, CLIENT_IDLE_TIMEOUT_SECS,
    DEFAULT_FILE, DEFAULT_HOST, DEFAULT_MAX_BODY_SIZE, DEFAULT_PORT, DEFAULT_ROOT,
    DEFAULT_ROUTE_PATH, DEFAULT_SERVER_NAME, REQUEST_CAP_PER_CONNECTION, SOFT_CONNECTION_CAP,
};
pub use validate::validate_configs;

use std::path::Path;

/// Loads, parses and validates a configuration file, returning the surviving
/// server blocks. Invalid individual blocks are dropped with a warning rather
/// than aborting the whole file; a completely empty result after validation
/// is still returned as-is and is the caller's problem to reject.
pub fn load_config(path: &Path) -> crate::error::Result<Vec<ServerConfig>> {
    let source = std::fs::read_to_string(path)?;
    let config = parse_config(&source)?;
    Ok(validate_configs(config.servers))
}
