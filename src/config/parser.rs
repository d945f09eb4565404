use std::fmt;

use crate::config::lexer::{Lexer, Loc, Token, TokenKind};
use crate::config::types::{Config, RouteConfig, ServerConfig, parse_size};
use crate::http::Method;

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub loc: Option<Loc>,
    pub context: Vec<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\u{274c} \x1b[1;31mConfiguration Error\x1b[0m: {}", self.message)?;
        if let Some(loc) = self.loc {
            write!(f, " \x1b[38;5;244m(at line {}, col {})\x1b[0m", loc.line, loc.col)?;
        }
        if !self.context.is_empty() {
            writeln!(f, "\n   \x1b[1;34mContext trace:\x1b[0m")?;
            for (i, ctx) in self.context.iter().rev().enumerate() {
                let indent = " ".repeat(2 + i * 2);
                writeln!(f, "{}\u{21b3} {}", indent, ctx)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

pub type ParseResult<T> = Result<T, ConfigError>;

pub struct ConfigParser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl ConfigParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_loc(&self) -> Option<Loc> {
        self.peek().map(|t| t.loc)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> ConfigError {
        ConfigError { message: message.into(), loc: self.peek_loc(), context: Vec::new() }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        match self.advance() {
            Some(t) if t.kind == kind => Ok(()),
            Some(t) => Err(ConfigError {
                message: format!("expected {:?}, found {:?}", kind, t.kind),
                loc: Some(t.loc),
                context: Vec::new(),
            }),
            None => Err(ConfigError {
                message: format!("expected {:?}, found end of file", kind),
                loc: None,
                context: Vec::new(),
            }),
        }
    }

    fn expect_word(&mut self, what: &str) -> ParseResult<String> {
        match self.advance() {
            Some(Token { kind: TokenKind::Word(s), .. }) => Ok(s),
            Some(Token { kind: TokenKind::StringLit(s), .. }) => Ok(s),
            Some(t) => Err(ConfigError {
                message: format!("expected {}, found {:?}", what, t.kind),
                loc: Some(t.loc),
                context: Vec::new(),
            }),
            None => Err(ConfigError {
                message: format!("expected {}, found end of file", what),
                loc: None,
                context: Vec::new(),
            }),
        }
    }

    fn peek_is_word(&self) -> bool {
        matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Word(_)) | Some(TokenKind::StringLit(_))
        )
    }

    fn directive_name(&mut self) -> ParseResult<(String, Loc)> {
        let loc = self.peek_loc().ok_or_else(|| self.err("expected a directive, found end of file"))?;
        let name = self.expect_word("a directive name")?;
        Ok((name, loc))
    }

    pub fn parse(&mut self) -> ParseResult<Config> {
        let mut servers = Vec::new();
        while self.peek().is_some() {
            let (name, loc) = self.directive_name()?;
            if name != "server" {
                return Err(ConfigError {
                    message: format!("expected top-level 'server' block, found '{}'", name),
                    loc: Some(loc),
                    context: Vec::new(),
                });
            }
            servers.push(self.parse_server().map_err(|mut e| {
                e.context.push("parsing server block".to_string());
                e
            })?);
        }
        Ok(Config { servers })
    }

    fn parse_server(&mut self) -> ParseResult<ServerConfig> {
        self.expect(TokenKind::LBrace)?;
        let mut cfg = ServerConfig {
            host: String::new(),
            ports: Vec::new(),
            server_name: String::new(),
            default_server: false,
            root: String::new(),
            index: String::new(),
            client_max_body_size: 0,
            error_pages: Default::default(),
            locations: Vec::new(),
        };
        let mut have_host = false;
        let mut have_root = false;
        let mut have_index = false;
        let mut have_name = false;
        let mut have_max_size = false;

        while !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace)) {
            if self.peek().is_none() {
                return Err(self.err("unterminated server block, expected '}'"));
            }
            let (name, loc) = self.directive_name()?;
            match name.as_str() {
                "listen" => {
                    let v = self.expect_word("a listen value")?;
                    self.expect(TokenKind::Semicolon)?;
                    if let Some((h, p)) = v.rsplit_once(':') {
                        cfg.host = h.to_string();
                        have_host = true;
                        cfg.ports.push(p.parse().map_err(|_| ConfigError {
                            message: format!("invalid port in listen directive: '{}'", p),
                            loc: Some(loc),
                            context: Vec::new(),
                        })?);
                    } else {
                        cfg.ports.push(v.parse().map_err(|_| ConfigError {
                            message: format!("invalid port in listen directive: '{}'", v),
                            loc: Some(loc),
                            context: Vec::new(),
                        })?);
                    }
                }
                "host" => {
                    cfg.host = self.expect_word("a host address")?;
                    have_host = true;
                    self.expect(TokenKind::Semicolon)?;
                }
                "server_name" => {
                    cfg.server_name = self.expect_word("a server name")?;
                    have_name = true;
                    self.expect(TokenKind::Semicolon)?;
                }
                "root" => {
                    cfg.root = self.expect_word("a root path")?;
                    have_root = true;
                    self.expect(TokenKind::Semicolon)?;
                }
                "index" => {
                    cfg.index = self.expect_word("an index filename")?;
                    have_index = true;
                    self.expect(TokenKind::Semicolon)?;
                }
                "max_size" => {
                    let raw = self.expect_word("a max_size literal")?;
                    cfg.client_max_body_size = parse_size(&raw).map_err(|m| ConfigError {
                        message: m,
                        loc: Some(loc),
                        context: Vec::new(),
                    })?;
                    have_max_size = true;
                    self.expect(TokenKind::Semicolon)?;
                }
                "default_server" => {
                    let v = self.expect_word("on/off")?;
                    cfg.default_server = v == "on" || v == "true";
                    self.expect(TokenKind::Semicolon)?;
                }
                "error_page" => {
                    let code = self.expect_word("a status code")?;
                    let path = self.expect_word("a file path")?;
                    self.expect(TokenKind::Semicolon)?;
                    let code: u16 = code.parse().map_err(|_| ConfigError {
                        message: format!("invalid status code in error_page: '{}'", code),
                        loc: Some(loc),
                        context: Vec::new(),
                    })?;
                    cfg.error_pages.insert(code, path.into());
                }
                "location" => {
                    let pattern = self.expect_word("a location pattern")?;
                    let route = self.parse_location(pattern).map_err(|mut e| {
                        e.context.push("parsing location block".to_string());
                        e
                    })?;
                    cfg.locations.push(route);
                }
                other => {
                    return Err(ConfigError {
                        message: format!("unknown server directive '{}'", other),
                        loc: Some(loc),
                        context: Vec::new(),
                    });
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        if !have_host {
            return Err(self.err("server block is missing required 'host'/'listen' directive"));
        }
        if cfg.ports.is_empty() {
            return Err(self.err("server block is missing required 'listen' directive"));
        }
        if !have_root {
            return Err(self.err("server block is missing required 'root' directive"));
        }
        if !have_index {
            return Err(self.err("server block is missing required 'index' directive"));
        }
        if !have_name {
            return Err(self.err("server block is missing required 'server_name' directive"));
        }
        if !have_max_size {
            return Err(self.err("server block is missing required 'max_size' directive"));
        }
        if cfg.locations.is_empty() {
            return Err(self.err("server block must declare at least one 'location'"));
        }

        Ok(cfg)
    }

    fn parse_location(&mut self, pattern: String) -> ParseResult<RouteConfig> {
        self.expect(TokenKind::LBrace)?;
        let mut route = RouteConfig { path: pattern, methods: Vec::new(), ..Default::default() };

        while !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace)) {
            if self.peek().is_none() {
                return Err(self.err("unterminated location block, expected '}'"));
            }
            let (name, loc) = self.directive_name()?;
            match name.as_str() {
                "methods" => {
                    let mut methods = Vec::new();
                    while self.peek_is_word() {
                        let m = self.expect_word("an HTTP method")?;
                        methods.push(m.parse::<Method>().map_err(|_| ConfigError {
                            message: format!("unsupported method '{}' in methods directive", m),
                            loc: Some(loc),
                            context: Vec::new(),
                        })?);
                    }
                    self.expect(TokenKind::Semicolon)?;
                    route.methods = methods;
                }
                "root" => {
                    route.root = Some(self.expect_word("a root path")?);
                    self.expect(TokenKind::Semicolon)?;
                }
                "index" => {
                    route.index = Some(self.expect_word("an index filename")?);
                    self.expect(TokenKind::Semicolon)?;
                }
                "autoindex" => {
                    let v = self.expect_word("on/off")?;
                    route.autoindex = v == "on" || v == "true";
                    self.expect(TokenKind::Semicolon)?;
                }
                "cgi_extension" => {
                    let mut exts = Vec::new();
                    while self.peek_is_word() {
                        exts.push(self.expect_word("a cgi extension")?);
                    }
                    self.expect(TokenKind::Semicolon)?;
                    route.cgi_ext = exts;
                }
                "upload_path" => {
                    route.upload_dir = Some(self.expect_word("an upload directory")?);
                    self.expect(TokenKind::Semicolon)?;
                }
                "return" => {
                    let code = self.expect_word("a redirect status code")?;
                    let url = self.expect_word("a redirect url")?;
                    self.expect(TokenKind::Semicolon)?;
                    let code: u16 = code.parse().map_err(|_| ConfigError {
                        message: format!("invalid redirect status code '{}'", code),
                        loc: Some(loc),
                        context: Vec::new(),
                    })?;
                    route.redirect = Some((code, url));
                }
                other => {
                    return Err(ConfigError {
                        message: format!("unknown location directive '{}'", other),
                        loc: Some(loc),
                        context: Vec::new(),
                    });
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(route)
    }
}

pub fn parse_config(source: &str) -> ParseResult<Config> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize().map_err(|e| ConfigError {
        message: e,
        loc: None,
        context: vec!["lexing phase".to_string()],
    })?;
    let mut parser = ConfigParser::new(tokens);
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"
        server {
            listen 8080;
            host 127.0.0.1;
            server_name example.com;
            root ./www;
            index index.html;
            max_size 5m;
            error_page 404 /errors/404.html;
            location / {
                methods GET POST;
                autoindex on;
            }
            location *.py {
                methods GET POST;
                cgi_extension .py;
            }
        }
        "#
    }

    #[test]
    fn parses_minimal_server() {
        let cfg = parse_config(sample()).expect("should parse");
        assert_eq!(cfg.servers.len(), 1);
        let s = &cfg.servers[0];
        assert_eq!(s.ports, vec![8080]);
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.server_name, "example.com");
        assert_eq!(s.client_max_body_size, 5 * 1024 * 1024);
        assert_eq!(s.locations.len(), 2);
        assert!(s.locations[1].is_suffix_pattern());
        assert_eq!(s.locations[1].suffix(), ".py");
    }

    #[test]
    fn missing_brace_is_an_error() {
        let bad = "server { listen 8080;";
        assert!(parse_config(bad).is_err());
    }

    #[test]
    fn missing_required_directive_is_an_error() {
        let bad = r#"
        server {
            listen 8080;
            host 127.0.0.1;
            server_name x;
            root ./www;
            index index.html;
            location / { methods GET; }
        }
        "#;
        let err = parse_config(bad).unwrap_err();
        assert!(err.message.contains("max_size"));
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let bad = r#"
        server {
            listen 8080;
            host 127.0.0.1;
            server_name x;
            root ./www;
            index index.html;
            max_size 1m;
            bogus_directive foo;
            location / { methods GET; }
        }
        "#;
        assert!(parse_config(bad).unwrap_err().message.contains("unknown"));
    }

    #[test]
    fn multiple_servers_parse_independently() {
        let src = format!("{}\n{}", sample(), sample());
        let cfg = parse_config(&src).expect("should parse");
        assert_eq!(cfg.servers.len(), 2);
    }
}
