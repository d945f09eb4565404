pub use crate::config::{
    Config, RouteConfig, ServerConfig, CGI_TIMEOUT_SECS, CLIENT_IDLE_TIMEOUT_SECS,
    REQUEST_CAP_PER_CONNECTION, SOFT_CONNECTION_CAP,
};
pub use crate::error::Result;
pub use crate::http::*;

pub use mio::{
    event::Event,
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};
pub use proxy_log::{debug, errors, info, trace, warn};
pub use std::collections::HashMap;
pub use std::fs::{self, File, OpenOptions};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::os::unix::fs::MetadataExt;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

pub use std::{
    fmt::{self, Display},
    io,
    os::fd::{FromRawFd, IntoRawFd},
    process::{Command, Stdio},
    str::FromStr,
    time::SystemTime,
};

pub use crate::{
    cgi::{cgi_timeout_response, frame_cgi_output, poll_cgi_pipe, spawn_cgi, teardown_cgi, CgiPoll, CgiSession, CGI_TIMEOUT},
    handlers::{handle_delete, handle_get},
    http::HttpResponse,
    router::{resolve_target, RoutingError},
    server::Server,
    upload::{Upload, UploadState},
};

pub use crate::http::{find_subsequence, parse_part_headers, HttpRequest, PartInfo};

pub const READ_BUF_SIZE: usize = 4096;
pub const MAX_READ_DATA: usize = u16::MAX as usize; // 64KB

pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_FOUND: u16 = 302;

// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;

// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const GATEWAY_TIMEOUT: u16 = 504;
pub const CGI_LOOP_DETECTED: u16 = 508;
