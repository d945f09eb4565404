use crate::prelude::*;

/// What a connection is doing with the bytes of the response it owes the
/// client right now. Exactly one of these is active at a time; `None` means
/// "nothing to stream, whatever's in `write_buffer` is the whole answer".
pub enum ActiveAction {
    /// Body bytes are being appended to an upload (either the configured
    /// upload directory, or, via `Upload::target_override`, the exact
    /// filesystem target of a generic verbatim-write POST).
    Upload,
    /// Streaming a file back to the client; `usize` is the remaining byte
    /// count so the write phase knows when to stop refilling.
    FileDownload(File, usize),
    /// Body bytes are being buffered for a CGI script's stdin temp file;
    /// the script itself hasn't been spawned yet.
    BufferingCgi { script_path: PathBuf, program: String },
    /// A CGI child is running; its stdout pipe is registered with the poll
    /// under its own token, looked up via `Server::cgi_to_client`.
    Cgi(CgiSession),
    /// A body is present but nothing downstream wants it; drain and drop it.
    Discard,
    None,
}

impl fmt::Debug for ActiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveAction::Upload => write!(f, "Upload"),
            ActiveAction::FileDownload(_, n) => write!(f, "FileDownload(remaining={n})"),
            ActiveAction::BufferingCgi { script_path, .. } => {
                write!(f, "BufferingCgi({})", script_path.display())
            }
            ActiveAction::Cgi(_) => write!(f, "Cgi"),
            ActiveAction::Discard => write!(f, "Discard"),
            ActiveAction::None => write!(f, "None"),
        }
    }
}

pub struct HttpConnection {
    pub stream: TcpStream,
    pub write_buffer: Vec<u8>,
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub config_list: Vec<Arc<ServerConfig>>,
    pub s_cfg: Option<Arc<ServerConfig>>,
    pub action: ActiveAction,
    pub upload_manager: Option<Upload>,
    pub cgi_stdin_buffer: Vec<u8>,
    pub total_body_read: usize,
    pub body_remaining: usize,
    pub boundary: String,
    pub closed: bool,
    pub requests_served: usize,
    pub cgi_token: Option<Token>,
    pub idle_deadline: Instant,
}

impl HttpConnection {
    pub fn new(stream: TcpStream, config_list: Vec<Arc<ServerConfig>>) -> Self {
        Self {
            stream,
            write_buffer: Vec::new(),
            request: HttpRequest::new(),
            response: HttpResponse::new(HTTP_OK, "OK"),
            upload_manager: None,
            cgi_stdin_buffer: Vec::new(),
            config_list,
            s_cfg: None,
            action: ActiveAction::None,
            total_body_read: 0,
            body_remaining: 0,
            boundary: String::new(),
            closed: false,
            requests_served: 0,
            cgi_token: None,
            idle_deadline: Instant::now() + Duration::from_secs(CLIENT_IDLE_TIMEOUT_SECS),
        }
    }

    pub fn should_close(&self) -> bool {
        self.closed && self.write_buffer.is_empty()
    }

    pub fn touch(&mut self) {
        self.idle_deadline = Instant::now() + Duration::from_secs(CLIENT_IDLE_TIMEOUT_SECS);
    }

    pub fn is_idle_expired(&self, now: Instant) -> bool {
        now >= self.idle_deadline
    }

    /// Resolves the virtual server that owns this connection's listener.
    /// Host-header matching picks among servers sharing one listener;
    /// `default_server` is the fallback, then simply the first one bound.
    pub fn resolve_config(&self) -> Arc<ServerConfig> {
        if let Some(host_header) = self.request.headers.get("host") {
            for config in &self.config_list {
                if config.matches_host(host_header) {
                    return Arc::clone(config);
                }
            }
        }
        for config in &self.config_list {
            if config.default_server {
                return Arc::clone(config);
            }
        }
        Arc::clone(&self.config_list[0])
    }

    /// Reads one burst off the socket into the request buffer. Returns
    /// `true` if the peer closed (EOF) or the socket errored.
    pub fn read_data(&mut self) -> bool {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return true,
                Ok(n) => {
                    self.request.buffer.extend_from_slice(&buf[..n]);
                    self.touch();
                    if self.request.buffer.len() >= MAX_READ_DATA {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return true,
            }
        }
        false
    }

    /// Writes one burst of the send buffer to the socket. Returns `true` on
    /// an error that should close the connection.
    pub fn write_data(&mut self) -> bool {
        match self.stream.write(&self.write_buffer) {
            Ok(n) => {
                self.write_buffer.drain(..n);
                false
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) if e.kind() == ErrorKind::Interrupted => false,
            Err(_) => true,
        }
    }

    /// Appends the finished response to the send buffer and computes
    /// keep-alive per §4.3: HTTP/1.1 defaults open, HTTP/1.0 defaults
    /// closed; either can be overridden by an explicit `Connection` header,
    /// and the per-connection request cap always wins.
    pub fn finalize_response(&mut self) {
        let explicit = self
            .request
            .headers
            .get("connection")
            .map(|v| v.to_ascii_lowercase());

        let keep_alive = match explicit.as_deref() {
            Some("close") => false,
            Some("keep-alive") => true,
            _ => self.request.version != "HTTP/1.0",
        };

        self.requests_served += 1;
        let is_error = self.response.status_code >= 400;
        let over_cap = self.requests_served >= REQUEST_CAP_PER_CONNECTION;

        if !keep_alive || is_error || over_cap {
            self.response.set_header("connection", "close");
            self.closed = true;
        } else {
            self.response.set_header("connection", "keep-alive");
        }

        self.write_buffer.extend_from_slice(&self.response.to_bytes());
        self.response = HttpResponse::new(HTTP_OK, "OK");
    }
}
