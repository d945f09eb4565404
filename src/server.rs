use crate::prelude::*;

const SHUTDOWN_GRACE_SECS: u64 = 5;

struct BoundListener {
    listener: TcpListener,
    token: Token,
    configs: Vec<Arc<ServerConfig>>,
}

/// Owns every listening socket, every live connection, and every running CGI
/// session, and drives them all from a single-threaded mio event loop.
///
/// Tokens are handed out from one monotonically increasing counter shared
/// across listeners, connections, and CGI stdout pipes; which kind a ready
/// token names is recovered by checking, in order, the listener list, then
/// `cgi_to_client`, then `connections` — never by partitioning the token
/// space up front.
pub struct Server {
    listeners: Vec<BoundListener>,
    connections: HashMap<Token, HttpConnection>,
    cgi_to_client: HashMap<Token, Token>,
    next_token: usize,
    poll: Poll,
}

impl Server {
    /// Binds one listener per unique `(host, port)` pair across all server
    /// blocks. Server blocks that share a bind address are all attached to
    /// that one listener's `configs`, so `HttpConnection::resolve_config`
    /// can pick among them by `Host` header once a connection arrives.
    pub fn new(configs: Vec<ServerConfig>) -> Result<Self> {
        let poll = Poll::new()?;
        let owned: Vec<Arc<ServerConfig>> = configs.into_iter().map(Arc::new).collect();

        let mut groups: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();
        for cfg in &owned {
            for &port in &cfg.ports {
                groups
                    .entry((cfg.host.clone(), port))
                    .or_default()
                    .push(Arc::clone(cfg));
            }
        }

        let mut next_token = 0usize;
        let mut listeners = Vec::new();
        for ((host, port), cfgs) in groups {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let mut listener = TcpListener::bind(addr)?;
            let token = Token(next_token);
            next_token += 1;
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            info!("listening on {addr}");
            listeners.push(BoundListener { listener, token, configs: cfgs });
        }

        Ok(Self {
            listeners,
            connections: HashMap::new(),
            cgi_to_client: HashMap::new(),
            next_token,
            poll,
        })
    }

    /// Runs until `signals::shutdown_requested()` flips, at which point new
    /// connections stop being accepted and already-open ones get up to
    /// `SHUTDOWN_GRACE_SECS` to drain their pending writes before the loop
    /// exits unconditionally.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        let mut shutting_down = false;
        let mut shutdown_deadline = Instant::now();

        loop {
            if !shutting_down && signals::shutdown_requested() {
                shutting_down = true;
                shutdown_deadline = Instant::now() + Duration::from_secs(SHUTDOWN_GRACE_SECS);
                info!(
                    "shutdown requested, draining {} connection(s)",
                    self.connections.len()
                );
            }
            if shutting_down && (self.connections.is_empty() || Instant::now() >= shutdown_deadline)
            {
                break;
            }

            match self.poll.poll(&mut events, Some(Duration::from_millis(500))) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                let token = event.token();

                if let Some(idx) = self.listeners.iter().position(|l| l.token == token) {
                    if !shutting_down {
                        self.accept_all(idx);
                    }
                    continue;
                }

                if let Some(&client_token) = self.cgi_to_client.get(&token) {
                    self.handle_cgi_event(token, client_token);
                    continue;
                }

                if !self.connections.contains_key(&token) {
                    continue;
                }
                if event.is_readable() {
                    self.handle_read(token);
                }
                if event.is_writable() {
                    self.handle_write(token);
                }
            }

            self.reap_cgi_timeouts();
            self.reap_idle_connections();
            self.sweep_closed();
        }

        for (_, mut conn) in self.connections.drain() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        info!("shutdown complete");
        Ok(())
    }

    /// Drains every ready connection off one listener, bounded by the soft
    /// connection cap so a SYN flood can't grow `connections` without limit.
    fn accept_all(&mut self, listener_idx: usize) {
        loop {
            if self.connections.len() >= SOFT_CONNECTION_CAP {
                warn!("soft connection cap ({SOFT_CONNECTION_CAP}) reached, pausing accept");
                return;
            }

            let accepted = {
                let l = &self.listeners[listener_idx];
                l.listener.accept()
            };

            let stream = match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {e}");
                    return;
                }
            };

            let configs = self.listeners[listener_idx].configs.clone();
            let token = self.alloc_token();
            let mut conn = HttpConnection::new(stream, configs);
            match self
                .poll
                .registry()
                .register(&mut conn.stream, token, Interest::READABLE)
            {
                Ok(()) => {
                    self.connections.insert(token, conn);
                }
                Err(e) => warn!("failed to register accepted connection: {e}"),
            }
        }
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Reads one burst, then processes as many complete pipelined requests as
    /// are already buffered — stopping the moment a request's action is left
    /// unresolved (streaming a file, or a CGI child still running), since the
    /// next request must not be dispatched before the current one's response
    /// is fully on the send buffer.
    fn handle_read(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        if conn.read_data() {
            conn.closed = true;
        }
        self.drain_pipelined(token);
        self.sync_interest(token);
    }

    fn drain_pipelined(&mut self, token: Token) {
        loop {
            let Some(conn) = self.connections.get_mut(&token) else { return };
            if conn.closed || conn.request.buffer.is_empty() {
                return;
            }
            if conn.request.state != ParsingState::RequestLine {
                return;
            }
            if !matches!(conn.action, ActiveAction::None) {
                return;
            }

            match HttpRequest::proces_request(
                &self.poll,
                token,
                &mut self.next_token,
                &mut self.cgi_to_client,
                conn,
            ) {
                Ok(closed) => {
                    if closed {
                        conn.closed = true;
                        return;
                    }
                }
                Err(_) => {
                    conn.closed = true;
                    return;
                }
            }
        }
    }

    /// Drains the send buffer, refilling it from an in-progress
    /// `FileDownload` whenever it empties out, until the socket would block
    /// or there's genuinely nothing left to send.
    fn handle_write(&mut self, token: Token) {
        loop {
            let Some(conn) = self.connections.get_mut(&token) else { return };

            if conn.write_buffer.is_empty() {
                if let ActiveAction::FileDownload(ref mut file, ref mut remaining) = conn.action {
                    if *remaining > 0 {
                        let cap = READ_BUF_SIZE.min(*remaining);
                        let mut buf = vec![0u8; cap];
                        match file.read(&mut buf) {
                            Ok(0) => *remaining = 0,
                            Ok(n) => {
                                conn.write_buffer.extend_from_slice(&buf[..n]);
                                *remaining -= n;
                            }
                            Err(_) => {
                                *remaining = 0;
                                conn.closed = true;
                            }
                        }
                    }
                    if *remaining == 0 {
                        conn.action = ActiveAction::None;
                    }
                }
            }

            if conn.write_buffer.is_empty() {
                break;
            }

            if conn.write_data() {
                conn.closed = true;
                break;
            }
            if !conn.write_buffer.is_empty() {
                break;
            }
        }

        let ready_for_more = self
            .connections
            .get(&token)
            .is_some_and(|c| c.write_buffer.is_empty() && matches!(c.action, ActiveAction::None));
        if ready_for_more {
            self.drain_pipelined(token);
        }
        self.sync_interest(token);
    }

    /// Drains whatever is ready on a CGI child's stdout pipe; on EOF (or a
    /// read error) reaps the child and frames its output as the response.
    fn handle_cgi_event(&mut self, cgi_token: Token, client_token: Token) {
        let Some(conn) = self.connections.get_mut(&client_token) else {
            self.cgi_to_client.remove(&cgi_token);
            return;
        };
        let ActiveAction::Cgi(ref mut session) = conn.action else {
            self.cgi_to_client.remove(&cgi_token);
            return;
        };

        match poll_cgi_pipe(session) {
            CgiPoll::Pending => {}
            CgiPoll::Done => self.finish_cgi(client_token, cgi_token, true),
            CgiPoll::Error => self.finish_cgi(client_token, cgi_token, false),
        }
    }

    fn finish_cgi(&mut self, client_token: Token, cgi_token: Token, clean_eof: bool) {
        self.cgi_to_client.remove(&cgi_token);
        let Some(conn) = self.connections.get_mut(&client_token) else { return };
        let ActiveAction::Cgi(mut session) =
            std::mem::replace(&mut conn.action, ActiveAction::None)
        else {
            return;
        };
        conn.cgi_token = None;

        let exited_ok = clean_eof && session.child.wait().map(|s| s.success()).unwrap_or(false);
        let _ = self.poll.registry().deregister(&mut session.pipe);
        let _ = std::fs::remove_file(&session.tmp_path);

        conn.response = frame_cgi_output(&session.buffer, exited_ok);
        conn.finalize_response();

        self.drain_pipelined(client_token);
        self.sync_interest(client_token);
    }

    /// Kills and reaps any CGI child that has run past `CGI_TIMEOUT`,
    /// replacing its connection's pending response with a `508`.
    fn reap_cgi_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter_map(|(&token, conn)| match &conn.action {
                ActiveAction::Cgi(session) if now.duration_since(session.start) >= CGI_TIMEOUT => {
                    Some(token)
                }
                _ => None,
            })
            .collect();

        for token in expired {
            if let Some(conn) = self.connections.get_mut(&token) {
                if let ActiveAction::Cgi(mut session) =
                    std::mem::replace(&mut conn.action, ActiveAction::None)
                {
                    if let Some(cgi_token) = conn.cgi_token.take() {
                        self.cgi_to_client.remove(&cgi_token);
                    }
                    teardown_cgi(&mut session, &self.poll);
                    warn!("CGI script exceeded {}s, killed", CGI_TIMEOUT.as_secs());
                    conn.response = cgi_timeout_response();
                    conn.finalize_response();
                }
            }
            self.sync_interest(token);
        }
    }

    fn reap_idle_connections(&mut self) {
        let now = Instant::now();
        let idle: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_idle_expired(now))
            .map(|(&token, _)| token)
            .collect();

        for token in idle {
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.closed = true;
                conn.write_buffer.clear();
            }
        }
    }

    fn sweep_closed(&mut self) {
        let done: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.should_close())
            .map(|(&token, _)| token)
            .collect();
        for token in done {
            self.close_connection(token);
        }
    }

    fn close_connection(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else { return };
        if let ActiveAction::Cgi(mut session) = std::mem::replace(&mut conn.action, ActiveAction::None) {
            if let Some(cgi_token) = conn.cgi_token.take() {
                self.cgi_to_client.remove(&cgi_token);
            }
            teardown_cgi(&mut session, &self.poll);
        }
        let _ = self.poll.registry().deregister(&mut conn.stream);
    }

    /// Re-registers a connection's socket interest: write readiness is only
    /// needed while there's something queued to send or a file is streaming.
    fn sync_interest(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        if conn.should_close() {
            return;
        }
        let interest = if !conn.write_buffer.is_empty()
            || matches!(conn.action, ActiveAction::FileDownload(_, _))
        {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        let _ = self.poll.registry().reregister(&mut conn.stream, token, interest);
    }
}
