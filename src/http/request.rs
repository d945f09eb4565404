use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    HeadersDone,
    Body,
    ChunkedBody,
    Complete,
}

const CRLF_LEN: usize = 2;

#[derive(Debug, PartialEq)]
pub enum ParseError {
    IncompleteRequestLine,
    MalformedRequestLine,
    InvalidMethod,
    HeaderTooLong,
    InvalidChunkSize,
    PayloadTooLarge,
    Upload(u16),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IncompleteRequestLine => write!(f, "incomplete request line"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidMethod => write!(f, "invalid or unsupported HTTP method"),
            ParseError::HeaderTooLong => write!(f, "header line too long"),
            ParseError::InvalidChunkSize => write!(f, "invalid chunk size"),
            ParseError::PayloadTooLarge => write!(f, "payload too large"),
            ParseError::Upload(code) => write!(f, "upload failed with status {code}"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum ChunkState {
    ReadSize,
    ReadData(usize),
    ReadTrailingCrlf,
    ReadTrailers,
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub trailers: HashMap<String, String>,
    pub buffer: Vec<u8>,
    pub cursor: usize,
    pub state: ParsingState,
    pub chunk_state: ChunkState,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::Get,
            url: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            trailers: HashMap::new(),
            buffer: Vec::with_capacity(READ_BUF_SIZE),
            cursor: 0,
            state: ParsingState::RequestLine,
            chunk_state: ChunkState::ReadSize,
        }
    }

    fn clear(&mut self) {
        self.state = ParsingState::RequestLine;
        self.chunk_state = ChunkState::ReadSize;
        self.headers.clear();
        self.trailers.clear();
    }

    pub fn finish_request(&mut self) {
        self.buffer.drain(..self.cursor);
        self.cursor = 0;
        self.clear();
    }

    pub fn query_string(&self) -> &str {
        self.url.splitn(2, '?').nth(1).unwrap_or("")
    }

    pub fn path_only(&self) -> &str {
        self.url.splitn(2, '?').next().unwrap_or(&self.url)
    }

    /// Drives the request state machine as far as the currently buffered bytes
    /// allow, then reacts to the outcome: a finished request is finalized and
    /// handed off, a parse failure produces an error response, and an
    /// incomplete request simply waits for more bytes on the next read.
    pub fn proces_request(
        poll: &Poll,
        token: Token,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        conn: &mut HttpConnection,
    ) -> Result<bool> {
        let mut closed = false;
        loop {
            match HttpRequest::parse_request(conn) {
                Ok(()) => {
                    trace!("request parsing complete");

                    if matches!(conn.action, ActiveAction::BufferingCgi { .. }) {
                        spawn_cgi(conn, poll, next_token, cgi_to_client, token);
                    }

                    if let Some(mut upload_manager) = conn.upload_manager.take() {
                        let s_cfg = conn.s_cfg.as_ref().unwrap().clone();
                        Upload::handel_upload_manager(&mut conn.response, &mut upload_manager, &s_cfg);
                    }

                    conn.finalize_response();
                    conn.request.finish_request();
                    break;
                }
                Err(ParseError::IncompleteRequestLine) => break,
                Err(e) => {
                    let code = match e {
                        ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
                        ParseError::InvalidMethod => HTTP_METHOD_NOT_ALLOWED,
                        ParseError::HeaderTooLong => HTTP_URI_TOO_LONG,
                        ParseError::Upload(code) => code,
                        _ => HTTP_BAD_REQUEST,
                    };
                    handle_error(&mut conn.response, code, conn.s_cfg.as_ref());
                    conn.response.set_header("connection", "close");
                    closed = true;
                    conn.action = ActiveAction::None;
                    conn.write_buffer.extend_from_slice(&conn.response.to_bytes());
                    conn.request.finish_request();
                    break;
                }
            }
        }

        if !conn.write_buffer.is_empty() || matches!(conn.action, ActiveAction::FileDownload(_, _))
        {
            poll.registry().reregister(
                &mut conn.stream,
                token,
                Interest::READABLE | Interest::WRITABLE,
            )?;
        }
        Ok(closed)
    }

    fn parse_request(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        loop {
            let res = match conn.request.state {
                ParsingState::RequestLine => conn.request.parse_request_line(),
                ParsingState::Headers => HttpRequest::parse_headers(conn),
                ParsingState::HeadersDone => HttpRequest::setup_action(conn),
                ParsingState::Body => HttpRequest::parse_unchunked_body(conn),
                ParsingState::ChunkedBody => HttpRequest::parse_chunked_body(conn),
                ParsingState::Complete => break,
            };

            match res {
                Ok(()) => {
                    if conn.request.state == ParsingState::Complete {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Resolves the virtual server and matching location, then commits to one
    /// of: an immediate redirect, handing off to CGI, or a method handler.
    /// Leaves `conn.request.state` pointing at whatever comes next (reading a
    /// body, or already `Complete` for bodyless responses).
    fn setup_action(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        let s_cfg = conn.resolve_config();
        conn.s_cfg = Some(Arc::clone(&s_cfg));

        let content_length = conn
            .request
            .headers
            .get("content-length")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);

        let is_chunked = conn
            .request
            .headers
            .get("transfer-encoding")
            .map(|v| v.contains("chunked"))
            .unwrap_or(false);

        let content_type = conn
            .request
            .headers
            .get("content-type")
            .map(|s| s.as_str())
            .unwrap_or("");

        conn.boundary = content_type
            .split("boundary=")
            .nth(1)
            .map(|b| b.trim().trim_matches('"'))
            .unwrap_or("")
            .to_string();

        if !is_chunked
            && s_cfg.client_max_body_size > 0
            && content_length > s_cfg.client_max_body_size
        {
            return Err(ParseError::PayloadTooLarge);
        }

        conn.body_remaining = content_length;

        let path = conn.request.path_only().to_string();
        let method = conn.request.method;

        let has_body_needed = match s_cfg.find_route(&path, method) {
            Ok(r_cfg) => {
                if let Some((code, ref target)) = r_cfg.redirect {
                    conn.response = HttpResponse::redirect(code, target);
                    false
                } else if let Some(ext) = r_cfg.cgi_ext.iter().find(|ext| path.ends_with(ext.as_str())) {
                    let program = crate::cgi::cgi_interpreter(ext);
                    let script_path = resolve_target(r_cfg, &s_cfg, &path);

                    if !script_path.is_file() {
                        handle_error(&mut conn.response, HTTP_NOT_FOUND, Some(&s_cfg));
                        false
                    } else {
                        conn.action = ActiveAction::BufferingCgi {
                            script_path,
                            program: program.to_string(),
                        };
                        content_length > 0 || is_chunked
                    }
                } else {
                    match method {
                        Method::Get => {
                            conn.action = handle_get(&conn.request, &mut conn.response, r_cfg, &s_cfg);
                            false
                        }
                        Method::Post => {
                            conn.upload_manager = Some(match &r_cfg.upload_dir {
                                // Multipart bodies are demultiplexed per-part
                                // by the boundary-aware state machine (§9
                                // enrichment); everything else is the
                                // literal single-file model: basename(path)
                                // written under the configured upload dir.
                                Some(dir) if !conn.boundary.is_empty() => {
                                    let upload_dir = PathBuf::from(
                                        r_cfg.root.as_deref().unwrap_or(&s_cfg.root),
                                    )
                                    .join(dir);
                                    Upload::new(upload_dir, &conn.boundary)
                                }
                                Some(dir) => {
                                    let upload_dir = PathBuf::from(
                                        r_cfg.root.as_deref().unwrap_or(&s_cfg.root),
                                    )
                                    .join(dir);
                                    let filename = Upload::sanitize_filename(&path);
                                    Upload::new_verbatim(upload_dir.join(filename))
                                }
                                None => Upload::new_verbatim(resolve_target(r_cfg, &s_cfg, &path)),
                            });
                            conn.action = ActiveAction::Upload;
                            true
                        }
                        Method::Delete => {
                            conn.response = handle_delete(&conn.request, r_cfg, &s_cfg);
                            false
                        }
                    }
                }
            }
            Err(RoutingError::MethodNotAllowed) => {
                handle_error(&mut conn.response, HTTP_METHOD_NOT_ALLOWED, Some(&s_cfg));
                false
            }
            Err(RoutingError::NotFound) => {
                handle_error(&mut conn.response, HTTP_NOT_FOUND, Some(&s_cfg));
                false
            }
        };

        if has_body_needed {
            conn.request.state = if is_chunked {
                ParsingState::ChunkedBody
            } else {
                ParsingState::Body
            };
        } else if is_chunked || content_length > 0 {
            // A body follows but nothing downstream wants it: drain it anyway
            // so the connection stays in sync, discarding the bytes.
            if matches!(conn.action, ActiveAction::None) {
                conn.action = ActiveAction::Discard;
            }
            conn.request.state = if is_chunked {
                ParsingState::ChunkedBody
            } else {
                ParsingState::Body
            };
        } else {
            conn.request.state = ParsingState::Complete;
        }

        Ok(())
    }

    fn parse_request_line(&mut self) -> core::result::Result<(), ParseError> {
        let Some(abs_index) = find_crlf(&self.buffer, self.cursor) else {
            return Err(ParseError::IncompleteRequestLine);
        };
        let line_bytes = &self.buffer[self.cursor..abs_index];
        let request_line =
            std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::MalformedRequestLine);
        }

        self.method = parts[0].parse()?;
        self.url = parts[1].to_string();
        self.version = parts[2].to_string();

        self.cursor = abs_index + CRLF_LEN;
        self.state = ParsingState::Headers;
        Ok(())
    }

    fn extract_and_parse_header(
        &mut self,
    ) -> core::result::Result<Option<(String, String)>, ParseError> {
        let Some(abs_index) = find_crlf(&self.buffer, self.cursor) else {
            return Err(ParseError::IncompleteRequestLine);
        };
        let line_bytes = &self.buffer[self.cursor..abs_index];
        if line_bytes.is_empty() {
            self.cursor = abs_index + CRLF_LEN;
            return Ok(None);
        }
        let line = std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;
        self.cursor = abs_index + CRLF_LEN;

        let Some(sep) = line.find(':') else {
            return Err(ParseError::MalformedRequestLine);
        };
        let key = line[..sep].trim().to_ascii_lowercase();
        let val = line[sep + 1..].trim().to_string();
        Ok(Some((key, val)))
    }

    fn parse_headers(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        loop {
            match conn.request.extract_and_parse_header()? {
                Some((k, v)) => {
                    conn.request.headers.insert(k, v);
                }
                None => {
                    conn.request.buffer.drain(..conn.request.cursor);
                    conn.request.cursor = 0;
                    conn.request.state = ParsingState::HeadersDone;
                    return Ok(());
                }
            }
        }
    }

    fn parse_unchunked_body(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        let available = conn.request.buffer.len() - conn.request.cursor;
        let to_process = std::cmp::min(available, conn.body_remaining);

        if to_process > 0 {
            let start = conn.request.cursor;
            let chunk = conn.request.buffer[start..start + to_process].to_vec();
            execute_active_action(
                &conn.request,
                &mut conn.upload_manager,
                &mut conn.cgi_stdin_buffer,
                &mut conn.action,
                &chunk,
                &conn.boundary,
            )?;

            conn.body_remaining -= to_process;
            conn.request.buffer.drain(start..start + to_process);
        }

        if conn.body_remaining == 0 {
            conn.request.state = ParsingState::Complete;
            Ok(())
        } else {
            Err(ParseError::IncompleteRequestLine)
        }
    }

    fn parse_chunked_body(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        let s_cfg = conn.s_cfg.clone().expect("route resolved before body parsing");
        loop {
            match conn.request.chunk_state {
                ChunkState::ReadSize => {
                    let current_len = conn.request.buffer.len();
                    if current_len == 0 {
                        return Err(ParseError::IncompleteRequestLine);
                    }

                    let search_limit = std::cmp::min(current_len, 18);
                    match find_subsequence(&conn.request.buffer[..search_limit], b"\r\n", 0) {
                        Some(line_end) => {
                            let hex_str = String::from_utf8_lossy(&conn.request.buffer[..line_end]);
                            let chunk_size = usize::from_str_radix(hex_str.trim(), 16)
                                .map_err(|_| ParseError::InvalidChunkSize)?;

                            if s_cfg.client_max_body_size > 0
                                && conn.total_body_read + chunk_size > s_cfg.client_max_body_size
                            {
                                return Err(ParseError::PayloadTooLarge);
                            }

                            if chunk_size == 0 {
                                if conn.request.buffer.len() < line_end + 2 {
                                    return Err(ParseError::IncompleteRequestLine);
                                }
                                conn.request.buffer.drain(..line_end + 2);
                                conn.request.chunk_state = ChunkState::ReadTrailers;
                                continue;
                            }

                            conn.request.chunk_state = ChunkState::ReadData(chunk_size);
                            conn.request.buffer.drain(..line_end + 2);
                        }
                        None => {
                            if current_len >= 18 {
                                return Err(ParseError::InvalidChunkSize);
                            }
                            return Err(ParseError::IncompleteRequestLine);
                        }
                    }
                }

                ChunkState::ReadData(remaining_size) => {
                    if conn.request.buffer.is_empty() {
                        return Err(ParseError::IncompleteRequestLine);
                    }

                    let available = conn.request.buffer.len();
                    let to_read = std::cmp::min(available, remaining_size);
                    let data = conn.request.buffer.drain(..to_read).collect::<Vec<u8>>();

                    execute_active_action(
                        &conn.request,
                        &mut conn.upload_manager,
                        &mut conn.cgi_stdin_buffer,
                        &mut conn.action,
                        &data,
                        &conn.boundary,
                    )?;

                    conn.total_body_read += to_read;
                    let new_remaining = remaining_size - to_read;

                    if new_remaining == 0 {
                        conn.request.chunk_state = ChunkState::ReadTrailingCrlf;
                    } else {
                        conn.request.chunk_state = ChunkState::ReadData(new_remaining);
                        return Err(ParseError::IncompleteRequestLine);
                    }
                }

                ChunkState::ReadTrailingCrlf => {
                    if conn.request.buffer.len() < 2 {
                        return Err(ParseError::IncompleteRequestLine);
                    }
                    if &conn.request.buffer[..2] != b"\r\n" {
                        return Err(ParseError::InvalidChunkSize);
                    }
                    conn.request.buffer.drain(..2);
                    conn.request.chunk_state = ChunkState::ReadSize;
                }

                ChunkState::ReadTrailers => match conn.request.extract_and_parse_header() {
                    Ok(Some((k, v))) => {
                        if conn
                            .request
                            .headers
                            .get("trailer")
                            .is_some_and(|allowed| allowed.to_lowercase().contains(&k))
                        {
                            conn.request.trailers.insert(k, v);
                        }
                        continue;
                    }
                    Ok(None) => {
                        conn.request.buffer.drain(..conn.request.cursor);
                        conn.request.cursor = 0;
                        conn.request.state = ParsingState::Complete;
                        return Ok(());
                    }
                    Err(ParseError::IncompleteRequestLine) => {
                        return Err(ParseError::IncompleteRequestLine);
                    }
                    Err(e) => return Err(e),
                },
            }
        }
    }

    pub fn extract_filename(&self) -> String {
        format!(
            "uploaded_{}",
            SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0)
        )
    }
}

fn find_crlf(buffer: &[u8], start_offset: usize) -> Option<usize> {
    let search_area = buffer.get(start_offset..)?;
    let mut current_pos = 0;
    while let Some(r_pos) = search_area[current_pos..].iter().position(|&b| b == b'\r') {
        let abs_r_pos_in_search = current_pos + r_pos;
        if search_area.get(abs_r_pos_in_search + 1) == Some(&b'\n') {
            return Some(start_offset + abs_r_pos_in_search);
        }
        current_pos = abs_r_pos_in_search + 1;
    }
    None
}

pub fn find_subsequence(buffer: &[u8], needle: &[u8], start_offset: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let search_area = buffer.get(start_offset..)?;
    let first_byte = needle[0];
    let mut current_pos = 0;

    while let Some(rel_pos) = search_area[current_pos..].iter().position(|&b| b == first_byte) {
        let abs_pos_in_search = current_pos + rel_pos;
        if let Some(candidate) = search_area.get(abs_pos_in_search..abs_pos_in_search + needle.len()) {
            if candidate == needle {
                return Some(start_offset + abs_pos_in_search);
            }
        } else {
            return None;
        }
        current_pos = abs_pos_in_search + 1;
    }
    None
}

impl Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.method, self.url, self.version)?;
        for (key, value) in &self.headers {
            writeln!(f, "  {}: {}", key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PartInfo {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
}

pub fn parse_part_headers(headers: &str) -> PartInfo {
    let mut info = PartInfo {
        name: String::new(),
        filename: None,
        content_type: String::new(),
    };

    for line in headers.lines() {
        if line.to_ascii_lowercase().starts_with("content-disposition:") {
            if let Some(n) = line.split(';').find(|s| s.trim().starts_with("name=")) {
                info.name = n.split('=').nth(1).unwrap_or("").trim_matches('"').to_string();
            }
            if let Some(fname) = line.split(';').find(|s| s.trim().starts_with("filename=")) {
                info.filename = Some(
                    fname.split('=').nth(1).unwrap_or("").trim_matches('"').to_string(),
                );
            }
        } else if line.to_ascii_lowercase().starts_with("content-type:") {
            info.content_type = line.split(':').nth(1).unwrap_or("text/plain").trim().to_string();
        }
    }
    info
}
