use crate::prelude::*;
use mio::unix::pipe;
use std::os::fd::AsRawFd;
use std::process::Child;

/// Picks the interpreter for a CGI script by its extension, per §4.4.
/// Anything unrecognized falls through to the `.bla` test harness slot so a
/// misconfigured `cgi_extension` still fails loudly (exec error) rather than
/// silently serving the script's source.
pub(crate) fn cgi_interpreter(ext: &str) -> &'static str {
    match ext.trim_start_matches('*').trim_start_matches('.') {
        "py" => "python3",
        "php" => "php-cgi",
        "bla" => "./cgi_tester",
        _ => "./cgi_tester",
    }
}

/// One forked interpreter subprocess and the state needed to drain its
/// stdout and reap it. Owned exclusively by the connection whose request
/// started it; when the connection is torn down the child is killed with
/// it (see `Server::close_connection`).
pub struct CgiSession {
    pub child: Child,
    pub pipe: pipe::Receiver,
    pub buffer: Vec<u8>,
    pub start: Instant,
    pub tmp_path: PathBuf,
}

pub const CGI_TIMEOUT: Duration = Duration::from_secs(CGI_TIMEOUT_SECS);

/// Builds the CGI environment per §4.4: the fixed meta-variables, the
/// request's own headers translated to `HTTP_*`, and `REMOTE_ADDR`/
/// `REMOTE_PORT` from the peer socket.
fn build_cgi_env(
    conn: &HttpConnection,
    s_cfg: &ServerConfig,
    script_path: &Path,
) -> HashMap<String, String> {
    let req = &conn.request;
    let mut env = HashMap::new();

    env.insert("GATEWAY_INTERFACE".into(), "CGI/1.1".into());
    env.insert("SERVER_PROTOCOL".into(), "HTTP/1.1".into());
    env.insert("REDIRECT_STATUS".into(), "200".into());
    env.insert("REQUEST_METHOD".into(), req.method.to_string());
    env.insert("QUERY_STRING".into(), req.query_string().to_string());
    env.insert("REQUEST_URI".into(), req.url.clone());
    env.insert("PATH_INFO".into(), req.path_only().to_string());
    env.insert("SCRIPT_NAME".into(), req.path_only().to_string());
    env.insert(
        "SCRIPT_FILENAME".into(),
        script_path.to_string_lossy().into_owned(),
    );
    env.insert("SERVER_NAME".into(), s_cfg.server_name.clone());
    env.insert(
        "CONTENT_LENGTH".into(),
        req.headers
            .get("content-length")
            .cloned()
            .unwrap_or_else(|| "0".to_string()),
    );
    if let Some(ct) = req.headers.get("content-type") {
        env.insert("CONTENT_TYPE".into(), ct.clone());
    }
    if let Ok(addr) = conn.stream.peer_addr() {
        env.insert("REMOTE_ADDR".into(), addr.ip().to_string());
        env.insert("REMOTE_PORT".into(), addr.port().to_string());
    }
    for (k, v) in req.headers.iter() {
        let key = format!("HTTP_{}", k.to_ascii_uppercase().replace('-', "_"));
        env.insert(key, v.clone());
    }
    env
}

/// Starts the CGI session named by `conn.action`'s `BufferingCgi` variant.
/// Writes the buffered body to a temp file (rewound for the child's stdin),
/// forks the interpreter with its stdout on a non-blocking pipe, and
/// registers that pipe with the poll under a fresh token mapped back to
/// `client_token` in `cgi_to_client`.
///
/// Exec failures and pipe/fork failures both degrade to a `500` response on
/// the connection rather than propagating — a single bad CGI invocation
/// must not take down the event loop.
pub fn spawn_cgi(
    conn: &mut HttpConnection,
    poll: &Poll,
    next_token: &mut usize,
    cgi_to_client: &mut HashMap<Token, Token>,
    client_token: Token,
) {
    let ActiveAction::BufferingCgi { script_path, program } =
        std::mem::replace(&mut conn.action, ActiveAction::None)
    else {
        return;
    };

    let s_cfg = conn.s_cfg.clone().expect("route resolved before CGI spawn");
    let env = build_cgi_env(conn, &s_cfg, &script_path);

    match try_spawn(&script_path, &program, &conn.cgi_stdin_buffer, env) {
        Ok((child, receiver, tmp_path)) => {
            let cgi_token = Token(*next_token);
            *next_token += 1;

            let mut receiver = receiver;
            if poll
                .registry()
                .register(&mut receiver, cgi_token, Interest::READABLE)
                .is_err()
            {
                let _ = std::fs::remove_file(&tmp_path);
                handle_error(&mut conn.response, HTTP_INTERNAL_SERVER_ERROR, Some(&s_cfg));
                conn.write_buffer.extend_from_slice(&conn.response.to_bytes());
                conn.response = HttpResponse::new(HTTP_OK, "OK");
                return;
            }

            cgi_to_client.insert(cgi_token, client_token);
            conn.cgi_token = Some(cgi_token);
            conn.action = ActiveAction::Cgi(CgiSession {
                child,
                pipe: receiver,
                buffer: Vec::new(),
                start: Instant::now(),
                tmp_path,
            });
        }
        Err(_) => {
            handle_error(&mut conn.response, HTTP_INTERNAL_SERVER_ERROR, Some(&s_cfg));
            conn.write_buffer.extend_from_slice(&conn.response.to_bytes());
            conn.response = HttpResponse::new(HTTP_OK, "OK");
        }
    }
    conn.cgi_stdin_buffer.clear();
}

fn try_spawn(
    script_path: &Path,
    program: &str,
    body: &[u8],
    env: HashMap<String, String>,
) -> io::Result<(Child, pipe::Receiver, PathBuf)> {
    let mut tmp = tempfile_in(std::env::temp_dir())?;
    tmp.write_all(body)?;
    use std::io::Seek;
    tmp.seek(std::io::SeekFrom::Start(0))?;
    let tmp_path = tmp.path().to_path_buf();
    let stdin = Stdio::from(tmp.try_clone()?);

    // Handing the write end's fd to `Stdio` transfers ownership to the
    // `Command`, which closes its parent-side copy once the child has its
    // own dup'd descriptor — otherwise the parent would keep the pipe's
    // write end open and never observe EOF after the child exits.
    let (sender, receiver) = pipe::new()?;
    let stdout = unsafe { Stdio::from_raw_fd(sender.into_raw_fd()) };

    let child = Command::new(program)
        .arg(script_path)
        .envs(env)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::null())
        .spawn()?;

    Ok((child, receiver, tmp_path))
}

/// A named temp file the caller keeps an open handle to; removed by
/// `cleanup` once the CGI session is torn down.
struct NamedTempFile {
    file: File,
    path: PathBuf,
}

impl NamedTempFile {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl std::ops::Deref for NamedTempFile {
    type Target = File;
    fn deref(&self) -> &File {
        &self.file
    }
}

impl std::ops::DerefMut for NamedTempFile {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl AsRawFd for NamedTempFile {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.file.as_raw_fd()
    }
}

fn tempfile_in(dir: PathBuf) -> io::Result<NamedTempFile> {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let unique = format!(
        "originserve-cgi-{}-{}.tmp",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let path = dir.join(unique);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    Ok(NamedTempFile { file, path })
}

/// Drains whatever is currently available on a CGI session's stdout pipe.
/// On EOF, reaps the child and hands the framed response back so the event
/// loop can enqueue it on the connection and drop the session.
pub enum CgiPoll {
    Pending,
    Done,
    Error,
}

pub fn poll_cgi_pipe(session: &mut CgiSession) -> CgiPoll {
    let mut buf = [0u8; 4096];
    loop {
        match session.pipe.read(&mut buf) {
            Ok(0) => return CgiPoll::Done,
            Ok(n) => session.buffer.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return CgiPoll::Pending,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return CgiPoll::Error,
        }
    }
}

/// Frames the raw stdout of a finished CGI child into an `HttpResponse`,
/// per §4.4's Output framing rules. `exited_ok` is false when the child was
/// signalled or exited nonzero, which always produces a `500`.
pub fn frame_cgi_output(raw: &[u8], exited_ok: bool) -> HttpResponse {
    if !exited_ok {
        let mut res = HttpResponse::new(HTTP_INTERNAL_SERVER_ERROR, "Internal Server Error");
        res.set_body(b"500 Internal Server Error".to_vec(), "text/plain");
        return res;
    }

    if raw.starts_with(b"HTTP/") {
        return parse_verbatim_response(raw);
    }

    let has_content_length = {
        let probe_len = raw.len().min(1024);
        let probe = String::from_utf8_lossy(&raw[..probe_len]).to_ascii_lowercase();
        probe.contains("content-length:")
    };

    let boundary = find_subsequence(raw, b"\r\n\r\n", 0)
        .map(|p| (p, 4))
        .or_else(|| find_subsequence(raw, b"\n\n", 0).map(|p| (p, 2)));

    let mut out = Vec::with_capacity(raw.len() + 64);
    out.extend_from_slice(b"HTTP/1.1 200 OK\r\n");

    if !has_content_length {
        if let Some((pos, delim_len)) = boundary {
            let body_len = raw.len() - (pos + delim_len);
            out.extend_from_slice(format!("Content-Length: {}\r\n", body_len).as_bytes());
        }
    }
    out.extend_from_slice(raw);

    HttpResponse::from_raw_bytes(&out)
}

fn parse_verbatim_response(raw: &[u8]) -> HttpResponse {
    HttpResponse::from_raw_bytes(raw)
}

/// Kills the child, drops the pipe fd, and removes the temp file.
/// Idempotent enough to call from both normal completion and timeout/abort.
pub fn teardown_cgi(session: &mut CgiSession, poll: &Poll) {
    let _ = session.child.kill();
    let _ = session.child.wait();
    let _ = poll.registry().deregister(&mut session.pipe);
    let _ = std::fs::remove_file(&session.tmp_path);
}

/// A canned `508 Loop Detected` response for a CGI session that blew past
/// its wall-clock budget.
pub fn cgi_timeout_response() -> HttpResponse {
    let mut res = HttpResponse::new(CGI_LOOP_DETECTED, "Loop Detected");
    res.set_body(
        b"<html><body><h1>508 Loop Detected</h1></body></html>".to_vec(),
        "text/html",
    );
    res.set_header("connection", "close");
    res
}
