use crate::prelude::*;

#[derive(Debug)]
pub struct HttpResponse {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status_code,
            status_text: status_text.to_string(),
            headers: HashMap::from([("content-length".to_string(), "0".to_string())]),
            body: Vec::new(),
        }
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.insert(key.to_lowercase(), value.to_string());
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.headers
            .insert("content-length".to_string(), body.len().to_string());
        self.headers
            .insert("content-type".to_string(), content_type.to_string());
        self.body = body;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = format!(
            "{} {} {}\r\n",
            self.version, self.status_code, self.status_text
        )
        .into_bytes();

        for (key, val) in &self.headers {
            let formatted_key = Self::to_pascal_case(key);
            res.extend_from_slice(format!("{}: {}\r\n", formatted_key, val).as_bytes());
        }
        res.extend_from_slice(b"\r\n");
        res.extend_from_slice(&self.body);
        res
    }

    pub fn to_bytes_headers_only(&self) -> Vec<u8> {
        let mut res = format!("{} {} {}\r\n", self.version, self.status_code, self.status_text);
        for (k, v) in &self.headers {
            let formatted_key = Self::to_pascal_case(k);
            res.push_str(&format!("{}: {}\r\n", formatted_key, v));
        }
        res.push_str("\r\n");
        res.into_bytes()
    }

    pub fn status_text(code: u16) -> String {
        match code {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            HTTP_BAD_REQUEST => "Bad Request",
            HTTP_FORBIDDEN => "Forbidden",
            HTTP_NOT_FOUND => "Not Found",
            HTTP_METHOD_NOT_ALLOWED => "Method Not Allowed",
            HTTP_PAYLOAD_TOO_LARGE => "Payload Too Large",
            HTTP_URI_TOO_LONG => "URI Too Long",
            HTTP_INTERNAL_SERVER_ERROR => "Internal Server Error",
            HTTP_NOT_IMPLEMENTED => "Not Implemented",
            GATEWAY_TIMEOUT => "Gateway Timeout",
            CGI_LOOP_DETECTED => "Loop Detected",
            _ => "Unknown",
        }
        .to_string()
    }

    pub fn set_status_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.status_text = HttpResponse::status_text(code);
        self
    }

    fn to_pascal_case(s: &str) -> String {
        s.split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
                }
            })
            .collect::<Vec<String>>()
            .join("-")
    }

    pub fn redirect(code: u16, target_url: &str) -> Self {
        let mut res = HttpResponse::new(code, &HttpResponse::status_text(code));
        res.set_header("location", target_url)
            .set_header("content-length", "0");
        res
    }

    /// Parses a full `HTTP/1.x <code> <reason>\r\n<headers>\r\n\r\n<body>`
    /// byte stream, as produced by a CGI script that writes its own status
    /// line, or by `frame_cgi_output` after it has synthesized one.
    pub fn from_raw_bytes(raw: &[u8]) -> Self {
        let split = find_subsequence(raw, b"\r\n\r\n", 0)
            .map(|p| (p, 4))
            .or_else(|| find_subsequence(raw, b"\n\n", 0).map(|p| (p, 2)));

        let (head, body) = match split {
            Some((pos, delim_len)) => (&raw[..pos], &raw[pos + delim_len..]),
            None => (raw, &raw[raw.len()..]),
        };

        let head_str = String::from_utf8_lossy(head);
        let mut lines = head_str.split("\r\n").flat_map(|l| l.split('\n'));

        let status_line = lines.next().unwrap_or("HTTP/1.1 200 OK");
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("HTTP/1.1").to_string();
        let status_code: u16 = parts.next().and_then(|c| c.parse().ok()).unwrap_or(200);
        let status_text = parts
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| HttpResponse::status_text(status_code));

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
            }
        }
        headers
            .entry("content-length".to_string())
            .or_insert_with(|| body.len().to_string());

        Self {
            version,
            status_code,
            status_text,
            headers,
            body: body.to_vec(),
        }
    }
}

pub fn get_mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("xml") => "application/xml",
        Some("zip") => "application/zip",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn get_ext_from_content_type(content_type: &str) -> &str {
    match content_type {
        "application/json" => ".json",
        "application/pdf" => ".pdf",
        "application/xml" => ".xml",
        "application/zip" => ".zip",
        "audio/mpeg" => ".mp3",
        "image/gif" => ".gif",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        "image/x-icon" => ".ico",
        "text/css" => ".css",
        "text/html" => ".html",
        "text/javascript" => ".js",
        "text/plain" => ".txt",
        "video/mp4" => ".mp4",
        _ => ".bin",
    }
}

pub fn generate_autoindex(path: &Path, original_url: &str) -> HttpResponse {
    let mut html = format!("<html><body><h1>Index of {}</h1><ul>", original_url);
    if let Ok(entries) = path.read_dir() {
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        for name in names {
            html.push_str(&format!(
                "<li><a href=\"{}/{}\">{}</a></li>",
                original_url.trim_end_matches('/'),
                name,
                name
            ));
        }
    }
    html.push_str("</ul></body></html>");

    let mut res = HttpResponse::new(HTTP_OK, "OK");
    res.set_body(html.into_bytes(), "text/html");
    res
}

/// Populates an error response, preferring a configured custom error page
/// when one exists and is readable, and falling back to a plain-text body.
pub fn handle_error(res: &mut HttpResponse, code: u16, s_cfg: Option<&Arc<ServerConfig>>) {
    if let Some(cfg) = s_cfg {
        if let Some(path_str) = cfg.error_pages.get(&code) {
            if let Ok(content) = fs::read(path_str) {
                res.set_status_code(code).set_body(content, "text/html");
                apply_connection_policy(res, code);
                return;
            }
        }
    }

    res.set_status_code(code);
    let body = format!("{} {}", code, HttpResponse::status_text(code)).into_bytes();
    res.set_body(body, "text/plain");
    apply_connection_policy(res, code);
}

fn apply_connection_policy(res: &mut HttpResponse, code: u16) {
    let close = code >= 400 && code != HTTP_NOT_FOUND && code != HTTP_METHOD_NOT_ALLOWED;
    res.set_header("connection", if close { "close" } else { "keep-alive" });
}
