use crate::config::{RouteConfig, ServerConfig};
use crate::http::Method;

#[derive(Debug, PartialEq, Eq)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}

impl ServerConfig {
    /// Resolves the Location that governs a given path and method.
    ///
    /// Deliberately not "longest match wins": a suffix-wildcard Location
    /// that allows the method outranks every prefix match, even a more
    /// specific one, and an allowed match outranks a disallowed one
    /// regardless of specificity. This mirrors the tie-break order wired
    /// into the request dispatcher and should not be "simplified" to plain
    /// longest-prefix routing.
    pub fn find_route(&self, path: &str, method: Method) -> Result<&RouteConfig, RoutingError> {
        let mut suffix_match: Option<&RouteConfig> = None;
        let mut prefix_match: Option<&RouteConfig> = None;

        for loc in &self.locations {
            if loc.is_suffix_pattern() {
                if path.ends_with(loc.suffix()) {
                    suffix_match = Some(loc);
                }
            } else if path.starts_with(loc.path.as_str())
                && prefix_match.is_none_or(|cur| loc.path.len() > cur.path.len())
            {
                prefix_match = Some(loc);
            }
        }

        if let Some(r) = suffix_match {
            if r.allows(&method) {
                return Ok(r);
            }
        }
        if let Some(r) = prefix_match {
            if r.allows(&method) {
                return Ok(r);
            }
        }
        if suffix_match.is_some() || prefix_match.is_some() {
            return Err(RoutingError::MethodNotAllowed);
        }
        Err(RoutingError::NotFound)
    }
}

/// The filesystem target for a request: the matched Location's root (or the
/// server's, if the Location doesn't override it) joined to the *full*
/// sanitized request path — not the path with the Location's prefix
/// stripped off. A Location at `/files` serving root `/srv/data` maps
/// `/files/a.txt` to `/srv/data/files/a.txt`, not `/srv/data/a.txt`.
pub fn resolve_target(r_cfg: &RouteConfig, s_cfg: &ServerConfig, full_path: &str) -> std::path::PathBuf {
    let root = r_cfg.root.as_deref().unwrap_or(&s_cfg.root);
    let sanitized = sanitize_path(full_path);
    std::path::PathBuf::from(root).join(sanitized.trim_start_matches('/'))
}

/// Splits on `/`, drops `.` segments, pops the parent on `..` (never above
/// root), and rejoins with a single leading slash. No symlink resolution.
pub fn sanitize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
