use crate::prelude::*;

/// Unlinks the Location's resolved target, per §4.3. No `upload_dir`
/// requirement: DELETE targets the same effective root as GET.
pub fn handle_delete(
    request: &HttpRequest,
    r_cfg: &RouteConfig,
    s_cfg: &Arc<ServerConfig>,
) -> HttpResponse {
    let target = resolve_target(r_cfg, s_cfg, request.path_only());
    let mut res = HttpResponse::new(HTTP_OK, "OK");

    if target.is_dir() {
        handle_error(&mut res, HTTP_FORBIDDEN, Some(s_cfg));
        return res;
    }

    match fs::remove_file(&target) {
        Ok(_) => HttpResponse::new(204, "No Content"),
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::NotFound => HTTP_NOT_FOUND,
                ErrorKind::PermissionDenied => HTTP_FORBIDDEN,
                _ => HTTP_INTERNAL_SERVER_ERROR,
            };
            handle_error(&mut res, code, Some(s_cfg));
            res
        }
    }
}
