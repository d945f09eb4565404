use crate::prelude::*;

pub fn handle_get(
    request: &HttpRequest,
    response: &mut HttpResponse,
    r_cfg: &RouteConfig,
    s_cfg: &Arc<ServerConfig>,
) -> ActiveAction {
    let mut path = resolve_target(r_cfg, s_cfg, request.path_only());

    if path.is_dir() {
        let index = r_cfg.index.as_deref().unwrap_or(&s_cfg.index);
        if !index.is_empty() && path.join(index).is_file() {
            path.push(index);
        } else if r_cfg.autoindex {
            *response = generate_autoindex(&path, &request.url);
            return ActiveAction::None;
        } else {
            handle_error(response, HTTP_NOT_FOUND, Some(s_cfg));
            return ActiveAction::None;
        }
    }

    match File::open(&path) {
        Ok(file) => {
            let Ok(metadata) = file.metadata() else {
                handle_error(response, HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg));
                return ActiveAction::None;
            };
            let file_size = metadata.size() as usize;
            let mime_type = get_mime_type(path.extension().and_then(|s| s.to_str()));

            response.set_status_code(HTTP_OK);
            response
                .headers
                .insert("content-length".to_string(), file_size.to_string());
            response
                .headers
                .insert("content-type".to_string(), mime_type.to_string());

            ActiveAction::FileDownload(file, file_size)
        }
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => handle_error(response, HTTP_NOT_FOUND, Some(s_cfg)),
                std::io::ErrorKind::PermissionDenied => {
                    handle_error(response, HTTP_FORBIDDEN, Some(s_cfg))
                }
                _ => handle_error(response, HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
            };
            ActiveAction::None
        }
    }
}
