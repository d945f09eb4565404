use crate::prelude::*;

/// Feeds one slice of request-body bytes to whatever the connection's
/// current action wants to do with it: append to an upload in progress,
/// buffer it up for a CGI script's stdin, or drop it on the floor.
pub fn execute_active_action(
    request: &HttpRequest,
    upload_manager: &mut Option<Upload>,
    cgi_stdin_buffer: &mut Vec<u8>,
    action: &mut ActiveAction,
    chunk: &[u8],
    boundary: &str,
) -> std::result::Result<(), ParseError> {
    match action {
        ActiveAction::Upload => {
            if let Some(mgr) = upload_manager {
                if !boundary.is_empty() {
                    mgr.upload_body_with_boundry(request, chunk);
                } else {
                    mgr.upload_simple_body(request, chunk);
                }
                if let UploadState::Error(code) = mgr.state {
                    return Err(ParseError::Upload(code));
                }
            }
        }
        ActiveAction::BufferingCgi { .. } => {
            cgi_stdin_buffer.extend_from_slice(chunk);
        }
        _ => {}
    }

    Ok(())
}
