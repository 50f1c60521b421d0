use hilight_core::config::WS_UUID_PLACEHOLDER;
use hilight_core::types::ConnectionId;

/// Build the URL for one connection attempt.
///
/// The first `{UUIDD}` in `template` is replaced with `conn_id`. Without a
/// placeholder the id is appended as a trailing path segment; the query
/// string is kept when the template parses as a URL.
pub fn resolve_connect_url(template: &str, conn_id: &ConnectionId) -> String {
    let id = conn_id.as_str();
    if template.contains(WS_UUID_PLACEHOLDER) {
        return template.replacen(WS_UUID_PLACEHOLDER, id, 1);
    }

    match url::Url::parse(template) {
        Ok(mut parsed) if !parsed.cannot_be_a_base() => {
            let path = format!("{}/{}", parsed.path().trim_end_matches('/'), id);
            parsed.set_path(&path);
            parsed.to_string()
        }
        _ => format!("{}/{}", template.trim_end_matches('/'), id),
    }
}
