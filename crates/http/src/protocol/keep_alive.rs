//! Persistent-connection signaling.
//!
//! HTTP/1.1 connections are persistent unless a `Connection: close` token is present,
//! HTTP/1.0 connections are closed unless a `Connection: keep-alive` token is present.
//! The gateway always writes an explicit `Connection` header so both kinds of client
//! see the decision that was made for them.

use http::header::CONNECTION;
use http::{HeaderMap, HeaderValue, Version};

const CLOSE: HeaderValue = HeaderValue::from_static("close");
const KEEP_ALIVE: HeaderValue = HeaderValue::from_static("keep-alive");

/// Returns whether a message with `version` and `headers` asks for a persistent connection.
pub fn is_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let mut close = false;
    let mut keep_alive = false;
    for value in headers.get_all(CONNECTION) {
        for token in value.as_bytes().split(|b| *b == b',') {
            let token = token.trim_ascii();
            if token.eq_ignore_ascii_case(b"close") {
                close = true;
            } else if token.eq_ignore_ascii_case(b"keep-alive") {
                keep_alive = true;
            }
        }
    }

    match version {
        _ if close => false,
        Version::HTTP_11 => true,
        Version::HTTP_10 => keep_alive,
        _ => false,
    }
}

/// Replaces any `Connection` header with an explicit `keep-alive` or `close`.
pub fn set_keep_alive(headers: &mut HeaderMap, keep_alive: bool) {
    headers.insert(CONNECTION, if keep_alive { KEEP_ALIVE } else { CLOSE });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(connection: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = connection {
            headers.insert(CONNECTION, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn http11_defaults_to_persistent() {
        assert!(is_keep_alive(Version::HTTP_11, &headers(None)));
        assert!(is_keep_alive(Version::HTTP_11, &headers(Some("keep-alive"))));
        assert!(!is_keep_alive(Version::HTTP_11, &headers(Some("close"))));
        assert!(!is_keep_alive(Version::HTTP_11, &headers(Some("Upgrade, Close"))));
    }

    #[test]
    fn http10_needs_explicit_keep_alive() {
        assert!(!is_keep_alive(Version::HTTP_10, &headers(None)));
        assert!(is_keep_alive(Version::HTTP_10, &headers(Some("Keep-Alive"))));
        assert!(!is_keep_alive(Version::HTTP_10, &headers(Some("close"))));
    }

    #[test]
    fn set_overrides_previous_value() {
        let mut map = headers(Some("keep-alive"));
        set_keep_alive(&mut map, false);
        assert_eq!(map.get(CONNECTION).unwrap(), "close");
        assert!(!is_keep_alive(Version::HTTP_11, &map));

        set_keep_alive(&mut map, true);
        assert!(is_keep_alive(Version::HTTP_10, &map));
    }
}
