//! HTTP dates have a resolution of one second, file times usually do not.
//!
//! Everything compared with or written into an HTTP date header goes through
//! [`truncate_to_secs`] first, so a client echoing our `Last-Modified` back in
//! `If-Modified-Since` gets a `304`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderValue;

/// Drops the sub-second part of `time`.
pub fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()),
        Err(_) => time,
    }
}

/// Parses a header value in any of the three HTTP date formats.
pub fn parse_http_date(value: &HeaderValue) -> Option<SystemTime> {
    value.to_str().ok().and_then(|value| httpdate::parse_http_date(value).ok())
}

/// Formats `time` as an IMF-fixdate header value.
pub fn fmt_http_date(time: SystemTime) -> HeaderValue {
    let formatted = httpdate::fmt_http_date(truncate_to_secs(time));
    // an IMF-fixdate only contains visible ASCII
    HeaderValue::try_from(formatted).unwrap_or_else(|_e| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation() {
        let time = UNIX_EPOCH + Duration::from_millis(1_445_412_480_750);
        assert_eq!(truncate_to_secs(time), UNIX_EPOCH + Duration::from_secs(1_445_412_480));
    }

    #[test]
    fn format_and_parse() {
        let time = UNIX_EPOCH + Duration::from_millis(1_445_412_480_750);
        let value = fmt_http_date(time);
        assert_eq!(value, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_http_date(&value), Some(truncate_to_secs(time)));
    }

    #[test]
    fn other_formats_and_garbage() {
        let expected = Some(UNIX_EPOCH + Duration::from_secs(784_111_777));
        assert_eq!(parse_http_date(&HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT")), expected);
        assert_eq!(parse_http_date(&HeaderValue::from_static("Sunday, 06-Nov-94 08:49:37 GMT")), expected);
        assert_eq!(parse_http_date(&HeaderValue::from_static("Sun Nov  6 08:49:37 1994")), expected);
        assert_eq!(parse_http_date(&HeaderValue::from_static("yesterday")), None);
    }
}
