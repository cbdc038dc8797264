//! HTTP-date (IMF-fixdate) formatting and parsing for `If-Range` and
//! `Last-Modified`.

use chrono::{DateTime, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp as `Sun, 06 Nov 1994 08:49:37 GMT`. Sub-second precision is dropped.
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(IMF_FIXDATE).to_string()
}

/// Parse an HTTP-date. Returns `None` for anything that is not a date, such
/// as an entity tag.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        let time = Utc.timestamp_opt(784_111_777, 500).unwrap();
        assert_eq!(format_http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_parse_drops_nothing_but_subseconds() {
        let time = Utc.timestamp_opt(1_700_000_000, 999_999_999).unwrap();
        let parsed = parse_http_date(&format_http_date(time)).unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_rejects_etag() {
        assert!(parse_http_date("\"abc123\"").is_none());
        assert!(parse_http_date("").is_none());
    }
}
