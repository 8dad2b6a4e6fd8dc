//! HTTP helpers for resumable web fetches.

use url::Url;

/// `Range` header value requesting everything from `offset` on.
///
/// # Examples
///
/// ```
/// use mediaload::range_header;
///
/// assert_eq!(range_header(0), None);
/// assert_eq!(range_header(1024).as_deref(), Some("bytes=1024-"));
/// ```
pub fn range_header(offset: u64) -> Option<String> {
    (offset > 0).then(|| format!("bytes={offset}-"))
}

/// Returns `true` if the HTTP status code indicates a redirect.
///
/// Recognized codes: 301, 302, 303, 307, 308.
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end:   u64,
    /// `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Parse a `Content-Range` header value. Unsatisfied ranges (`bytes */N`)
/// and malformed values yield `None`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        total => Some(total.parse().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Resolve a `Location` header against the URL that produced it.
pub fn resolve_location(base: &str, location: &str) -> Result<String, url::ParseError> {
    let base = Url::parse(base)?;
    Ok(base.join(location)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_from_zero_is_omitted() {
        assert_eq!(range_header(0), None);
        assert_eq!(range_header(1).as_deref(), Some("bytes=1-"));
    }

    #[test]
    fn test_is_redirect() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status));
        }
        assert!(!is_redirect(200));
        assert!(!is_redirect(304));
        assert!(!is_redirect(404));
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 100-199/1000"),
            Some(ContentRange {
                start: 100,
                end:   199,
                total: Some(1000),
            })
        );
        assert_eq!(parse_content_range("bytes 0-9/*").and_then(|r| r.total), None);
        assert_eq!(parse_content_range("bytes */1000"), None);
        assert_eq!(parse_content_range("bytes 9-0/10"), None);
        assert_eq!(parse_content_range("items 0-9/10"), None);
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(
            resolve_location("https://a.example/files/x.png", "/y.png").unwrap(),
            "https://a.example/y.png"
        );
        assert_eq!(
            resolve_location("https://a.example/files/x.png", "https://b.example/z").unwrap(),
            "https://b.example/z"
        );
        assert!(resolve_location("not a url", "/y").is_err());
    }
}
