//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Uploaded documents carry personal financial data, so spans get file
//! names instead of paths, endpoints without credentials and bounded
//! previews instead of full document text.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo and query string from an endpoint URL.
///
/// - `https://key@api.example.com/v1/chat?key=abc` → `https://****@api.example.com/v1/chat`
/// - `https://api.example.com/v1/chat` → unchanged
pub fn redact_endpoint(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &without_query[..scheme_end + 3];
            return format!("{}****@{}", scheme, &after_scheme[at_pos + 1..]);
        }
    }

    without_query.to_string()
}

/// First `max_chars` characters of `text` on a single line, for debug logs.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(max_chars)
        .collect();
    if text.chars().count() > max_chars {
        format!("{}…", flat)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/uploads/owner-7/1700000000-receipt.jpg")),
            "1700000000-receipt.jpg"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_endpoint_with_userinfo_and_query() {
        assert_eq!(
            redact_endpoint("https://sk-123@api.example.com/v1/chat/completions?key=abc"),
            "https://****@api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_redact_endpoint_plain() {
        assert_eq!(
            redact_endpoint("http://localhost:8080/v1/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_redact_endpoint_ignores_at_in_path() {
        assert_eq!(
            redact_endpoint("https://api.example.com/models/@latest"),
            "https://api.example.com/models/@latest"
        );
    }

    #[test]
    fn test_preview_truncates_and_flattens() {
        assert_eq!(preview("line one\nline two", 8), "line one…");
        assert_eq!(preview("a\tb", 10), "a b");
        assert_eq!(preview("", 5), "");
    }
}
