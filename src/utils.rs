use std::time::Duration;
use url::Url;

/// Parse a URL supplied by a client. Any scheme is accepted as long as the
/// URL is absolute and names a host.
pub fn parse_target_url(raw: &str) -> Result<Url, url::ParseError> {
    let parsed = Url::parse(raw.trim())?;

    if !parsed.has_host() {
        return Err(url::ParseError::EmptyHost);
    }

    Ok(parsed)
}

/// Resolve `href` relative to `base`, returning `None` for empty or
/// unparseable references.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    base.join(href).ok().map(|u| u.to_string())
}

pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|d| d.to_string()))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_url() {
        assert!(parse_target_url("https://example.com").is_ok());
        assert!(parse_target_url("http://example.com/path?q=1").is_ok());
        assert!(parse_target_url("ftp://example.com/file").is_ok());
        assert!(parse_target_url("not a url").is_err());
        assert!(parse_target_url("").is_err());
        assert!(parse_target_url("/relative/path").is_err());
        assert!(parse_target_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://example.com/blog/post").unwrap();
        assert_eq!(resolve_href(&base, "/img/a.png"), Some("https://example.com/img/a.png".to_string()));
        assert_eq!(resolve_href(&base, "b.png"), Some("https://example.com/blog/b.png".to_string()));
        assert_eq!(
            resolve_href(&base, "https://cdn.example.net/c.png"),
            Some("https://cdn.example.net/c.png".to_string())
        );
        assert_eq!(resolve_href(&base, "  "), None);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello \n  world\t"), "Hello world");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://example.com/path"), Some("example.com".to_string()));
        assert_eq!(extract_domain("http://127.0.0.1:8080/"), Some("127.0.0.1".to_string()));
        assert_eq!(extract_domain("invalid-url"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }
}
