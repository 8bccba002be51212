use reqwest::Url;

/// Query parameters that identify the resource on a given host. Everything
/// else in a query string is tracking or presentation noise.
/// A pattern ending in `.` matches as a host prefix, anything else as a domain suffix.
const LOAD_BEARING_QUERY: &[(&str, &[&str])] = &[
    ("youtube.com", &["v", "list"]),
    ("books.google.", &["id", "vid", "isbn"]),
    ("play.google.com", &["id"]),
    ("scholar.google.", &["cluster"]),
    ("barnesandnoble.com", &["ean"]),
    ("bookshop.org", &["ean"]),
    ("ncbi.nlm.nih.gov", &["term"]),
    ("ssrn.com", &["abstract_id"]),
    ("ieeexplore.ieee.org", &["arnumber"]),
    ("dl.acm.org", &["id", "doid"]),
    ("citeseerx.ist.psu.edu", &["doi"]),
    ("openreview.net", &["id"]),
    ("news.ycombinator.com", &["id"]),
    ("semanticscholar.org", &["paperid"]),
];

/// Canonical form used for URL matching: `https` scheme, lowercase host without
/// `www.`, no fragment, no trailing slash, and only load-bearing query parameters.
///
/// Never fails; strings that do not parse as URLs are trimmed and case-folded.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else if Url::parse(trimmed).is_ok_and(|url| url.cannot_be_a_base()) {
        // mailto:, urn:, tel: and friends
        return fallback_normalize(trimmed);
    } else {
        format!("https://{trimmed}")
    };

    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some() && matches!(url.scheme(), "http" | "https") => {
            canonical_http_url(&url)
        }
        _ => fallback_normalize(trimmed),
    }
}

fn canonical_http_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut out = format!("https://{host}");
    if let Some(port) = url.port().filter(|p| *p != 80 && *p != 443) {
        out.push_str(&format!(":{port}"));
    }

    let path = url.path().trim_end_matches('/');
    out.push_str(path);

    let retained = retained_query_keys(&host);
    if !retained.is_empty() {
        let pairs: Vec<String> = url
            .query_pairs()
            .filter(|(key, _)| retained.iter().any(|k| k.eq_ignore_ascii_case(key)))
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    key.to_ascii_lowercase(),
                    urlencoding::encode(&value)
                )
            })
            .collect();
        if !pairs.is_empty() {
            out.push('?');
            out.push_str(&pairs.join("&"));
        }
    }

    out
}

fn retained_query_keys(host: &str) -> &'static [&'static str] {
    LOAD_BEARING_QUERY
        .iter()
        .find(|(pattern, _)| host_matches(host, pattern))
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

fn host_matches(host: &str, pattern: &str) -> bool {
    if pattern.ends_with('.') {
        host.starts_with(pattern)
    } else {
        host == pattern || host.ends_with(&format!(".{pattern}"))
    }
}

fn fallback_normalize(input: &str) -> String {
    let without_fragment = input.split('#').next().unwrap_or(input);
    without_fragment.trim_end_matches('/').to_lowercase()
}

/// Lowercased host without `www.`, when the input parses as an http(s) URL.
pub fn url_host(input: &str) -> Option<String> {
    let normalized = normalize_url(input);
    let rest = normalized.strip_prefix("https://")?;
    let host = rest.split(['/', '?', ':']).next()?;
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_scheme_and_strips_www() {
        assert_eq!(
            normalize_url("http://www.Example.com/Paper/"),
            "https://example.com/Paper"
        );
    }

    #[test]
    fn strips_tracking_query_and_fragment() {
        assert_eq!(
            normalize_url("https://example.com/a/b?utm_source=x&ref=y#section-2"),
            "https://example.com/a/b"
        );
    }

    #[test]
    fn keeps_load_bearing_query() {
        assert_eq!(
            normalize_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s"),
            "https://youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            normalize_url("https://books.google.com/books?id=abc123&hl=en"),
            "https://books.google.com/books?id=abc123"
        );
    }

    #[test]
    fn bare_host_gets_scheme() {
        assert_eq!(normalize_url("example.org/x/"), "https://example.org/x");
    }

    #[test]
    fn root_path_has_no_trailing_slash() {
        assert_eq!(normalize_url("https://example.org/"), "https://example.org");
    }

    #[test]
    fn non_default_port_is_kept() {
        assert_eq!(normalize_url("http://localhost:8080/x"), "https://localhost:8080/x");
    }

    #[test]
    fn garbage_is_total() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("   "), "");
        assert_eq!(normalize_url("mailto:someone@example.com"), "mailto:someone@example.com");
        let _ = normalize_url("http://[::1");
        let _ = normalize_url("::::////");
    }

    #[test]
    fn host_extraction() {
        assert_eq!(url_host("https://www.arxiv.org/abs/1").as_deref(), Some("arxiv.org"));
        assert_eq!(url_host("mailto:x@y.z"), None);
    }
}
