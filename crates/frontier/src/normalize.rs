use sha2::{Digest, Sha256};
use url::Url;

/// Tracking parameters stripped during normalization (§4.C).
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("empty URL")]
    Empty,
    #[error("invalid URL")]
    Invalid,
    #[error("missing scheme or host")]
    MissingSchemeOrHost,
}

/// §4.C `Normalize(raw) -> canonical`.
///
/// Note (§9 open question): this unconditionally upgrades `http` to
/// `https`, which is correct for modern targets but collapses a handful of
/// genuinely HTTP-only hosts into the same equivalence class as their
/// (nonexistent) HTTPS counterpart. Kept as specified: not changed without
/// explicit intent.
pub fn normalize(raw: &str) -> Result<String, NormalizeError> {
    if raw.trim().is_empty() {
        return Err(NormalizeError::Empty);
    }

    let mut url = Url::parse(raw).map_err(|_| NormalizeError::Invalid)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(NormalizeError::MissingSchemeOrHost);
    }
    if url.host_str().is_none() {
        return Err(NormalizeError::MissingSchemeOrHost);
    }

    let original_scheme = url.scheme().to_string();
    // Upgrade http -> https unconditionally, then lowercase scheme/host.
    let _ = url.set_scheme("https");
    let host_lower = url.host_str().unwrap_or_default().to_lowercase();
    let _ = url.set_host(Some(&host_lower));

    // Drop port if it's the default for either the original or the
    // upgraded scheme (§4.C: "matches the default for the original or
    // upgraded scheme").
    if let Some(port) = url.port() {
        let is_default = (original_scheme == "http" && port == 80)
            || (original_scheme == "https" && port == 443)
            || port == 443; // upgraded scheme's default
        if is_default {
            let _ = url.set_port(None);
        }
    }

    // `url::Url` already resolves dot-segments during parsing.

    // Trim trailing slash, preserving root "/".
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        url.set_path(trimmed);
    }

    url.set_fragment(None);

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &kept {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    Ok(url.to_string())
}

/// `URLHash(raw) -> 64-char hex` = SHA-256 of `Normalize(raw)`.
pub fn url_hash(raw: &str) -> Result<String, NormalizeError> {
    let canonical = normalize(raw)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_invalid() {
        assert_eq!(normalize(""), Err(NormalizeError::Empty));
        assert_eq!(normalize("not a url"), Err(NormalizeError::Invalid));
    }

    #[test]
    fn upgrades_http_to_https() {
        let n = normalize("http://example.com/page").unwrap();
        assert!(n.starts_with("https://"));
    }

    #[test]
    fn http_80_and_https_443_are_equivalent() {
        let a = normalize("http://host:80/p").unwrap();
        let b = normalize("https://host:443/p").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn lowercases_scheme_and_host() {
        let n = normalize("HTTP://Example.COM/Path").unwrap();
        assert_eq!(n, "https://example.com/Path");
    }

    #[test]
    fn trims_trailing_slash_but_preserves_root() {
        assert_eq!(normalize("https://example.com/a/").unwrap(), "https://example.com/a");
        assert_eq!(normalize("https://example.com/").unwrap(), "https://example.com/");
    }

    #[test]
    fn drops_fragment() {
        let n = normalize("https://example.com/page#section").unwrap();
        assert!(!n.contains('#'));
    }

    #[test]
    fn strips_tracking_params_and_drops_bare_question_mark() {
        let n = normalize("https://example.com/page?utm_source=x").unwrap();
        assert!(!n.contains('?'));
        assert!(!n.contains("utm_source"));
    }

    #[test]
    fn sorts_remaining_query_params() {
        let n = normalize("HTTP://Example.com/path?b=2&a=1").unwrap();
        let m = normalize("https://example.com/path?a=1&b=2").unwrap();
        assert_eq!(n, m);
    }

    #[test]
    fn hash_is_64_char_lowercase_hex() {
        let h = url_hash("https://example.com/article").unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn equal_normalized_forms_hash_identically() {
        let a = url_hash("HTTP://Example.com/path?b=2&a=1").unwrap();
        let b = url_hash("https://example.com/path?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }
}
