//! Pure URL helpers: host extraction, a best-effort first-level domain
//! heuristic, and permissive relative-link resolution.

use url::Url;

/// Returns the host of `url`, or `None` if it has no host (not reachable for
/// http/https URLs, which always carry one).
pub fn host(url: &Url) -> Option<String> {
    url.host_str().map(str::to_string)
}

/// Best-effort second-to-last-label join, e.g. `a.b.example.com` ->
/// `example.com`. Deliberately **not** Public-Suffix-List accurate: it will
/// return `co.uk` for `www.example.co.uk` rather than `example.co.uk`. This
/// is an acknowledged, unfixed heuristic — do not rely on this for
/// multi-label public suffixes.
pub fn first_level_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Some(host.to_string());
    }
    Some(labels[labels.len() - 2..].join("."))
}

/// Resolves `relative` against `base`: if `relative` already carries a
/// scheme or starts with `//`, it is returned verbatim
/// (after parsing); otherwise it is joined against `base` permissively
/// (non-http schemes allowed, spaces percent-encoded, path kept as-is).
pub fn resolve(base: &Url, relative: &str) -> Option<Url> {
    if has_scheme(relative) {
        return Url::parse(relative).ok();
    }
    if let Some(authority) = relative.strip_prefix("//") {
        return Url::parse(&format!("{}://{}", base.scheme(), authority)).ok();
    }
    base.join(relative).ok()
}

fn has_scheme(s: &str) -> bool {
    match s.find(':') {
        Some(i) if i > 0 => {
            let scheme = &s[..i];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        let url = Url::parse("https://example.com:8443/a").unwrap();
        assert_eq!(host(&url).as_deref(), Some("example.com"));
    }

    #[test]
    fn fld_simple_two_label() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(first_level_domain(&url).as_deref(), Some("example.com"));
    }

    #[test]
    fn fld_subdomain() {
        let url = Url::parse("https://a.b.example.com/").unwrap();
        assert_eq!(first_level_domain(&url).as_deref(), Some("example.com"));
    }

    #[test]
    fn resolve_relative_path() {
        let base = Url::parse("http://h/base/page").unwrap();
        let resolved = resolve(&base, "/x").unwrap();
        assert_eq!(resolved.as_str(), "http://h/x");
    }

    #[test]
    fn resolve_absolute_is_verbatim() {
        let base = Url::parse("http://h/base").unwrap();
        let resolved = resolve(&base, "http://other/y").unwrap();
        assert_eq!(resolved.as_str(), "http://other/y");
    }

    #[test]
    fn resolve_scheme_relative() {
        let base = Url::parse("https://h/base").unwrap();
        let resolved = resolve(&base, "//cdn.example.com/a.js").unwrap();
        assert_eq!(resolved.host_str(), Some("cdn.example.com"));
        assert_eq!(resolved.scheme(), "https");
    }

    #[test]
    fn resolve_query_relative() {
        let base = Url::parse("http://h/base/page?x=1").unwrap();
        let resolved = resolve(&base, "?y=2").unwrap();
        assert_eq!(resolved.as_str(), "http://h/base/page?y=2");
    }
}
