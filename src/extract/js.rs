//! Link harvesting from `application/javascript` bodies: three path-regex
//! families plus one full-URL regex, resolved/deduplicated against the
//! document's base URL.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    /// Absolute-rooted string literals: `"/api/v2/thing"`.
    static ref ROOTED_PATH: Regex = Regex::new(r#"["'](/[A-Za-z0-9_./\-?=&%]+)["']"#).unwrap();
    /// Relative string literals: `"./thing"`, `"../thing"`.
    static ref RELATIVE_PATH: Regex = Regex::new(r#"["'](\.{1,2}/[A-Za-z0-9_./\-?=&%]+)["']"#).unwrap();
    /// Common fetch/XHR call sites: `fetch("/x")`, `.open("GET", "/x")`.
    static ref CALL_SITE_PATH: Regex =
        Regex::new(r#"(?:fetch|axios\.\w+|\.open)\s*\(\s*(?:["'][A-Z]+["']\s*,\s*)?["']([^"']+)["']"#).unwrap();
    /// Fully-qualified URLs embedded anywhere in the body.
    static ref FULL_URL: Regex = Regex::new(r#"https?://[A-Za-z0-9_./\-?=&%~:@+#]+"#).unwrap();
}

/// Extracts links from a JavaScript body. Paths are combined with `base`
/// (scheme + authority, resolving `.`/`..` per the base's current path);
/// full URLs are kept only if they stay in `base`'s domain, then
/// deduplicated. Returns owned strings.
pub(crate) fn extract(body: &str, base: &Url) -> Vec<String> {
    let base_host = base.host_str().map(str::to_ascii_lowercase);

    let mut out = Vec::new();
    let mut seen_full = HashSet::new();

    for re in [&*ROOTED_PATH, &*RELATIVE_PATH, &*CALL_SITE_PATH] {
        for caps in re.captures_iter(body) {
            if let Some(m) = caps.get(1) {
                if let Ok(joined) = base.join(m.as_str()) {
                    out.push(joined.to_string());
                }
            }
        }
    }

    for m in FULL_URL.find_iter(body) {
        let candidate = m.as_str();
        let Ok(parsed) = Url::parse(candidate) else { continue };
        let in_domain = parsed.host_str().map(str::to_ascii_lowercase) == base_host;
        if !in_domain {
            continue;
        }
        if seen_full.insert(candidate.to_string()) {
            out.push(candidate.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_path_is_combined_with_authority() {
        let base = Url::parse("http://h/base").unwrap();
        let links = extract(r#"fetch("/api/data")"#, &base);
        assert!(links.contains(&"http://h/api/data".to_string()));
    }

    #[test]
    fn full_url_in_domain_is_kept() {
        let base = Url::parse("http://h/base").unwrap();
        let links = extract(r#"var u = "http://h/x";"#, &base);
        assert!(links.contains(&"http://h/x".to_string()));
    }

    #[test]
    fn full_url_out_of_domain_is_discarded() {
        let base = Url::parse("http://h/base").unwrap();
        let links = extract(r#"var u = "http://other.com/x";"#, &base);
        assert!(!links.iter().any(|l| l.contains("other.com")));
    }

    #[test]
    fn full_url_duplicates_collapsed() {
        let base = Url::parse("http://h/base").unwrap();
        let links = extract(r#""http://h/x"; "http://h/x";"#, &base);
        assert_eq!(links.iter().filter(|l| *l == "http://h/x").count(), 1);
    }

    #[test]
    fn relative_dotted_path() {
        let base = Url::parse("http://h/base").unwrap();
        let links = extract(r#"import x from "../shared/mod.js""#, &base);
        assert!(links.iter().any(|l| l.ends_with("/shared/mod.js")));
    }
}
