//! The cookie jar itself: storage, scope validation, and emission.

use std::collections::HashMap;
use std::time::SystemTime;

use super::parse::{parse_set_cookie, ParsedCookie};

/// A single stored cookie.
///
/// Invariants upheld by construction: `name` is non-empty, `domain` is
/// non-empty and lowercase with any leading `.` already stripped, `path`
/// begins with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// `None` means a session cookie, alive for the life of the jar.
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub httponly: bool,
}

impl Cookie {
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        matches!(self.expires, Some(t) if t <= now)
    }

    fn domain_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }

    fn path_matches(&self, path: &str) -> bool {
        if self.path == "/" {
            return true;
        }
        if path == self.path {
            return true;
        }
        path.starts_with(&self.path) && path[self.path.len()..].starts_with('/')
    }
}

/// Two-level `domain -> path -> cookies` store.
#[derive(Default)]
pub struct CookieJar {
    domains: HashMap<String, HashMap<String, Vec<Cookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        CookieJar { domains: HashMap::new() }
    }

    /// Parses and stores one `Set-Cookie` header value produced by a
    /// response to `(request_host, request_path, is_https)`. Returns
    /// `false` if the header was malformed or failed scope validation; both
    /// cases are non-fatal and are logged by the caller.
    pub fn store(&mut self, set_cookie: &str, request_host: &str, request_path: &str, is_https: bool) -> bool {
        let Some(parsed) = parse_set_cookie(set_cookie) else {
            log::warn!("dropping unparsable Set-Cookie header");
            return false;
        };
        let Some(cookie) = self.to_scoped_cookie(parsed, request_host, request_path, is_https) else {
            return false;
        };
        self.insert(cookie);
        true
    }

    fn to_scoped_cookie(
        &self,
        parsed: ParsedCookie,
        request_host: &str,
        request_path: &str,
        is_https: bool,
    ) -> Option<Cookie> {
        let domain = parsed
            .domain
            .unwrap_or_else(|| request_host.to_ascii_lowercase());
        let path = parsed.path.unwrap_or_else(|| default_path(request_path));

        let request_host_lower = request_host.to_ascii_lowercase();
        let domain_ok = request_host_lower == domain || request_host_lower.ends_with(&format!(".{domain}"));
        if !domain_ok {
            log::warn!("dropping cookie {:?}: domain {domain} does not match host {request_host}", parsed.name);
            return None;
        }
        if parsed.secure && !is_https {
            log::warn!("dropping Secure cookie {:?} received over plaintext", parsed.name);
            return None;
        }

        Some(Cookie {
            name: parsed.name,
            value: parsed.value,
            domain,
            path,
            expires: parsed.expires,
            secure: parsed.secure,
            httponly: parsed.httponly,
        })
    }

    /// Finds-or-creates the (domain, path) entry and replaces any existing
    /// cookie with a matching case-insensitive name, preserving insertion
    /// order at the tail.
    fn insert(&mut self, cookie: Cookie) {
        let path_map = self.domains.entry(cookie.domain.clone()).or_default();
        let list = path_map.entry(cookie.path.clone()).or_default();
        list.retain(|existing| !existing.name.eq_ignore_ascii_case(&cookie.name));
        list.push(cookie);
    }

    /// Builds the `Cookie:` header value for an outgoing request to
    /// `(host, path, is_https)`, purging expired cookies along the way.
    /// Returns `None` if nothing survives.
    pub fn emit(&mut self, host: &str, path: &str, is_https: bool) -> Option<String> {
        let now = SystemTime::now();
        let host_lower = host.to_ascii_lowercase();
        let mut pairs = Vec::new();

        for (domain, paths) in self.domains.iter_mut() {
            let domain_ok = host_lower == *domain || host_lower.ends_with(&format!(".{domain}"));
            if !domain_ok {
                continue;
            }
            for (cookie_path, cookies) in paths.iter_mut() {
                let path_ok = cookie_path == "/" || path == cookie_path || (path.starts_with(cookie_path.as_str()) && path[cookie_path.len()..].starts_with('/'));
                if !path_ok {
                    continue;
                }
                cookies.retain(|c| !c.is_expired_at(now));
                for cookie in cookies.iter() {
                    if cookie.secure && !is_https {
                        continue;
                    }
                    pairs.push(format!("{}={}", cookie.name, cookie.value));
                }
            }
        }

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    #[cfg(test)]
    fn cookie_count(&self) -> usize {
        self.domains.values().flat_map(|p| p.values()).map(Vec::len).sum()
    }
}

fn default_path(request_path: &str) -> String {
    request_path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn round_trip_same_path_and_subpath() {
        let mut jar = CookieJar::new();
        assert!(jar.store("k=v; Path=/; Domain=h", "h", "/", true));
        assert_eq!(jar.emit("h", "/p", true).as_deref(), Some("k=v"));
        assert_eq!(jar.emit("h", "/p/sub", true).as_deref(), Some("k=v"));
    }

    #[test]
    fn secure_cookie_not_stored_from_plaintext() {
        let mut jar = CookieJar::new();
        assert!(!jar.store("k=v; Secure", "h", "/", false));
        assert_eq!(jar.cookie_count(), 0);
    }

    #[test]
    fn secure_cookie_not_emitted_over_plaintext() {
        let mut jar = CookieJar::new();
        assert!(jar.store("k=v; Secure", "h", "/", true));
        assert_eq!(jar.emit("h", "/", false), None);
        assert_eq!(jar.emit("h", "/", true).as_deref(), Some("k=v"));
    }

    #[test]
    fn max_age_zero_never_emitted() {
        let mut jar = CookieJar::new();
        jar.store("k=v; Max-Age=0", "h", "/", true);
        assert_eq!(jar.emit("h", "/", true), None);
    }

    #[test]
    fn expired_cookie_purged_on_emit() {
        let mut jar = CookieJar::new();
        jar.insert(Cookie {
            name: "k".into(),
            value: "v".into(),
            domain: "h".into(),
            path: "/".into(),
            expires: Some(SystemTime::now() - Duration::from_secs(10)),
            secure: false,
            httponly: false,
        });
        assert_eq!(jar.cookie_count(), 1);
        assert_eq!(jar.emit("h", "/", true), None);
        assert_eq!(jar.cookie_count(), 0);
    }

    #[test]
    fn domain_match_suffix_and_rejects() {
        let mut jar = CookieJar::new();
        jar.store("k=v; Domain=example.com", "example.com", "/", true);
        assert_eq!(jar.emit("example.com", "/", true).as_deref(), Some("k=v"));
        assert_eq!(jar.emit("a.example.com", "/", true).as_deref(), Some("k=v"));
        assert_eq!(jar.emit("notexample.com", "/", true), None);
        assert_eq!(jar.emit("example.com.evil", "/", true), None);
    }

    #[test]
    fn domain_mismatch_dropped_on_store() {
        let mut jar = CookieJar::new();
        assert!(!jar.store("k=v; Domain=other.com", "h", "/", true));
    }

    #[test]
    fn insert_replaces_same_name_same_scope() {
        let mut jar = CookieJar::new();
        jar.store("k=old", "h", "/", true);
        jar.store("k=new", "h", "/", true);
        assert_eq!(jar.cookie_count(), 1);
        assert_eq!(jar.emit("h", "/", true).as_deref(), Some("k=new"));
    }

    #[test]
    fn path_default_is_the_request_path_verbatim() {
        let mut jar = CookieJar::new();
        jar.store("k=v", "h", "/a/b", true);
        assert_eq!(jar.emit("h", "/a/b", true).as_deref(), Some("k=v"));
        assert_eq!(jar.emit("h", "/a/b/sub", true).as_deref(), Some("k=v"));
        assert_eq!(jar.emit("h", "/a/other", true), None);
        assert_eq!(jar.emit("h", "/x", true), None);
    }
}
