//! `Set-Cookie` parsing and the three legacy HTTP date formats RFC 6265
//! requires a cookie jar to understand.

use std::time::{Duration, SystemTime};

use chrono::NaiveDateTime;

/// A `Set-Cookie` header value broken into its attributes, before scope
/// validation against the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedCookie {
    pub(crate) name: String,
    pub(crate) value: String,
    /// Leading `.` already stripped. `None` if the header had no `Domain`
    /// attribute (caller defaults to the request host).
    pub(crate) domain: Option<String>,
    /// `None` if the header had no `Path` attribute (caller defaults to the
    /// request path).
    pub(crate) path: Option<String>,
    /// `None` means a session cookie. `Some` in the past means "delete on
    /// sight".
    pub(crate) expires: Option<SystemTime>,
    pub(crate) secure: bool,
    pub(crate) httponly: bool,
}

/// Parses one `Set-Cookie` header value. Returns `None` if the mandatory
/// `name=value` pair is missing its `=`.
pub(crate) fn parse_set_cookie(header: &str) -> Option<ParsedCookie> {
    let mut parts = header.split(';');
    let first = parts.next()?.trim();
    let eq = first.find('=')?;
    let name = first[..eq].trim().to_string();
    let value = first[eq + 1..].trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut cookie = ParsedCookie {
        name,
        value,
        domain: None,
        path: None,
        expires: None,
        secure: false,
        httponly: false,
    };

    let mut max_age: Option<i64> = None;
    let mut expires_attr: Option<SystemTime> = None;

    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (key, val) = match attr.find('=') {
            Some(i) => (attr[..i].trim(), attr[i + 1..].trim()),
            None => (attr, ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "domain" => {
                let v = val.trim();
                let v = v.strip_prefix('.').unwrap_or(v);
                if !v.is_empty() {
                    cookie.domain = Some(v.to_ascii_lowercase());
                }
            }
            "path" => {
                if !val.is_empty() {
                    cookie.path = Some(val.to_string());
                }
            }
            "secure" => cookie.secure = true,
            "httponly" => cookie.httponly = true,
            "expires" => {
                expires_attr = parse_http_date(val);
            }
            "max-age" => {
                max_age = val.trim().parse::<i64>().ok();
            }
            _ => {}
        }
    }

    // Max-Age wins over Expires when both appear.
    cookie.expires = if let Some(seconds) = max_age {
        Some(if seconds <= 0 {
            SystemTime::UNIX_EPOCH
        } else {
            SystemTime::now() + Duration::from_secs(seconds as u64)
        })
    } else {
        expires_attr
    };

    Some(cookie)
}

/// Parses an HTTP date against RFC 1123, RFC 850, and ANSI C `asctime`, in
/// that order, all interpreted as UTC.
pub(crate) fn parse_http_date(s: &str) -> Option<SystemTime> {
    let s = s.trim();
    const FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S GMT", // RFC 1123
        "%A, %d-%b-%y %H:%M:%S GMT", // RFC 850
        "%a %b %e %H:%M:%S %Y",      // asctime
    ];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            let secs = naive.and_utc().timestamp();
            return Some(if secs <= 0 {
                SystemTime::UNIX_EPOCH
            } else {
                SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64)
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_equals_is_dropped() {
        assert!(parse_set_cookie("justaname").is_none());
    }

    #[test]
    fn basic_name_value() {
        let c = parse_set_cookie("k=v").unwrap();
        assert_eq!(c.name, "k");
        assert_eq!(c.value, "v");
        assert!(c.domain.is_none());
        assert!(c.expires.is_none());
    }

    #[test]
    fn domain_strips_leading_dot() {
        let c = parse_set_cookie("k=v; Domain=.Example.com").unwrap();
        assert_eq!(c.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn secure_and_httponly_flags() {
        let c = parse_set_cookie("k=v; Secure; HttpOnly").unwrap();
        assert!(c.secure);
        assert!(c.httponly);
    }

    #[test]
    fn max_age_wins_over_expires() {
        let c = parse_set_cookie("k=v; Max-Age=3600; Expires=Wed, 21 Oct 2099 07:28:00 GMT").unwrap();
        let expires = c.expires.unwrap();
        assert!(expires < SystemTime::now() + Duration::from_secs(3601));
    }

    #[test]
    fn max_age_zero_is_immediate_expiry() {
        let c = parse_set_cookie("k=v; Max-Age=0").unwrap();
        assert_eq!(c.expires, Some(SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn max_age_negative_is_immediate_expiry() {
        let c = parse_set_cookie("k=v; Max-Age=-5").unwrap();
        assert_eq!(c.expires, Some(SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn rfc1123_date() {
        let t = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert!(t > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn rfc850_date() {
        let t = parse_http_date("Wednesday, 21-Oct-15 07:28:00 GMT").unwrap();
        assert!(t > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn asctime_date() {
        let t = parse_http_date("Wed Oct 21 07:28:00 2015").unwrap();
        assert!(t > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn garbage_date_is_none() {
        assert!(parse_http_date("not a date").is_none());
    }
}
