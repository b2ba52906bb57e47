//! Error taxonomy shared by every component.
//!
//! Transport and HTTP-status errors are never retried automatically by this
//! crate; recovery is left to the caller. Cookie parse failures, URL
//! resolution failures and link-extraction failures are non-fatal and are
//! never propagated through this type — the offending item is logged and
//! dropped at the call site instead.

use std::fmt;

/// A transport-layer failure code surfaced to `complete_cb`.
///
/// Zero means success. Positive values are a small taxonomy of causes; this
/// is deliberately not a bitflag or an open-ended string so callers can
/// match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCode(pub u32);

impl TransportCode {
    pub const OK: TransportCode = TransportCode(0);
    pub const DNS: TransportCode = TransportCode(1);
    pub const CONNECT: TransportCode = TransportCode(2);
    pub const TLS: TransportCode = TransportCode(3);
    pub const IO: TransportCode = TransportCode(4);
    pub const PROTOCOL: TransportCode = TransportCode(5);
    pub const TIMEOUT: TransportCode = TransportCode(6);
    pub const TOO_MANY_REDIRECTS: TransportCode = TransportCode(7);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::OK => "ok",
            Self::DNS => "dns",
            Self::CONNECT => "connect",
            Self::TLS => "tls",
            Self::IO => "io",
            Self::PROTOCOL => "protocol",
            Self::TIMEOUT => "timeout",
            Self::TOO_MANY_REDIRECTS => "too-many-redirects",
            TransportCode(n) => return write!(f, "transport-code({n})"),
        };
        f.write_str(name)
    }
}

/// Error returned synchronously by a constructor or registration call.
///
/// Transport, HTTP-status, and timeout failures are delivered to callbacks
/// rather than returned, so they are represented on
/// [`crate::http::Response`] / the completion callback instead of here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad argument to a registration call: conflicting I/O flags, a
    /// negative timer delay, an empty URL, and the like.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Allocator, OS resource, or TLS engine initialization failure.
    #[error("resource error: {0}")]
    Resource(String),

    /// A cookie or date string failed to parse. Always non-fatal: the
    /// offending datum is dropped and this is logged at `warn`, never
    /// returned to a caller that can't act on it.
    #[error("parse error: {0}")]
    ParseError(String),
}

impl Error {
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Error::InvalidArg(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::ParseError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
