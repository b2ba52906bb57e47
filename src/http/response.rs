//! Response type.

use url::Url;

use crate::error::TransportCode;

/// A completed (or failed) transfer's result. Owned by the HTTP client until
/// delivered to the completion callback, then transferred to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL the response was actually produced at, after following any
    /// redirects.
    pub effective_url: Url,
    /// `0` if no HTTP response was ever received.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Zero on success, a positive taxonomy code on transport-layer failure.
    pub transport: TransportCode,
    pub error: Option<String>,
}

impl Response {
    pub(crate) fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
