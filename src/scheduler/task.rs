//! Per-request context carried alongside a dispatched frontier entry.
//!
//! The HTTP client already accumulates the full response body and header
//! list before handing back a [`crate::http::Response`], so this task
//! record does not duplicate a growable body buffer or `Content-Type`
//! tracker — those are read straight off the delivered response.

pub(crate) struct Task {
    pub(crate) depth: u32,
}
