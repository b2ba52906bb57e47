//! RFC 6265 subset: parse `Set-Cookie`, scope-match on store, emit `Cookie`
//! headers. Accessed only by the HTTP client, on the dispatching thread.

mod jar;
mod parse;

pub use jar::{Cookie, CookieJar};
