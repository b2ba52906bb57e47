//! Async HTTP client multiplexed over the reactor.

mod client;
mod parse;
mod request;
mod response;
mod tls;
mod transfer;

pub use client::{HttpClient, RequestCallbacks, RequestHandle};
pub use request::{Body, Method, MultipartField, Request};
pub use response::Response;
