//! Single-process async crawler core: a cooperative reactor, an async
//! HTTP/1.1 client with TLS and redirect support, a crawl scheduler, and a
//! cookie jar, all running on one thread with no locks.
//!
//! Wiring a crawl together looks like:
//!
//! ```no_run
//! use crawlcore::{Crawler, CrawlerConfig, Reactor};
//! use url::Url;
//!
//! let mut reactor = Reactor::new().unwrap();
//! let crawler = Crawler::new(
//!     &mut reactor,
//!     CrawlerConfig::default(),
//!     |url, status, body| println!("{status} {url} ({} bytes)", body.len()),
//!     |url, transport| eprintln!("{url}: {transport}"),
//! )
//! .unwrap();
//! crawler.add_url(&mut reactor, Url::parse("https://example.com/").unwrap());
//! reactor.dispatch().unwrap();
//! ```

mod error;
mod reactor;
mod http;
mod cookie;
mod url_util;
mod extract;
mod scheduler;

pub use error::{Error, Result, TransportCode};
pub use reactor::{DispatchOutcome, Handle, IoFlags, Reactor, StopHandle};
pub use http::{Body, HttpClient, Method, MultipartField, Request, RequestCallbacks, RequestHandle, Response};
pub use cookie::{Cookie, CookieJar};
pub use url_util::{first_level_domain, host, resolve};
pub use extract::extract_links;
pub use scheduler::{Crawler, CrawlerConfig, CrawlStats};
