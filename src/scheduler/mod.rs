//! Crawl scheduler: frontier, visited set, parallelism gate, link
//! extraction, and the completion pipeline that feeds new links back into
//! the frontier.

mod frontier;
mod task;

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use url::Url;

use crate::error::{Result, TransportCode};
use crate::extract::extract_links;
use crate::http::{HttpClient, RequestCallbacks, Response};
use crate::reactor::{Handle, Reactor};
use crate::url_util;
use frontier::{Frontier, FrontierEntry};
use task::Task;

/// Tunables for a [`Crawler`].
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Maximum HTTP transfers simultaneously handed to the HTTP client.
    pub max_concurrent: usize,
    /// Links discovered beyond this depth are discarded.
    pub max_depth: u32,
    /// Advisory byte ceiling on a response body; bodies longer than this
    /// are truncated before reaching `page_cb` and link extraction.
    pub max_page_size: usize,
    /// Caps frontier length, dropping newest entries silently once reached.
    /// `None` keeps the frontier unbounded.
    pub max_frontier: Option<usize>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_concurrent: 4,
            max_depth: 8,
            max_page_size: 16 * 1024 * 1024,
            max_frontier: None,
        }
    }
}

/// Counters exposed by [`Crawler::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlStats {
    pub dispatched: u64,
    pub completed: u64,
    pub errored: u64,
    pub frontier_len: usize,
    /// Entries rejected by `max_frontier` once the cap was reached.
    pub dropped: u64,
}

type PageCb = Rc<dyn Fn(&Url, u16, &[u8])>;
type ErrorCb = Rc<dyn Fn(&Url, TransportCode)>;

struct State {
    config: CrawlerConfig,
    http: HttpClient,
    frontier: Frontier,
    seen: HashSet<String>,
    active: usize,
    dispatch_timer: Option<Handle>,
    page_cb: PageCb,
    error_cb: ErrorCb,
    stats: CrawlStats,
}

/// Owns the frontier, the visited set, the parallelism budget, and the
/// completion pipeline for one crawl.
#[derive(Clone)]
pub struct Crawler {
    state: Rc<RefCell<State>>,
}

impl Crawler {
    /// Constructs the scheduler, binds a fresh [`HttpClient`] to `reactor`,
    /// and arms the zero-delay dispatch timer.
    pub fn new(
        reactor: &mut Reactor,
        config: CrawlerConfig,
        page_cb: impl Fn(&Url, u16, &[u8]) + 'static,
        error_cb: impl Fn(&Url, TransportCode) + 'static,
    ) -> Result<Self> {
        let http = HttpClient::new()?;
        let state = Rc::new(RefCell::new(State {
            config,
            http,
            frontier: Frontier::new(),
            seen: HashSet::new(),
            active: 0,
            dispatch_timer: None,
            page_cb: Rc::new(page_cb),
            error_cb: Rc::new(error_cb),
            stats: CrawlStats::default(),
        }));
        Self::rearm_dispatch(reactor, &state);
        Ok(Crawler { state })
    }

    /// Enqueues `url` at depth 0. Canonicalization of the URL string itself
    /// is the caller's responsibility via `Url::parse`. Returns `false`
    /// without enqueuing if `url` is already visited; `true` reports
    /// *enqueued*, not *completed*.
    pub fn add_url(&self, reactor: &mut Reactor, url: Url) -> bool {
        Self::enqueue(reactor, &self.state, url, 0)
    }

    /// Arms the dispatch timer if it is not already armed; the event loop
    /// is expected to be driven externally via `reactor.dispatch()`.
    pub fn start(&self, reactor: &mut Reactor) {
        Self::rearm_dispatch(reactor, &self.state);
    }

    /// Drains the frontier, removes the dispatch timer, and frees the HTTP
    /// client — which cancels pending transfers without invoking their
    /// completion callbacks.
    pub fn free(&self, reactor: &mut Reactor) {
        let mut state = self.state.borrow_mut();
        while state.frontier.pop().is_some() {}
        if let Some(h) = state.dispatch_timer.take() {
            let _ = reactor.del(h);
        }
        state.http.cancel_all(reactor);
        state.seen.clear();
    }

    pub fn stats(&self) -> CrawlStats {
        let state = self.state.borrow();
        CrawlStats { frontier_len: state.frontier.len(), ..state.stats }
    }

    /// Appends `url` to the frontier if it passes the depth/visited/cap
    /// checks, then re-arms the dispatch timer.
    fn enqueue(reactor: &mut Reactor, state: &Rc<RefCell<State>>, url: Url, depth: u32) -> bool {
        {
            let mut st = state.borrow_mut();
            let key = url.as_str().to_string();
            if st.seen.contains(&key) {
                return false;
            }
            if depth > st.config.max_depth {
                return false;
            }
            if let Some(cap) = st.config.max_frontier {
                if st.frontier.len() >= cap {
                    st.stats.dropped += 1;
                    log::warn!("frontier cap of {cap} reached, dropping {url}");
                    return false;
                }
            }
            st.frontier.push(FrontierEntry { url, depth });
        }
        Self::rearm_dispatch(reactor, state);
        true
    }

    fn rearm_dispatch(reactor: &mut Reactor, state: &Rc<RefCell<State>>) {
        if state.borrow().dispatch_timer.is_some() {
            return;
        }
        let state_for_timer = state.clone();
        match reactor.add_timer(0, false, move |reactor| {
            Self::dispatch(reactor, &state_for_timer);
        }) {
            Ok(handle) => state.borrow_mut().dispatch_timer = Some(handle),
            Err(e) => log::warn!("failed to arm dispatch timer: {e}"),
        }
    }

    /// The dispatch timer's callback: pops from the frontier while
    /// `active < max_concurrent`.
    ///
    /// Visited-set marking happens here, at pop time, not in `enqueue`.
    /// Two `add_url` calls for the same URL made before either is
    /// dispatched both land in the frontier; the second pop finds the URL
    /// already marked visited by the first and is dropped without counting
    /// against `active`. That is what makes enqueuing the same URL twice
    /// result in exactly one transfer, without having to mark visited
    /// earlier.
    fn dispatch(reactor: &mut Reactor, state: &Rc<RefCell<State>>) {
        state.borrow_mut().dispatch_timer = None;

        loop {
            let (active, max_concurrent) = {
                let st = state.borrow();
                (st.active, st.config.max_concurrent)
            };
            if active >= max_concurrent {
                break;
            }
            let Some(entry) = state.borrow_mut().frontier.pop() else { break };

            let key = entry.url.as_str().to_string();
            if state.borrow().seen.contains(&key) {
                continue;
            }
            state.borrow_mut().seen.insert(key);
            Self::dispatch_one(reactor, state, entry);
        }

        let (active, frontier_empty) = {
            let st = state.borrow();
            (st.active, st.frontier.is_empty())
        };
        if active == 0 && frontier_empty {
            reactor.stop();
        }
    }

    fn dispatch_one(reactor: &mut Reactor, state: &Rc<RefCell<State>>, entry: FrontierEntry) {
        let FrontierEntry { url, depth } = entry;
        let task = Task { depth };
        let max_page_size = state.borrow().config.max_page_size;
        let state_for_complete = state.clone();

        let callbacks = RequestCallbacks::new(move |reactor, _handle, response| {
            Self::on_complete(reactor, &state_for_complete, &task, max_page_size, response);
        });

        let http = state.borrow().http.clone();
        match http.get(reactor, url.clone(), callbacks) {
            Ok(_handle) => {
                let mut st = state.borrow_mut();
                st.active += 1;
                st.stats.dispatched += 1;
            }
            Err(e) => log::warn!("failed to submit {url}: {e}"),
        }
    }

    /// The per-request completion callback.
    fn on_complete(reactor: &mut Reactor, state: &Rc<RefCell<State>>, task: &Task, max_page_size: usize, response: Response) {
        {
            let mut st = state.borrow_mut();
            st.active = st.active.saturating_sub(1);
        }

        let truncated = response.body.len() > max_page_size;
        let body: &[u8] = if truncated { &response.body[..max_page_size] } else { &response.body };
        if truncated {
            log::warn!("truncating response body for {} to {max_page_size} bytes", response.effective_url);
        }

        let ok = response.error.is_none() && (200..300).contains(&response.status);
        if ok {
            let page_cb = state.borrow().page_cb.clone();
            page_cb(&response.effective_url, response.status, body);
            state.borrow_mut().stats.completed += 1;

            let content_type = response.header_value("content-type").unwrap_or("");
            for link in extract_links(content_type, body, &response.effective_url) {
                if let Some(resolved) = url_util::resolve(&response.effective_url, &link) {
                    Self::enqueue(reactor, state, resolved, task.depth + 1);
                }
            }
        } else {
            let error_cb = state.borrow().error_cb.clone();
            error_cb(&response.effective_url, response.transport);
            state.borrow_mut().stats.errored += 1;
        }

        Self::rearm_dispatch(reactor, state);
    }
}
