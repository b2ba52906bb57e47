//! The HTTP client itself: owns no multiplexing engine beyond the reactor,
//! since each [`Transfer`] is already 1:1 with its socket. Registers the
//! reactor I/O/timer handles a transfer needs and retargets them as the
//! transfer's direction needs change, by deleting and re-registering rather
//! than mutating a live registration in place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::rc::Rc;
use std::time::Instant;

use url::Url;

use crate::cookie::CookieJar;
use crate::error::{Error, Result, TransportCode};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::tls;
use crate::http::transfer::{Outcome, Transfer};
use crate::reactor::{Handle, IoFlags, Reactor};

/// Identifies one accepted request for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

/// The three callbacks a caller supplies per request. `header_cb`/`data_cb`
/// may fire any number of times before `complete_cb` fires exactly once.
pub struct RequestCallbacks {
    pub header_cb: Option<Rc<dyn Fn(&str)>>,
    pub data_cb: Option<Rc<dyn Fn(&[u8])>>,
    pub complete_cb: Box<dyn FnMut(&mut Reactor, RequestHandle, Response)>,
}

impl RequestCallbacks {
    pub fn new(complete_cb: impl FnMut(&mut Reactor, RequestHandle, Response) + 'static) -> Self {
        RequestCallbacks { header_cb: None, data_cb: None, complete_cb: Box::new(complete_cb) }
    }

    pub fn with_header_cb(mut self, cb: impl Fn(&str) + 'static) -> Self {
        self.header_cb = Some(Rc::new(cb));
        self
    }

    pub fn with_data_cb(mut self, cb: impl Fn(&[u8]) + 'static) -> Self {
        self.data_cb = Some(Rc::new(cb));
        self
    }
}

const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Failure from [`HttpClient::start_attempt`]: the transport code to report,
/// the error to log, and the caller's callbacks handed back so a failed
/// follow-up attempt can still deliver exactly one `complete_cb`.
type StartAttemptError = (TransportCode, Error, RequestCallbacks);

struct Entry {
    transfer: Transfer,
    url: Url,
    callbacks: RequestCallbacks,
    io_handle: Option<Handle>,
    io_flags: IoFlags,
    timer_handle: Option<Handle>,
}

struct ClientState {
    cookie_jar: CookieJar,
    entries: HashMap<u64, Entry>,
    next_id: u64,
    max_redirects: u32,
}

/// Holds a single multiplexing context. Cloning shares the same
/// cookie jar and in-flight transfer table — the clone is cheap (`Rc`) and
/// intended for closures that need to submit further requests from a
/// completion callback (e.g. the scheduler following links).
#[derive(Clone)]
pub struct HttpClient {
    state: Rc<RefCell<ClientState>>,
}

impl HttpClient {
    /// Fails with [`Error::Resource`] if the process-wide TLS config cannot
    /// be built.
    pub fn new() -> Result<Self> {
        tls::client_config()?;
        Ok(HttpClient {
            state: Rc::new(RefCell::new(ClientState {
                cookie_jar: CookieJar::new(),
                entries: HashMap::new(),
                next_id: 0,
                max_redirects: DEFAULT_MAX_REDIRECTS,
            })),
        })
    }

    pub fn get(&self, reactor: &mut Reactor, url: Url, callbacks: RequestCallbacks) -> Result<RequestHandle> {
        self.submit(reactor, Request::get(url), callbacks)
    }

    pub fn post(
        &self,
        reactor: &mut Reactor,
        url: Url,
        body: Vec<u8>,
        callbacks: RequestCallbacks,
    ) -> Result<RequestHandle> {
        self.submit(reactor, Request::post(url, body), callbacks)
    }

    /// Marks the transfer cancelled, tears down its reactor handles, and
    /// drops it immediately; `complete_cb` is never invoked.
    pub fn cancel(&self, reactor: &mut Reactor, handle: RequestHandle) -> bool {
        let entry = self.state.borrow_mut().entries.remove(&handle.0);
        match entry {
            Some(entry) => {
                if let Some(h) = entry.io_handle {
                    let _ = reactor.del(h);
                }
                if let Some(h) = entry.timer_handle {
                    let _ = reactor.del(h);
                }
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight transfer without invoking completion
    /// callbacks.
    pub fn cancel_all(&self, reactor: &mut Reactor) {
        let entries: Vec<Entry> = self.state.borrow_mut().entries.drain().map(|(_, v)| v).collect();
        for entry in entries {
            if let Some(h) = entry.io_handle {
                let _ = reactor.del(h);
            }
            if let Some(h) = entry.timer_handle {
                let _ = reactor.del(h);
            }
        }
    }

    fn submit(&self, reactor: &mut Reactor, request: Request, callbacks: RequestCallbacks) -> Result<RequestHandle> {
        if request.url.scheme() != "http" && request.url.scheme() != "https" {
            return Err(Error::invalid_arg(format!("unsupported scheme {:?}", request.url.scheme())));
        }
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            state.next_id
        };
        match self.start_attempt(reactor, id, request, callbacks, 0) {
            Ok(()) => Ok(RequestHandle(id)),
            Err((_transport, error, _callbacks)) => Err(error),
        }
    }

    /// Attempts to open and register a transfer for `request` under `id`.
    /// On failure, hands `callbacks` back to the caller instead of dropping
    /// it — a request already accepted (handed an id a caller is tracking,
    /// e.g. mid-redirect) must still receive exactly one `complete_cb`, and
    /// only the caller knows whether this is the first attempt (no handle
    /// promised yet, safe to drop) or a follow-up one (must be delivered).
    fn start_attempt(
        &self,
        reactor: &mut Reactor,
        id: u64,
        request: Request,
        callbacks: RequestCallbacks,
        redirects_followed: u32,
    ) -> std::result::Result<(), StartAttemptError> {
        let url = request.url.clone();
        let Some(host) = url.host_str().map(str::to_string) else {
            return Err((TransportCode::CONNECT, Error::invalid_arg("URL has no host"), callbacks));
        };
        let is_https = url.scheme() == "https";
        let port = url.port_or_known_default().unwrap_or(if is_https { 443 } else { 80 });

        let addr = match (host.as_str(), port).to_socket_addrs() {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr,
                None => {
                    let e = Error::resource(format!("dns resolution returned no address for {host}"));
                    return Err((TransportCode::DNS, e, callbacks));
                }
            },
            Err(e) => {
                let e = Error::resource(format!("dns resolution failed for {host}: {e}"));
                return Err((TransportCode::DNS, e, callbacks));
            }
        };

        let path = url.path().to_string();
        let cookie_header = { self.state.borrow_mut().cookie_jar.emit(&host, &path, is_https) };

        let mut transfer = match Transfer::connect(addr, &host, is_https, request, cookie_header.as_deref()) {
            Ok(transfer) => transfer,
            Err(e) => {
                let e = Error::resource(format!("connect to {host}:{port} failed: {e}"));
                return Err((TransportCode::CONNECT, e, callbacks));
            }
        };
        transfer.redirects_followed = redirects_followed;
        transfer.header_cb = callbacks.header_cb.clone();
        transfer.data_cb = callbacks.data_cb.clone();

        let deadline = transfer.deadline();
        let fd = transfer.raw_fd();

        {
            let mut state = self.state.borrow_mut();
            state.entries.insert(
                id,
                Entry {
                    transfer,
                    url,
                    callbacks,
                    io_handle: None,
                    io_flags: IoFlags::WRITE,
                    timer_handle: None,
                },
            );
        }

        let state_for_io = self.state.clone();
        let io_handle = match reactor.add_io(fd, IoFlags::WRITE | IoFlags::PERSIST, move |reactor, _flags| {
            Self::on_socket_event(reactor, &state_for_io, id);
        }) {
            Ok(handle) => handle,
            Err(e) => {
                let callbacks = self.state.borrow_mut().entries.remove(&id).map(|e| e.callbacks);
                return Err((TransportCode::IO, e, callbacks.expect("entry was just inserted above")));
            }
        };

        let timer_handle = if let Some(deadline) = deadline {
            let millis = deadline.saturating_duration_since(Instant::now()).as_millis() as i64;
            let state_for_timer = self.state.clone();
            match reactor.add_timer(millis, false, move |reactor| {
                Self::on_timeout(reactor, &state_for_timer, id);
            }) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    let _ = reactor.del(io_handle);
                    let callbacks = self.state.borrow_mut().entries.remove(&id).map(|e| e.callbacks);
                    return Err((TransportCode::IO, e, callbacks.expect("entry was just inserted above")));
                }
            }
        } else {
            None
        };

        if let Some(entry) = self.state.borrow_mut().entries.get_mut(&id) {
            entry.io_handle = Some(io_handle);
            entry.timer_handle = timer_handle;
        }
        Ok(())
    }

    fn on_socket_event(reactor: &mut Reactor, state: &Rc<RefCell<ClientState>>, id: u64) {
        let outcome = {
            let mut st = state.borrow_mut();
            let Some(entry) = st.entries.get_mut(&id) else { return };
            entry.transfer.on_ready()
        };

        match outcome {
            None => Self::retarget_io(reactor, state, id),
            Some(outcome) => Self::deliver(reactor, state, id, outcome),
        }
    }

    fn on_timeout(reactor: &mut Reactor, state: &Rc<RefCell<ClientState>>, id: u64) {
        let outcome = {
            let mut st = state.borrow_mut();
            let Some(entry) = st.entries.get_mut(&id) else { return };
            entry.timer_handle = None;
            entry.transfer.on_timeout()
        };
        Self::deliver(reactor, state, id, outcome);
    }

    fn retarget_io(reactor: &mut Reactor, state: &Rc<RefCell<ClientState>>, id: u64) {
        let desired = {
            let st = state.borrow();
            let Some(entry) = st.entries.get(&id) else { return };
            entry.transfer.desired_io_flags()
        };

        let needs_retarget = {
            let st = state.borrow();
            st.entries.get(&id).map(|e| e.io_flags != desired).unwrap_or(false)
        };
        if !needs_retarget {
            return;
        }

        let (old_handle, fd) = {
            let st = state.borrow();
            let Some(entry) = st.entries.get(&id) else { return };
            (entry.io_handle, entry.transfer.raw_fd())
        };
        if let Some(h) = old_handle {
            let _ = reactor.del(h);
        }

        let state_for_io = state.clone();
        let new_handle = reactor.add_io(fd, desired | IoFlags::PERSIST, move |reactor, _flags| {
            Self::on_socket_event(reactor, &state_for_io, id);
        });

        if let Ok(handle) = new_handle {
            if let Some(entry) = state.borrow_mut().entries.get_mut(&id) {
                entry.io_handle = Some(handle);
                entry.io_flags = desired;
            }
        }
    }

    fn deliver(reactor: &mut Reactor, state: &Rc<RefCell<ClientState>>, id: u64, outcome: Outcome) {
        let redirect_target = redirect_location(&outcome).and_then(|location| {
            let st = state.borrow();
            let entry = st.entries.get(&id)?;
            crate::url_util::resolve(&entry.url, &location)
        });

        let mut outcome = outcome;
        if let Some(target) = redirect_target {
            let (redirects_followed, max_redirects) = {
                let st = state.borrow();
                (st.entries.get(&id).map(|e| e.transfer.redirects_followed).unwrap_or(0), st.max_redirects)
            };
            if redirects_followed < max_redirects {
                Self::follow_redirect(reactor, state, id, target, redirects_followed + 1);
                return;
            }
            outcome.transport = TransportCode::TOO_MANY_REDIRECTS;
            outcome.error = Some(format!("exceeded redirect limit of {max_redirects}"));
        }

        let mut entry = {
            let mut st = state.borrow_mut();
            let Some(entry) = st.entries.remove(&id) else { return };
            entry
        };
        if let Some(h) = entry.io_handle.take() {
            let _ = reactor.del(h);
        }
        if let Some(h) = entry.timer_handle.take() {
            let _ = reactor.del(h);
        }

        if outcome.error.is_none() {
            let host = entry.url.host_str().unwrap_or("").to_string();
            let path = entry.url.path().to_string();
            let is_https = entry.url.scheme() == "https";
            let mut jar = state.borrow_mut();
            for (name, value) in &outcome.headers {
                if name.eq_ignore_ascii_case("set-cookie") {
                    jar.cookie_jar.store(value, &host, &path, is_https);
                }
            }
        }

        let response = Response {
            effective_url: entry.url.clone(),
            status: outcome.status,
            headers: outcome.headers,
            body: outcome.body,
            transport: outcome.transport,
            error: outcome.error,
        };
        (entry.callbacks.complete_cb)(reactor, RequestHandle(id), response);
    }

    /// Re-submits the redirected request under the same `id`. If opening the
    /// new attempt fails outright (DNS, connect, ...), the redirect itself
    /// still counts as the request's one completion event: synthesize a
    /// failed [`Response`] and invoke `complete_cb` rather than dropping it
    /// the way a plain `start_attempt` error would be dropped by `submit`.
    fn follow_redirect(reactor: &mut Reactor, state: &Rc<RefCell<ClientState>>, id: u64, target: Url, redirects: u32) {
        let entry = { state.borrow_mut().entries.remove(&id) };
        let Some(mut entry) = entry else { return };
        if let Some(h) = entry.io_handle.take() {
            let _ = reactor.del(h);
        }
        if let Some(h) = entry.timer_handle.take() {
            let _ = reactor.del(h);
        }

        let mut request = entry.transfer.request.clone();
        request.url = target.clone();
        let client = HttpClient { state: state.clone() };
        if let Err((transport, error, mut callbacks)) =
            client.start_attempt(reactor, id, request, entry.callbacks, redirects)
        {
            log::warn!("redirect follow-up to {target} failed: {error}");
            let response = Response {
                effective_url: target,
                status: 0,
                headers: Vec::new(),
                body: Vec::new(),
                transport,
                error: Some(error.to_string()),
            };
            (callbacks.complete_cb)(reactor, RequestHandle(id), response);
        }
    }
}

fn redirect_location(outcome: &Outcome) -> Option<String> {
    if !(300..400).contains(&outcome.status) {
        return None;
    }
    outcome
        .headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("location"))
        .map(|(_, v)| v.trim().to_string())
}
