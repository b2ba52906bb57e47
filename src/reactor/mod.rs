//! Single-threaded cooperative reactor over OS readiness notifications and a
//! monotonic timer wheel. Never spawns a thread; every callback runs on
//! whichever thread calls [`Reactor::dispatch`].

mod timer;

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::{Error, Result};
use timer::TimerTable;

bitflags::bitflags! {
    /// Readiness a caller wants notifications for. At least one of `READ`
    /// or `WRITE` must be set; `PERSIST` keeps the registration alive across
    /// firings instead of auto-removing it after one.
    pub struct IoFlags: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const PERSIST = 0b100;
    }
}

/// Opaque identifier for a registered I/O or timer event. Ids are
/// monotonically increasing so a stale handle can never alias a freshly
/// issued one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

/// Why [`Reactor::dispatch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No registered events remained.
    Completed,
    /// [`Reactor::stop`] (or a [`StopHandle`]) was invoked.
    Stopped,
}

/// A `Send + Sync` handle that can request reactor shutdown from another
/// thread or a signal handler, without touching any of the reactor's
/// single-threaded internal state beyond an atomic flag and a wakeup.
#[derive(Clone)]
pub struct StopHandle {
    waker: Arc<Waker>,
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

struct IoMeta {
    fd: RawFd,
    flags: IoFlags,
}

const STOP_TOKEN: Token = Token(usize::MAX);

pub struct Reactor {
    poll: Poll,
    events: Events,
    io: HashMap<u64, IoMeta>,
    io_callbacks: HashMap<u64, Box<dyn FnMut(&mut Reactor, IoFlags)>>,
    timers: TimerTable,
    timer_callbacks: HashMap<u64, Box<dyn FnMut(&mut Reactor)>>,
    next_id: u64,
    waker: Arc<Waker>,
    stop_requested: Arc<AtomicBool>,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(|e| Error::resource(format!("create poll: {e}")))?;
        let waker = Arc::new(
            Waker::new(poll.registry(), STOP_TOKEN)
                .map_err(|e| Error::resource(format!("create waker: {e}")))?,
        );
        Ok(Reactor {
            poll,
            events: Events::with_capacity(1024),
            io: HashMap::new(),
            io_callbacks: HashMap::new(),
            timers: TimerTable::new(),
            timer_callbacks: HashMap::new(),
            next_id: 0,
            waker,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// A cloneable, thread-safe handle that can call [`StopHandle::stop`]
    /// from outside the dispatching thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            waker: self.waker.clone(),
            flag: self.stop_requested.clone(),
        }
    }

    /// Thread-safe wakeup that causes a currently blocked [`Reactor::dispatch`]
    /// to return promptly. Safe to call from the dispatching thread too.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }

    fn interest_for(flags: IoFlags) -> Interest {
        match (flags.contains(IoFlags::READ), flags.contains(IoFlags::WRITE)) {
            (true, true) => Interest::READABLE.add(Interest::WRITABLE),
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => unreachable!("checked by caller"),
        }
    }

    /// Registers `fd` for the requested readiness. Fails with
    /// [`Error::InvalidArg`] if neither `READ` nor `WRITE` is set.
    pub fn add_io<F>(&mut self, fd: RawFd, flags: IoFlags, callback: F) -> Result<Handle>
    where
        F: FnMut(&mut Reactor, IoFlags) + 'static,
    {
        if !flags.intersects(IoFlags::READ | IoFlags::WRITE) {
            return Err(Error::invalid_arg("add_io requires READ and/or WRITE"));
        }
        let id = self.next_id();
        let interest = Self::interest_for(flags);
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(id as usize), interest)
            .map_err(|e| Error::resource(format!("register fd {fd}: {e}")))?;
        self.io.insert(id, IoMeta { fd, flags });
        self.io_callbacks.insert(id, Box::new(callback));
        Ok(Handle(id))
    }

    /// Arms a timer that fires after `millis` milliseconds. Fails with
    /// [`Error::InvalidArg`] if `millis` is negative.
    pub fn add_timer<F>(&mut self, millis: i64, persistent: bool, callback: F) -> Result<Handle>
    where
        F: FnMut(&mut Reactor) + 'static,
    {
        if millis < 0 {
            return Err(Error::invalid_arg("negative timer delay"));
        }
        let id = self.next_id();
        self.timers.insert(id, Duration::from_millis(millis as u64), persistent);
        self.timer_callbacks.insert(id, Box::new(callback));
        Ok(Handle(id))
    }

    /// Detaches `handle` from its OS source (if any), guaranteeing that no
    /// further callback for it fires after this call returns.
    pub fn del(&mut self, handle: Handle) -> Result<()> {
        let id = handle.0;
        if let Some(meta) = self.io.remove(&id) {
            self.io_callbacks.remove(&id);
            let mut fd = meta.fd;
            let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
            return Ok(());
        }
        if self.timers.remove(id) {
            self.timer_callbacks.remove(&id);
            return Ok(());
        }
        Err(Error::invalid_arg("unknown reactor handle"))
    }

    fn fire_timer(&mut self, id: u64) {
        let Some(mut cb) = self.timer_callbacks.remove(&id) else {
            return;
        };
        cb(self);
        if self.timers.contains(id) {
            self.timer_callbacks.insert(id, cb);
        }
    }

    fn fire_io(&mut self, id: u64, flags: IoFlags) {
        let persist = match self.io.get(&id) {
            Some(meta) => meta.flags.contains(IoFlags::PERSIST),
            None => return, // deleted between readiness collection and now
        };
        if !persist {
            if let Some(meta) = self.io.remove(&id) {
                let mut fd = meta.fd;
                let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
            }
        }
        let Some(mut cb) = self.io_callbacks.remove(&id) else {
            return;
        };
        cb(self, flags);
        if self.io.contains_key(&id) {
            self.io_callbacks.insert(id, cb);
        }
    }

    /// Runs until no registered events remain or [`Reactor::stop`] is called.
    pub fn dispatch(&mut self) -> Result<DispatchOutcome> {
        self.stop_requested.store(false, Ordering::SeqCst);
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return Ok(DispatchOutcome::Stopped);
            }
            if self.io.is_empty() && self.timers.is_empty() {
                return Ok(DispatchOutcome::Completed);
            }

            let timeout = self.timers.next_timeout();
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::resource(format!("poll: {e}"))),
            }

            for id in self.timers.take_due() {
                self.fire_timer(id);
                if self.stop_requested.load(Ordering::SeqCst) {
                    return Ok(DispatchOutcome::Stopped);
                }
            }

            let ready: Vec<(u64, IoFlags)> = self
                .events
                .iter()
                .filter(|ev| ev.token() != STOP_TOKEN)
                .map(|ev| {
                    let mut flags = IoFlags::empty();
                    if ev.is_readable() {
                        flags |= IoFlags::READ;
                    }
                    if ev.is_writable() {
                        flags |= IoFlags::WRITE;
                    }
                    (ev.token().0 as u64, flags)
                })
                .collect();

            for (id, flags) in ready {
                self.fire_io(id, flags);
                if self.stop_requested.load(Ordering::SeqCst) {
                    return Ok(DispatchOutcome::Stopped);
                }
            }
        }
    }
}
