//! Thin abstraction over the OS readiness mechanism (spec.md §4.2,
//! component C2). `mio` already is exactly this abstraction on this
//! platform, registering descriptors edge-triggered by construction; this
//! module just names the interest bits the core requires and wraps the
//! handful of calls sub-reactors and workers need, so the rest of the crate
//! never imports `mio` directly outside `selector.rs` and `reactor/`.

use std::io;
use std::time::Duration;

pub use mio::Token;
use mio::event::Source;
use mio::{Events, Interest, Poll, Registry};

/// The four interest bits spec.md §4.2 names. mio has no explicit
/// `ONE_SHOT`/`EDGE_TRIGGERED` flags — both are mio's only mode on epoll —
/// so those two constants exist purely as documentation: every registration
/// in this crate behaves as one-shot-until-reregistered, edge-triggered.
pub mod interest {
    use mio::Interest;

    pub const READ: Interest = Interest::READABLE;
    pub const WRITE: Interest = Interest::WRITABLE;

    pub fn read_write() -> Interest {
        Interest::READABLE.add(Interest::WRITABLE)
    }
}

pub struct Selector {
    poll: Poll,
    events: Events,
}

impl Selector {
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Selector {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity),
        })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// An owned, `Send` handle to this selector's registry, for re-arming a
    /// descriptor from a worker thread that does not own the `Selector`
    /// itself.
    pub fn try_clone_registry(&self) -> io::Result<Registry> {
        self.poll.registry().try_clone()
    }

    pub fn register<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn deregister<S: Source + ?Sized>(&self, source: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Blocks up to `timeout` for readiness, or forever if `None`. Returns
    /// the number of ready events, which can then be iterated with
    /// `events()`. Retries transparently on `EINTR` (spec.md §7: "Selector
    /// error with EINTR -> Retry; not an error").
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => return Ok(self.events.iter().count()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn events(&self) -> &Events {
        &self.events
    }
}

/// Re-arms a descriptor with a new interest set using an owned registry
/// handle (see `Selector::try_clone_registry`). This is the "re-arm" step
/// spec.md §4.8 requires to happen exactly once per completed I/O attempt.
pub fn rearm<S: Source + ?Sized>(
    registry: &Registry,
    source: &mut S,
    token: Token,
    interest: Interest,
) -> io::Result<()> {
    registry.reregister(source, token, interest)
}
