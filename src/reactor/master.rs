//! Owns the listening socket and round-robins accepted connections across
//! the sub-reactors (spec.md §4.9, component C9). New relative to the
//! teacher, which has no separate acceptor thread at all — built from the
//! same `mio::net::TcpListener` primitives the teacher's (unwired) `server.rs`
//! names, generalized into the accept-then-dispatch loop spec.md §2
//! describes.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::net::TcpListener;
use mio::Token;
use proxy_log::{error, info};

use crate::dbpool::DbPool;
use crate::reactor::sub::{SubReactor, SubReactorHandle};
use crate::selector::{self, Selector};
use crate::workpool::WorkerPool;

const LISTENER_TOKEN: Token = Token(usize::MAX);
const LISTEN_BACKLOG: i32 = 1024;

/// Binds with `SO_REUSEADDR` and a 1024-entry backlog (spec.md §4.9), which
/// `mio::net::TcpListener::bind` does not expose directly. Grounded on the
/// retrieval pack's `socket2`-based listener setup (`create_listener_with_reuseport`
/// in the pelikan-io cache crate), minus `SO_REUSEPORT` — this server has a
/// single acceptor, not one listener per core.
fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => socket2::Domain::IPV4,
        SocketAddr::V6(_) => socket2::Domain::IPV6,
    };
    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}

pub struct MasterReactor {
    listener: TcpListener,
    selector: Selector,
    sub_handles: Vec<SubReactorHandle>,
    sub_threads: Vec<JoinHandle<()>>,
    sub_running_flags: Vec<Arc<AtomicBool>>,
    next_sub: usize,
    running: Arc<AtomicBool>,
}

impl MasterReactor {
    /// Binds the listening socket and spawns `sub_reactor_num` sub-reactor
    /// threads, each with its own selector, connection map and worker-task
    /// dispatch (spec.md §4.9 / §2's one-acceptor/N-sub-reactor topology).
    pub fn new(
        addr: SocketAddr,
        sub_reactor_num: usize,
        pool: Arc<WorkerPool>,
        db_pool: Arc<DbPool>,
        src_dir: std::path::PathBuf,
        active_user_count: Arc<AtomicUsize>,
    ) -> std::io::Result<Self> {
        let mut listener = bind_listener(addr)?;
        let selector = Selector::new(128)?;
        selector.register(&mut listener, LISTENER_TOKEN, selector::interest::READ)?;

        let mut sub_handles = Vec::with_capacity(sub_reactor_num);
        let mut sub_threads = Vec::with_capacity(sub_reactor_num);
        let mut sub_running_flags = Vec::with_capacity(sub_reactor_num);

        for id in 0..sub_reactor_num.max(1) {
            let sub = SubReactor::new(
                Arc::clone(&pool),
                Arc::clone(&db_pool),
                src_dir.clone(),
                Arc::clone(&active_user_count),
            )?;
            sub_handles.push(sub.handle());
            sub_running_flags.push(sub.running_flag());
            sub_threads.push(
                thread::Builder::new()
                    .name(format!("sub-reactor-{id}"))
                    .spawn(move || sub.run())
                    .expect("failed to spawn sub-reactor thread"),
            );
        }

        Ok(MasterReactor {
            listener,
            selector,
            sub_handles,
            sub_threads,
            sub_running_flags,
            next_sub: 0,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Accepts connections in a drain loop on each listener readiness and
    /// round-robin dispatches them to sub-reactors (spec.md §4.9 "accept in
    /// a loop until EAGAIN"). Runs until `stop()` flips the running flag
    /// from another thread. The listener's own wait uses a zero timeout
    /// (spec.md §4.9: "a non-blocking wait, timeout 0" — matching the
    /// original's `epoller_->Wait(0)`), unlike the sub-reactors' 1000ms
    /// blocking wait; this is a tight poll loop by design, not an oversight.
    pub fn run(&mut self) {
        info!("master reactor listening on {:?}", self.listener.local_addr());
        while self.running.load(Ordering::Relaxed) {
            let n = match self.selector.wait(Some(std::time::Duration::ZERO)) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("master selector wait failed: {e}");
                    continue;
                }
            };
            if n == 0 {
                continue;
            }

            loop {
                match self.listener.accept() {
                    Ok((stream, peer_addr)) => self.dispatch(stream, peer_addr),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("accept failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, stream: mio::net::TcpStream, peer_addr: SocketAddr) {
        let handle = &self.sub_handles[self.next_sub];
        self.next_sub = (self.next_sub + 1) % self.sub_handles.len();
        if let Err(e) = handle.add_conn(stream, peer_addr) {
            error!("failed to register accepted connection {peer_addr}: {e}");
        }
    }

    /// Signals every sub-reactor and this reactor's own loop to exit after
    /// their current `wait()` timeout, then joins the sub-reactor threads
    /// (spec.md §9: "stop and drain", not a true graceful in-flight drain).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for flag in &self.sub_running_flags {
            flag.store(false, Ordering::Relaxed);
        }
        for handle in self.sub_threads.drain(..) {
            let _ = handle.join();
        }
    }
}
