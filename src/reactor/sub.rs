//! Owns a selector and a set of connections; dispatches readiness into the
//! worker pool (spec.md §4.8, component C8). New relative to the teacher,
//! which runs exactly one reactor loop — generalized here to N independent
//! instances, each with its own thread, `Selector` and connection map, per
//! spec.md §2's one-acceptor/N-worker-reactor topology. The per-fd
//! mutual-exclusion discipline (one-shot readiness; at most one worker task
//! in flight per fd) and the re-arm step are exactly spec.md §4.8/§5.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::TcpStream;
use mio::Registry;
use proxy_log::info;

use crate::dbpool::DbPool;
use crate::http::Connection;
use crate::selector::{self, Selector, Token};
use crate::workpool::WorkerPool;

type Connections = Arc<Mutex<HashMap<Token, Connection>>>;

/// What the master reactor (or any other thread) needs in order to hand a
/// freshly-accepted socket to this sub-reactor, without touching its
/// `Selector` directly — registering through a cloned `Registry` lands on
/// the same underlying epoll instance the sub-reactor thread is blocked in
/// `wait()` on, so no hand-off channel is needed.
pub struct SubReactorHandle {
    registry: Registry,
    connections: Connections,
    next_token: Arc<AtomicUsize>,
    src_dir: PathBuf,
    active_user_count: Arc<AtomicUsize>,
}

impl SubReactorHandle {
    /// Registers a freshly-accepted, non-blocking socket with this
    /// sub-reactor and inserts its `Connection` into the shared map
    /// (spec.md §4.8 `AddConn`).
    pub fn add_conn(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> std::io::Result<()> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registry.register(
            &mut stream,
            token,
            selector::interest::READ,
        )?;
        let conn = Connection::init(
            stream,
            peer_addr,
            self.src_dir.clone(),
            Arc::clone(&self.active_user_count),
        );
        self.connections.lock().unwrap().insert(token, conn);
        Ok(())
    }
}

pub struct SubReactor {
    selector: Selector,
    connections: Connections,
    registry: Registry,
    next_token: Arc<AtomicUsize>,
    pool: Arc<WorkerPool>,
    db_pool: Arc<DbPool>,
    src_dir: PathBuf,
    active_user_count: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl SubReactor {
    pub fn new(
        pool: Arc<WorkerPool>,
        db_pool: Arc<DbPool>,
        src_dir: PathBuf,
        active_user_count: Arc<AtomicUsize>,
    ) -> std::io::Result<Self> {
        let selector = Selector::new(1024)?;
        let registry = selector.try_clone_registry()?;
        Ok(SubReactor {
            selector,
            connections: Arc::new(Mutex::new(HashMap::new())),
            registry,
            next_token: Arc::new(AtomicUsize::new(0)),
            pool,
            db_pool,
            src_dir,
            active_user_count,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn handle(&self) -> SubReactorHandle {
        SubReactorHandle {
            registry: self.registry.try_clone().expect("registry clone"),
            connections: Arc::clone(&self.connections),
            next_token: Arc::clone(&self.next_token),
            src_dir: self.src_dir.clone(),
            active_user_count: Arc::clone(&self.active_user_count),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// The sub-reactor's thread body: `selector.wait(1000ms)` then dispatch
    /// each ready event into the worker pool (spec.md §4.8 "Run loop").
    pub fn run(mut self) {
        while self.running.load(Ordering::Relaxed) {
            let n = match self.selector.wait(Some(Duration::from_millis(1000))) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    proxy_log::error!("selector wait failed: {e}");
                    continue;
                }
            };
            if n == 0 {
                continue;
            }

            let events: Vec<(Token, bool, bool)> = self
                .selector
                .events()
                .iter()
                .map(|e| (e.token(), e.is_readable(), e.is_writable()))
                .collect();

            for (token, readable, writable) in events {
                if !self.connections.lock().unwrap().contains_key(&token) {
                    continue;
                }

                if !readable && !writable {
                    // Any event that is neither READ nor WRITE (hangup,
                    // error) triggers an immediate close on the dispatching
                    // thread (spec.md §4.8).
                    self.close_conn(token);
                    continue;
                }

                let connections = Arc::clone(&self.connections);
                let registry = self.registry.try_clone().expect("registry clone");
                let db_pool = Arc::clone(&self.db_pool);

                self.pool.submit(move || {
                    // DESIGN.md Open Question 5: hold the map lock only
                    // long enough to take ownership of the connection, not
                    // across the I/O itself.
                    let conn = connections.lock().unwrap().remove(&token);
                    let Some(mut conn) = conn else { return };

                    if readable {
                        handle_read(&mut conn, &registry, token, &db_pool);
                    } else {
                        handle_write(&mut conn, &registry, token, &db_pool);
                    }

                    if conn.is_closed() {
                        let _ = registry.deregister(&mut conn.stream);
                        let _ = conn.stream.shutdown(std::net::Shutdown::Both);
                    } else {
                        connections.lock().unwrap().insert(token, conn);
                    }
                });
            }
        }
    }

    fn close_conn(&self, token: Token) {
        if let Some(mut conn) = self.connections.lock().unwrap().remove(&token) {
            let _ = self.registry.deregister(&mut conn.stream);
            conn.close();
            info!("closing connection {:?}: {}", token, conn.peer_addr);
        }
    }
}

/// spec.md §4.8 `handle_read`, with the §9 known-defect fix applied
/// (DESIGN.md Open Question 4): a peer-closed or errored read returns
/// without calling `process`.
fn handle_read(conn: &mut Connection, registry: &Registry, token: Token, db_pool: &DbPool) {
    let (n, err) = conn.read();
    let peer_closed = n == 0 && err.is_none();
    if peer_closed || matches!(&err, Some(e) if e.kind() != ErrorKind::WouldBlock) {
        conn.close();
        return;
    }

    if conn.process(db_pool) {
        conn.set_writing(true);
        let _ = selector::rearm(registry, &mut conn.stream, token, selector::interest::WRITE);
    } else {
        let _ = selector::rearm(registry, &mut conn.stream, token, selector::interest::READ);
    }
}

/// spec.md §4.8 `handle_write`.
fn handle_write(conn: &mut Connection, registry: &Registry, token: Token, db_pool: &DbPool) {
    let err = conn.write();

    if conn.to_write_bytes() == 0 {
        conn.set_writing(false);
        if conn.keep_alive() {
            let rearmed = selector::rearm(registry, &mut conn.stream, token, selector::interest::READ);
            if rearmed.is_ok() && conn.has_buffered_request_bytes() {
                // Pipelined bytes are already sitting in the read buffer;
                // serve them immediately rather than waiting for another
                // readiness notification (spec.md §4.7/§4.8 — keep-alive
                // pipelining of already-buffered bytes, not a wire feature).
                if conn.process(db_pool) {
                    conn.set_writing(true);
                    let _ = selector::rearm(registry, &mut conn.stream, token, selector::interest::WRITE);
                }
            }
        } else {
            conn.close();
        }
    } else if matches!(&err, Some(e) if e.kind() == ErrorKind::WouldBlock) || err.is_none() {
        let _ = selector::rearm(registry, &mut conn.stream, token, selector::interest::WRITE);
    } else {
        conn.close();
    }
}
