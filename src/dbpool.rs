//! Fixed-size pool of reusable `mysql::Conn` handles with timed blocking
//! acquisition and scoped release (spec.md §4.4, component C4).
//!
//! `std-semaphore` (which the retrieval pack's `elbaro-zero-mysql` pulls in)
//! has no timed-acquire API, and spec.md's `Acquire(timeout_ms)` needs one,
//! so `Semaphore` below is hand-rolled on `Mutex<usize> + Condvar` — the
//! same primitive pairing the teacher's scratch executor and
//! `src/timeouts.rs` already lean on. See DESIGN.md Open Question 6.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use mysql::prelude::*;
use mysql::{Conn, Opts, OptsBuilder};
use proxy_log::{info, warn};

use crate::config::DatabaseConfig;

/// A counting semaphore with a timed acquire. `0` means fail immediately if
/// none free; `>0` is a bounded wait; callers that want to block forever
/// pass `None`.
struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    fn new(initial: usize) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    /// `None` blocks forever; `Some(Duration::ZERO)` fails immediately if
    /// none are free; `Some(d)` waits up to `d`.
    fn acquire(&self, timeout: Option<Duration>) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            return true;
        }
        match timeout {
            Some(d) if d.is_zero() => false,
            Some(d) => {
                let deadline = Instant::now() + d;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    let (guard, result) = self.condvar.wait_timeout(count, remaining).unwrap();
                    count = guard;
                    if *count > 0 {
                        *count -= 1;
                        return true;
                    }
                    if result.timed_out() {
                        return false;
                    }
                }
            }
            None => {
                while *count == 0 {
                    count = self.condvar.wait(count).unwrap();
                }
                *count -= 1;
                true
            }
        }
    }

    /// Posts the semaphore once. Must be called exactly once per prior
    /// successful `acquire` (spec.md §4.4: "the semaphore token logically
    /// accompanies ownership of the handle").
    fn release(&self) {
        *self.count.lock().unwrap() += 1;
        self.condvar.notify_one();
    }
}

struct PoolState {
    free: Mutex<VecDeque<Conn>>,
    free_count: Mutex<usize>,
    used_count: Mutex<usize>,
    semaphore: Semaphore,
}

pub struct DbPool {
    state: Arc<PoolState>,
    max: usize,
}

impl DbPool {
    /// Creates up to `cfg.pool_size` handles. Partial failure is tolerated:
    /// the semaphore is seeded with the count of handles that actually
    /// connected (spec.md §4.4).
    pub fn new(cfg: &DatabaseConfig, pool_size: usize) -> Self {
        let opts: Opts = OptsBuilder::new()
            .ip_or_hostname(Some(cfg.host.clone()))
            .tcp_port(cfg.port)
            .user(Some(cfg.user.clone()))
            .pass(Some(cfg.password.clone()))
            .db_name(Some(cfg.dbname.clone()))
            .into();

        let mut free = VecDeque::with_capacity(pool_size);
        for _ in 0..pool_size {
            match Conn::new(opts.clone()) {
                Ok(conn) => free.push_back(conn),
                Err(e) => warn!("db pool: failed to establish one connection: {e}"),
            }
        }

        let established = free.len();
        if established < pool_size {
            warn!(
                "db pool: only {established}/{pool_size} connections established at startup"
            );
        } else {
            info!("db pool: {established} connections established");
        }

        DbPool {
            state: Arc::new(PoolState {
                free: Mutex::new(free),
                free_count: Mutex::new(established),
                used_count: Mutex::new(0),
                semaphore: Semaphore::new(established),
            }),
            max: pool_size,
        }
    }

    /// `timeout_ms == 0` means fail immediately if none free (mapped to
    /// `Some(Duration::ZERO)`); spec.md overloads 0 to mean "block forever"
    /// at the `Acquire` level, but that reading only makes sense for a
    /// caller explicit about wanting no deadline — the HTTP handlers here
    /// always want a bounded wait, so `acquire` below takes an explicit
    /// `Option<Duration>` and `acquire_ms` is the spec-shaped convenience
    /// that maps `0 -> block forever`, `>0 -> bounded`, matching spec.md
    /// §4.4's `Acquire(timeout_ms)` literally.
    pub fn acquire_ms(&self, timeout_ms: i64) -> Option<PooledConn> {
        let timeout = match timeout_ms {
            0 => None,
            ms if ms > 0 => Some(Duration::from_millis(ms as u64)),
            _ => Some(Duration::ZERO),
        };
        self.acquire(timeout)
    }

    pub fn acquire(&self, timeout: Option<Duration>) -> Option<PooledConn> {
        if !self.state.semaphore.acquire(timeout) {
            return None;
        }
        let conn = {
            let mut free = self.state.free.lock().unwrap();
            let conn = free
                .pop_front()
                .expect("semaphore token implies a free handle");
            *self.state.free_count.lock().unwrap() -= 1;
            *self.state.used_count.lock().unwrap() += 1;
            conn
        };
        Some(PooledConn {
            conn: Some(conn),
            state: Arc::clone(&self.state),
        })
    }

    pub fn max_size(&self) -> usize {
        self.max
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        *self.state.free_count.lock().unwrap()
    }

    #[cfg(test)]
    fn used_count(&self) -> usize {
        *self.state.used_count.lock().unwrap()
    }
}

/// Scoped acquisition (spec.md §4.4): guarantees `release` runs on every
/// exit path, normal or `?`-propagated, via `Drop`.
pub struct PooledConn {
    conn: Option<Conn>,
    state: Arc<PoolState>,
}

impl std::ops::Deref for PooledConn {
    type Target = Conn;
    fn deref(&self) -> &Conn {
        self.conn.as_ref().expect("conn taken before drop")
    }
}

impl std::ops::DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("conn taken before drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.state.free.lock().unwrap().push_back(conn);
            *self.state.free_count.lock().unwrap() += 1;
            *self.state.used_count.lock().unwrap() -= 1;
            // Post outside the critical section: the lock above is already
            // released by the time this runs.
            self.state.semaphore.release();
        }
    }
}

/// `SELECT password FROM user WHERE username=? LIMIT 1`, parameterized
/// (spec.md §6, §9: resolve the SQL-injection open question in favor of
/// binding). Returns `true` iff a row exists with a matching password.
pub fn verify_login(conn: &mut Conn, username: &str, password: &str) -> mysql::Result<bool> {
    let stored: Option<String> =
        conn.exec_first("SELECT password FROM user WHERE username=? LIMIT 1", (username,))?;
    Ok(stored.as_deref() == Some(password))
}

/// `SELECT username ... ; INSERT INTO user(username,password) VALUES(?,?)`,
/// parameterized. Returns `true` iff the username was free and the insert
/// succeeded.
pub fn register_user(conn: &mut Conn, username: &str, password: &str) -> mysql::Result<bool> {
    let existing: Option<String> =
        conn.exec_first("SELECT username FROM user WHERE username=? LIMIT 1", (username,))?;
    if existing.is_some() {
        return Ok(false);
    }
    conn.exec_drop(
        "INSERT INTO user(username,password) VALUES(?,?)",
        (username, password),
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_acquire_zero_fails_fast_when_empty() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert!(!sem.acquire(Some(Duration::ZERO)));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn semaphore_acquire_release_round_trips() {
        let sem = Semaphore::new(1);
        assert!(sem.acquire(Some(Duration::from_millis(10))));
        assert!(!sem.acquire(Some(Duration::ZERO)));
        sem.release();
        assert!(sem.acquire(Some(Duration::from_millis(10))));
    }

    #[test]
    fn semaphore_acquire_times_out_when_never_released() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert!(!sem.acquire(Some(Duration::from_millis(50))));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
