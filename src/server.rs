//! Top-level facade wiring config, DB pool, worker pool and the reactor
//! topology together (spec.md §4.10, component C10). Grounded on the
//! teacher's `src/bin/main.rs` wiring shape (`AppConfig::load` ->
//! `Server::new` -> `server.run()`).

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use proxy_log::info;

use crate::config::AppConfig;
use crate::dbpool::DbPool;
use crate::error::Result;
use crate::reactor::MasterReactor;
use crate::workpool::WorkerPool;

pub struct Server {
    config: AppConfig,
    reactor: MasterReactor,
    active_user_count: Arc<AtomicUsize>,
}

impl Server {
    pub fn new(config: AppConfig) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

        let pool = Arc::new(WorkerPool::new(config.pool.thread_pool_num));
        let db_pool = Arc::new(DbPool::new(&config.database, config.pool.sql_pool_num));
        let active_user_count = Arc::new(AtomicUsize::new(0));

        let reactor = MasterReactor::new(
            addr,
            config.server.sub_reactor_num,
            pool,
            db_pool,
            config.server.src_dir.clone().into(),
            Arc::clone(&active_user_count),
        )?;

        Ok(Server {
            config,
            reactor,
            active_user_count,
        })
    }

    pub fn active_user_count(&self) -> usize {
        self.active_user_count
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Blocks until `stop()` is called from another thread (e.g. a signal
    /// handler installed by the binary) or the process is killed.
    pub fn run(&mut self) {
        self.config.display();
        info!(
            "serving static files from {}",
            self.config.server.src_dir
        );
        self.reactor.run();
    }

    pub fn stop(&mut self) {
        info!("stopping server");
        self.reactor.stop();
    }
}
