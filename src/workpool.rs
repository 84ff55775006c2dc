//! Fixed-size set of threads draining a FIFO task queue (spec.md §4.3,
//! component C3). Grounded on the `Mutex<Vec<_>> + Condvar` shape of the
//! scratch `Executor` in the teacher's old `src/main.rs`: wait on the
//! condvar until work or stop, pop under lock, release, run.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use proxy_log::error;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    stop: Mutex<bool>,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop: Mutex::new(false),
        });

        let workers = (0..size)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("worker-{id}"))
                    .spawn(move || Self::run(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        WorkerPool { shared, workers }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let task = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if let Some(task) = queue.pop_front() {
                        break Some(task);
                    }
                    if *shared.stop.lock().unwrap() {
                        break None;
                    }
                    queue = shared.condvar.wait(queue).unwrap();
                }
            };

            let Some(task) = task else { break };

            // A task panicking must not take the worker down with it —
            // spec.md §7: "Worker task exception -> Log and continue;
            // worker stays alive."
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!("worker task panicked: {msg}");
            }
        }
    }

    /// Enqueues a task and wakes one waiting worker. FIFO among submissions;
    /// no per-connection ordering is guaranteed here (see
    /// `http::Connection`'s one-shot re-arm discipline for that).
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.lock().unwrap().push_back(Box::new(task));
        self.shared.condvar.notify_one();
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        *self.shared.stop.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
