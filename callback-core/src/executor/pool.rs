//! Fixed-size worker pool.
//!
//! Workers pull from a bounded queue. Submissions beyond the queue's
//! capacity, or after shutdown has begun, are refused with an
//! [`ExecutorError`] so the dispatching callback fails fast instead of
//! piling up unbounded work. Dropping the pool drains whatever is already
//! queued, then joins every worker.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Executor, ExecutorError, Task};
use crate::callback::Failure;

/// Configuration for a [`ThreadPool`].
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use callback_core::executor::PoolConfig;
///
/// let config = PoolConfig::from_json(r#"{ "workers": 4 }"#).unwrap();
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.queue_capacity, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Maximum number of queued (not yet running) tasks.
    pub queue_capacity: usize,

    /// Prefix for worker thread names; workers are named `<prefix>-<n>`.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(4, |n| n.get()),
            queue_capacity: 1024,
            thread_name: "callback-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.workers == 0 {
            return Err(ExecutorError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ExecutorError::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

struct Queue {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    capacity: usize,
}

/// A fixed pool of named worker threads.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Start a pool.
    pub fn new(config: PoolConfig) -> Result<Self, ExecutorError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::with_capacity(config.queue_capacity),
                shutdown: false,
            }),
            available: Condvar::new(),
            capacity: config.queue_capacity,
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(config.workers),
        };

        for n in 0..config.workers {
            let shared = Arc::clone(&pool.shared);
            // On error `pool` drops here, stopping the workers already started.
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, n))
                .spawn(move || work(&shared))?;
            pool.workers.push(handle);
        }

        debug!(workers = config.workers, capacity = config.queue_capacity, "thread pool started");
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn shutdown(&self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.available.notify_all();
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return Err(ExecutorError::Shutdown);
            }
            if queue.tasks.len() >= self.shared.capacity {
                return Err(ExecutorError::Rejected {
                    capacity: self.shared.capacity,
                });
            }
            queue.tasks.push_back(task);
        }
        self.shared.available.notify_one();
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("thread pool worker exited with a panic");
            }
        }
    }
}

/// Worker loop: run tasks until shut down and drained.
fn work(shared: &Shared) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                if queue.shutdown {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };

        // Tasks from `resolve_on` already contain their own failures; this
        // only catches raw tasks submitted directly.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            let error = Failure::from_panic(payload);
            error!(%error, "task panicked on thread pool worker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Callback, CallbackState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn config(workers: usize, queue_capacity: usize) -> PoolConfig {
        PoolConfig {
            workers,
            queue_capacity,
            thread_name: "test-worker".to_string(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = PoolConfig::from_json(r#"{ "queue_capacity": 8, "thread_name": "rpc" }"#).unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.thread_name, "rpc");
        assert_eq!(config.workers, PoolConfig::default().workers);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = config(3, 16);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PoolConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            ThreadPool::new(config(0, 8)),
            Err(ExecutorError::InvalidConfig(_))
        ));
        assert!(matches!(
            ThreadPool::new(config(2, 0)),
            Err(ExecutorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pool_resolves_callbacks_on_named_workers() {
        let pool = ThreadPool::new(config(2, 64)).unwrap();
        assert_eq!(pool.workers(), 2);

        let callbacks: Vec<_> = (0..20)
            .map(|i| {
                Callback::spawn(&pool, move || {
                    let name = thread::current().name().map(str::to_string);
                    Ok((i, name))
                })
            })
            .collect();

        for (i, callback) in callbacks.iter().enumerate() {
            let (value, name) = callback.get().unwrap();
            assert_eq!(value, i);
            assert!(name.unwrap().starts_with("test-worker-"));
        }
    }

    #[test]
    fn full_queue_rejects_and_fails_callback() {
        let pool = ThreadPool::new(config(1, 1)).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        // Occupy the only worker.
        let blocker = Callback::spawn(&pool, move || {
            started_tx.send(()).ok();
            release_rx.recv().ok();
            Ok(())
        });
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Fill the queue.
        let queued = Callback::spawn(&pool, || Ok(()));
        assert_eq!(pool.queued(), 1);

        let rejected = Callback::spawn(&pool, || Ok(()));
        assert_eq!(rejected.state(), CallbackState::Failed);

        release_tx.send(()).unwrap();
        assert!(blocker.get().is_ok());
        assert!(queued.get().is_ok());
    }

    #[test]
    fn shutdown_rejects_new_work_but_drains_queue() {
        let ran = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(config(1, 128)).unwrap();

        for _ in 0..50 {
            let ran = ran.clone();
            pool.execute(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown();

        let late = Callback::spawn(&pool, || Ok(1));
        assert_eq!(late.state(), CallbackState::Failed);

        drop(pool);
        assert_eq!(ran.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        let pool = ThreadPool::new(config(1, 8)).unwrap();
        pool.execute(Box::new(|| panic!("raw task panic"))).unwrap();

        let after = Callback::spawn(&pool, || Ok("still alive"));
        assert_eq!(after.get().unwrap(), "still alive");
    }
}
