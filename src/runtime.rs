//! Worker primitives shared by every driver
//!
//! Each periodic loop (refresh, speed, keep-alive, LCD, listener) and each
//! RGB animation runs on its own named thread holding a one-shot
//! [`CancelToken`]. Sleeping between ticks goes through
//! [`CancelToken::wait`], so cancellation wakes a worker immediately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// One-shot cancellation signal.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Later calls are no-ops.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock();
        if !*cancelled {
            *cancelled = true;
            cvar.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep up to `timeout`; returns `true` if the token fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = lock.lock();
        while !*cancelled {
            if cvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// A named thread paired with its cancellation token.
pub struct Worker {
    name: String,
    token: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new thread. The body receives the token and
    /// must return once it fires.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let name = name.into();
        let token = CancelToken::new();
        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(worker_token));
        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("failed to spawn worker {name}: {e}");
                None
            }
        };
        Self {
            name,
            token,
            handle,
        }
    }

    /// Spawn a loop that calls `tick` every `interval` until cancelled.
    ///
    /// The first tick runs immediately.
    pub fn periodic<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(name, move |token| loop {
            if token.is_cancelled() {
                break;
            }
            tick();
            if token.wait(interval) {
                break;
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel and join. Joining is skipped when called from the worker
    /// itself.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("worker {} panicked", self.name);
            }
            debug!("worker {} stopped", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// All periodic workers of one driver, shut down exactly once.
#[derive(Default)]
pub struct TaskGroup {
    workers: Mutex<Vec<Worker>>,
    shut_down: AtomicBool,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a worker. Workers added after shutdown are stopped at once.
    pub fn add(&self, mut worker: Worker) {
        if self.is_shut_down() {
            worker.stop();
            return;
        }
        self.workers.lock().push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop every worker. Returns `false` when already shut down.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for w in &workers {
            w.token().cancel();
        }
        for mut w in workers {
            w.stop();
        }
        true
    }

    /// Names of workers still running.
    pub fn live(&self) -> Vec<String> {
        self.workers
            .lock()
            .iter()
            .filter(|w| !w.is_finished())
            .map(|w| w.name().to_string())
            .collect()
    }
}

/// Per-port RGB animation workers. At most one per key.
#[derive(Default)]
pub struct RgbHandles {
    handles: Mutex<BTreeMap<i32, Worker>>,
}

impl RgbHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `worker` for `port`, stopping any previous one first.
    pub fn start(&self, port: i32, worker: Worker) {
        let previous = self.handles.lock().insert(port, worker);
        if let Some(mut prev) = previous {
            prev.stop();
        }
    }

    /// Stop the worker on `port`, if any.
    pub fn stop(&self, port: i32) -> bool {
        let removed = self.handles.lock().remove(&port);
        match removed {
            Some(mut w) => {
                w.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every animation worker.
    pub fn stop_all(&self) {
        let all = std::mem::take(&mut *self.handles.lock());
        for w in all.values() {
            w.token().cancel();
        }
        for (_, mut w) in all {
            w.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, port: i32) -> bool {
        self.handles.lock().contains_key(&port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_wait_returns_on_cancel() {
        let token = CancelToken::new();
        let t2 = token.clone();
        let h = thread::spawn(move || t2.wait(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(h.join().unwrap());
    }

    #[test]
    fn test_wait_times_out() {
        let token = CancelToken::new();
        assert!(!token.wait(Duration::from_millis(5)));
    }

    #[test]
    fn test_periodic_worker_ticks_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut w = Worker::periodic("tick", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(40));
        w.stop();
        assert!(w.is_finished());
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_task_group_shutdown_once() {
        let group = TaskGroup::new();
        group.add(Worker::periodic("a", Duration::from_millis(5), || {}));
        group.add(Worker::periodic("b", Duration::from_millis(5), || {}));
        assert_eq!(group.len(), 2);
        assert!(group.shutdown());
        assert!(!group.shutdown());
        assert!(group.live().is_empty());
        group.add(Worker::periodic("late", Duration::from_millis(5), || {}));
        assert!(group.is_empty());
    }

    #[test]
    fn test_rgb_handles_replace() {
        let handles = RgbHandles::new();
        let first = Worker::spawn("rgb-0", |t| {
            t.wait(Duration::from_secs(10));
        });
        let first_token = first.token().clone();
        handles.start(0, first);
        handles.start(
            0,
            Worker::spawn("rgb-0b", |t| {
                t.wait(Duration::from_secs(10));
            }),
        );
        assert!(first_token.is_cancelled());
        assert_eq!(handles.len(), 1);
        handles.stop_all();
        assert!(handles.is_empty());
    }
}
