//! Task scheduling seam: one-shot timers, repeating timers, and
//! animation-frame requests.
//!
//! The core never sleeps or spawns on its own; every deferred action goes
//! through [`Scheduler`]. Production hosts use [`TokioScheduler`], which
//! drives callbacks on a dedicated current-thread runtime; tests use the
//! manual scheduler in [`crate::testing`] for deterministic ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Identifier for a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// One-shot deferred task.
pub type ScheduledTask = Box<dyn FnOnce() + Send>;

/// Task invoked on every tick of a repeating timer.
pub type RepeatingTask = Box<dyn FnMut() + Send>;

/// Deferred execution surface used by all tracker components.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> TimerId;

    /// Run `task` every `period` until cancelled.
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerId;

    /// Cancel a pending timer. Unknown or already-fired ids are ignored.
    fn cancel(&self, timer: TimerId);

    /// Run `task` on the next animation frame, after pending layout/paint.
    fn request_frame(&self, task: ScheduledTask);
}

/// Production scheduler driving callbacks on a dedicated runtime thread.
///
/// A current-thread tokio runtime runs on its own OS thread so callers never
/// need to be inside a runtime themselves; all timer callbacks execute there,
/// serialized, matching the cooperative single-consumer model the tracker
/// assumes.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
    next_id: AtomicU64,
    cancelled: Arc<Mutex<HashMap<u64, Arc<AtomicBool>>>>,
    frame_interval: Duration,
}

impl TokioScheduler {
    /// Approximation of one rendering frame at 60 Hz.
    pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

    /// Spawn a dedicated driver thread with its own runtime.
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to create Tokio runtime for scheduler driver");
            let _ = tx.send(rt.handle().clone());
            rt.block_on(std::future::pending::<()>());
        });
        let handle = rx.recv().expect("scheduler driver thread failed to start");
        Self::with_handle(handle)
    }

    /// Build a scheduler over an existing runtime handle.
    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            cancelled: Arc::new(Mutex::new(HashMap::new())),
            frame_interval: Self::DEFAULT_FRAME_INTERVAL,
        }
    }

    fn register(&self) -> (u64, Arc<AtomicBool>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let flag = Arc::new(AtomicBool::new(false));
        self.cancelled
            .lock()
            .expect("scheduler registry poisoned")
            .insert(id, Arc::clone(&flag));
        (id, flag)
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> TimerId {
        let (id, flag) = self.register();
        let registry = Arc::clone(&self.cancelled);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let live = !flag.load(Ordering::SeqCst);
            registry
                .lock()
                .expect("scheduler registry poisoned")
                .remove(&id);
            if live {
                task();
            }
        });
        TimerId(id)
    }

    fn schedule_repeating(&self, period: Duration, mut task: RepeatingTask) -> TimerId {
        let (id, flag) = self.register();
        let registry = Arc::clone(&self.cancelled);
        self.handle.spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if flag.load(Ordering::SeqCst) {
                    registry
                        .lock()
                        .expect("scheduler registry poisoned")
                        .remove(&id);
                    break;
                }
                task();
            }
        });
        TimerId(id)
    }

    fn cancel(&self, timer: TimerId) {
        if let Some(flag) = self
            .cancelled
            .lock()
            .expect("scheduler registry poisoned")
            .get(&timer.0)
        {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn request_frame(&self, task: ScheduledTask) {
        let interval = self.frame_interval;
        self.handle.spawn(async move {
            tokio::time::sleep(interval).await;
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_schedule_once_fires() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        scheduler.schedule_once(
            Duration::from_millis(10),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let timer = scheduler.schedule_once(
            Duration::from_millis(50),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        scheduler.cancel(timer);
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_repeating_fires_until_cancelled() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let timer = scheduler.schedule_repeating(
            Duration::from_millis(10),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(100));
        scheduler.cancel(timer);
        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected repeated firings, got {}", fired);
        std::thread::sleep(Duration::from_millis(60));
        let after_cancel = counter.load(Ordering::SeqCst);
        // At most one in-flight tick can land after cancellation.
        assert!(after_cancel <= fired + 1);
    }
}
