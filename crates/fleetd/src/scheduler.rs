//! Cancellable, reschedulable timers.
//!
//! Every timed action in the engine (keepalive pulses, reconnect backoff,
//! command loops, delayed replies, long-running addon passes) is started
//! through a [`Scheduler`] and represented by a [`ScheduledTask`]. Owners
//! keep their tasks in a [`TaskSet`] and cancel it as a unit on teardown.
//!
//! # Cancellation
//!
//! Cancelling is idempotent and immediate: the cancellation flag is checked
//! after the timer fires and before the callback is invoked, and a callback
//! that is already running is dropped at its next suspension point.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::trace;

// ============================================================================
// Scheduled Task Handle
// ============================================================================

/// Handle to a pending or repeating timed action.
///
/// Cloning shares the same underlying task. A task is "active" until it is
/// cancelled or (for one-shot tasks) its callback has completed.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: u64,
    token: CancellationToken,
}

impl ScheduledTask {
    /// Unique id within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the task. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True until cancelled or completed.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// What a repeating task wants after a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Fire again after the next computed interval.
    Continue,
    /// Fire again after this delay instead of the computed interval.
    RetryAfter(Duration),
    /// Do not fire again.
    Stop,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Starts timed actions on the tokio runtime.
///
/// Cheap to clone. All tasks are children of one root token, so
/// [`Scheduler::shutdown`] cancels everything started through any clone.
#[derive(Debug, Clone)]
pub struct Scheduler {
    root: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn new_task(&self) -> ScheduledTask {
        ScheduledTask {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: self.root.child_token(),
        }
    }

    /// Runs `f` once after `delay`.
    pub fn after<F, Fut>(&self, delay: Duration, f: F) -> ScheduledTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = self.new_task();
        let token = task.token.clone();
        let id = task.id;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!(task = id, "Timer cancelled before firing");
                    return;
                }
                _ = sleep(delay) => {}
            }

            if token.is_cancelled() {
                return;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = f() => {}
            }

            // Completed tasks report inactive.
            token.cancel();
        });

        task
    }

    /// Runs `fut` now, cancellable like any timer.
    pub fn spawn<Fut>(&self, fut: Fut) -> ScheduledTask
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.after(Duration::ZERO, move || fut)
    }

    /// Runs `f` repeatedly; `interval` is recomputed before every wait.
    ///
    /// The first firing happens after the first computed interval. The
    /// callback's [`Tick`] decides whether and when the next firing happens.
    pub fn every<I, F, Fut>(&self, mut interval: I, mut f: F) -> ScheduledTask
    where
        I: FnMut() -> Duration + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Tick> + Send + 'static,
    {
        let task = self.new_task();
        let token = task.token.clone();
        let id = task.id;

        tokio::spawn(async move {
            let mut next = interval();
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = sleep(next) => {}
                }

                if token.is_cancelled() {
                    break;
                }

                let tick = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    tick = f() => tick,
                };

                next = match tick {
                    Tick::Continue => interval(),
                    Tick::RetryAfter(delay) => delay,
                    Tick::Stop => {
                        token.cancel();
                        break;
                    }
                };
            }
            trace!(task = id, "Repeating task finished");
        });

        task
    }

    /// Cancels a task. Equivalent to [`ScheduledTask::cancel`].
    pub fn cancel(&self, task: &ScheduledTask) {
        task.cancel();
    }

    /// Cancels every task started through this scheduler or its clones.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

/// Uniformly random duration in `[min, max]` at millisecond resolution.
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

// ============================================================================
// Task Ledger
// ============================================================================

/// The set of tasks one component owns.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<ScheduledTask>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a task, dropping entries that already finished.
    pub fn track(&mut self, task: ScheduledTask) {
        self.tasks.retain(ScheduledTask::is_active);
        self.tasks.push(task);
    }

    /// Cancels every tracked task and forgets them.
    pub fn cancel_all(&mut self) -> usize {
        let active = self.active();
        for task in self.tasks.drain(..) {
            task.cancel();
        }
        active
    }

    /// Number of tasks still pending or repeating.
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_active()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active() == 0
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_once() {
        let scheduler = Scheduler::new();
        let hits = counter();
        let h = hits.clone();

        let task = scheduler.after(Duration::from_secs(5), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_active());

        sleep(Duration::from_secs(4)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!task.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_fires() {
        let scheduler = Scheduler::new();
        let hits = counter();
        let h = hits.clone();

        let task = scheduler.after(Duration::from_secs(1), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();
        task.cancel();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_recomputes_interval() {
        let scheduler = Scheduler::new();
        let hits = counter();
        let h = hits.clone();
        let mut n = 0u64;

        // Intervals 1s, 2s, 3s, ... -> firings at t=1, 3, 6, 10
        let task = scheduler.every(
            move || {
                n += 1;
                Duration::from_secs(n)
            },
            move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Tick::Continue
                }
            },
        );

        sleep(Duration::from_millis(6500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        task.cancel();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_retry_after_overrides_interval() {
        let scheduler = Scheduler::new();
        let hits = counter();
        let h = hits.clone();

        let _task = scheduler.every(
            || Duration::from_secs(60),
            move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Tick::RetryAfter(Duration::from_secs(5))
                }
            },
        );

        // t=60 first firing, then every 5s
        sleep(Duration::from_millis(70_500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_stop_deactivates() {
        let scheduler = Scheduler::new();
        let task = scheduler.every(|| Duration::from_secs(1), || async { Tick::Stop });

        sleep(Duration::from_millis(1500)).await;
        assert!(!task.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_all() {
        let scheduler = Scheduler::new();
        let hits = counter();

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let h = hits.clone();
            tasks.push(scheduler.clone().after(Duration::from_secs(1), move || async move {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }

        scheduler.shutdown();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(tasks.iter().all(|t| !t.is_active()));
        assert!(scheduler.is_shut_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_set_cancel_all() {
        let scheduler = Scheduler::new();
        let hits = counter();
        let mut set = TaskSet::new();

        for _ in 0..4 {
            let h = hits.clone();
            set.track(scheduler.after(Duration::from_secs(2), move || async move {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(set.active(), 4);

        assert_eq!(set.cancel_all(), 4);
        assert!(set.is_empty());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_jitter_bounds() {
        let min = Duration::from_secs(45);
        let max = Duration::from_secs(75);
        for _ in 0..200 {
            let d = jitter(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(jitter(max, min), max);
    }
}
