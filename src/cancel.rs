//! Operator-stop watcher.
//!
//! The caller's thread may be blocked waiting on process exit, so an
//! operator stop request arriving asynchronously needs its own polling
//! task: check the externally supplied stop predicate once per poll
//! interval while the process is alive, and trigger cancellation on the
//! first positive check.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Externally supplied "has the owning workflow been stopped?" predicate.
pub trait StopSignal: Send + Sync {
    fn is_stopped(&self) -> bool;
}

impl StopSignal for AtomicBool {
    fn is_stopped(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Stop signal that never fires; used when no orchestrator owns the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStopped;

impl StopSignal for NeverStopped {
    fn is_stopped(&self) -> bool {
        false
    }
}

/// Slice length for the interval sleep, so the watcher notices process exit
/// promptly and can be joined without waiting out a full poll interval.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Spawn the cancellation watcher.
///
/// `finished` is set by the supervisor when the process has exited; the
/// watcher then terminates without invoking `cancel`. The stop predicate is
/// consulted once per `poll_interval`. On a positive check the watcher runs
/// `cancel` once and terminates itself.
pub fn spawn_canceller<F>(
    stop: Arc<dyn StopSignal>,
    poll_interval: Duration,
    finished: Arc<AtomicBool>,
    cancel: F,
) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::spawn(move || {
        loop {
            if finished.load(Ordering::Acquire) {
                return;
            }
            if stop.is_stopped() {
                cancel();
                return;
            }
            sleep_interval(poll_interval, &finished);
        }
    })
}

/// Sleep for `interval` in short slices, returning early once `finished`
/// is set.
fn sleep_interval(interval: Duration, finished: &AtomicBool) {
    let mut remaining = interval;
    while !remaining.is_zero() {
        if finished.load(Ordering::Acquire) {
            return;
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn fires_cancel_within_one_poll_interval() {
        let stop = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let counter = cancelled.clone();
        let handle = spawn_canceller(
            stop,
            Duration::from_millis(200),
            finished,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let start = Instant::now();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exits_without_cancel_when_process_finishes() {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let counter = cancelled.clone();
        let handle = spawn_canceller(
            stop,
            Duration::from_secs(60),
            finished.clone(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        finished.store(true, Ordering::Release);
        let start = Instant::now();
        handle.join().unwrap();
        // Joins promptly despite the 60 s poll interval.
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_raised_mid_run_is_seen_on_next_poll() {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let counter = cancelled.clone();
        let handle = spawn_canceller(
            stop.clone(),
            Duration::from_millis(100),
            finished,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        std::thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::Release);
        handle.join().unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_stopped_is_never_stopped() {
        assert!(!NeverStopped.is_stopped());
    }
}
