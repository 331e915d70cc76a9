//! Output-stream watchers and the shared hand-off signal.
//!
//! One watcher thread per child stream reads lines, forwards them to the
//! log sink, and tests each against the trigger patterns. The first match
//! across either stream flips the shared [`HandoffSignal`]; the flip is an
//! atomic compare-and-set, so the registered callback runs exactly once no
//! matter how the two streams race.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, error, info};

/// Logging collaborator consumed by the watchers and the supervisor.
///
/// `basic` is the ordinary per-line channel, `detailed` carries diagnostics
/// (matched patterns, argv dumps), `error` carries stream I/O failures.
pub trait LogSink: Send + Sync {
    fn basic(&self, line: &str);
    fn detailed(&self, line: &str);
    fn error(&self, line: &str);
}

/// Default sink forwarding to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn basic(&self, line: &str) {
        info!("{line}");
    }

    fn detailed(&self, line: &str) {
        debug!("{line}");
    }

    fn error(&self, line: &str) {
        error!("{line}");
    }
}

/// Callback invoked by the watcher that performs the hand-off flip.
pub type OnHandoff = Box<dyn Fn(&str) + Send + Sync>;

/// Shared submitted-flag plus at-most-once callback.
///
/// Any watcher may call [`fire`](Self::fire); only the call that wins the
/// compare-and-set runs the callback. The flag itself is the synchronization
/// point, not a lock, so ordinary line logging never blocks across threads.
pub struct HandoffSignal {
    fired: AtomicBool,
    on_fire: Option<OnHandoff>,
}

impl HandoffSignal {
    pub fn new(on_fire: Option<OnHandoff>) -> Self {
        Self {
            fired: AtomicBool::new(false),
            on_fire,
        }
    }

    /// Flip the flag. Returns `true` only for the call that performed the
    /// flip; that call (and no other) runs the callback.
    pub fn fire(&self, pattern: &str) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(cb) = &self.on_fire {
            cb(pattern);
        }
        true
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Start a watcher thread for one output channel.
///
/// Reads lines until end-of-stream, logging each at basic verbosity with the
/// channel name. A line containing any trigger pattern fires the signal (the
/// winning match is logged at detailed verbosity). Read errors are logged
/// and treated as end-of-stream; the thread never panics the supervisor.
/// Returns the number of lines read, for diagnostics.
pub fn spawn_watcher<R>(
    channel: &'static str,
    reader: R,
    patterns: Arc<Vec<String>>,
    signal: Arc<HandoffSignal>,
    sink: Arc<dyn LogSink>,
) -> JoinHandle<usize>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut lines_read = 0usize;
        for line in BufReader::new(reader).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    sink.error(&format!("{channel}: read failed, treating as end of stream: {e}"));
                    break;
                }
            };
            lines_read += 1;
            sink.basic(&format!("{channel}: {line}"));

            if let Some(pattern) = patterns.iter().find(|p| line.contains(p.as_str())) {
                if signal.fire(pattern) {
                    sink.detailed(&format!(
                        "{channel}: matched hand-off pattern {pattern:?}, job considered submitted"
                    ));
                }
            }
        }
        lines_read
    })
}
