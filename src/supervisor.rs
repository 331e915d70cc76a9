//! Process supervision for one submission run.
//!
//! Spawns the submit tool with piped stdout/stderr, starts one watcher
//! thread per stream plus the cancellation watcher, and waits for a
//! terminal condition: natural exit, hand-off pattern match (non-blocking
//! mode), or operator stop. Whatever the path, both stream watchers are
//! joined before the child and its stdio handles are released; leaving
//! pipes open across many supervised runs exhausts file descriptors.
//!
//! The tool is spawned as the leader of a fresh process group and teardown
//! signals the whole group, not just a snapshot of the descendant tree: a
//! descendant forked after the snapshot, or an orphan reparented away from
//! the tree, still holds the pipe write ends and would stall the watcher
//! join until it exits on its own.
//!
//! The only state shared across the four threads is the hand-off flag, the
//! cancellation/finished flags, and the child handle behind a mutex. The
//! caller's wait is a `try_wait` poll (rather than a blocking `wait`) so a
//! watcher or the canceller can take the child lock to kill it.

#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use crate::cancel::{self, StopSignal};
use crate::command;
use crate::config::SubmitConfig;
use crate::error::SubmitError;
use crate::reaper;
use crate::vars::{PathResolver, VariableSpace};
use crate::watcher::{HandoffSignal, LogSink, OnHandoff, spawn_watcher};

/// Polling interval while waiting for the child to exit.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Outcome of one supervision run, produced exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_status: i32,
    pub error_count: u32,
}

impl ExecutionResult {
    /// Result for failures that happen before a process exists
    /// (validation, spawn).
    pub fn failed() -> Self {
        Self {
            success: false,
            exit_status: -1,
            error_count: 1,
        }
    }
}

/// Where the run currently stands. `Submitted` marks a hand-off pattern
/// match and is transient; it ends the run only in non-blocking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Running,
    Submitted,
    Completed,
    Killed,
    Failed,
}

/// Options for supervising an already-built command line.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub blocking: bool,
    pub trigger_patterns: Vec<String>,
    pub poll_interval: Duration,
}

impl StartOptions {
    fn from_config(config: &SubmitConfig) -> Self {
        Self {
            blocking: config.blocking,
            trigger_patterns: config.trigger_patterns.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_sec),
        }
    }
}

/// State shared between the caller, the watchers, and the canceller.
struct Shared {
    child: Mutex<Child>,
    pid: u32,
    cancelled: AtomicBool,
    operator_stop: AtomicBool,
    terminal: Mutex<Option<(CompletionState, ExecutionResult)>>,
    sink: Arc<dyn LogSink>,
}

impl Shared {
    /// Idempotent teardown, shared by operator stop and hand-off
    /// self-cancel; the second and subsequent calls are no-ops.
    ///
    /// Descendants are reaped before the root is killed so the process
    /// table still carries the tree's parent links.
    fn cancel(&self, operator: bool) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let already_exited = matches!(child.try_wait(), Ok(Some(_)));

        if operator && !already_exited {
            self.operator_stop.store(true, Ordering::Release);
        }
        self.sink.detailed(&format!(
            "cancelling submit process {} ({})",
            self.pid,
            if operator { "operator stop" } else { "job handed off" },
        ));

        // Even when the root already exited, a forked worker may linger.
        reaper::reap_descendants(self.pid, self.sink.as_ref());
        // The snapshot walk misses anything forked after the snapshot and
        // orphans whose parent link left the tree; the group signal does not.
        reaper::reap_group(self.pid, self.sink.as_ref());

        if !already_exited {
            if let Err(e) = child.kill() {
                // Lost the race against natural exit; nothing left to do.
                self.sink.detailed(&format!("kill of {} was a no-op: {e}", self.pid));
            }
        }
    }
}

/// An in-flight supervision run.
pub struct Supervision {
    shared: Arc<Shared>,
    signal: Arc<HandoffSignal>,
    finished: Arc<AtomicBool>,
    stdout_watcher: Option<JoinHandle<usize>>,
    stderr_watcher: Option<JoinHandle<usize>>,
    canceller: Option<JoinHandle<()>>,
    blocking: bool,
}

impl Supervision {
    /// Build the command from `config` and start supervising it.
    pub fn start(
        config: &SubmitConfig,
        vars: &dyn VariableSpace,
        paths: &dyn PathResolver,
        stop: Arc<dyn StopSignal>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, SubmitError> {
        let argv = command::build(config, vars, paths)?;
        Self::start_command(argv, vars.variables(), StartOptions::from_config(config), stop, sink)
    }

    /// Start supervising an already-built command line.
    ///
    /// `env` is copied verbatim into the child environment at spawn time
    /// (never after). In non-blocking mode the first trigger-pattern match
    /// cancels the local process: hand-off to the cluster has happened and
    /// holding the process open serves no purpose.
    pub fn start_command(
        argv: Vec<String>,
        env: Vec<(String, String)>,
        options: StartOptions,
        stop: Arc<dyn StopSignal>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, SubmitError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(SubmitError::EmptyCommandLine);
        };

        sink.basic("Submitting job to cluster");
        sink.detailed(&format!("command: {argv:?}"));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Fresh process group so teardown can signal every descendant,
        // including ones forked after any process-table snapshot.
        #[cfg(unix)]
        cmd.process_group(0);
        for (name, value) in env {
            cmd.env(name, value);
        }

        let mut child = cmd.spawn().map_err(|e| SubmitError::SpawnFailed {
            tool: program.clone(),
            detail: e.to_string(),
        })?;
        let pid = child.id();

        // We set Stdio::piped() above, so take() always returns Some.
        let child_stdout = child.stdout.take().expect("stdout was piped");
        let child_stderr = child.stderr.take().expect("stderr was piped");

        let shared = Arc::new(Shared {
            child: Mutex::new(child),
            pid,
            cancelled: AtomicBool::new(false),
            operator_stop: AtomicBool::new(false),
            terminal: Mutex::new(None),
            sink: sink.clone(),
        });

        let on_handoff: Option<OnHandoff> = if options.blocking {
            None
        } else {
            let shared = shared.clone();
            let sink = sink.clone();
            Some(Box::new(move |_pattern: &str| {
                sink.detailed("job handed off, stopping the local submit process");
                shared.cancel(false);
            }))
        };
        let signal = Arc::new(HandoffSignal::new(on_handoff));

        let patterns = Arc::new(options.trigger_patterns);
        let stdout_watcher =
            spawn_watcher("stdout", child_stdout, patterns.clone(), signal.clone(), sink.clone());
        let stderr_watcher =
            spawn_watcher("stderr", child_stderr, patterns, signal.clone(), sink.clone());

        let finished = Arc::new(AtomicBool::new(false));
        let canceller = {
            let shared = shared.clone();
            cancel::spawn_canceller(stop, options.poll_interval, finished.clone(), move || {
                shared.cancel(true);
            })
        };

        Ok(Self {
            shared,
            signal,
            finished,
            stdout_watcher: Some(stdout_watcher),
            stderr_watcher: Some(stderr_watcher),
            canceller: Some(canceller),
            blocking: options.blocking,
        })
    }

    /// OS process id of the supervised child.
    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    /// Where the run currently stands. After [`Self::await_completion`]
    /// this reports the terminal classification (`Completed`, `Killed`, or
    /// `Failed`; `Submitted` for a non-blocking hand-off).
    pub fn state(&self) -> CompletionState {
        let terminal = self
            .shared
            .terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((state, _)) = *terminal {
            return state;
        }
        if self.signal.fired() {
            return CompletionState::Submitted;
        }
        CompletionState::Running
    }

    /// Operator-initiated cancellation. Idempotent and safe to call
    /// concurrently with the watchers or with natural exit.
    pub fn cancel(&self) {
        self.shared.cancel(true);
    }

    /// Wait for the run to reach a terminal condition and produce its
    /// result. Idempotent; repeated calls return the same result.
    ///
    /// In non-blocking mode this still waits for the (possibly killed)
    /// process to exit, which the hand-off callback makes prompt; the exit
    /// status is then overridden per the hand-off contract. Both stream
    /// watchers and the canceller are joined before the child handle is
    /// released, on every path.
    pub fn await_completion(&mut self) -> ExecutionResult {
        {
            let terminal = self
                .shared
                .terminal
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some((_, result)) = *terminal {
                return result;
            }
        }

        let mut wait_failed = false;
        let status: Option<ExitStatus> = loop {
            let polled = {
                let mut child = self
                    .shared
                    .child
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                child.try_wait()
            };
            match polled {
                Ok(Some(status)) => break Some(status),
                Ok(None) => std::thread::sleep(WAIT_POLL),
                Err(e) => {
                    self.shared
                        .sink
                        .error(&format!("waiting on submit process failed: {e}"));
                    wait_failed = true;
                    break None;
                }
            }
        };

        self.finished.store(true, Ordering::Release);

        for (name, handle) in [
            ("stdout", self.stdout_watcher.take()),
            ("stderr", self.stderr_watcher.take()),
        ] {
            let Some(handle) = handle else { continue };
            match handle.join() {
                Ok(lines) => self
                    .shared
                    .sink
                    .detailed(&format!("{name} watcher done after {lines} line(s)")),
                Err(_) => self
                    .shared
                    .sink
                    .error(&format!("{name} watcher panicked")),
            }
        }
        if let Some(canceller) = self.canceller.take() {
            if canceller.join().is_err() {
                self.shared.sink.error("cancellation watcher panicked");
            }
        }

        let exit_status = status.map(exit_status_of).unwrap_or(-1);
        let submitted = self.signal.fired();
        let operator = self.shared.operator_stop.load(Ordering::Acquire);

        let (success, final_status, state) = if wait_failed {
            (false, -1, CompletionState::Failed)
        } else if operator {
            (false, exit_status, CompletionState::Killed)
        } else if !self.blocking && submitted {
            // Hand-off already happened; the forced exit code of the local
            // process says nothing about the submission, so report success.
            // This can mask a submit-tool crash that printed the trigger
            // text first; kept for compatibility with the wider suite.
            (true, 0, CompletionState::Submitted)
        } else if self.shared.cancelled.load(Ordering::Acquire) && exit_status != 0 {
            (false, exit_status, CompletionState::Killed)
        } else {
            (exit_status == 0, exit_status, CompletionState::Completed)
        };

        self.shared.sink.detailed(&format!(
            "submit finished in state {state:?} (exit status {final_status})"
        ));

        let result = ExecutionResult {
            success,
            exit_status: final_status,
            error_count: u32::from(!success),
        };
        *self
            .shared
            .terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((state, result));
        result
    }
}

/// Map an OS exit status to one integer: the exit code when there is one,
/// `128 + signal` for signal deaths on Unix, `-1` otherwise.
fn exit_status_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
