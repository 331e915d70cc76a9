//! Supervisor for cluster job hand-off via an external spark-submit tool.
//!
//! The crate builds a submit command line from a typed configuration
//! ([`config::SubmitConfig`] + [`command::build`]), spawns the tool, and
//! supervises it ([`supervisor::Supervision`]): two watcher threads pump
//! and log stdout/stderr while testing each line against hand-off trigger
//! patterns, a cancellation watcher polls an operator stop signal, and
//! teardown kills the whole descendant process tree ([`reaper`]) — the
//! submit tool is typically a thin launcher that forks the real worker.
//!
//! In blocking mode the caller gets the tool's real exit status; in
//! non-blocking mode the first trigger match counts as successful hand-off
//! and the local process is torn down early.

pub mod cancel;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod reaper;
pub mod submit;
pub mod supervisor;
pub mod tokenize;
pub mod vars;
pub mod watcher;
