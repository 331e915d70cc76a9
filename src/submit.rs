//! Top-level submission entry.
//!
//! Validates the configuration, supervises the submit tool, and folds
//! every failure into the returned [`ExecutionResult`]: the orchestration
//! layer consuming this crate branches on one result per submission, and
//! detailed diagnostics go to the log sink, not the result. Callers that
//! want typed errors use [`Supervision::start`] directly.

use std::sync::Arc;

use crate::cancel::StopSignal;
use crate::config::SubmitConfig;
use crate::reaper;
use crate::supervisor::{ExecutionResult, Supervision};
use crate::vars::{PathResolver, VariableSpace};
use crate::watcher::LogSink;

/// Run one submission to completion.
///
/// Validation and spawn errors are logged and reported as a failed result;
/// no exception-style propagation crosses this boundary.
pub fn run(
    config: &SubmitConfig,
    vars: &dyn VariableSpace,
    paths: &dyn PathResolver,
    stop: Arc<dyn StopSignal>,
    sink: Arc<dyn LogSink>,
) -> ExecutionResult {
    if let Err(e) = config.validate(vars) {
        sink.error(&format!("submission rejected: {e}"));
        return ExecutionResult::failed();
    }

    if !config.blocking && !reaper::supported() {
        sink.detailed(
            "descendant-tree reaping is unsupported on this platform; \
             early teardown will only kill the immediate child",
        );
    }

    match Supervision::start(config, vars, paths, stop, sink.clone()) {
        Ok(mut supervision) => supervision.await_completion(),
        Err(e) => {
            sink.error(&format!("failed to submit job: {e}"));
            ExecutionResult::failed()
        }
    }
}
