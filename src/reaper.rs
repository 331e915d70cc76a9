//! Descendant-process-tree teardown.
//!
//! Killing the immediate child is not always enough: the submit tool is a
//! thin launcher that forks the real worker, and on platforms where
//! terminating a process leaves its descendants running those workers would
//! outlive the supervision run. The reaper snapshots the process table,
//! walks the parent/child relation breadth-first from the root, and signals
//! every descendant (the root itself is killed by the caller through the
//! ordinary teardown path). [`reap_group`] additionally signals the root's
//! process group, catching forks that postdate the snapshot.
//!
//! Only Linux is implemented (process table from `/proc`). Other platforms
//! report [`ReapOutcome::Unsupported`] instead of silently doing nothing,
//! so callers can log the gap.

use crate::watcher::LogSink;

/// One process-table entry: (pid, parent pid).
pub type ProcEntry = (u32, u32);

/// Result of a reap attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Descendant pids that were signaled (possibly empty).
    Signaled(Vec<u32>),
    /// Tree reaping is not implemented for this platform.
    Unsupported,
}

/// Whether descendant reaping is implemented for the current platform.
pub fn supported() -> bool {
    cfg!(target_os = "linux")
}

/// Collect every descendant of `root` from a process-table snapshot,
/// breadth-first, excluding the root itself. Unrelated pids are never
/// included; cycles in a corrupt snapshot cannot loop because each pid is
/// added at most once.
pub fn descendants(snapshot: &[ProcEntry], root: u32) -> Vec<u32> {
    let mut found: Vec<u32> = Vec::new();
    let mut frontier: Vec<u32> = vec![root];

    while let Some(parent) = frontier.pop() {
        for &(pid, ppid) in snapshot {
            if ppid == parent && pid != root && !found.contains(&pid) {
                found.push(pid);
                frontier.push(pid);
            }
        }
    }

    found
}

/// Signal every descendant of `root`, best-effort.
///
/// Enumeration or signaling failures for individual processes are logged at
/// detailed verbosity and skipped; the function never errors. Call this
/// while the root is still alive (or freshly killed) so the snapshot still
/// reflects the tree's parent links.
pub fn reap_descendants(root: u32, sink: &dyn LogSink) -> ReapOutcome {
    #[cfg(target_os = "linux")]
    {
        let snapshot = match linux::snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                sink.detailed(&format!("process-table snapshot failed, skipping tree reap: {e}"));
                return ReapOutcome::Signaled(Vec::new());
            }
        };

        let targets = descendants(&snapshot, root);
        let mut signaled = Vec::with_capacity(targets.len());
        for pid in targets {
            match linux::kill(pid) {
                Ok(()) => signaled.push(pid),
                Err(e) => sink.detailed(&format!("could not signal descendant {pid}: {e}")),
            }
        }
        sink.detailed(&format!("signaled {} descendant process(es) of {root}", signaled.len()));
        ReapOutcome::Signaled(signaled)
    }

    #[cfg(not(target_os = "linux"))]
    {
        sink.detailed(&format!(
            "descendant-tree reaping is not supported on this platform; pid {root} descendants left to the OS"
        ));
        ReapOutcome::Unsupported
    }
}

/// SIGKILL the whole process group led by `root`, best-effort.
///
/// The supervisor spawns the submit tool as its own group leader, so the
/// group covers descendants forked after any snapshot was taken and orphans
/// whose parent link no longer points into the tree. Complements
/// [`reap_descendants`], which in turn reaches descendants that moved
/// themselves into another group.
pub fn reap_group(root: u32, sink: &dyn LogSink) -> ReapOutcome {
    #[cfg(target_os = "linux")]
    {
        match linux::kill_group(root) {
            Ok(()) => {
                sink.detailed(&format!("signaled process group {root}"));
                ReapOutcome::Signaled(vec![root])
            }
            Err(e) => {
                sink.detailed(&format!("could not signal process group {root}: {e}"));
                ReapOutcome::Signaled(Vec::new())
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        sink.detailed(&format!(
            "process-group teardown is not supported on this platform; group of pid {root} left to the OS"
        ));
        ReapOutcome::Unsupported
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::ProcEntry;

    /// Snapshot (pid, ppid) for every process visible under `/proc`.
    ///
    /// Entries that disappear or fail to parse mid-walk are skipped; the
    /// snapshot is inherently racy and the caller treats it as best-effort.
    pub(super) fn snapshot() -> std::io::Result<Vec<ProcEntry>> {
        let mut entries = Vec::new();
        for dirent in std::fs::read_dir("/proc")? {
            let Ok(dirent) = dirent else { continue };
            let name = dirent.file_name();
            let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(stat) = std::fs::read_to_string(dirent.path().join("stat")) else {
                continue;
            };
            if let Some(ppid) = parse_ppid(&stat) {
                entries.push((pid, ppid));
            }
        }
        Ok(entries)
    }

    /// Extract the ppid (field 4) from `/proc/<pid>/stat`.
    ///
    /// The second field is the command name wrapped in parentheses and may
    /// itself contain spaces and parentheses, so fields are counted from the
    /// last `)` rather than split naively.
    pub(super) fn parse_ppid(stat: &str) -> Option<u32> {
        let after_comm = &stat[stat.rfind(')')? + 1..];
        // after_comm: " <state> <ppid> ..."
        after_comm.split_whitespace().nth(1)?.parse().ok()
    }

    pub(super) fn kill(pid: u32) -> nix::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
    }

    pub(super) fn kill_group(pgid: u32) -> nix::Result<()> {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_simulated_tree_breadth_first() {
        // root -> {A=10, B=11}, A -> {C=12}; 99 is unrelated.
        let snapshot = vec![(10, 1), (11, 1), (12, 10), (99, 2)];
        let mut found = descendants(&snapshot, 1);
        found.sort_unstable();
        assert_eq!(found, vec![10, 11, 12]);
    }

    #[test]
    fn root_is_never_in_the_result() {
        let snapshot = vec![(10, 1)];
        assert!(!descendants(&snapshot, 1).contains(&1));
    }

    #[test]
    fn unrelated_processes_are_untouched() {
        let snapshot = vec![(10, 1), (20, 5), (21, 20)];
        assert_eq!(descendants(&snapshot, 1), vec![10]);
    }

    #[test]
    fn leaf_root_has_no_descendants() {
        let snapshot = vec![(10, 2), (11, 3)];
        assert!(descendants(&snapshot, 1).is_empty());
    }

    #[test]
    fn deep_chain_is_fully_collected() {
        let snapshot = vec![(2, 1), (3, 2), (4, 3), (5, 4)];
        let mut found = descendants(&snapshot, 1);
        found.sort_unstable();
        assert_eq!(found, vec![2, 3, 4, 5]);
    }

    #[test]
    fn corrupt_cycle_does_not_loop() {
        // 2 and 3 claim each other as parent.
        let snapshot = vec![(2, 1), (3, 2), (2, 3)];
        let mut found = descendants(&snapshot, 1);
        found.sort_unstable();
        assert_eq!(found, vec![2, 3]);
    }

    #[cfg(target_os = "linux")]
    mod linux {
        use super::super::linux::{parse_ppid, snapshot};

        #[test]
        fn parses_ppid_from_plain_stat_line() {
            let stat = "1234 (sleep) S 42 1234 1234 0 -1 4194304 0";
            assert_eq!(parse_ppid(stat), Some(42));
        }

        #[test]
        fn parses_ppid_when_comm_contains_spaces_and_parens() {
            let stat = "1234 (a b) (c) S 77 1234 1234 0 -1 0";
            assert_eq!(parse_ppid(stat), Some(77));
        }

        #[test]
        fn rejects_garbage() {
            assert_eq!(parse_ppid("no parens here"), None);
        }

        #[test]
        fn snapshot_contains_current_process() {
            let snapshot = snapshot().unwrap();
            let me = std::process::id();
            assert!(snapshot.iter().any(|&(pid, _)| pid == me));
        }
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn reap_reports_unsupported() {
        struct NullSink;
        impl crate::watcher::LogSink for NullSink {
            fn basic(&self, _: &str) {}
            fn detailed(&self, _: &str) {}
            fn error(&self, _: &str) {}
        }
        assert_eq!(reap_descendants(1, &NullSink), ReapOutcome::Unsupported);
        assert_eq!(reap_group(1, &NullSink), ReapOutcome::Unsupported);
    }
}
