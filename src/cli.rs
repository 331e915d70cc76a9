use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::JobKind;

/// sparksub — supervisor for cluster job hand-off.
///
/// Builds a spark-submit command line from a typed configuration, spawns
/// the tool, streams and logs its output, and tears the process tree down
/// on hand-off (non-blocking mode) or operator stop.
#[derive(Debug, Parser)]
#[command(name = "sparksub", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a job and supervise the submit tool until hand-off or exit.
    Submit(SubmitArgs),
}

/// Arguments for the `submit` subcommand.
///
/// Most values can also come from a TOML job file (`--job`) or env vars
/// (`SPARKSUB_TOOL`, `SPARKSUB_MASTER`, ...). Precedence: CLI > env > file.
#[derive(Debug, Clone, clap::Args)]
pub struct SubmitArgs {
    /// Path to a TOML job file.
    #[arg(long)]
    pub job: Option<PathBuf>,

    /// Path to the spark-submit tool.
    #[arg(long)]
    pub tool: Option<String>,

    /// Master URL (default: "yarn-cluster").
    #[arg(long)]
    pub master: Option<String>,

    /// Job kind: "jar" (class-based) or "script" (default: jar).
    #[arg(long, value_enum)]
    pub kind: Option<JobKind>,

    /// Jar path (jar kind) or script path (script kind).
    #[arg(long)]
    pub entry_point: Option<String>,

    /// Entry class name; only meaningful for jar submissions.
    #[arg(long)]
    pub class: Option<String>,

    /// Supporting library as `path[=tag]`. Repeatable; order is preserved.
    #[arg(long = "lib")]
    pub lib: Vec<String>,

    /// Configuration parameter as `key=value`, passed through as `--conf`.
    /// Repeatable; order is preserved.
    #[arg(long = "conf")]
    pub conf: Vec<String>,

    /// Driver memory (e.g. "2g"). Omitted from the command when unset.
    #[arg(long)]
    pub driver_memory: Option<String>,

    /// Executor memory (e.g. "4g"). Omitted from the command when unset.
    #[arg(long)]
    pub executor_memory: Option<String>,

    /// Free-form arguments for the job, tokenized with shell-style quoting.
    #[arg(long)]
    pub args: Option<String>,

    /// Do not wait for the job: treat the first trigger-pattern match as
    /// successful hand-off and stop the local submit process.
    #[arg(long, default_value_t = false)]
    pub no_block: bool,

    /// Output substring signaling cluster acceptance (default:
    /// "tracking URL:"). Repeatable; overrides the default set.
    #[arg(long = "pattern")]
    pub pattern: Vec<String>,

    /// Operator-stop poll interval in seconds (default: 5).
    #[arg(long)]
    pub poll_interval_sec: Option<u64>,

    /// Log level filter (default: "info"). Supports tracing directives
    /// (e.g. "debug", "sparksub=trace,warn"). Overridden by SPARKSUB_LOG.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to a log file. When set, structured JSON logs are appended here
    /// in addition to the human-readable stderr output.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print the built command line (one token per line) and exit without
    /// spawning anything.
    #[arg(long, default_value_t = false)]
    pub print_command: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_submit() {
        let cli = Cli::try_parse_from([
            "sparksub",
            "submit",
            "--tool",
            "/bin/submit",
            "--entry-point",
            "a.jar",
        ])
        .unwrap();

        let Commands::Submit(args) = cli.command;
        assert_eq!(args.tool.as_deref(), Some("/bin/submit"));
        assert_eq!(args.entry_point.as_deref(), Some("a.jar"));
        assert!(!args.no_block);
        assert!(args.lib.is_empty());
    }

    #[test]
    fn repeatable_flags_keep_order() {
        let cli = Cli::try_parse_from([
            "sparksub",
            "submit",
            "--conf",
            "a=1",
            "--conf",
            "b=2",
            "--lib",
            "x.jar=e1",
            "--lib",
            "y.jar",
        ])
        .unwrap();

        let Commands::Submit(args) = cli.command;
        assert_eq!(args.conf, vec!["a=1", "b=2"]);
        assert_eq!(args.lib, vec!["x.jar=e1", "y.jar"]);
    }

    #[test]
    fn kind_values_are_jar_and_script() {
        let cli = Cli::try_parse_from(["sparksub", "submit", "--kind", "script"]).unwrap();
        let Commands::Submit(args) = cli.command;
        assert_eq!(args.kind, Some(JobKind::ScriptFile));

        assert!(Cli::try_parse_from(["sparksub", "submit", "--kind", "perl"]).is_err());
    }

    #[test]
    fn no_block_flag_parses() {
        let cli = Cli::try_parse_from(["sparksub", "submit", "--no-block"]).unwrap();
        let Commands::Submit(args) = cli.command;
        assert!(args.no_block);
    }
}
