use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use sparksub::cancel::NeverStopped;
use sparksub::cli::{Cli, Commands};
use sparksub::command;
use sparksub::config::SubmitConfig;
use sparksub::submit;
use sparksub::vars::{IdentityResolver, MapVariables};
use sparksub::watcher::TracingSink;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns the process exit code: 0 when the supervised submission
/// succeeded, 1 otherwise.
fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Submit(args) => {
            let job_file = args.job.clone();
            let config = SubmitConfig::load(job_file.as_deref(), &args)?;

            sparksub::logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;

            let vars = MapVariables::from_env();

            if args.print_command {
                let argv = command::build(&config, &vars, &IdentityResolver)?;
                for token in argv {
                    println!("{token}");
                }
                return Ok(0);
            }

            info!(
                tool = %config.submit_tool_path,
                master = %config.master_url,
                kind = ?config.job_kind,
                entry_point = %config.entry_point,
                blocking = config.blocking,
                "submitting"
            );

            let result = submit::run(
                &config,
                &vars,
                &IdentityResolver,
                Arc::new(NeverStopped),
                Arc::new(TracingSink),
            );

            // The one machine-readable line on stdout; logs go to stderr.
            println!("{}", serde_json::to_string(&result)?);

            Ok(if result.success { 0 } else { 1 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_from(argv: &[&str]) -> Cli {
        let mut full = vec!["sparksub"];
        full.extend_from_slice(argv);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn run_fails_without_required_fields() {
        let cli = cli_from(&["submit"]);
        let err = run(cli).unwrap_err();
        assert!(
            err.to_string().contains("submit_tool_path is required"),
            "got: {err}"
        );
    }

    #[test]
    fn print_command_short_circuits_without_spawning() {
        // The tool does not exist; --print-command must still succeed.
        let cli = cli_from(&[
            "submit",
            "--tool",
            "/no/such/submit",
            "--entry-point",
            "a.jar",
            "--class",
            "org.X",
            "--print-command",
        ]);

        let code = run(cli).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn missing_tool_yields_failure_exit_code() {
        let cli = cli_from(&["submit", "--tool", "/no/such/submit", "--entry-point", "a.jar"]);

        let code = run(cli).unwrap();
        assert_eq!(code, 1);
    }

    #[cfg(unix)]
    #[test]
    fn successful_submission_yields_success_exit_code() {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("submit");
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o755)
            .open(&tool)
            .unwrap();
        writeln!(f, "#!/bin/sh\nexit 0").unwrap();
        // Close the writable handle before spawning, or exec fails with ETXTBSY.
        drop(f);

        let cli = cli_from(&[
            "submit",
            "--tool",
            tool.to_str().unwrap(),
            "--entry-point",
            "a.jar",
        ]);

        let code = run(cli).unwrap();
        assert_eq!(code, 0);
    }
}
