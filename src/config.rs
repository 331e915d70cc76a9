use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::SubmitArgs;
use crate::error::SubmitError;
use crate::vars::VariableSpace;

// Precedence: CLI > env > file > defaults.

const DEFAULT_MASTER_URL: &str = "yarn-cluster";
const DEFAULT_TRIGGER_PATTERN: &str = "tracking URL:";
const DEFAULT_POLL_INTERVAL_SEC: u64 = 5;

const ENV_PREFIX: &str = "SPARKSUB_";

/// Kind of job handed to the submit tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum JobKind {
    /// A jar submitted with an optional entry class (`--class`, `--jars`).
    #[value(name = "jar")]
    #[serde(rename = "jar")]
    NativeJar,
    /// An interpreted script (`--py-files`).
    #[value(name = "script")]
    #[serde(rename = "script")]
    ScriptFile,
}

/// One supporting library: a path plus a free-form tag.
///
/// Insertion order is significant (the command builder joins paths in
/// order); the tag is carried for round-trip with the surrounding suite but
/// unused when building the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryEntry {
    pub path: String,
    #[serde(default)]
    pub tag: String,
}

/// Resolved configuration for one submission.
///
/// Built from three layers with precedence CLI > env > file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitConfig {
    pub job_kind: JobKind,
    pub master_url: String,
    pub submit_tool_path: String,
    /// Jar path (jar kind) or script path (script kind).
    pub entry_point: String,
    /// Entry class, only meaningful for jar submissions.
    pub entry_class: Option<String>,
    pub libraries: Vec<LibraryEntry>,
    /// `key=value` strings passed through verbatim as `--conf` pairs.
    pub conf_params: Vec<String>,
    pub driver_memory: Option<String>,
    pub executor_memory: Option<String>,
    /// Free-form argument string, tokenized at build time.
    pub raw_args: Option<String>,
    /// When true, wait for the real process exit; when false, treat the
    /// first trigger-pattern match as successful hand-off and tear down.
    pub blocking: bool,
    /// Output substrings signaling that the cluster accepted the job.
    pub trigger_patterns: Vec<String>,
    /// Cancellation-watcher poll interval in seconds.
    pub poll_interval_sec: u64,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// TOML-deserializable job file representation. All fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    job_kind: Option<JobKind>,
    master_url: Option<String>,
    submit_tool_path: Option<String>,
    entry_point: Option<String>,
    entry_class: Option<String>,
    libraries: Option<Vec<LibraryEntry>>,
    conf_params: Option<Vec<String>>,
    driver_memory: Option<String>,
    executor_memory: Option<String>,
    raw_args: Option<String>,
    blocking: Option<bool>,
    trigger_patterns: Option<Vec<String>>,
    poll_interval_sec: Option<u64>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

/// Intermediate layer where every field is optional, used to merge sources.
#[derive(Debug, Default)]
struct ConfigLayer {
    job_kind: Option<JobKind>,
    master_url: Option<String>,
    submit_tool_path: Option<String>,
    entry_point: Option<String>,
    entry_class: Option<String>,
    libraries: Option<Vec<LibraryEntry>>,
    conf_params: Option<Vec<String>>,
    driver_memory: Option<String>,
    executor_memory: Option<String>,
    raw_args: Option<String>,
    blocking: Option<bool>,
    trigger_patterns: Option<Vec<String>>,
    poll_interval_sec: Option<u64>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

impl SubmitConfig {
    /// Load configuration with precedence: CLI > env > file > defaults.
    ///
    /// `job_file` — optional path to a TOML job file.
    /// `cli_args` — values provided on the command line.
    pub fn load(job_file: Option<&Path>, cli_args: &SubmitArgs) -> anyhow::Result<Self> {
        Self::load_with_env(job_file, cli_args, real_env_var)
    }

    /// Validate the fields that must hold before any process exists:
    /// non-blank master URL, non-blank kind-specific entry point, and a
    /// submit tool path that (after variable substitution) references an
    /// existing executable file.
    pub fn validate(&self, vars: &dyn VariableSpace) -> Result<(), SubmitError> {
        let tool = vars.resolve(&self.submit_tool_path);
        if self.submit_tool_path.trim().is_empty() || !is_executable(Path::new(&tool)) {
            return Err(SubmitError::SubmitToolInvalid { path: tool });
        }
        if self.master_url.trim().is_empty() {
            return Err(SubmitError::MasterUrlBlank);
        }
        if self.entry_point.trim().is_empty() {
            return Err(match self.job_kind {
                JobKind::NativeJar => SubmitError::JarPathBlank,
                JobKind::ScriptFile => SubmitError::ScriptPathBlank,
            });
        }
        Ok(())
    }

    /// Internal constructor that accepts an env-var lookup function,
    /// enabling deterministic testing without process-global mutation.
    fn load_with_env(
        job_file: Option<&Path>,
        cli_args: &SubmitArgs,
        env_fn: fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file_layer = match job_file {
            Some(path) => load_file_layer(path)?,
            None => ConfigLayer::default(),
        };
        let env_layer = load_env_layer(env_fn)?;
        let cli_layer = cli_layer_from(cli_args);

        let merged = merge_layers(file_layer, env_layer, cli_layer);

        let submit_tool_path = merged.submit_tool_path.ok_or_else(|| {
            anyhow::anyhow!("submit_tool_path is required (via --tool, SPARKSUB_TOOL, or job file)")
        })?;
        let entry_point = merged.entry_point.ok_or_else(|| {
            anyhow::anyhow!(
                "entry_point is required (via --entry-point, SPARKSUB_ENTRY_POINT, or job file)"
            )
        })?;

        Ok(SubmitConfig {
            job_kind: merged.job_kind.unwrap_or(JobKind::NativeJar),
            master_url: merged
                .master_url
                .unwrap_or_else(|| DEFAULT_MASTER_URL.to_owned()),
            submit_tool_path,
            entry_point,
            entry_class: merged.entry_class,
            libraries: merged.libraries.unwrap_or_default(),
            conf_params: merged.conf_params.unwrap_or_default(),
            driver_memory: merged.driver_memory,
            executor_memory: merged.executor_memory,
            raw_args: merged.raw_args,
            blocking: merged.blocking.unwrap_or(true),
            trigger_patterns: merged
                .trigger_patterns
                .unwrap_or_else(|| vec![DEFAULT_TRIGGER_PATTERN.to_owned()]),
            poll_interval_sec: merged
                .poll_interval_sec
                .unwrap_or(DEFAULT_POLL_INTERVAL_SEC),
            log_level: merged.log_level,
            log_file: merged.log_file,
        })
    }
}

/// Returns `true` when `path` exists and is a regular file.
///
/// On Unix this additionally checks the executable permission bits.
pub(crate) fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

fn load_file_layer(path: &Path) -> anyhow::Result<ConfigLayer> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read job file {}: {e}", path.display()))?;
    let fc: FileConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse job file {}: {e}", path.display()))?;
    Ok(ConfigLayer {
        job_kind: fc.job_kind,
        master_url: fc.master_url,
        submit_tool_path: fc.submit_tool_path,
        entry_point: fc.entry_point,
        entry_class: fc.entry_class,
        libraries: fc.libraries,
        conf_params: fc.conf_params,
        driver_memory: fc.driver_memory,
        executor_memory: fc.executor_memory,
        raw_args: fc.raw_args,
        blocking: fc.blocking,
        trigger_patterns: fc.trigger_patterns,
        poll_interval_sec: fc.poll_interval_sec,
        log_level: fc.log_level,
        log_file: fc.log_file,
    })
}

fn real_env_var(suffix: &str) -> Option<String> {
    let key = format!("{ENV_PREFIX}{suffix}");
    env::var(&key).ok().filter(|v| !v.is_empty())
}

fn load_env_layer(env_fn: fn(&str) -> Option<String>) -> Result<ConfigLayer, SubmitError> {
    Ok(ConfigLayer {
        job_kind: parse_env_kind(env_fn, "KIND")?,
        master_url: env_fn("MASTER"),
        submit_tool_path: env_fn("TOOL"),
        entry_point: env_fn("ENTRY_POINT"),
        entry_class: env_fn("CLASS"),
        libraries: env_fn("LIBS").as_deref().map(parse_lib_list),
        conf_params: env_fn("CONF").map(|s| {
            s.split(',')
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .collect()
        }),
        driver_memory: env_fn("DRIVER_MEMORY"),
        executor_memory: env_fn("EXECUTOR_MEMORY"),
        raw_args: env_fn("ARGS"),
        blocking: parse_env_bool(env_fn, "BLOCKING")?,
        trigger_patterns: env_fn("PATTERNS").map(|s| {
            s.split(',')
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty())
                .collect()
        }),
        poll_interval_sec: parse_env_u64(env_fn, "POLL_INTERVAL_SEC")?,
        log_level: env_fn("LOG_LEVEL"),
        log_file: env_fn("LOG_FILE").map(PathBuf::from),
    })
}

/// Parse a `path[=tag]` library spec; the tag defaults to empty.
fn parse_lib_entry(spec: &str) -> LibraryEntry {
    match spec.split_once('=') {
        Some((path, tag)) => LibraryEntry {
            path: path.trim().to_owned(),
            tag: tag.trim().to_owned(),
        },
        None => LibraryEntry {
            path: spec.trim().to_owned(),
            tag: String::new(),
        },
    }
}

fn parse_lib_list(s: &str) -> Vec<LibraryEntry> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_lib_entry)
        .collect()
}

fn parse_env_kind(
    env_fn: fn(&str) -> Option<String>,
    suffix: &str,
) -> Result<Option<JobKind>, SubmitError> {
    match env_fn(suffix) {
        Some(s) => match s.as_str() {
            "jar" => Ok(Some(JobKind::NativeJar)),
            "script" => Ok(Some(JobKind::ScriptFile)),
            other => Err(SubmitError::ConfigEnvParseError {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: format!("expected \"jar\" or \"script\", got \"{other}\""),
            }),
        },
        None => Ok(None),
    }
}

fn parse_env_u64(
    env_fn: fn(&str) -> Option<String>,
    suffix: &str,
) -> Result<Option<u64>, SubmitError> {
    match env_fn(suffix) {
        Some(s) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|e| SubmitError::ConfigEnvParseError {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn parse_env_bool(
    env_fn: fn(&str) -> Option<String>,
    suffix: &str,
) -> Result<Option<bool>, SubmitError> {
    match env_fn(suffix) {
        Some(s) => s
            .parse::<bool>()
            .map(Some)
            .map_err(|e| SubmitError::ConfigEnvParseError {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn cli_layer_from(args: &SubmitArgs) -> ConfigLayer {
    ConfigLayer {
        job_kind: args.kind,
        master_url: args.master.clone(),
        submit_tool_path: args.tool.clone(),
        entry_point: args.entry_point.clone(),
        entry_class: args.class.clone(),
        libraries: if args.lib.is_empty() {
            None
        } else {
            Some(args.lib.iter().map(|s| parse_lib_entry(s)).collect())
        },
        conf_params: if args.conf.is_empty() {
            None
        } else {
            Some(args.conf.clone())
        },
        driver_memory: args.driver_memory.clone(),
        executor_memory: args.executor_memory.clone(),
        raw_args: args.args.clone(),
        blocking: if args.no_block { Some(false) } else { None },
        trigger_patterns: if args.pattern.is_empty() {
            None
        } else {
            Some(args.pattern.clone())
        },
        poll_interval_sec: args.poll_interval_sec,
        log_level: args.log_level.clone(),
        log_file: args.log_file.clone(),
    }
}

/// Merge three layers. For each field, pick CLI first, then env, then file.
fn merge_layers(file: ConfigLayer, env: ConfigLayer, cli: ConfigLayer) -> ConfigLayer {
    ConfigLayer {
        job_kind: cli.job_kind.or(env.job_kind).or(file.job_kind),
        master_url: cli.master_url.or(env.master_url).or(file.master_url),
        submit_tool_path: cli
            .submit_tool_path
            .or(env.submit_tool_path)
            .or(file.submit_tool_path),
        entry_point: cli.entry_point.or(env.entry_point).or(file.entry_point),
        entry_class: cli.entry_class.or(env.entry_class).or(file.entry_class),
        libraries: cli.libraries.or(env.libraries).or(file.libraries),
        conf_params: cli.conf_params.or(env.conf_params).or(file.conf_params),
        driver_memory: cli
            .driver_memory
            .or(env.driver_memory)
            .or(file.driver_memory),
        executor_memory: cli
            .executor_memory
            .or(env.executor_memory)
            .or(file.executor_memory),
        raw_args: cli.raw_args.or(env.raw_args).or(file.raw_args),
        blocking: cli.blocking.or(env.blocking).or(file.blocking),
        trigger_patterns: cli
            .trigger_patterns
            .or(env.trigger_patterns)
            .or(file.trigger_patterns),
        poll_interval_sec: cli
            .poll_interval_sec
            .or(env.poll_interval_sec)
            .or(file.poll_interval_sec),
        log_level: cli.log_level.or(env.log_level).or(file.log_level),
        log_file: cli.log_file.or(env.log_file).or(file.log_file),
    }
}
