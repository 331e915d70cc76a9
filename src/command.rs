//! Submit-tool command-line construction.
//!
//! Pure: builds the full argv (program first) from a `SubmitConfig` and the
//! collaborator seams, with no filesystem or process side effects. The argv
//! layout is a compatibility contract with the external submit tool:
//!
//! ```text
//! <tool> --master <url> [--conf k=v]* [--driver-memory m] [--executor-memory m]
//!        ( --class <cls> [--jars p1,p2,...] <jar> | [--py-files p1,p2,...] <script> )
//!        [tokenized raw args...]
//! ```

use crate::config::{JobKind, SubmitConfig};
use crate::error::SubmitError;
use crate::tokenize::tokenize;
use crate::vars::{PathResolver, VariableSpace};

/// Prefix marking a path that must be resolved through the cluster VFS
/// before the submit tool can open it.
pub const INDIRECT_PATH_PREFIX: &str = "hc://";

/// Build the submit command argv.
///
/// Every emitted value passes through variable substitution. Blank
/// `driver_memory` / `executor_memory` are omitted entirely, never emitted
/// as empty strings. The entry point and any `hc://`-prefixed raw-arg token
/// are additionally resolved through the path resolver.
pub fn build(
    config: &SubmitConfig,
    vars: &dyn VariableSpace,
    paths: &dyn PathResolver,
) -> Result<Vec<String>, SubmitError> {
    let mut cmds = Vec::new();

    cmds.push(vars.resolve(&config.submit_tool_path));
    cmds.push("--master".to_owned());
    cmds.push(vars.resolve(&config.master_url));

    for param in &config.conf_params {
        cmds.push("--conf".to_owned());
        cmds.push(vars.resolve(param));
    }

    if let Some(mem) = non_blank(config.driver_memory.as_deref()) {
        cmds.push("--driver-memory".to_owned());
        cmds.push(vars.resolve(mem));
    }

    if let Some(mem) = non_blank(config.executor_memory.as_deref()) {
        cmds.push("--executor-memory".to_owned());
        cmds.push(vars.resolve(mem));
    }

    match config.job_kind {
        JobKind::NativeJar => {
            if let Some(class) = non_blank(config.entry_class.as_deref()) {
                cmds.push("--class".to_owned());
                cmds.push(vars.resolve(class));
            }
            if !config.libraries.is_empty() {
                cmds.push("--jars".to_owned());
                cmds.push(vars.resolve(&joined_library_paths(config)));
            }
            cmds.push(paths.resolve_indirect(&vars.resolve(&config.entry_point)));
        }
        JobKind::ScriptFile => {
            if !config.libraries.is_empty() {
                cmds.push("--py-files".to_owned());
                cmds.push(vars.resolve(&joined_library_paths(config)));
            }
            cmds.push(paths.resolve_indirect(&vars.resolve(&config.entry_point)));
        }
    }

    if let Some(raw) = non_blank(config.raw_args.as_deref()) {
        for token in tokenize(raw)? {
            let token = vars.resolve(&token);
            if token.is_empty() {
                continue;
            }
            if token.starts_with(INDIRECT_PATH_PREFIX) {
                cmds.push(paths.resolve_indirect(&token));
            } else {
                cmds.push(token);
            }
        }
    }

    Ok(cmds)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Comma-join library paths in insertion order. Tags are carried in the
/// config for round-trip only and never appear on the command line.
fn joined_library_paths(config: &SubmitConfig) -> String {
    config
        .libraries
        .iter()
        .map(|lib| lib.path.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryEntry;
    use crate::vars::{IdentityResolver, MapVariables};

    fn base_config() -> SubmitConfig {
        SubmitConfig {
            job_kind: JobKind::NativeJar,
            master_url: "yarn-cluster".to_owned(),
            submit_tool_path: "/bin/submit".to_owned(),
            entry_point: "a.jar".to_owned(),
            entry_class: None,
            libraries: vec![],
            conf_params: vec![],
            driver_memory: None,
            executor_memory: None,
            raw_args: None,
            blocking: true,
            trigger_patterns: vec!["tracking URL:".to_owned()],
            poll_interval_sec: 5,
            log_level: None,
            log_file: None,
        }
    }

    fn build_plain(config: &SubmitConfig) -> Vec<String> {
        build(config, &MapVariables::new(), &IdentityResolver).unwrap()
    }

    #[test]
    fn build_is_deterministic() {
        let mut config = base_config();
        config.entry_class = Some("org.example.Main".to_owned());
        config.conf_params = vec!["spark.executor.cores=2".to_owned()];
        config.raw_args = Some("in.log 1000".to_owned());

        let first = build_plain(&config);
        let second = build_plain(&config);
        assert_eq!(first, second);
    }

    #[test]
    fn jar_submission_shape() {
        let mut config = base_config();
        config.entry_class = Some("org.X".to_owned());

        let cmds = build_plain(&config);
        assert_eq!(&cmds[..3], &["/bin/submit", "--master", "yarn-cluster"]);
        assert_eq!(&cmds[cmds.len() - 3..], &["--class", "org.X", "a.jar"]);
    }

    #[test]
    fn script_submission_uses_py_files() {
        let mut config = base_config();
        config.job_kind = JobKind::ScriptFile;
        config.entry_point = "job.py".to_owned();
        config.libraries = vec![
            LibraryEntry { path: "dep1.py".to_owned(), tag: String::new() },
            LibraryEntry { path: "dep2.py".to_owned(), tag: String::new() },
        ];

        let cmds = build_plain(&config);
        assert_eq!(
            &cmds[cmds.len() - 3..],
            &["--py-files", "dep1.py,dep2.py", "job.py"]
        );
        assert!(!cmds.contains(&"--class".to_owned()));
    }

    #[test]
    fn library_join_preserves_insertion_order() {
        let mut config = base_config();
        config.libraries = vec![
            LibraryEntry { path: "x.jar".to_owned(), tag: "e1".to_owned() },
            LibraryEntry { path: "y.jar".to_owned(), tag: "e2".to_owned() },
        ];

        let cmds = build_plain(&config);
        let jars = cmds.iter().position(|c| c == "--jars").unwrap();
        assert_eq!(cmds[jars + 1], "x.jar,y.jar");
    }

    #[test]
    fn conf_params_emitted_in_list_order() {
        let mut config = base_config();
        config.conf_params = vec!["a=1".to_owned(), "b=2".to_owned()];

        let cmds = build_plain(&config);
        let first = cmds.iter().position(|c| c == "--conf").unwrap();
        assert_eq!(&cmds[first..first + 4], &["--conf", "a=1", "--conf", "b=2"]);
    }

    #[test]
    fn memory_flags_emitted_when_set() {
        let mut config = base_config();
        config.driver_memory = Some("1g".to_owned());
        config.executor_memory = Some("2g".to_owned());

        let cmds = build_plain(&config);
        let d = cmds.iter().position(|c| c == "--driver-memory").unwrap();
        assert_eq!(cmds[d + 1], "1g");
        let e = cmds.iter().position(|c| c == "--executor-memory").unwrap();
        assert_eq!(cmds[e + 1], "2g");
    }

    #[test]
    fn blank_memory_values_are_omitted_entirely() {
        let mut config = base_config();
        config.driver_memory = Some(String::new());
        config.executor_memory = Some("  ".to_owned());

        let cmds = build_plain(&config);
        assert!(!cmds.contains(&"--driver-memory".to_owned()));
        assert!(!cmds.contains(&"--executor-memory".to_owned()));
        assert!(!cmds.contains(&String::new()));
    }

    #[test]
    fn blank_entry_class_is_omitted() {
        let mut config = base_config();
        config.entry_class = Some("   ".to_owned());

        let cmds = build_plain(&config);
        assert!(!cmds.contains(&"--class".to_owned()));
    }

    #[test]
    fn raw_args_are_tokenized_and_appended() {
        let mut config = base_config();
        config.raw_args = Some(r#"in.log "a b" 1000"#.to_owned());

        let cmds = build_plain(&config);
        assert_eq!(&cmds[cmds.len() - 3..], &["in.log", "a b", "1000"]);
    }

    #[test]
    fn unterminated_quote_in_raw_args_propagates() {
        let mut config = base_config();
        config.raw_args = Some("\"broken".to_owned());

        let err = build(&config, &MapVariables::new(), &IdentityResolver).unwrap_err();
        assert!(matches!(err, SubmitError::UnterminatedQuote { .. }));
    }

    #[test]
    fn variables_are_substituted_throughout() {
        let mut vars = MapVariables::new();
        vars.set("MASTER", "spark://host:7077");
        vars.set("MEM", "4g");

        let mut config = base_config();
        config.master_url = "${MASTER}".to_owned();
        config.driver_memory = Some("${MEM}".to_owned());

        let cmds = build(&config, &vars, &IdentityResolver).unwrap();
        assert!(cmds.contains(&"spark://host:7077".to_owned()));
        assert!(cmds.contains(&"4g".to_owned()));
    }

    struct PrefixStrippingResolver;

    impl PathResolver for PrefixStrippingResolver {
        fn resolve_indirect(&self, path: &str) -> String {
            match path.strip_prefix(INDIRECT_PATH_PREFIX) {
                Some(rest) => format!("hdfs://{rest}"),
                None => path.to_owned(),
            }
        }
    }

    #[test]
    fn indirect_entry_point_is_resolved() {
        let mut config = base_config();
        config.entry_point = "hc://cluster/a.jar".to_owned();

        let cmds = build(&config, &MapVariables::new(), &PrefixStrippingResolver).unwrap();
        assert_eq!(cmds.last().unwrap(), "hdfs://cluster/a.jar");
    }

    #[test]
    fn indirect_raw_arg_tokens_are_resolved_others_untouched() {
        let mut config = base_config();
        config.raw_args = Some("hc://cluster/in.log plain".to_owned());

        let cmds = build(&config, &MapVariables::new(), &PrefixStrippingResolver).unwrap();
        assert!(cmds.contains(&"hdfs://cluster/in.log".to_owned()));
        assert!(cmds.contains(&"plain".to_owned()));
    }

    #[test]
    fn empty_raw_arg_tokens_are_dropped() {
        let mut config = base_config();
        config.raw_args = Some(r#"a "" b"#.to_owned());

        let cmds = build_plain(&config);
        assert_eq!(&cmds[cmds.len() - 2..], &["a", "b"]);
    }
}
