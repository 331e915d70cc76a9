/// Errors raised before or while supervising a submission run.
///
/// Validation variants are detected before any process is spawned, so they
/// carry no cleanup obligations. Everything that happens after spawn is
/// captured internally and folded into the `ExecutionResult` instead of
/// propagating (see `submit::run`).
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Submit tool path is blank or does not reference an executable file: {path}")]
    SubmitToolInvalid { path: String },

    #[error("Master URL must not be blank.")]
    MasterUrlBlank,

    #[error("No jar path configured for a jar submission.")]
    JarPathBlank,

    #[error("No script path configured for a script submission.")]
    ScriptPathBlank,

    #[error("Unterminated {quote} quote at byte {offset} in argument string")]
    UnterminatedQuote { quote: char, offset: usize },

    #[error("Built command line is empty")]
    EmptyCommandLine,

    #[error("Failed to spawn '{tool}': {detail}")]
    SpawnFailed { tool: String, detail: String },

    #[error("Failed to parse environment variable '{var}': {detail}")]
    ConfigEnvParseError { var: String, detail: String },
}
