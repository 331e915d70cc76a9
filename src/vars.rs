//! Collaborator seams owned outside the supervision core: variable
//! substitution and indirect-path resolution.
//!
//! The surrounding workflow engine owns the real variable space and the
//! cluster VFS; this module defines the traits the core consumes plus the
//! default implementations used by the CLI (process environment, identity
//! path resolution).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// The caller's variable space.
///
/// `resolve` expands `${NAME}` placeholders in config fields before they are
/// used; `variables` enumerates every visible variable so the supervisor can
/// copy them verbatim into the child process environment at spawn time.
pub trait VariableSpace: Send + Sync {
    fn resolve(&self, raw: &str) -> String;
    fn variables(&self) -> Vec<(String, String)>;
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"))
}

/// Variable space backed by an ordered map.
#[derive(Debug, Default, Clone)]
pub struct MapVariables {
    vars: BTreeMap<String, String>,
}

impl MapVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl VariableSpace for MapVariables {
    /// Expand `${NAME}` placeholders. Unknown names are left untouched so a
    /// misspelled placeholder is visible in the logged command line instead
    /// of silently collapsing to an empty string.
    fn resolve(&self, raw: &str) -> String {
        placeholder_re()
            .replace_all(raw, |caps: &regex::Captures<'_>| match self.vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_owned(),
            })
            .into_owned()
    }

    fn variables(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Rewrites an indirect cluster-path reference (`hc://...`) into the
/// concrete filesystem or URI path the submit tool can open.
pub trait PathResolver: Send + Sync {
    fn resolve_indirect(&self, path: &str) -> String;
}

/// Default resolver: paths pass through unchanged. Real alias resolution
/// lives in the surrounding suite's VFS layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

impl PathResolver for IdentityResolver {
    fn resolve_indirect(&self, path: &str) -> String {
        path.to_owned()
    }
}
