//! Environment variable prefix
//!
//! Every variable this crate reads is namespaced by a project prefix
//! declared in a root-level file named `env_var_prefix`.

use crate::error::{ConfigurationError, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// File holding the prefix declaration, relative to the project root
pub const PREFIX_FILE_NAME: &str = "env_var_prefix";

/// Normalized prefix: non-empty, no leading underscore, one trailing underscore
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EnvPrefix(String);

impl EnvPrefix {
    /// Normalizes a raw declaration. Returns `None` when nothing but
    /// whitespace and underscores remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let core = raw.trim().trim_matches('_');
        if core.is_empty() {
            return None;
        }
        Some(Self(format!("{core}_")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the prefix declared in `<root>/env_var_prefix`.
///
/// A missing or unreadable file is fatal: every other lookup depends on it.
pub fn environment_variable_prefix(root: &Path) -> Result<EnvPrefix> {
    let path = root.join(PREFIX_FILE_NAME);
    let content = std::fs::read_to_string(&path).map_err(|source| {
        ConfigurationError::PrefixUnreadable {
            path: path.clone(),
            source,
        }
    })?;

    let prefix = EnvPrefix::parse(&content).ok_or(ConfigurationError::EmptyPrefix { path })?;
    tracing::debug!(prefix = %prefix, "environment variable prefix loaded");
    Ok(prefix)
}
