//! 错误处理模块
//!
//! Defines the single error kind raised while resolving settings. Every
//! variant is meant to abort process startup; nothing here is retried.

use std::path::PathBuf;
use thiserror::Error;

/// Settings resolution error
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Environment name other than development, testing or production
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// A required variable is absent from the environment source
    #[error("missing required variable: {0}")]
    MissingVariable(String),

    /// Severity name outside the fixed enumeration
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    /// A present value failed its coercion
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// The prefix declaration file is missing or unreadable
    #[error(
        "the environment variable prefix couldn't be read from {path}; this file must contain \
         a single line with the prefix: {source}"
    )]
    PrefixUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prefix declaration holds nothing but whitespace and underscores
    #[error("the environment variable prefix declared in {path} is empty")]
    EmptyPrefix { path: PathBuf },

    /// The override file exists but could not be read
    #[error("override file {path} could not be read: {source}")]
    OverrideUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Name of the variable the error refers to, when there is one
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::MissingVariable(name) => Some(name.as_str()),
            Self::InvalidValue { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConfigurationError>;
