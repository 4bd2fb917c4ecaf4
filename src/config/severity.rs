//! Logging severity levels
//!
//! The fixed six-member enumeration used to filter which records reach a
//! sink. Names are matched case-insensitively; anything outside the
//! enumeration is an error rather than a fallback.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    NotSet,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Info,
        Self::Debug,
        Self::NotSet,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::NotSet => "NOTSET",
        }
    }

    /// Numeric level, higher is more severe
    pub const fn value(self) -> u8 {
        match self {
            Self::Critical => 50,
            Self::Error => 40,
            Self::Warning => 30,
            Self::Info => 20,
            Self::Debug => 10,
            Self::NotSet => 0,
        }
    }

    /// Threshold filter for a `tracing` layer.
    ///
    /// `tracing` has no level above ERROR, so CRITICAL shares it. NOTSET
    /// lets every record through.
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Critical | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::NotSet => LevelFilter::TRACE,
        }
    }
}

/// Case-insensitive lookup of a severity name
pub fn severity(name: &str) -> Result<Severity, ConfigurationError> {
    let wanted = name.trim();
    Severity::ALL
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ConfigurationError::UnknownSeverity(name.to_string()))
}

impl FromStr for Severity {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        severity(s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
