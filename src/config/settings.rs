//! Resolved settings record
//!
//! Produced once per resolution call and never mutated afterwards.

use crate::config::environment::Environment;
use crate::config::severity::Severity;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Session-signing key. Redacted in `Debug` and `Serialize` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(\"***\")")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// Whether plain HTTP requests are redirected to HTTPS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsStatus {
    Enabled,
    Disabled,
}

impl TlsStatus {
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Integer form used in override files
    pub const fn flag(self) -> u8 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 0,
        }
    }
}

/// 解析后的应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSettings {
    /// Environment the values were resolved for
    pub environment: Environment,
    pub secret_key: SecretString,
    /// Connection string, handed untouched to the data-access layer
    pub database_uri: String,
    pub logging_file_base_path: PathBuf,
    pub logging_file_level: Severity,
    /// Rotation threshold in bytes, always positive
    pub logging_file_max_bytes: u64,
    pub logging_file_backup_count: u32,
    pub logging_mail_to_addresses: Vec<String>,
    pub logging_mail_host: Option<String>,
    pub logging_mail_from_address: Option<String>,
    pub logging_mail_subject: Option<String>,
    pub logging_mail_level: Severity,
    pub tls_enforced: TlsStatus,
}

/// Mail sink parameters, present only when the sink is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailSink<'a> {
    pub host: &'a str,
    pub to_addresses: &'a [String],
    pub from_address: Option<&'a str>,
    pub subject: Option<&'a str>,
    pub level: Severity,
}

impl ResolvedSettings {
    /// The mail sink is configured only when a non-empty host and at least
    /// one recipient are present. Anything less disables it without error.
    pub fn mail_sink(&self) -> Option<MailSink<'_>> {
        let host = self.logging_mail_host.as_deref().filter(|h| !h.is_empty())?;
        if self.logging_mail_to_addresses.is_empty() {
            return None;
        }
        Some(MailSink {
            host,
            to_addresses: &self.logging_mail_to_addresses,
            from_address: self.logging_mail_from_address.as_deref(),
            subject: self.logging_mail_subject.as_deref(),
            level: self.logging_mail_level,
        })
    }

    pub fn mail_configured(&self) -> bool {
        self.mail_sink().is_some()
    }

    /// HTTPS redirection applies outside debug environments only
    pub fn redirects_to_https(&self) -> bool {
        self.tls_enforced.is_enabled() && !self.environment.is_debug()
    }
}
