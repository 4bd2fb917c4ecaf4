//! Settings catalog
//!
//! Static table of every setting the resolver knows: the raw variable name,
//! whether it is required, its default and how its text is coerced.

use serde::Serialize;

/// Default size limit of the log file before rotation (5 MiB)
pub const DEFAULT_LOG_FILE_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Default number of rotated log files kept
pub const DEFAULT_LOG_FILE_BACKUP_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Setting {
    SecretKey,
    DatabaseUri,
    LoggingFileBasePath,
    LoggingFileLoggingLevel,
    LoggingFileMaxBytes,
    LoggingFileBackupCount,
    LoggingMailToAddresses,
    LoggingMailHost,
    LoggingMailLoggingLevel,
    LoggingMailFromAddress,
    LoggingMailSubject,
    SslEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional { default: Option<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// Used verbatim
    Text,
    /// Case-insensitive severity name
    Severity,
    /// Integer greater than zero
    PositiveInteger,
    /// Integer, zero allowed
    Count,
    /// Comma separated list, blank items dropped
    AddressList,
    /// Integer flag, zero disables
    TlsFlag,
}

impl Setting {
    pub const ALL: [Setting; 12] = [
        Self::SecretKey,
        Self::DatabaseUri,
        Self::LoggingFileBasePath,
        Self::LoggingFileLoggingLevel,
        Self::LoggingFileMaxBytes,
        Self::LoggingFileBackupCount,
        Self::LoggingMailToAddresses,
        Self::LoggingMailHost,
        Self::LoggingMailLoggingLevel,
        Self::LoggingMailFromAddress,
        Self::LoggingMailSubject,
        Self::SslEnabled,
    ];

    /// Name without prefix or environment infix
    pub const fn raw_name(self) -> &'static str {
        match self {
            Self::SecretKey => "SECRET_KEY",
            Self::DatabaseUri => "DATABASE_URI",
            Self::LoggingFileBasePath => "LOGGING_FILE_BASE_PATH",
            Self::LoggingFileLoggingLevel => "LOGGING_FILE_LOGGING_LEVEL",
            Self::LoggingFileMaxBytes => "LOGGING_FILE_MAX_BYTES",
            Self::LoggingFileBackupCount => "LOGGING_FILE_BACKUP_COUNT",
            Self::LoggingMailToAddresses => "LOGGING_MAIL_TO_ADDRESSES",
            Self::LoggingMailHost => "LOGGING_MAIL_HOST",
            Self::LoggingMailLoggingLevel => "LOGGING_MAIL_LOGGING_LEVEL",
            Self::LoggingMailFromAddress => "LOGGING_MAIL_FROM_ADDRESS",
            Self::LoggingMailSubject => "LOGGING_MAIL_SUBJECT",
            Self::SslEnabled => "SSL_ENABLED",
        }
    }

    pub const fn requirement(self) -> Requirement {
        match self {
            Self::SecretKey | Self::DatabaseUri | Self::LoggingFileBasePath => {
                Requirement::Required
            }
            Self::LoggingFileLoggingLevel | Self::LoggingMailLoggingLevel => {
                Requirement::Optional {
                    default: Some("ERROR"),
                }
            }
            Self::LoggingFileMaxBytes => Requirement::Optional {
                default: Some("5242880"),
            },
            Self::LoggingFileBackupCount => Requirement::Optional {
                default: Some("10"),
            },
            Self::SslEnabled => Requirement::Optional { default: Some("1") },
            Self::LoggingMailToAddresses
            | Self::LoggingMailHost
            | Self::LoggingMailFromAddress
            | Self::LoggingMailSubject => Requirement::Optional { default: None },
        }
    }

    pub const fn coercion(self) -> Coercion {
        match self {
            Self::LoggingFileLoggingLevel | Self::LoggingMailLoggingLevel => Coercion::Severity,
            Self::LoggingFileMaxBytes => Coercion::PositiveInteger,
            Self::LoggingFileBackupCount => Coercion::Count,
            Self::LoggingMailToAddresses => Coercion::AddressList,
            Self::SslEnabled => Coercion::TlsFlag,
            Self::SecretKey
            | Self::DatabaseUri
            | Self::LoggingFileBasePath
            | Self::LoggingMailHost
            | Self::LoggingMailFromAddress
            | Self::LoggingMailSubject => Coercion::Text,
        }
    }

    pub const fn is_required(self) -> bool {
        matches!(self.requirement(), Requirement::Required)
    }

    /// Value used when the variable is absent
    pub const fn default_value(self) -> Option<&'static str> {
        match self.requirement() {
            Requirement::Required => None,
            Requirement::Optional { default } => default,
        }
    }
}
