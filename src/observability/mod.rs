//! 可观测性模块
//!
//! Wires resolved settings into a `tracing` subscriber: stderr output, a
//! size-rotated log file and, when configured, mail alerts.

pub mod mail;

use crate::config::settings::ResolvedSettings;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::path::PathBuf;
use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// 日志初始化错误
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("log directory {path} could not be created: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mail address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("mail worker could not be started: {0}")]
    MailWorker(#[source] std::io::Error),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the log writers alive.
///
/// On drop, queued alerts are handed to the mail server (bounded by
/// [`mail::SHUTDOWN_TIMEOUT`]) and pending file records are flushed.
#[must_use = "dropping the guard stops the log writers"]
pub struct LoggingGuard {
    mail: Option<mail::MailWorker>,
    _file: WorkerGuard,
}

impl LoggingGuard {
    pub fn mail_configured(&self) -> bool {
        self.mail.is_some()
    }

    /// Alerts discarded because the mail queue was full
    pub fn dropped_alerts(&self) -> usize {
        self.mail.as_ref().map_or(0, mail::MailWorker::dropped)
    }
}

/// Type-erased subscriber built from settings
pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

fn env_filter(service_name: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("info,{service_name}")))
}

// ===== Structured Logging =====

/// 初始化结构化日志
///
/// Plain stderr subscriber for tools that run before (or without)
/// resolved settings.
pub fn init_tracing(service_name: &str) -> Result<(), LoggingError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(service_name))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Installs the settings-driven subscriber as the global default.
pub fn init_logging(
    service_name: &str,
    settings: &ResolvedSettings,
) -> Result<LoggingGuard, LoggingError> {
    let (subscriber, guard) = build_subscriber(service_name, settings)?;
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(
        path = %settings.logging_file_base_path.display(),
        file_level = %settings.logging_file_level,
        mail_configured = guard.mail_configured(),
        "logging initialised"
    );
    Ok(guard)
}

/// Builds the settings-driven subscriber without installing it.
///
/// The file sink receives records at or above `logging_file_level`; the
/// mail sink, present only when [`ResolvedSettings::mail_sink`] is, receives
/// records at or above `logging_mail_level`.
pub fn build_subscriber(
    service_name: &str,
    settings: &ResolvedSettings,
) -> Result<(BoxedSubscriber, LoggingGuard), LoggingError> {
    let (file_writer, file_guard) = tracing_appender::non_blocking(rotating_file(settings)?);

    let mail_worker = match settings.mail_sink() {
        Some(sink) => {
            let mailer = mail::Mailer::from_sink(&sink)?;
            Some(mail::MailWorker::spawn(mailer.into_delivery())?)
        }
        None => None,
    };

    let subscriber = compose(
        service_name,
        settings,
        file_writer,
        mail_worker.as_ref().map(mail::MailWorker::layer),
    );
    Ok((
        subscriber,
        LoggingGuard {
            mail: mail_worker,
            _file: file_guard,
        },
    ))
}

/// Stacks stderr, file and optional mail layers with their level filters.
fn compose<W>(
    service_name: &str,
    settings: &ResolvedSettings,
    file_writer: W,
    mail_layer: Option<mail::MailLayer>,
) -> BoxedSubscriber
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter(service_name));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(settings.logging_file_level.level_filter());

    let mail_layer =
        mail_layer.map(|layer| layer.with_filter(settings.logging_mail_level.level_filter()));

    Box::new(
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .with(mail_layer),
    )
}

/// Size-rotated log file at `logging_file_base_path`.
///
/// Rotated files are numbered `.1`, `.2`, ... up to the backup count. With
/// a backup count of zero the file is never rotated.
pub fn rotating_file(settings: &ResolvedSettings) -> Result<FileRotate<AppendCount>, LoggingError> {
    let path = &settings.logging_file_base_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| LoggingError::LogDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let backups = settings.logging_file_backup_count as usize;
    let limit = if backups == 0 {
        ContentLimit::None
    } else {
        ContentLimit::Bytes(usize::try_from(settings.logging_file_max_bytes).unwrap_or(usize::MAX))
    };

    Ok(FileRotate::new(
        path,
        AppendCount::new(backups.max(1)),
        limit,
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::environment::Environment;
    use crate::config::settings::tests::sample;
    use crate::config::severity::Severity;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::mpsc;

    #[test]
    fn test_rotating_file_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = sample(Environment::Development);
        settings.logging_file_base_path = dir.path().join("logs/nested/app.log");

        let mut file = rotating_file(&settings).unwrap();
        file.write_all(b"hello\n").unwrap();
        file.flush().unwrap();

        let written = std::fs::read_to_string(&settings.logging_file_base_path).unwrap();
        assert_eq!(written, "hello\n");
    }

    #[test]
    fn test_rotating_file_rotates_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = sample(Environment::Development);
        settings.logging_file_base_path = dir.path().join("app.log");
        settings.logging_file_max_bytes = 8;
        settings.logging_file_backup_count = 2;

        let mut file = rotating_file(&settings).unwrap();
        for _ in 0..4 {
            file.write_all(b"12345678").unwrap();
        }
        file.flush().unwrap();

        assert!(dir.path().join("app.log.1").exists());
        assert!(!dir.path().join("app.log.3").exists());
    }

    #[test]
    fn test_file_sink_honours_file_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = sample(Environment::Production);
        settings.logging_file_base_path = dir.path().join("logs/app.log");
        settings.logging_file_level = Severity::Warning;

        let (subscriber, guard) = build_subscriber("envcfg", &settings).unwrap();
        assert!(!guard.mail_configured());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("routine heartbeat");
            tracing::warn!("disk nearly full");
            tracing::error!("disk full");
        });
        drop(guard);

        let written = std::fs::read_to_string(&settings.logging_file_base_path).unwrap();
        assert!(!written.contains("routine heartbeat"));
        assert!(written.contains("disk nearly full"));
        assert!(written.contains("disk full"));
    }

    #[test]
    fn test_mail_layer_receives_records_at_mail_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = sample(Environment::Production);
        settings.logging_file_base_path = dir.path().join("app.log");
        settings.logging_file_level = Severity::Debug;
        settings.logging_mail_level = Severity::Error;

        let (sender, receiver) = mpsc::sync_channel(8);
        let (file_writer, _file_guard) =
            tracing_appender::non_blocking(rotating_file(&settings).unwrap());
        let mail_layer = mail::MailLayer::new(sender, Arc::default());
        let subscriber = compose("envcfg", &settings, file_writer, Some(mail_layer));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("user signed in");
            tracing::warn!("slow query");
            tracing::error!(order = 7, "payment failed");
        });

        let messages: Vec<String> = receiver
            .try_iter()
            .filter_map(|command| match command {
                mail::MailCommand::Record(record) => Some(record.message),
                mail::MailCommand::Shutdown => None,
            })
            .collect();
        assert_eq!(messages, vec!["payment failed order=7"]);
    }
}
