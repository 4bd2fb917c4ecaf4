//! 配置管理模块
//!
//! Resolves application settings from namespaced environment variables,
//! optionally pre-populated from a root-level `.env` override file.

pub mod catalog;
pub mod env_file;
pub mod environment;
pub mod loader;
pub mod prefix;
pub mod render;
pub mod settings;
pub mod severity;
pub mod source;

pub use catalog::Setting;
pub use environment::Environment;
pub use loader::{ConfigResolver, TlsFallback};
pub use prefix::{EnvPrefix, environment_variable_prefix};
pub use settings::{MailSink, ResolvedSettings, SecretString, TlsStatus};
pub use severity::{Severity, severity};
pub use source::EnvSource;
