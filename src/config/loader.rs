use crate::config::catalog::{Coercion, Setting};
use crate::config::env_file::{OVERRIDE_FILE_NAME, load_env_file};
use crate::config::environment::Environment;
use crate::config::prefix::{EnvPrefix, environment_variable_prefix};
use crate::config::settings::{ResolvedSettings, SecretString, TlsStatus};
use crate::config::severity::{Severity, severity};
use crate::config::source::EnvSource;
use crate::error::{ConfigurationError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What to do when the TLS flag is present but not an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsFallback {
    /// Treat the value as enabled
    #[default]
    Enable,
    /// Fail resolution with `InvalidValue`
    Reject,
}

/// 配置解析器
///
/// Turns an environment name and an [`EnvSource`] into [`ResolvedSettings`].
/// Variable names are `prefix + infix + raw name`; required settings fail
/// loudly, optional ones fall back to their catalog default.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    prefix: EnvPrefix,
    source: EnvSource,
    tls_fallback: TlsFallback,
}

impl ConfigResolver {
    pub fn new(prefix: EnvPrefix, source: EnvSource) -> Self {
        Self {
            prefix,
            source,
            tls_fallback: TlsFallback::default(),
        }
    }

    /// 从项目根目录加载
    ///
    /// Reads `<root>/env_var_prefix`, snapshots the process environment and
    /// layers `<root>/.env` on top of it.
    pub fn from_root(root: &Path) -> Result<Self> {
        Self::from_root_with_source(root, EnvSource::from_process())
    }

    /// Same as [`ConfigResolver::from_root`], starting from `source` instead
    /// of the process environment.
    pub fn from_root_with_source(root: &Path, mut source: EnvSource) -> Result<Self> {
        let prefix = environment_variable_prefix(root)?;
        let overrides = load_env_file(&override_file_path(root))?;
        let applied = source.apply_overrides(overrides);
        if applied > 0 {
            tracing::debug!(count = applied, "applied override file entries");
        }
        Ok(Self::new(prefix, source))
    }

    pub fn with_tls_fallback(mut self, policy: TlsFallback) -> Self {
        self.tls_fallback = policy;
        self
    }

    pub fn prefix(&self) -> &EnvPrefix {
        &self.prefix
    }

    pub fn source(&self) -> &EnvSource {
        &self.source
    }

    /// Full variable name consulted for `setting` in `env`
    pub fn variable_name(&self, env: Environment, setting: Setting) -> String {
        format!("{}{}{}", self.prefix, env.infix(), setting.raw_name())
    }

    /// Resolves settings for an environment given by name.
    pub fn resolve(&self, environment_name: &str) -> Result<ResolvedSettings> {
        let env: Environment = environment_name.parse()?;
        self.resolve_environment(env)
    }

    pub fn resolve_environment(&self, env: Environment) -> Result<ResolvedSettings> {
        let raw = self.lookup_all(env)?;
        let mut values = CoercedValues::default();
        for (setting, name, value) in raw {
            let coerced = self.coerce(setting, &name, value)?;
            values.insert(setting, name, coerced);
        }

        let settings = ResolvedSettings {
            environment: env,
            secret_key: SecretString::new(values.text(Setting::SecretKey)?),
            database_uri: values.text(Setting::DatabaseUri)?,
            logging_file_base_path: PathBuf::from(values.text(Setting::LoggingFileBasePath)?),
            logging_file_level: values.severity(Setting::LoggingFileLoggingLevel)?,
            logging_file_max_bytes: values.integer(Setting::LoggingFileMaxBytes)?,
            logging_file_backup_count: values.count(Setting::LoggingFileBackupCount)?,
            logging_mail_to_addresses: values.addresses(Setting::LoggingMailToAddresses)?,
            logging_mail_host: values.optional_text(Setting::LoggingMailHost)?,
            logging_mail_from_address: values.optional_text(Setting::LoggingMailFromAddress)?,
            logging_mail_subject: values.optional_text(Setting::LoggingMailSubject)?,
            logging_mail_level: values.severity(Setting::LoggingMailLoggingLevel)?,
            tls_enforced: values.tls(Setting::SslEnabled)?,
        };

        tracing::info!(
            environment = %env,
            file_level = %settings.logging_file_level,
            mail_configured = settings.mail_configured(),
            tls = ?settings.tls_enforced,
            "settings resolved"
        );
        Ok(settings)
    }

    /// Looks up every catalog entry, applying defaults. Fails on the first
    /// absent required variable, before any value is coerced.
    fn lookup_all(&self, env: Environment) -> Result<Vec<(Setting, String, Option<String>)>> {
        let mut values = Vec::with_capacity(Setting::ALL.len());
        for setting in Setting::ALL {
            let name = self.variable_name(env, setting);
            let value = match self.source.get(&name) {
                Some(v) => Some(v.to_string()),
                None if setting.is_required() => {
                    tracing::warn!(variable = %name, "required variable not set");
                    return Err(ConfigurationError::MissingVariable(name));
                }
                None => {
                    tracing::debug!(variable = %name, "variable not set, using default");
                    setting.default_value().map(str::to_string)
                }
            };
            values.push((setting, name, value));
        }
        Ok(values)
    }

    /// Applies the coercion the catalog declares for `setting`.
    fn coerce(&self, setting: Setting, name: &str, value: Option<String>) -> Result<Value> {
        let present = |value: Option<String>| {
            value.ok_or_else(|| ConfigurationError::MissingVariable(name.to_string()))
        };
        match setting.coercion() {
            Coercion::Text => Ok(Value::Text(value)),
            Coercion::AddressList => Ok(Value::Addresses(
                value.as_deref().map(split_addresses).unwrap_or_default(),
            )),
            Coercion::TlsFlag => self.tls_status(name, value).map(Value::Tls),
            Coercion::Severity => severity(&present(value)?).map(Value::Severity),
            Coercion::PositiveInteger => {
                let value = present(value)?;
                match value.trim().parse::<u64>() {
                    Ok(0) => Err(ConfigurationError::invalid(name, "must be greater than zero")),
                    Ok(n) => Ok(Value::Integer(n)),
                    Err(e) => Err(ConfigurationError::invalid(
                        name,
                        format!("expected a positive integer, got {value:?}: {e}"),
                    )),
                }
            }
            Coercion::Count => {
                let value = present(value)?;
                value.trim().parse::<u32>().map(Value::Count).map_err(|e| {
                    ConfigurationError::invalid(
                        name,
                        format!("expected a non-negative integer, got {value:?}: {e}"),
                    )
                })
            }
        }
    }

    fn tls_status(&self, name: &str, value: Option<String>) -> Result<TlsStatus> {
        let Some(value) = value else {
            return Ok(TlsStatus::Enabled);
        };
        match integer_is_nonzero(&value) {
            Some(false) => Ok(TlsStatus::Disabled),
            Some(true) => Ok(TlsStatus::Enabled),
            None => match self.tls_fallback {
                TlsFallback::Enable => {
                    tracing::warn!(
                        variable = %name,
                        value = %value,
                        "unparseable TLS flag, keeping TLS enabled"
                    );
                    Ok(TlsStatus::Enabled)
                }
                TlsFallback::Reject => Err(ConfigurationError::invalid(
                    name,
                    format!("expected an integer flag, got {value:?}"),
                )),
            },
        }
    }
}

/// Coerced form of one catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Text(Option<String>),
    Severity(Severity),
    Integer(u64),
    Count(u32),
    Addresses(Vec<String>),
    Tls(TlsStatus),
}

/// Coerced values keyed by setting, drained while building the record
#[derive(Default)]
struct CoercedValues {
    values: HashMap<Setting, (String, Value)>,
}

impl CoercedValues {
    fn insert(&mut self, setting: Setting, name: String, value: Value) {
        self.values.insert(setting, (name, value));
    }

    fn take(&mut self, setting: Setting) -> Result<(String, Value)> {
        self.values.remove(&setting).ok_or_else(|| {
            ConfigurationError::invalid(setting.raw_name(), "setting missing from catalog")
        })
    }

    fn mismatch(name: String, value: &Value) -> ConfigurationError {
        ConfigurationError::invalid(name, format!("catalog coercion produced {value:?}"))
    }

    fn text(&mut self, setting: Setting) -> Result<String> {
        match self.take(setting)? {
            (_, Value::Text(Some(v))) => Ok(v),
            (name, Value::Text(None)) => Err(ConfigurationError::MissingVariable(name)),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }

    fn optional_text(&mut self, setting: Setting) -> Result<Option<String>> {
        match self.take(setting)? {
            (_, Value::Text(v)) => Ok(v),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }

    fn severity(&mut self, setting: Setting) -> Result<Severity> {
        match self.take(setting)? {
            (_, Value::Severity(v)) => Ok(v),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }

    fn integer(&mut self, setting: Setting) -> Result<u64> {
        match self.take(setting)? {
            (_, Value::Integer(v)) => Ok(v),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }

    fn count(&mut self, setting: Setting) -> Result<u32> {
        match self.take(setting)? {
            (_, Value::Count(v)) => Ok(v),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }

    fn addresses(&mut self, setting: Setting) -> Result<Vec<String>> {
        match self.take(setting)? {
            (_, Value::Addresses(v)) => Ok(v),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }

    fn tls(&mut self, setting: Setting) -> Result<TlsStatus> {
        match self.take(setting)? {
            (_, Value::Tls(v)) => Ok(v),
            (name, other) => Err(Self::mismatch(name, &other)),
        }
    }
}

/// Reads an integer literal of any magnitude: optional sign, then digits
/// with single underscores allowed between them. Returns whether it is
/// non-zero, or `None` when the text is not an integer.
fn integer_is_nonzero(text: &str) -> Option<bool> {
    let text = text.trim();
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    let well_formed = !digits.is_empty()
        && !digits.starts_with('_')
        && !digits.ends_with('_')
        && !digits.contains("__")
        && digits.chars().all(|c| c.is_ascii_digit() || c == '_');
    well_formed.then(|| digits.chars().any(|c| c.is_ascii_digit() && c != '0'))
}

/// Splits a comma separated recipient list, dropping blank items
pub fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Path of the override file under `root`
pub fn override_file_path(root: &Path) -> PathBuf {
    root.join(OVERRIDE_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn prefix() -> EnvPrefix {
        EnvPrefix::parse("MYAPP").unwrap()
    }

    fn base_source(infix: &str) -> EnvSource {
        EnvSource::from_pairs([
            (format!("MYAPP_{infix}SECRET_KEY"), "abc123".to_string()),
            (format!("MYAPP_{infix}DATABASE_URI"), "sqlite://test".to_string()),
            (
                format!("MYAPP_{infix}LOGGING_FILE_BASE_PATH"),
                "/tmp/app.log".to_string(),
            ),
        ])
    }

    #[test]
    fn test_development_defaults() {
        let resolver = ConfigResolver::new(prefix(), base_source("DEV_"));
        let settings = resolver.resolve("development").unwrap();

        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.secret_key.expose(), "abc123");
        assert_eq!(settings.database_uri, "sqlite://test");
        assert_eq!(settings.logging_file_base_path, PathBuf::from("/tmp/app.log"));
        assert_eq!(settings.logging_file_max_bytes, 5_242_880);
        assert_eq!(settings.logging_file_backup_count, 10);
        assert_eq!(settings.logging_file_level, Severity::Error);
        assert_eq!(settings.logging_mail_level, Severity::Error);
        assert!(settings.logging_mail_to_addresses.is_empty());
        assert_eq!(settings.logging_mail_host, None);
        assert_eq!(settings.tls_enforced, TlsStatus::Enabled);
    }

    #[rstest]
    #[case("development", "DEV_")]
    #[case("testing", "TEST_")]
    #[case("production", "")]
    fn test_each_environment_uses_its_infix(#[case] name: &str, #[case] infix: &str) {
        let resolver = ConfigResolver::new(prefix(), base_source(infix));
        assert!(resolver.resolve(name).is_ok());
    }

    #[test]
    fn test_other_environment_variables_are_not_consulted() {
        let resolver = ConfigResolver::new(prefix(), base_source("DEV_"));
        let err = resolver.resolve("production").unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingVariable(ref n) if n == "MYAPP_SECRET_KEY"));
    }

    #[rstest]
    #[case("staging")]
    #[case("")]
    #[case("DEVELOPMENT")]
    fn test_unknown_environment(#[case] name: &str) {
        let resolver = ConfigResolver::new(prefix(), base_source("DEV_"));
        let err = resolver.resolve(name).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEnvironment(_)));
    }

    #[rstest]
    #[case("SECRET_KEY")]
    #[case("DATABASE_URI")]
    #[case("LOGGING_FILE_BASE_PATH")]
    fn test_missing_required_fails(#[case] raw: &str) {
        let mut source = base_source("TEST_");
        let name = format!("MYAPP_TEST_{raw}");
        source.remove(&name);

        let resolver = ConfigResolver::new(prefix(), source);
        let err = resolver.resolve("testing").unwrap_err();
        assert_eq!(err.variable(), Some(name.as_str()));
        assert_eq!(err.to_string(), format!("missing required variable: {name}"));
    }

    #[test]
    fn test_empty_required_value_counts_as_present() {
        let mut source = base_source("DEV_");
        source.set("MYAPP_DEV_SECRET_KEY", "");
        let settings = ConfigResolver::new(prefix(), source)
            .resolve("development")
            .unwrap();
        assert_eq!(settings.secret_key.expose(), "");
    }

    #[test]
    fn test_optional_values_are_coerced() {
        let mut source = base_source("");
        source.set("MYAPP_LOGGING_FILE_LOGGING_LEVEL", "warning");
        source.set("MYAPP_LOGGING_FILE_MAX_BYTES", " 1024 ");
        source.set("MYAPP_LOGGING_FILE_BACKUP_COUNT", "0");
        source.set("MYAPP_LOGGING_MAIL_TO_ADDRESSES", "a@x.org, b@x.org ,,");
        source.set("MYAPP_LOGGING_MAIL_HOST", "smtp.x.org");
        source.set("MYAPP_LOGGING_MAIL_LOGGING_LEVEL", "Critical");
        source.set("MYAPP_LOGGING_MAIL_FROM_ADDRESS", "app@x.org");
        source.set("MYAPP_LOGGING_MAIL_SUBJECT", "App failure");
        source.set("MYAPP_SSL_ENABLED", "0");

        let settings = ConfigResolver::new(prefix(), source)
            .resolve("production")
            .unwrap();

        assert_eq!(settings.logging_file_level, Severity::Warning);
        assert_eq!(settings.logging_file_max_bytes, 1024);
        assert_eq!(settings.logging_file_backup_count, 0);
        assert_eq!(settings.logging_mail_to_addresses, vec!["a@x.org", "b@x.org"]);
        assert_eq!(settings.logging_mail_host.as_deref(), Some("smtp.x.org"));
        assert_eq!(settings.logging_mail_level, Severity::Critical);
        assert_eq!(settings.logging_mail_from_address.as_deref(), Some("app@x.org"));
        assert_eq!(settings.logging_mail_subject.as_deref(), Some("App failure"));
        assert_eq!(settings.tls_enforced, TlsStatus::Disabled);
        assert!(settings.mail_configured());
    }

    #[test]
    fn test_unknown_severity_is_an_error() {
        let mut source = base_source("DEV_");
        source.set("MYAPP_DEV_LOGGING_MAIL_LOGGING_LEVEL", "VERBOSE");
        let err = ConfigResolver::new(prefix(), source)
            .resolve("development")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownSeverity(ref n) if n == "VERBOSE"));
    }

    #[rstest]
    #[case("LOGGING_FILE_MAX_BYTES", "0")]
    #[case("LOGGING_FILE_MAX_BYTES", "-5")]
    #[case("LOGGING_FILE_MAX_BYTES", "5MB")]
    #[case("LOGGING_FILE_BACKUP_COUNT", "-1")]
    #[case("LOGGING_FILE_BACKUP_COUNT", "ten")]
    fn test_bad_integers_are_rejected(#[case] raw: &str, #[case] value: &str) {
        let mut source = base_source("DEV_");
        let name = format!("MYAPP_DEV_{raw}");
        source.set(name.clone(), value);
        let err = ConfigResolver::new(prefix(), source)
            .resolve("development")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
        assert_eq!(err.variable(), Some(name.as_str()));
    }

    #[rstest]
    #[case("1", TlsStatus::Enabled)]
    #[case("2", TlsStatus::Enabled)]
    #[case("-1", TlsStatus::Enabled)]
    #[case(" 0 ", TlsStatus::Disabled)]
    #[case("no", TlsStatus::Enabled)]
    #[case("", TlsStatus::Enabled)]
    fn test_tls_flag_lenient(#[case] value: &str, #[case] expected: TlsStatus) {
        let mut source = base_source("DEV_");
        source.set("MYAPP_DEV_SSL_ENABLED", value);
        let settings = ConfigResolver::new(prefix(), source)
            .resolve("development")
            .unwrap();
        assert_eq!(settings.tls_enforced, expected);
    }

    #[test]
    fn test_tls_flag_strict_rejects_garbage() {
        let mut source = base_source("DEV_");
        source.set("MYAPP_DEV_SSL_ENABLED", "yes");
        let resolver =
            ConfigResolver::new(prefix(), source).with_tls_fallback(TlsFallback::Reject);
        let err = resolver.resolve("development").unwrap_err();
        assert_eq!(err.variable(), Some("MYAPP_DEV_SSL_ENABLED"));
    }

    #[test]
    fn test_tls_flag_strict_still_defaults_when_absent() {
        let resolver = ConfigResolver::new(prefix(), base_source("DEV_"))
            .with_tls_fallback(TlsFallback::Reject);
        let settings = resolver.resolve("development").unwrap();
        assert_eq!(settings.tls_enforced, TlsStatus::Enabled);
    }

    #[test]
    fn test_mail_sink_missing_host_is_not_an_error() {
        let mut source = base_source("DEV_");
        source.set("MYAPP_DEV_LOGGING_MAIL_TO_ADDRESSES", "ops@example.com");
        let settings = ConfigResolver::new(prefix(), source)
            .resolve("development")
            .unwrap();
        assert_eq!(settings.logging_mail_to_addresses, vec!["ops@example.com"]);
        assert!(!settings.mail_configured());
    }

    #[test]
    fn test_variable_name() {
        let resolver = ConfigResolver::new(prefix(), EnvSource::new());
        assert_eq!(
            resolver.variable_name(Environment::Testing, Setting::LoggingFileMaxBytes),
            "MYAPP_TEST_LOGGING_FILE_MAX_BYTES"
        );
        assert_eq!(
            resolver.variable_name(Environment::Production, Setting::SslEnabled),
            "MYAPP_SSL_ENABLED"
        );
    }

    #[rstest]
    #[case("0", Some(false))]
    #[case("-000", Some(false))]
    #[case("+0_0", Some(false))]
    #[case("1", Some(true))]
    #[case("99999999999999999999", Some(true))]
    #[case("-99999999999999999999", Some(true))]
    #[case("1_000", Some(true))]
    #[case("", None)]
    #[case("-", None)]
    #[case("1__0", None)]
    #[case("_1", None)]
    #[case("1.0", None)]
    #[case("0x1", None)]
    fn test_integer_literals(#[case] text: &str, #[case] expected: Option<bool>) {
        assert_eq!(integer_is_nonzero(text), expected);
    }

    #[test]
    fn test_huge_tls_flag_is_enabled_under_strict_policy() {
        let mut source = base_source("");
        source.set("MYAPP_SSL_ENABLED", "99999999999999999999");
        let settings = ConfigResolver::new(prefix(), source)
            .with_tls_fallback(TlsFallback::Reject)
            .resolve("production")
            .unwrap();
        assert_eq!(settings.tls_enforced, TlsStatus::Enabled);
    }

    #[test]
    fn test_every_catalog_coercion_yields_its_value_shape() {
        let resolver = ConfigResolver::new(prefix(), EnvSource::new());
        for setting in Setting::ALL {
            let sample = match setting.coercion() {
                Coercion::Text | Coercion::AddressList => "x@example.org",
                Coercion::Severity => "info",
                Coercion::PositiveInteger | Coercion::Count | Coercion::TlsFlag => "7",
            };
            let value = resolver
                .coerce(setting, setting.raw_name(), Some(sample.to_string()))
                .unwrap();
            let shape_matches = match (setting.coercion(), &value) {
                (Coercion::Text, Value::Text(Some(_)))
                | (Coercion::AddressList, Value::Addresses(_))
                | (Coercion::Severity, Value::Severity(Severity::Info))
                | (Coercion::PositiveInteger, Value::Integer(7))
                | (Coercion::Count, Value::Count(7))
                | (Coercion::TlsFlag, Value::Tls(TlsStatus::Enabled)) => true,
                _ => false,
            };
            assert!(shape_matches, "{setting:?} coerced to {value:?}");
        }
    }

    #[rstest]
    #[case("", vec![])]
    #[case(" , ", vec![])]
    #[case("a@x.org", vec!["a@x.org"])]
    #[case("a@x.org,b@x.org", vec!["a@x.org", "b@x.org"])]
    fn test_split_addresses(#[case] value: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_addresses(value), expected);
    }
}
