//! Override file rendering
//!
//! Writes resolved settings back out as override-file text, so a host can be
//! provisioned with a `.env` that reproduces them. Lines are sorted by
//! variable name and absent optional values are left out.

use crate::config::catalog::Setting;
use crate::config::prefix::EnvPrefix;
use crate::config::settings::ResolvedSettings;
use crate::error::{ConfigurationError, Result};

/// Renders `settings` for its own environment under `prefix`.
///
/// Values that the override parser could not read back unchanged are
/// rejected: anything containing `=` or a line break, anything with
/// surrounding whitespace, and recipient lists whose items are blank,
/// padded or contain a comma.
pub fn render_env_file(settings: &ResolvedSettings, prefix: &EnvPrefix) -> Result<String> {
    let env = settings.environment;
    let mut lines = Vec::with_capacity(Setting::ALL.len());

    for setting in Setting::ALL {
        let name = format!("{prefix}{}{}", env.infix(), setting.raw_name());
        if setting == Setting::LoggingMailToAddresses {
            if let Some(reason) = settings
                .logging_mail_to_addresses
                .iter()
                .find_map(|a| unrepresentable_address(a))
            {
                return Err(ConfigurationError::invalid(name, reason));
            }
        }
        let Some(value) = rendered_value(settings, setting) else {
            continue;
        };
        if let Some(reason) = unrepresentable(&value) {
            return Err(ConfigurationError::invalid(name, reason));
        }
        lines.push(format!("{name}={value}"));
    }

    lines.sort();
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn unrepresentable(value: &str) -> Option<&'static str> {
    if value.contains(['=', '\n', '\r']) {
        Some("value cannot be written to an override file")
    } else if value.trim() != value {
        Some("surrounding whitespace would be trimmed when read back")
    } else {
        None
    }
}

fn unrepresentable_address(address: &str) -> Option<&'static str> {
    if address.is_empty() {
        Some("blank recipient would be dropped when read back")
    } else if address.contains(',') {
        Some("recipient containing a comma would be split when read back")
    } else if address.trim() != address {
        Some("surrounding whitespace in a recipient would be trimmed when read back")
    } else {
        None
    }
}

fn rendered_value(settings: &ResolvedSettings, setting: Setting) -> Option<String> {
    match setting {
        Setting::SecretKey => Some(settings.secret_key.expose().to_string()),
        Setting::DatabaseUri => Some(settings.database_uri.clone()),
        Setting::LoggingFileBasePath => {
            Some(settings.logging_file_base_path.display().to_string())
        }
        Setting::LoggingFileLoggingLevel => Some(settings.logging_file_level.to_string()),
        Setting::LoggingFileMaxBytes => Some(settings.logging_file_max_bytes.to_string()),
        Setting::LoggingFileBackupCount => Some(settings.logging_file_backup_count.to_string()),
        Setting::LoggingMailToAddresses => Some(settings.logging_mail_to_addresses.join(","))
            .filter(|joined| !joined.is_empty()),
        Setting::LoggingMailHost => settings.logging_mail_host.clone(),
        Setting::LoggingMailLoggingLevel => Some(settings.logging_mail_level.to_string()),
        Setting::LoggingMailFromAddress => settings.logging_mail_from_address.clone(),
        Setting::LoggingMailSubject => settings.logging_mail_subject.clone(),
        Setting::SslEnabled => Some(settings.tls_enforced.flag().to_string()),
    }
}
