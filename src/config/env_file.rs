//! Override file parsing
//!
//! The optional `.env` file at the project root holds `KEY=VALUE` lines.
//! A line is accepted only when it splits on `=` into exactly two parts;
//! anything else (comments, blank lines, values containing `=`) is skipped.
//! There is no quoting, escaping or multi-line support.

use crate::error::{ConfigurationError, Result};
use std::path::Path;

/// Override file name, relative to the project root
pub const OVERRIDE_FILE_NAME: &str = ".env";

/// Parses override text into key/value pairs, in file order.
pub fn parse_env_lines(text: &str) -> Vec<(String, String)> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.split('=');
    let key = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((key.trim().to_string(), value.trim().to_string()))
}

/// Loads the override file at `path`.
///
/// An absent file yields no pairs. A file that exists but cannot be read is
/// an error.
pub fn load_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no override file");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ConfigurationError::OverrideUnreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let pairs = parse_env_lines(&text);
    tracing::debug!(
        path = %path.display(),
        accepted = pairs.len(),
        skipped = text.lines().count() - pairs.len(),
        "override file parsed"
    );
    Ok(pairs)
}
