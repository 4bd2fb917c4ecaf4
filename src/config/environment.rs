//! Target environments and the variable-name infix each one selects.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Self::Development, Self::Testing, Self::Production];

    /// Segment inserted between the prefix and the raw setting name
    pub const fn infix(self) -> &'static str {
        match self {
            Self::Development => "DEV_",
            Self::Testing => "TEST_",
            Self::Production => "",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }

    /// Development and testing run with debugging enabled
    pub const fn is_debug(self) -> bool {
        !matches!(self, Self::Production)
    }

    pub const fn is_testing(self) -> bool {
        matches!(self, Self::Testing)
    }
}

impl FromStr for Environment {
    type Err = ConfigurationError;

    /// Names are matched exactly; `"Production"` or `"prod"` are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownEnvironment(s.to_string()))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("development", Environment::Development, "DEV_")]
    #[case("testing", Environment::Testing, "TEST_")]
    #[case("production", Environment::Production, "")]
    fn test_known_names_parse(
        #[case] name: &str,
        #[case] expected: Environment,
        #[case] infix: &str,
    ) {
        let env: Environment = name.parse().unwrap();
        assert_eq!(env, expected);
        assert_eq!(env.infix(), infix);
        assert_eq!(env.to_string(), name);
    }

    #[rstest]
    #[case("")]
    #[case("prod")]
    #[case("Production")]
    #[case(" testing")]
    #[case("staging")]
    fn test_unknown_names_rejected(#[case] name: &str) {
        let err = name.parse::<Environment>().unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEnvironment(n) if n == name));
    }

    #[test]
    fn test_debug_flags() {
        assert!(Environment::Development.is_debug());
        assert!(Environment::Testing.is_debug());
        assert!(!Environment::Production.is_debug());
        assert!(Environment::Testing.is_testing());
        assert!(!Environment::Development.is_testing());
    }
}
