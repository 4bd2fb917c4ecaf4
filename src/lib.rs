//! envcfg - 环境变量驱动的配置解析
//!
//! Resolves the settings of a server-rendered web application from
//! namespaced environment variables and wires them into logging.

pub mod config;
pub mod error;
pub mod observability;

pub use config::{ConfigResolver, Environment, ResolvedSettings};
pub use error::{ConfigurationError, Result};
