//! Mapper configuration via `widemap.toml`
//!
//! Every field is optional in the file; missing fields take their defaults.
//! Values are validated eagerly on load.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use widemap_core::{Error, Result};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "widemap.toml";

/// Tunables for planning, paging and transactions
///
/// # Example
///
/// ```toml
/// transaction_timeout_ms = 60000
/// default_page_limit = 100
/// max_page_limit = 5000
/// initial_version = 1
/// max_cursor_len = 8192
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Wall-clock lifetime of a transaction, in milliseconds
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
    /// Page size when a request does not set one
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,
    /// Larger requested limits are clamped to this
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: usize,
    /// Version written on insert, and on update of a row without one
    #[serde(default = "default_initial_version")]
    pub initial_version: i64,
    /// Longest cursor token accepted before decoding
    #[serde(default = "default_max_cursor_len")]
    pub max_cursor_len: usize,
}

fn default_transaction_timeout_ms() -> u64 {
    60_000
}

fn default_page_limit() -> usize {
    100
}

fn default_max_page_limit() -> usize {
    5_000
}

fn default_initial_version() -> i64 {
    1
}

fn default_max_cursor_len() -> usize {
    8_192
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: default_transaction_timeout_ms(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
            initial_version: default_initial_version(),
            max_cursor_len: default_max_cursor_len(),
        }
    }
}

impl MapperConfig {
    /// Transaction timeout as a `Duration`
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.transaction_timeout_ms == 0 {
            return Err(Error::Config("transaction_timeout_ms must be positive".into()));
        }
        if self.default_page_limit == 0 || self.max_page_limit == 0 {
            return Err(Error::Config("page limits must be positive".into()));
        }
        if self.default_page_limit > self.max_page_limit {
            return Err(Error::Config(format!(
                "default_page_limit {} exceeds max_page_limit {}",
                self.default_page_limit, self.max_page_limit
            )));
        }
        if self.max_cursor_len == 0 {
            return Err(Error::Config("max_cursor_len must be positive".into()));
        }
        Ok(())
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MapperConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# widemap configuration

# Lifetime of a transaction in milliseconds. Operations on an older
# transaction fail and the store-side transaction is aborted.
transaction_timeout_ms = 60000

# Page size used when a request does not set a limit
default_page_limit = 100

# Requested limits above this are clamped
max_page_limit = 5000

# Value written into version columns on insert
initial_version = 1

# Longest pagination cursor accepted, in bytes
max_cursor_len = 8192
"#
    }
}
