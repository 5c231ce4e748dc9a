//! Harness configuration via `lockstep.toml`
//!
//! Every setting has a default, so configuration files are optional. Test
//! suites that want different lane names or a longer expected-timeout for a
//! slow collaborator load a file once and hand it to the builder.

use crate::error::{LockstepError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "lockstep.toml";

fn default_first_lane_name() -> String {
    "T1".to_string()
}

fn default_second_lane_name() -> String {
    "T2".to_string()
}

fn default_expected_timeout_ms() -> u64 {
    2000
}

fn default_thread_name_prefix() -> String {
    "lockstep".to_string()
}

/// Harness configuration loaded from `lockstep.toml`.
///
/// # Example
///
/// ```toml
/// first_lane_name = "reader"
/// second_lane_name = "writer"
/// expected_timeout_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockstepConfig {
    /// Diagnostic name of the first lane
    #[serde(default = "default_first_lane_name")]
    pub first_lane_name: String,
    /// Diagnostic name of the second lane
    #[serde(default = "default_second_lane_name")]
    pub second_lane_name: String,
    /// Deadline used by `then_*_times_out` steps declared without a duration
    #[serde(default = "default_expected_timeout_ms")]
    pub expected_timeout_ms: u64,
    /// Prefix of the worker thread names (`<prefix>-<lane name>`)
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

impl Default for LockstepConfig {
    fn default() -> Self {
        Self {
            first_lane_name: default_first_lane_name(),
            second_lane_name: default_second_lane_name(),
            expected_timeout_ms: default_expected_timeout_ms(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl LockstepConfig {
    /// Default deadline for timeout-expected steps
    pub fn expected_timeout(&self) -> Duration {
        Duration::from_millis(self.expected_timeout_ms)
    }

    /// Check the configuration for values the harness cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for empty or identical lane names and for a
    /// zero expected-timeout.
    pub fn validate(&self) -> Result<()> {
        if self.first_lane_name.trim().is_empty() || self.second_lane_name.trim().is_empty() {
            return Err(LockstepError::InvalidConfig(
                "lane names must not be empty".to_string(),
            ));
        }
        if self.first_lane_name == self.second_lane_name {
            return Err(LockstepError::InvalidConfig(format!(
                "lane names must differ, both are '{}'",
                self.first_lane_name
            )));
        }
        if self.expected_timeout_ms == 0 {
            return Err(LockstepError::InvalidConfig(
                "expected_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Lockstep harness configuration
#
# Diagnostic lane names, used in trace lines and failure reports.
first_lane_name = "T1"
second_lane_name = "T2"

# Deadline (ms) for timeout-expected steps declared without a duration.
expected_timeout_ms = 2000

# Worker threads are named "<prefix>-<lane name>".
thread_name_prefix = "lockstep"
"#
    }

    /// Parse and validate config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LockstepConfig = toml::from_str(content).map_err(|e| {
            LockstepError::InvalidConfig(format!("failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LockstepError::InvalidConfig(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            LockstepError::InvalidConfig(msg) => {
                LockstepError::InvalidConfig(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            LockstepError::InvalidConfig(format!("failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content).map_err(|e| {
            LockstepError::InvalidConfig(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
