//! Harness configuration via `kvprobe.toml`
//!
//! Every key is optional; a missing file means defaults. Command-line flags
//! override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};
use crate::scenario::Scenario;

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "kvprobe.toml";

/// Harness configuration loaded from `kvprobe.toml`.
///
/// # Example
///
/// ```toml
/// backend = "log"
/// size_divisor = 64
/// deadline_secs = 120
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Backend to probe: `"memory"` or `"log"`
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Parent of the per-scenario directories (system temp when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    /// Bound for a close attempted after a timeout, in milliseconds
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
    /// Divide every built-in value size by this factor
    #[serde(default = "default_size_divisor")]
    pub size_divisor: u64,
    /// Bound every scenario, and replace every step deadline, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    /// Run each scenario in a fresh child process
    #[serde(default = "default_isolate")]
    pub isolate: bool,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_close_grace_ms() -> u64 {
    5_000
}

fn default_size_divisor() -> u64 {
    1
}

fn default_isolate() -> bool {
    true
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            work_dir: None,
            close_grace_ms: default_close_grace_ms(),
            size_divisor: default_size_divisor(),
            deadline_secs: None,
            isolate: default_isolate(),
        }
    }
}

impl HarnessConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# kvprobe configuration
#
# Backend under test: "memory" or "log"
backend = "memory"

# Parent directory for per-scenario stores (default: system temp dir)
# work_dir = "/var/tmp/kvprobe"

# Bound for closing a store after a timeout, in milliseconds
close_grace_ms = 5000

# Divide every built-in value size by this factor (1 = full size,
# 512 MiB values; use 64 or more for smoke runs)
size_divisor = 1

# Bound every scenario and replace step deadlines, in seconds. Without
# it, scenarios that carry no deadline of their own run unbounded.
# deadline_secs = 600

# Run each scenario in its own child process so abandoned operations
# from a timed-out scenario cannot starve the next one
isolate = true
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or holds invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(content)
            .map_err(|e| ProbeError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, else `kvprobe.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.is_file() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.backend.is_empty() {
            return Err(ProbeError::Config("backend must not be empty".to_string()));
        }
        if self.size_divisor == 0 {
            return Err(ProbeError::Config("size_divisor must be at least 1".to_string()));
        }
        if self.close_grace_ms == 0 {
            return Err(ProbeError::Config("close_grace_ms must be positive".to_string()));
        }
        if self.deadline_secs == Some(0) {
            return Err(ProbeError::Config("deadline_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Bound for a close attempted after a timeout
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Deadline override, if configured
    pub fn deadline_override(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Apply size scaling and deadline override to a scenario
    pub fn prepare(&self, scenario: Scenario) -> Scenario {
        let scenario = scenario.scaled(self.size_divisor as usize);
        match self.deadline_override() {
            Some(bound) => scenario.with_deadline_override(bound),
            None => scenario,
        }
    }
}
