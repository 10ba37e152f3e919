//! Scenario-scoped storage locations
//!
//! Each scenario run gets its own temporary directory, removed when the
//! run ends. Removal is best-effort: after a timeout an abandoned unit may
//! still hold files open, and a failed removal is reported, not fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};

/// Subdirectory handed to the backend
pub const STORE_DIR_NAME: &str = "store";

/// A fresh writable directory owned by one scenario run
#[derive(Debug)]
pub struct ScenarioDir {
    dir: TempDir,
}

impl ScenarioDir {
    /// Create `kvprobe-<scenario>-XXXX` under `root`, or the system temp
    /// directory when `root` is `None`.
    pub fn create(root: Option<&Path>, scenario: &str) -> io::Result<Self> {
        let prefix = format!("kvprobe-{}-", scenario);
        let mut builder = Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        fs::create_dir(dir.path().join(STORE_DIR_NAME))?;
        Ok(ScenarioDir { dir })
    }

    /// Root of the scenario directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Location the backend is opened at
    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join(STORE_DIR_NAME)
    }

    /// Remove the directory, surfacing any error.
    pub fn cleanup(self) -> io::Result<()> {
        self.dir.close()
    }
}
