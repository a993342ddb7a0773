//! Build script file in a project checkout
//!
//! Reads and writes the script under [`ScriptConfig::file_name`]. Writes go
//! through a temp file and a rename so a crash never leaves a half-written
//! script behind.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::BuildScript;
use super::config::ScriptConfig;
use super::error::Result;
use super::merge::conflict_diff;

/// Project checkout holding a build script
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: ScriptConfig,
}

impl Project {
    /// Project rooted at `root`
    pub fn new(root: impl Into<PathBuf>, config: ScriptConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the configuration
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Get the build script path
    pub fn script_path(&self) -> PathBuf {
        self.root.join(&self.config.file_name)
    }

    /// Read and parse the build script. A missing file is `Ok(None)`.
    pub fn read(&self) -> Result<Option<BuildScript>> {
        let path = self.script_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No build script in project");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), bytes = text.len(), "Read build script");
        BuildScript::from_text(&text).map(Some)
    }

    /// Write the build script, replacing any existing one.
    pub fn write(&self, script: &BuildScript) -> Result<()> {
        let path = self.script_path();
        let text = script.to_text_with(&self.config);
        write_atomic(&path, text.as_bytes())?;
        info!(path = %path.display(), "Wrote build script");
        Ok(())
    }

    /// Replace the build script with a conflict diff of `local` and `remote`.
    pub fn write_conflict_diff(&self, local: &BuildScript, remote: &BuildScript) -> Result<()> {
        let path = self.script_path();
        let diff = conflict_diff(local, remote);
        write_atomic(&path, diff.as_bytes())?;
        info!(path = %path.display(), "Wrote build script conflict diff");
        Ok(())
    }
}

/// Write `data` to `path` atomically: temp file, sync, rename, sync directory.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new().read(true).open(parent)?;
        dir.sync_all()?;
    }

    Ok(())
}
