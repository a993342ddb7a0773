//! Engine configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Result;
use super::project::write_atomic;

/// Default build script file name inside a project checkout.
pub const DEFAULT_FILE_NAME: &str = "buildscript.as";

/// Configuration for reading and rendering build scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Build script file name in a checkout (default: buildscript.as)
    pub file_name: String,

    /// Functions the text emitter renders on a single line
    pub inline_functions: Vec<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            inline_functions: [
                "Req",
                "Revision",
                "BuildFlag",
                "Eq",
                "Ne",
                "Gt",
                "Gte",
                "Lt",
                "Lte",
                "And",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ScriptConfig {
    /// Whether calls to `name` are rendered on one line.
    pub fn is_inline(&self, name: &str) -> bool {
        self.inline_functions.iter().any(|f| f == name)
    }

    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let mut config = ScriptConfig::default();
        config.file_name = "runtime.as".to_string();
        config.inline_functions.push("ingredient".to_string());
        config.save(&path).unwrap();

        let loaded = ScriptConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.is_inline("ingredient"));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, br#"{"file_name": "other.as"}"#).unwrap();

        let loaded = ScriptConfig::load(&path).unwrap();
        assert_eq!(loaded.file_name, "other.as");
        assert!(loaded.is_inline("Req"));
        assert!(!loaded.is_inline("solve"));
    }
}
