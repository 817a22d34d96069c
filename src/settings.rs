//! Persisted user settings.
//!
//! Stored as pretty JSON under the user configuration directory. Platform
//! defaults participate in manifest-list resolution whenever the matching
//! CLI flag is absent; `diff-tool` names the external command that
//! `compare files` hands its two squashed directories to.

use crate::error::{LensError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const KNOWN_KEYS: &[&str] = &["os", "os-version", "arch", "diff-tool"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_tool: Option<String>,
}

fn unknown_key(key: &str) -> LensError {
    if key.is_empty() {
        LensError::InvalidInput("setting key is empty".to_string())
    } else {
        LensError::InvalidInput(format!(
            "unknown setting {:?}; known keys: {}",
            key,
            KNOWN_KEYS.join(", ")
        ))
    }
}

impl Settings {
    /// Default on-disk location.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| LensError::Filesystem {
            path: PathBuf::from("~"),
            message: "no user configuration directory on this platform".to_string(),
        })?;
        Ok(base.join("layerlens").join("settings.json"))
    }

    /// Loads settings from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(LensError::filesystem(path, err)),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Writes settings to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LensError::filesystem(parent, e))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|e| LensError::filesystem(path, e))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Reads one setting by key; empty and unknown keys are input faults.
    pub fn get(&self, key: &str) -> Result<Option<&str>> {
        let field = match key {
            "os" => &self.os,
            "os-version" => &self.os_version,
            "arch" => &self.arch,
            "diff-tool" => &self.diff_tool,
            other => return Err(unknown_key(other)),
        };
        Ok(field.as_deref())
    }

    /// Stores one setting by key; empty and unknown keys are input faults.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let field = match key {
            "os" => &mut self.os,
            "os-version" => &mut self.os_version,
            "arch" => &mut self.arch,
            "diff-tool" => &mut self.diff_tool,
            other => return Err(unknown_key(other)),
        };
        *field = Some(value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/settings.json");

        let mut settings = Settings::default();
        settings.set("os", "linux").unwrap();
        settings.set("arch", "arm64").unwrap();
        settings.set("diff-tool", "meld").unwrap();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.get("arch").unwrap(), Some("arm64"));
    }

    #[test]
    fn unset_keys_read_back_as_none() {
        let settings = Settings::default();
        assert_eq!(settings.get("os-version").unwrap(), None);
    }

    #[test]
    fn empty_key_is_an_input_fault() {
        let settings = Settings::default();
        let err = settings.get("").unwrap_err();
        assert!(matches!(err, LensError::InvalidInput(_)));
    }

    #[test]
    fn unknown_key_names_the_valid_ones() {
        let mut settings = Settings::default();
        let err = settings.set("colour", "always").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("unknown setting"));
        assert!(text.contains("diff-tool"));
    }
}
