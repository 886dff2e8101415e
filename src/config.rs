// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Runtime configuration (bootstrap arguments and policy).
//!
//! Loaded from `$RTLOCK_CONFIG` when set, otherwise from
//! `<config dir>/rtlock/rtlock.toml`. A missing file yields defaults.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "RTLOCK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Arguments handed to the real-time runtime when it is bootstrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// `argv[0]` seen by the runtime.
    #[serde(default = "default_program_name")]
    pub program_name: String,
    /// Ask the runtime to trace its own calls (`--trace`).
    #[serde(default)]
    pub trace: bool,
    /// Extra runtime options, passed through verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Bootstrap as soon as a context is created instead of on first mismatch.
    #[serde(default)]
    pub eager: bool,
}

fn default_program_name() -> String {
    "rtlock".to_string()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            program_name: default_program_name(),
            trace: false,
            args: Vec::new(),
            eager: false,
        }
    }
}

impl BootstrapConfig {
    /// Full argument vector, program name first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.program_name.clone());
        if self.trace {
            argv.push("--trace".to_string());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtConfig {
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl RtConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Default config file location, if a config directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rtlock").map(|dirs| dirs.config_dir().join("rtlock.toml"))
    }

    /// Load from `$RTLOCK_CONFIG` or the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        Self::load_from(&path)
    }

    /// Load from a specific file. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write this config to a file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RtConfig::default();
        assert_eq!(config.bootstrap.program_name, "rtlock");
        assert!(!config.bootstrap.eager);
        assert_eq!(config.bootstrap.argv(), vec!["rtlock".to_string()]);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = RtConfig::from_toml(
            r#"
            [bootstrap]
            trace = true
            args = ["--cpu-affinity=1"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.bootstrap.argv(),
            vec!["rtlock", "--trace", "--cpu-affinity=1"]
        );
        assert!(!config.bootstrap.eager);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = RtConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RtConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtlock.toml");

        let mut config = RtConfig::default();
        config.bootstrap.eager = true;
        config.bootstrap.program_name = "scsynth".to_string();
        config.save_to(&path).unwrap();

        assert_eq!(RtConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtlock.toml");
        fs::write(&path, "[bootstrap\ntrace = ").unwrap();
        assert!(matches!(
            RtConfig::load_from(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }
}
