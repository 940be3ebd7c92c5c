//! User settings from `<home>/config.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Optional overrides. Every field falls back to discovery or a default.
///
/// ```toml
/// python = "/opt/homebrew/bin/python3.10"
/// java_home = "/opt/homebrew/opt/openjdk"
/// jobs = 8
/// verbose = false
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub python: Option<PathBuf>,
    pub java_home: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub verbose: bool,
}

impl Settings {
    /// Load from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parallel build jobs: the configured value, else the CPU count.
    pub fn jobs(&self) -> usize {
        self.jobs.filter(|&j| j > 0).unwrap_or_else(num_cpus::get)
    }
}
