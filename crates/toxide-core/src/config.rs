//! Runner configuration.
//!
//! [`RunnerConfig`] is built once by the caller and handed to the
//! [`crate::Orchestrator`]. [`UserDefaults`] is the optional
//! `$XDG_CONFIG_HOME/toxide/config.toml` file the CLI layers under its flags.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST: &str = "tox.ini";
pub const DEFAULT_BACKEND: &str = "host";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub manifest_path: PathBuf,
    /// Replaces `[tox] toxworkdir` when set.
    pub workdir: Option<PathBuf>,
    pub backend: String,
    /// Substituted for `{posargs}`.
    pub posargs: Vec<String>,
    /// Recreate every selected context regardless of its fingerprint.
    pub recreate: bool,
    /// Overrides `[tox] skip_missing_interpreters` when set.
    pub skip_missing_interpreters: Option<bool>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST),
            workdir: None,
            backend: DEFAULT_BACKEND.to_owned(),
            posargs: Vec::new(),
            recreate: false,
            skip_missing_interpreters: None,
        }
    }
}

impl RunnerConfig {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            ..Self::default()
        }
    }

    /// Start from the user defaults; explicit settings are applied afterwards.
    pub fn from_defaults(manifest_path: impl Into<PathBuf>, defaults: &UserDefaults) -> Self {
        let mut config = Self::new(manifest_path);
        if let Some(backend) = &defaults.backend {
            config.backend.clone_from(backend);
        }
        config.workdir.clone_from(&defaults.workdir);
        config.skip_missing_interpreters = defaults.skip_missing_interpreters;
        config
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserDefaults {
    pub backend: Option<String>,
    pub workdir: Option<PathBuf>,
    pub skip_missing_interpreters: Option<bool>,
}

impl UserDefaults {
    pub fn parse(content: &str, origin: &Path) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::UserConfig {
            path: origin.display().to_string(),
            message: e.to_string(),
        })
    }

    /// A missing file yields the empty defaults.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    pub fn load() -> Result<Self, CoreError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        defaults_path_from(
            std::env::var_os("XDG_CONFIG_HOME"),
            std::env::var_os("HOME"),
        )
    }
}

fn defaults_path_from(xdg: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = match xdg.filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => PathBuf::from(home.filter(|v| !v.is_empty())?).join(".config"),
    };
    Some(base.join("toxide").join("config.toml"))
}
