//! Environment orchestration for toxide.
//!
//! This crate ties manifest resolution, the work directory and execution backends
//! together in the [`Orchestrator`]: `resolve` an environment, `materialize` its
//! isolated context, `run` its commands, or `run_all` over a selection while
//! collecting a [`RunReport`]. It also provides per-environment locking, Ctrl-C
//! handling, context state validation and the user defaults file.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod events;
pub mod lifecycle;
pub mod report;
pub mod selection;

pub use concurrency::{install_signal_handler, shutdown_requested, EnvLock};
pub use config::{RunnerConfig, UserDefaults, DEFAULT_BACKEND, DEFAULT_MANIFEST};
pub use engine::{ContextGuard, EnvOutcome, Orchestrator};
pub use events::{NullEvents, RunEvents};
pub use lifecycle::validate_transition;
pub use report::{CommandRecord, EnvResult, EnvStatus, RunReport};
pub use selection::{select_envs, ALL_ENVS};

use thiserror::Error;
use toxide_schema::ManifestError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{env}: configuration error: {source}")]
    Config {
        env: String,
        #[source]
        source: ManifestError,
    },
    #[error("{env}: dependency installation failed: {message}")]
    Dependency { env: String, message: String },
    #[error("{env}: command '{command}' failed with exit code {code}")]
    Command {
        env: String,
        command: String,
        code: i32,
    },
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("store error: {0}")]
    Store(#[from] toxide_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] toxide_runtime::RuntimeError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("environment '{0}' is in use by another run")]
    Locked(String),
    #[error("{env}: changedir '{path}' does not exist")]
    MissingChangedir { env: String, path: String },
    #[error("user config {path}: {message}")]
    UserConfig { path: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn config(env: &str, source: ManifestError) -> Self {
        CoreError::Config {
            env: env.to_owned(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_env_and_cause() {
        let e = CoreError::config(
            "nonexistent",
            ManifestError::UnknownEnvironment("nonexistent".to_owned()),
        );
        let msg = e.to_string();
        assert!(msg.starts_with("nonexistent: configuration error"));
        assert!(msg.contains("nonexistent"));
    }

    #[test]
    fn command_error_display() {
        let e = CoreError::Command {
            env: "py34".to_owned(),
            command: "python setup.py testr".to_owned(),
            code: 1,
        };
        assert_eq!(
            e.to_string(),
            "py34: command 'python setup.py testr' failed with exit code 1"
        );
    }
}
