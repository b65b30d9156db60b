//! Execution layer for toxide environments.
//!
//! An [`IsolatedContext`] describes the directories and the command environment of
//! one materialized environment. [`ExecBackend`] implementations create the
//! interpreter environment inside it and run argv vectors there: [`HostBackend`]
//! spawns real processes and tees their output into the environment's log
//! directory, [`MockBackend`] records invocations for tests.

pub mod backend;
pub mod context;
pub mod host;
pub mod mock;
pub mod prereq;

pub use backend::{select_backend, ExecBackend, Invocation};
pub use context::{command_environment, IsolatedContext, HOST_PASSTHROUGH};
pub use host::HostBackend;
pub use mock::MockBackend;
pub use prereq::{locate_interpreter, locate_program};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("{env}: interpreter '{basepython}' not found")]
    InterpreterNotFound { env: String, basepython: String },
    #[error("{env}: creating virtualenv failed: {message}")]
    VenvFailed { env: String, message: String },
    #[error("failed to spawn '{program}': {message}")]
    SpawnFailed { program: String, message: String },
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreter_not_found_names_env_and_interpreter() {
        let e = RuntimeError::InterpreterNotFound {
            env: "py27".to_owned(),
            basepython: "python2.7".to_owned(),
        };
        assert_eq!(e.to_string(), "py27: interpreter 'python2.7' not found");
    }

    #[test]
    fn spawn_failed_display() {
        let e = RuntimeError::SpawnFailed {
            program: "flake8".to_owned(),
            message: "No such file or directory".to_owned(),
        };
        assert!(e.to_string().contains("flake8"));
    }
}
