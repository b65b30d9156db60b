use crate::context::IsolatedContext;
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use toxide_schema::EnvName;

/// One process to run inside an isolated context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invocation {
    pub env: EnvName,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    /// Output is copied here in addition to the terminal.
    pub log: Option<PathBuf>,
}

impl Invocation {
    pub fn new(env: EnvName, argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            env,
            argv,
            cwd: cwd.into(),
            log: None,
        }
    }

    #[must_use]
    pub fn with_log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

pub trait ExecBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Create the interpreter environment (a venv) in `ctx.envdir`.
    ///
    /// Contexts without a `basepython` have nothing to create. A missing
    /// interpreter is reported as [`RuntimeError::InterpreterNotFound`].
    fn create(&self, ctx: &IsolatedContext) -> Result<(), RuntimeError>;

    /// Run `invocation` to completion and return its exit code.
    ///
    /// A process killed by a signal reports `128 + signal` on unix.
    fn exec(&self, ctx: &IsolatedContext, invocation: &Invocation) -> Result<i32, RuntimeError>;
}

pub fn select_backend(name: &str) -> Result<Box<dyn ExecBackend>, RuntimeError> {
    match name {
        "host" => Ok(Box::new(crate::host::HostBackend::new())),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_backends() {
        assert_eq!(select_backend("host").unwrap().name(), "host");
        assert_eq!(select_backend("mock").unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_backend_fails() {
        assert!(matches!(
            select_backend("docker"),
            Err(RuntimeError::BackendUnavailable(ref n)) if n == "docker"
        ));
    }

    #[test]
    fn invocation_display_and_program() {
        let inv = Invocation::new(
            EnvName::new("pep8"),
            vec!["bandit".into(), "-r".into(), "osprofiler".into()],
            "/src",
        )
        .with_log("/src/.tox/pep8/log/1-commands.log");
        assert_eq!(inv.program(), Some("bandit"));
        assert_eq!(inv.display(), "bandit -r osprofiler");
        assert!(inv.log.is_some());
    }
}
