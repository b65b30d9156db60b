use crate::report::EnvResult;
use toxide_schema::EnvName;

/// Progress callbacks for `Orchestrator::run_all`. All methods default to no-ops.
pub trait RunEvents {
    fn on_env_start(&mut self, _env: &EnvName) {}
    /// Called before a venv is created with `basepython`.
    fn on_create(&mut self, _env: &EnvName, _basepython: &str) {}
    fn on_create_done(&mut self, _env: &EnvName, _ok: bool) {}
    /// Called before an installation command; `what` is `deps` or `package`.
    fn on_install(&mut self, _env: &EnvName, _what: &str, _command: &str) {}
    fn on_command(&mut self, _env: &EnvName, _cwd: &str, _command: &str) {}
    fn on_env_finish(&mut self, _result: &EnvResult) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl RunEvents for NullEvents {}
