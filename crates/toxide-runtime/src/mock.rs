use crate::backend::{ExecBackend, Invocation};
use crate::context::IsolatedContext;
use crate::RuntimeError;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Records invocations instead of running them.
///
/// Every command succeeds except the program `false` and commands matching a
/// rule registered with [`MockBackend::fail_on`]. Interpreters registered with
/// [`MockBackend::missing_interpreter`] cannot be created.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    invocations: Vec<Invocation>,
    created: Vec<String>,
    failures: Vec<FailRule>,
    missing: HashSet<String>,
}

struct FailRule {
    env: Option<String>,
    needle: String,
    code: i32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    /// Exit with `code` for commands whose line contains `needle`, optionally
    /// only inside environment `env`.
    pub fn fail_on(&self, env: Option<&str>, needle: &str, code: i32) {
        if let Ok(mut state) = self.lock() {
            state.failures.push(FailRule {
                env: env.map(str::to_owned),
                needle: needle.to_owned(),
                code,
            });
        }
    }

    pub fn missing_interpreter(&self, basepython: &str) {
        if let Ok(mut state) = self.lock() {
            state.missing.insert(basepython.to_owned());
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().map(|s| s.invocations.clone()).unwrap_or_default()
    }

    /// Invocations of one environment, as command lines.
    pub fn commands_of(&self, env: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.env == env)
            .map(|inv| inv.display())
            .collect()
    }

    /// Names of the environments whose venv was created, in order.
    pub fn created(&self) -> Vec<String> {
        self.lock().map(|s| s.created.clone()).unwrap_or_default()
    }
}

impl ExecBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn create(&self, ctx: &IsolatedContext) -> Result<(), RuntimeError> {
        let Some(basepython) = ctx.basepython.as_deref() else {
            return Ok(());
        };
        let mut state = self.lock()?;
        if state.missing.contains(basepython) {
            return Err(RuntimeError::InterpreterNotFound {
                env: ctx.name.to_string(),
                basepython: basepython.to_owned(),
            });
        }
        std::fs::create_dir_all(&ctx.envbindir)?;
        std::fs::write(&ctx.envpython, format!("mock-python:{basepython}\n"))?;
        state.created.push(ctx.name.to_string());
        Ok(())
    }

    fn exec(&self, ctx: &IsolatedContext, invocation: &Invocation) -> Result<i32, RuntimeError> {
        let line = invocation.display();
        let mut state = self.lock()?;
        state.invocations.push(invocation.clone());

        let code = if invocation.program() == Some("false") {
            1
        } else {
            state
                .failures
                .iter()
                .find(|rule| {
                    rule.env.as_deref().map_or(true, |env| ctx.name == env)
                        && line.contains(&rule.needle)
                })
                .map_or(0, |rule| rule.code)
        };

        if let Some(log) = &invocation.log {
            if let Some(parent) = log.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(log, format!("cmd: {line}\nmock-exec: exit {code}\n"))?;
        }
        Ok(code)
    }
}
