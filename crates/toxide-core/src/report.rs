use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use toxide_runtime::RuntimeError;
use toxide_schema::EnvName;

/// One executed command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandRecord {
    pub command: String,
    pub exit_code: i32,
    /// Non-zero exit that did not fail the environment (`-` prefix).
    #[serde(default)]
    pub ignored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnvStatus {
    Passed,
    Failed { command: String, code: i32 },
    /// A command failed but `ignore_outcome` is set.
    Ignored { command: String, code: i32 },
    DependencyFailed { message: String },
    ConfigError { message: String },
    Skipped { reason: String },
    Interrupted,
    Error { message: String },
}

impl EnvStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            EnvStatus::Passed | EnvStatus::Ignored { .. } | EnvStatus::Skipped { .. }
        )
    }

    /// Classify an error raised while resolving, materializing or running.
    pub fn from_error(error: &CoreError, skip_missing_interpreters: bool) -> Self {
        match error {
            CoreError::Config { source, .. } => EnvStatus::ConfigError {
                message: source.to_string(),
            },
            CoreError::Manifest(source) => EnvStatus::ConfigError {
                message: source.to_string(),
            },
            CoreError::Dependency { message, .. } => EnvStatus::DependencyFailed {
                message: message.clone(),
            },
            CoreError::Command { command, code, .. } => EnvStatus::Failed {
                command: command.clone(),
                code: *code,
            },
            CoreError::Runtime(RuntimeError::InterpreterNotFound { basepython, .. })
                if skip_missing_interpreters =>
            {
                EnvStatus::Skipped {
                    reason: format!("interpreter '{basepython}' not found"),
                }
            }
            other => EnvStatus::Error {
                message: other.to_string(),
            },
        }
    }

    /// Short human-readable form, also stored as the record's last outcome.
    pub fn label(&self) -> String {
        match self {
            EnvStatus::Passed => "passed".to_owned(),
            EnvStatus::Failed { code, .. } => format!("failed (exit {code})"),
            EnvStatus::Ignored { code, .. } => format!("ignored failure (exit {code})"),
            EnvStatus::DependencyFailed { .. } => "dependency error".to_owned(),
            EnvStatus::ConfigError { .. } => "config error".to_owned(),
            EnvStatus::Skipped { .. } => "skipped".to_owned(),
            EnvStatus::Interrupted => "interrupted".to_owned(),
            EnvStatus::Error { .. } => "error".to_owned(),
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            EnvStatus::Failed { command, .. } | EnvStatus::Ignored { command, .. } => {
                Some(command.clone())
            }
            EnvStatus::DependencyFailed { message }
            | EnvStatus::ConfigError { message }
            | EnvStatus::Error { message } => Some(message.clone()),
            EnvStatus::Skipped { reason } => Some(reason.clone()),
            EnvStatus::Passed | EnvStatus::Interrupted => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvResult {
    pub name: EnvName,
    #[serde(flatten)]
    pub status: EnvStatus,
    /// Whether an existing context was reused.
    #[serde(default)]
    pub reused: bool,
    #[serde(default)]
    pub commands: Vec<CommandRecord>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub results: Vec<EnvResult>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failure())
    }

    pub fn get(&self, name: &str) -> Option<&EnvResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Process exit code: 0 when nothing failed, else the command exit code of the
    /// first failed environment, or 1 when it failed without a command.
    pub fn exit_code(&self) -> i32 {
        match self.results.iter().find(|r| r.status.is_failure()) {
            None => 0,
            Some(EnvResult {
                status: EnvStatus::Failed { code, .. },
                ..
            }) if *code != 0 => *code,
            Some(_) => 1,
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as JSON, replacing `path` atomically.
    pub fn write_json(&self, path: &Path) -> Result<(), CoreError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.to_json()?.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }
}
