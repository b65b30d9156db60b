use crate::layout::{validate_env_name, WorkLayout};
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use toxide_schema::{EnvName, Fingerprint};

pub const RECORD_FILE: &str = ".toxide-env.json";

/// How far an isolated context got the last time it was materialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Directory (and venv, if any) exists; dependencies not installed yet.
    Created,
    /// Dependencies installed; reusable while the fingerprint matches.
    Ready,
    /// Dependency installation failed; the next run recreates the context.
    Broken,
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextState::Created => write!(f, "created"),
            ContextState::Ready => write!(f, "ready"),
            ContextState::Broken => write!(f, "broken"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvRecord {
    pub name: EnvName,
    pub fingerprint: Fingerprint,
    pub state: ContextState,
    #[serde(default)]
    pub basepython: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Outcome of the most recent run, e.g. `passed` or `failed (exit 1)`.
    #[serde(default)]
    pub last_outcome: Option<String>,
    /// blake3 checksum over the record without this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl EnvRecord {
    pub fn new(name: EnvName, fingerprint: Fingerprint, basepython: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name,
            fingerprint,
            state: ContextState::Created,
            basepython,
            created_at: now.clone(),
            updated_at: now,
            last_outcome: None,
            checksum: None,
        }
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Reads and writes `EnvRecord`s at `{envdir}/.toxide-env.json`.
pub struct RecordStore {
    layout: WorkLayout,
}

impl RecordStore {
    pub fn new(layout: WorkLayout) -> Self {
        Self { layout }
    }

    pub fn put(&self, record: &EnvRecord) -> Result<(), StoreError> {
        validate_env_name(&record.name)?;
        let dir = self.layout.env_path(&record.name);
        fs::create_dir_all(&dir)?;

        let mut with_checksum = record.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(RECORD_FILE))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<EnvRecord, StoreError> {
        let path = self.layout.env_path(name).join(RECORD_FILE);
        if !path.exists() {
            return Err(StoreError::RecordNotFound(name.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let record: EnvRecord = serde_json::from_str(&content)?;

        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    name: name.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(record)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.layout.env_path(name).join(RECORD_FILE).exists()
    }

    pub fn update_state(&self, name: &str, state: ContextState) -> Result<(), StoreError> {
        let mut record = self.get(name)?;
        record.state = state;
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.put(&record)
    }

    pub fn set_outcome(&self, name: &str, outcome: &str) -> Result<(), StoreError> {
        let mut record = self.get(name)?;
        record.last_outcome = Some(outcome.to_owned());
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.put(&record)
    }

    /// All readable records under the work dir, sorted by name.
    pub fn list(&self) -> Result<Vec<EnvRecord>, StoreError> {
        let root = self.layout.root();
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_str().unwrap_or("");
            if name_str.is_empty() || name_str.starts_with('.') || !self.exists(name_str) {
                continue;
            }
            match self.get(name_str) {
                Ok(record) => results.push(record),
                Err(e) => {
                    tracing::warn!("skipping corrupted record for '{name_str}': {e}");
                }
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}
