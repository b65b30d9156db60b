//! Work directory layout and environment records for toxide.
//!
//! This crate owns the on-disk side of isolated contexts: `WorkLayout` maps an
//! environment name to its directories under `toxworkdir`, and `RecordStore`
//! persists one checksummed `EnvRecord` per environment so that a later run can
//! decide between reusing and recreating the context.

pub mod layout;
pub mod record;

pub use layout::{validate_env_name, WorkLayout, WORK_FORMAT_VERSION};
pub use record::{ContextState, EnvRecord, RecordStore, RECORD_FILE};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("work dir I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record checksum mismatch for '{name}': expected {expected}, got {actual}")]
    IntegrityFailure {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("no record for environment '{0}'")]
    RecordNotFound(String),
    #[error("work dir format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid environment name: {0}")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_invalid_name() {
        let e = StoreError::InvalidName("bad/name".to_owned());
        assert!(e.to_string().contains("invalid environment name"));
    }

    #[test]
    fn store_error_display_record_not_found() {
        let e = StoreError::RecordNotFound("py27".to_owned());
        assert!(e.to_string().contains("py27"));
    }

    #[test]
    fn store_error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 2,
            found: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains('2'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            name: "pep8".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pep8"));
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }
}
