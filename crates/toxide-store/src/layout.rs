use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current work dir format version. Incremented on incompatible layout changes.
pub const WORK_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = ".toxide-version";

/// Directory layout under `toxworkdir`.
///
/// Every environment gets `{root}/{name}` with `tmp/` and `log/` below it, plus a
/// sibling lock file `{root}/{name}.lock`. Directories are created lazily.
#[derive(Debug, Clone)]
pub struct WorkLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkVersion {
    format_version: u32,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn env_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Directory holding the environment's executables (`bin`, or `Scripts` on Windows).
    #[inline]
    pub fn env_bin_dir(&self, name: &str) -> PathBuf {
        let bin = if cfg!(windows) { "Scripts" } else { "bin" };
        self.env_path(name).join(bin)
    }

    /// Scratch directory, emptied at the start of every run.
    #[inline]
    pub fn env_tmp_dir(&self, name: &str) -> PathBuf {
        self.env_path(name).join("tmp")
    }

    #[inline]
    pub fn env_log_dir(&self, name: &str) -> PathBuf {
        self.env_path(name).join("log")
    }

    #[inline]
    pub fn env_python(&self, name: &str) -> PathBuf {
        let python = if cfg!(windows) { "python.exe" } else { "python" };
        self.env_bin_dir(name).join(python)
    }

    #[inline]
    pub fn lock_file(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.lock"))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = WorkVersion {
                format_version: WORK_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&self.root)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let content = fs::read_to_string(self.root.join(VERSION_FILE))?;
        let ver: WorkVersion = serde_json::from_str(&content)?;

        if ver.format_version != WORK_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: WORK_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }

    /// Create the environment directories and reset its scratch directory.
    pub fn prepare_env(&self, name: &str) -> Result<(), StoreError> {
        validate_env_name(name)?;
        fs::create_dir_all(self.env_path(name))?;
        fs::create_dir_all(self.env_log_dir(name))?;
        let tmp = self.env_tmp_dir(name);
        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }
        fs::create_dir_all(&tmp)?;
        Ok(())
    }

    /// Delete the whole environment directory, if present.
    pub fn remove_env(&self, name: &str) -> Result<(), StoreError> {
        validate_env_name(name)?;
        let path = self.env_path(name);
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

/// Environment names become directory names; reject anything that could escape the work dir.
pub fn validate_env_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > 128 {
        return Err(StoreError::InvalidName(
            "environment name must be 1-128 characters".to_owned(),
        ));
    }
    if name.starts_with('.')
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-.+".contains(&b))
    {
        return Err(StoreError::InvalidName(format!(
            "'{name}' must match [a-zA-Z0-9_.+-] and not start with '.'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = WorkLayout::new("/src/.tox");
        assert_eq!(layout.env_path("py27"), PathBuf::from("/src/.tox/py27"));
        assert_eq!(
            layout.env_tmp_dir("py27"),
            PathBuf::from("/src/.tox/py27/tmp")
        );
        assert_eq!(
            layout.env_log_dir("py27"),
            PathBuf::from("/src/.tox/py27/log")
        );
        assert_eq!(layout.lock_file("py27"), PathBuf::from("/src/.tox/py27.lock"));
        #[cfg(unix)]
        assert_eq!(
            layout.env_python("py27"),
            PathBuf::from("/src/.tox/py27/bin/python")
        );
    }

    #[test]
    fn initialize_writes_version_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(dir.path().join(".tox"));
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn version_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(dir.path().join(VERSION_FILE), r#"{"format_version": 99}"#).unwrap();
        assert!(matches!(
            layout.verify_version(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }

    #[test]
    fn prepare_env_resets_tmp_but_keeps_logs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(dir.path());
        layout.prepare_env("pep8").unwrap();
        fs::write(layout.env_tmp_dir("pep8").join("scratch"), "x").unwrap();
        fs::write(layout.env_log_dir("pep8").join("1-commands.log"), "x").unwrap();

        layout.prepare_env("pep8").unwrap();
        assert!(!layout.env_tmp_dir("pep8").join("scratch").exists());
        assert!(layout.env_log_dir("pep8").join("1-commands.log").exists());
    }

    #[test]
    fn remove_env_deletes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(dir.path());
        layout.prepare_env("docs").unwrap();
        layout.remove_env("docs").unwrap();
        assert!(!layout.env_path("docs").exists());
        layout.remove_env("docs").unwrap();
    }

    #[test]
    fn env_names_are_validated() {
        assert!(validate_env_name("py27-django1.11").is_ok());
        assert!(validate_env_name("").is_err());
        assert!(validate_env_name("../escape").is_err());
        assert!(validate_env_name(".hidden").is_err());
        assert!(validate_env_name("a/b").is_err());
    }
}
