use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exclusive lock on one environment's context, held for the whole
/// materialize + run of that environment.
pub struct EnvLock {
    lock_file: File,
}

impl EnvLock {
    /// `None` when another run holds the lock; the caller reports the
    /// environment as busy instead of waiting.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C lets the current command finish and marks the remaining
/// environments interrupted; a second one exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(130);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received, stopping after the current command...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(path: &Path) -> EnvLock {
        EnvLock::try_acquire(path).unwrap().expect("lock is free")
    }

    #[test]
    fn lock_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".tox").join("py27.lock");
        let _lock = held(&lock_path);
        assert!(lock_path.exists());
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("pep8.lock");

        let _lock = held(&lock_path);
        assert!(EnvLock::try_acquire(&lock_path).unwrap().is_none());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("docs.lock");

        drop(held(&lock_path));
        assert!(EnvLock::try_acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn locks_are_per_environment() {
        let dir = tempfile::tempdir().unwrap();
        let _py27 = held(&dir.path().join("py27.lock"));
        assert!(EnvLock::try_acquire(&dir.path().join("py34.lock"))
            .unwrap()
            .is_some());
    }
}
