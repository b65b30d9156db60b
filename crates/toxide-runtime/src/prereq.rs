use std::path::{Path, PathBuf};

/// Locate the interpreter named by `basepython`.
///
/// A value containing a path separator is taken as a path; anything else is
/// looked up on the host `PATH`.
pub fn locate_interpreter(basepython: &str) -> Option<PathBuf> {
    let candidate = Path::new(basepython);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    which::which(basepython).ok()
}

/// Locate `program` the way a spawned command with `search_path` as `PATH` would.
pub fn locate_program(program: &str, search_path: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    if Path::new(program).components().count() > 1 {
        let path = cwd.join(program);
        return path.is_file().then_some(path);
    }
    match search_path {
        Some(paths) => which::which_in(program, Some(paths), cwd).ok(),
        None => which::which(program).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_interpreter_is_not_found() {
        assert!(locate_interpreter("python0.0-toxide-missing").is_none());
        assert!(locate_interpreter("/nonexistent/bin/python9").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn programs_are_found_on_the_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let tool = bin.join("fake-tool");
        std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let found = locate_program("fake-tool", Some(&bin.to_string_lossy()), dir.path());
        assert_eq!(found.as_deref(), Some(tool.as_path()));
        assert!(locate_program("fake-tool", Some("/nonexistent"), dir.path()).is_none());
        assert_eq!(
            locate_program("bin/fake-tool", None, dir.path()).as_deref(),
            Some(tool.as_path())
        );
    }
}
