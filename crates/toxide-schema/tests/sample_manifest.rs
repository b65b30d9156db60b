//! Resolution properties checked against the bundled sample manifest.

use toxide_schema::{parse_manifest_file, resolve, ManifestError};

fn sample_path() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tox.ini")
}

#[test]
fn every_envlist_member_resolves() {
    let manifest = parse_manifest_file(sample_path()).unwrap();
    for name in manifest.envlist() {
        let env = resolve(&manifest, name).unwrap();
        assert_eq!(env.name, *name);
        assert!(!env.commands.is_empty(), "{name} must have commands");
        // base [testenv] values flow into every envlist member
        assert_eq!(env.install_command, "pip install -U {opts} {packages}");
    }
}

#[test]
fn overrides_take_precedence_over_base() {
    let manifest = parse_manifest_file(sample_path()).unwrap();
    let base = resolve(&manifest, "py27").unwrap();
    let pep8 = resolve(&manifest, "pep8").unwrap();
    assert_ne!(base.commands, pep8.commands);
    assert_eq!(pep8.commands, vec!["flake8", "bandit -r osprofiler -n5"]);
    assert_eq!(base.deps, pep8.deps);
}

#[test]
fn declared_envs_outside_envlist_resolve() {
    let manifest = parse_manifest_file(sample_path()).unwrap();
    let docs = resolve(&manifest, "docs").unwrap();
    assert_eq!(docs.commands, vec!["python setup.py build_sphinx"]);
    let venv = resolve(&manifest, "venv").unwrap();
    assert_eq!(venv.commands, vec!["{posargs}"]);
}

#[test]
fn unknown_env_is_config_error() {
    let manifest = parse_manifest_file(sample_path()).unwrap();
    assert!(matches!(
        resolve(&manifest, "nonexistent"),
        Err(ManifestError::UnknownEnvironment(_))
    ));
}
