//! Layout and record behaviour across a simulated sequence of runs.

use toxide_schema::{EnvName, Fingerprint};
use toxide_store::{ContextState, EnvRecord, RecordStore, WorkLayout};

#[test]
fn recreate_cycle_replaces_record() {
    let dir = tempfile::tempdir().unwrap();
    let layout = WorkLayout::new(dir.path().join(".tox"));
    layout.initialize().unwrap();
    let records = RecordStore::new(layout.clone());

    layout.prepare_env("py27").unwrap();
    let first = EnvRecord::new(EnvName::new("py27"), Fingerprint::new("a".repeat(64)), None);
    records.put(&first).unwrap();
    records.update_state("py27", ContextState::Ready).unwrap();

    // a changed fingerprint means: wipe and start over
    layout.remove_env("py27").unwrap();
    assert!(!records.exists("py27"));

    layout.prepare_env("py27").unwrap();
    let second = EnvRecord::new(EnvName::new("py27"), Fingerprint::new("b".repeat(64)), None);
    records.put(&second).unwrap();

    let read = records.get("py27").unwrap();
    assert_eq!(read.state, ContextState::Created);
    assert_eq!(read.fingerprint, second.fingerprint);
    assert!(layout.env_tmp_dir("py27").is_dir());
    assert!(layout.env_log_dir("py27").is_dir());
}

#[test]
fn records_are_independent_per_environment() {
    let dir = tempfile::tempdir().unwrap();
    let layout = WorkLayout::new(dir.path());
    layout.initialize().unwrap();
    let records = RecordStore::new(layout);

    for name in ["py34", "py27", "pep8"] {
        records
            .put(&EnvRecord::new(EnvName::new(name), Fingerprint::new(name), None))
            .unwrap();
    }
    records.set_outcome("py34", "failed (exit 1)").unwrap();

    let all = records.list().unwrap();
    assert_eq!(all.len(), 3);
    for record in all {
        if record.name == "py34" {
            assert_eq!(record.last_outcome.as_deref(), Some("failed (exit 1)"));
        } else {
            assert!(record.last_outcome.is_none());
        }
    }
}
