//! CLI subprocess integration tests.
//!
//! These tests invoke the `toxide` binary against a temporary manifest with
//! the mock backend and verify exit codes, stdout content and JSON output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const MANIFEST: &str = r#"[tox]
envlist = lint,unit
skipsdist = true

[testenv]
commands = echo {posargs}

[testenv:lint]
description = style checks
commands = flake8

[testenv:unit]
deps = pytest
commands = pytest {posargs}

[testenv:broken]
commands = false

[flake8]
show-source = true
exclude = .git,.tox
"#;

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        Self::with_manifest(MANIFEST)
    }

    fn with_manifest(content: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tox.ini"), content).unwrap();
        Self { dir }
    }

    fn manifest(&self) -> PathBuf {
        self.dir.path().join("tox.ini")
    }

    fn workdir(&self) -> PathBuf {
        self.dir.path().join(".work")
    }

    /// The binary pointed at this project, without a backend choice.
    fn toxide_bare(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_toxide"));
        cmd.env_remove("TOXENV")
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .arg("--config")
            .arg(self.manifest())
            .arg("--workdir")
            .arg(self.workdir());
        cmd
    }

    fn toxide(&self) -> Command {
        let mut cmd = self.toxide_bare();
        cmd.args(["--backend", "mock"]);
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.toxide().args(args).output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {}", stdout(output)))
}

fn result_names(report: &serde_json::Value) -> Vec<String> {
    report["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_owned())
        .collect()
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_toxide"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("toxide"));
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_toxide"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["run", "list", "config", "completions"] {
        assert!(text.contains(command), "help must list '{command}': {text}");
    }
}

#[test]
fn cli_run_envlist_passes() {
    let project = Project::new();
    let output = project.run(&["run"]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    let text = stdout(&output);
    assert!(text.contains("lint: passed"), "{text}");
    assert!(text.contains("unit: passed"), "{text}");
    assert!(text.contains("congratulations"), "{text}");
}

#[test]
fn cli_run_failing_command_exit_code() {
    let project = Project::new();
    let output = project.run(&["run", "-e", "broken"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("failed (exit 1)"));
}

#[test]
fn cli_run_continues_after_failure() {
    let project = Project::new();
    let output = project.run(&["--json", "run", "-e", "broken,lint"]);
    assert_eq!(output.status.code(), Some(1));
    let report = stdout_json(&output);
    assert_eq!(result_names(&report), vec!["broken", "lint"]);
    assert_eq!(report["results"][0]["status"], "failed");
    assert_eq!(report["results"][0]["code"], 1);
    assert_eq!(report["results"][1]["status"], "passed");
}

#[test]
fn cli_missing_manifest_exits_two() {
    let project = Project::new();
    std::fs::remove_file(project.manifest()).unwrap();
    let output = project.run(&["run"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("manifest error"), "{stderr}");
}

#[test]
fn cli_malformed_manifest_exits_two() {
    let project = Project::with_manifest("envlist = py27\n[tox]\n");
    let output = project.run(&["list"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_unknown_backend_fails() {
    let project = Project::new();
    let output = project
        .toxide_bare()
        .args(["--backend", "nonexistent", "run"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nonexistent"), "{stderr}");
}

#[test]
fn cli_unknown_env_reports_config_error() {
    let project = Project::new();
    let output = project.run(&["--json", "run", "nosuchenv"]);
    assert_eq!(output.status.code(), Some(1));
    let report = stdout_json(&output);
    assert_eq!(report["results"][0]["status"], "config_error");
}

#[test]
fn cli_toxenv_selects_environments() {
    let project = Project::new();
    let output = project
        .toxide()
        .env("TOXENV", "unit")
        .args(["--json", "run"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(result_names(&stdout_json(&output)), vec!["unit"]);
}

#[test]
fn cli_explicit_env_overrides_toxenv() {
    let project = Project::new();
    let output = project
        .toxide()
        .env("TOXENV", "unit")
        .args(["--json", "run", "-e", "lint"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(result_names(&stdout_json(&output)), vec!["lint"]);
}

#[test]
fn cli_posargs_after_double_dash() {
    let project = Project::new();
    let output = project.run(&["--json", "run", "-e", "unit", "--", "-k", "smoke test"]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    let commands: Vec<&str> = report["results"][0]["commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["command"].as_str().unwrap())
        .collect();
    assert!(
        commands.iter().any(|c| c.starts_with("pytest -k")),
        "{commands:?}"
    );
    assert!(commands.iter().any(|c| c.contains("smoke test")), "{commands:?}");
}

#[test]
fn cli_result_json_written() {
    let project = Project::new();
    let path = project.dir.path().join("result.json");
    let output = project.run(&["run", "-e", "lint", "--result-json", path.to_str().unwrap()]);
    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(result_names(&report), vec!["lint"]);
    assert_eq!(report["results"][0]["status"], "passed");
}

#[test]
fn cli_second_run_reuses_context() {
    let project = Project::new();
    assert!(project.run(&["run", "-e", "unit"]).status.success());
    let report = stdout_json(&project.run(&["--json", "run", "-e", "unit"]));
    assert_eq!(report["results"][0]["reused"], true);

    let report = stdout_json(&project.run(&["--json", "run", "-e", "unit", "--recreate"]));
    assert_eq!(report["results"][0]["reused"], false);
}

#[test]
fn cli_list_shows_envlist_and_records() {
    let project = Project::new();
    let output = project.run(&["--json", "list"]);
    assert!(output.status.success());
    let listed = stdout_json(&output);
    let names: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["lint", "unit"]);
    assert_eq!(listed[0]["description"], "style checks");
    assert!(listed[0]["state"].is_null());

    assert!(project.run(&["run", "-e", "lint"]).status.success());
    let listed = stdout_json(&project.run(&["--json", "list"]));
    assert_eq!(listed[0]["state"], "ready");
    assert_eq!(listed[0]["last_outcome"], "passed");
}

#[test]
fn cli_list_all_includes_undeclared_in_envlist() {
    let project = Project::new();
    let listed = stdout_json(&project.run(&["--json", "list", "--all"]));
    let broken = listed
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "broken")
        .expect("broken must be listed with --all");
    assert_eq!(broken["in_envlist"], false);
}

#[test]
fn cli_list_human_output() {
    let project = Project::new();
    let output = project.run(&["list"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("lint"), "{text}");
    assert!(text.contains("style checks"), "{text}");
}

#[test]
fn cli_config_resolves_env() {
    let project = Project::new();
    let output = project.run(&["--json", "config", "-e", "unit"]);
    assert!(output.status.success());
    let env = stdout_json(&output);
    assert_eq!(env["name"], "unit");
    assert_eq!(env["deps"], serde_json::json!(["pytest"]));
    assert_eq!(env["commands"], serde_json::json!(["pytest {posargs}"]));
}

#[test]
fn cli_config_human_env() {
    let project = Project::new();
    let output = project.run(&["config", "-e", "lint"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("[testenv:lint]"), "{text}");
    assert!(text.contains("commands = flake8"), "{text}");
}

#[test]
fn cli_config_section() {
    let project = Project::new();
    let output = project.run(&["--json", "config", "--section", "flake8"]);
    assert!(output.status.success());
    let section = stdout_json(&output);
    assert_eq!(section["show-source"], "true");

    let output = project.run(&["config", "--section", "nope"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_config_overview() {
    let project = Project::new();
    let output = project.run(&["--json", "config"]);
    assert!(output.status.success());
    let overview = stdout_json(&output);
    assert_eq!(overview["tox"]["envlist"], serde_json::json!(["lint", "unit"]));
    assert_eq!(overview["lint"][0]["name"], "flake8");
    assert!(Path::new(overview["workdir"].as_str().unwrap()).ends_with(".work"));
}

#[test]
fn cli_completions_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_toxide"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("toxide"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_toxide"))
        .arg("man-pages")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("toxide.1").exists());
}
