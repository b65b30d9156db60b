use super::{colorize_status, exit_byte, json_pretty, spin_fail, spin_ok, spinner};
use console::Style;
use indicatif::ProgressBar;
use std::path::Path;
use toxide_core::{select_envs, EnvResult, Orchestrator, RunEvents, RunReport};
use toxide_schema::EnvName;

/// Prints progress while environments run; silent in JSON mode.
struct TerminalEvents {
    quiet: bool,
    spinner: Option<ProgressBar>,
}

impl TerminalEvents {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            spinner: None,
        }
    }

    fn step(&self, env: &EnvName, what: &str, detail: &str) {
        if !self.quiet {
            println!(
                "{} {} {}",
                Style::new().cyan().bold().apply_to(format!("{env}:")),
                Style::new().dim().apply_to(what),
                detail
            );
        }
    }
}

impl RunEvents for TerminalEvents {
    fn on_env_start(&mut self, env: &EnvName) {
        if !self.quiet {
            println!("{}", Style::new().bold().apply_to(format!("━━ {env}")));
        }
    }

    fn on_create(&mut self, env: &EnvName, basepython: &str) {
        if !self.quiet {
            self.spinner = Some(spinner(&format!(
                "{env}: creating virtualenv ({basepython})..."
            )));
        }
    }

    fn on_create_done(&mut self, env: &EnvName, ok: bool) {
        if let Some(pb) = self.spinner.take() {
            if ok {
                spin_ok(&pb, &format!("{env}: virtualenv created"));
            } else {
                spin_fail(&pb, &format!("{env}: virtualenv creation failed"));
            }
        }
    }

    fn on_install(&mut self, env: &EnvName, what: &str, command: &str) {
        self.step(env, &format!("install {what}>"), command);
    }

    fn on_command(&mut self, env: &EnvName, cwd: &str, command: &str) {
        self.step(env, &format!("{cwd}$"), command);
    }

    fn on_env_finish(&mut self, result: &EnvResult) {
        if self.quiet || !result.status.is_failure() {
            return;
        }
        if let Some(detail) = result.status.detail() {
            eprintln!("{}: {}", result.name, detail);
        }
    }
}

pub fn run(
    orch: &Orchestrator,
    requested: &[String],
    result_json: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let manifest = orch.load_manifest().map_err(|e| e.to_string())?;
    let toxenv = std::env::var("TOXENV").ok();
    let selection = select_envs(&manifest, requested, toxenv.as_deref());
    if selection.is_empty() {
        return Err("no environments selected: envlist is empty".to_owned());
    }
    tracing::debug!(
        "selected environments: {}",
        selection
            .iter()
            .map(EnvName::as_str)
            .collect::<Vec<_>>()
            .join(",")
    );

    let mut events = TerminalEvents::new(json);
    let report = orch.run_all_with(&manifest, &selection, &mut events);

    if let Some(path) = result_json {
        report.write_json(path).map_err(|e| e.to_string())?;
    }
    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(exit_byte(report.exit_code()))
}

fn print_summary(report: &RunReport) {
    println!("{}", Style::new().bold().apply_to("━━ summary"));
    for result in &report.results {
        let reused = if result.reused { " (reused)" } else { "" };
        println!(
            "  {}: {}{}",
            result.name,
            colorize_status(&result.status.label()),
            Style::new().dim().apply_to(reused)
        );
    }
    if report.succeeded() {
        println!("  {}", Style::new().green().bold().apply_to("congratulations :)"));
    }
}
