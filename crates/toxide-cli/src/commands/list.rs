use super::{colorize_status, json_pretty, EXIT_SUCCESS};
use serde::Serialize;
use toxide_core::Orchestrator;
use toxide_runtime::locate_interpreter;

#[derive(Debug, Serialize)]
struct EnvSummary {
    name: String,
    description: Option<String>,
    in_envlist: bool,
    basepython: Option<String>,
    interpreter_found: Option<bool>,
    /// Context state from the work directory, if the environment ran before.
    state: Option<String>,
    last_outcome: Option<String>,
}

pub fn run(orch: &Orchestrator, all: bool, json: bool) -> Result<u8, String> {
    let manifest = orch.load_manifest().map_err(|e| e.to_string())?;
    let records = orch.records(&manifest).map_err(|e| e.to_string())?;
    let names = if all {
        manifest.all_envs()
    } else {
        manifest.envlist().to_vec()
    };

    let mut summaries = Vec::with_capacity(names.len());
    for name in &names {
        let env = orch.resolve(&manifest, name).map_err(|e| e.to_string())?;
        let record = records.get(name.as_str()).ok();
        summaries.push(EnvSummary {
            name: name.to_string(),
            description: env.description.clone(),
            in_envlist: manifest.envlist().contains(name),
            interpreter_found: env
                .basepython
                .as_deref()
                .map(|py| locate_interpreter(py).is_some()),
            basepython: env.basepython,
            state: record.as_ref().map(|r| r.state.to_string()),
            last_outcome: record.and_then(|r| r.last_outcome),
        });
    }

    if json {
        println!("{}", json_pretty(&summaries)?);
    } else if summaries.is_empty() {
        println!("no environments found");
    } else {
        println!("{:<16} {:<10} {:<18} DESCRIPTION", "ENV", "STATE", "LAST");
        for s in &summaries {
            let state = s.state.as_deref().unwrap_or("-");
            let last = s.last_outcome.as_deref().unwrap_or("-");
            let mut description = s.description.clone().unwrap_or_default();
            if s.interpreter_found == Some(false) {
                if let Some(py) = &s.basepython {
                    description.push_str(&format!(" [{py} not found]"));
                }
            }
            println!(
                "{:<16} {:<10} {:<18} {}",
                s.name,
                colorize_status(state),
                colorize_status(last),
                description.trim()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
