use super::{json_pretty, EXIT_SUCCESS};
use serde::Serialize;
use toxide_core::Orchestrator;
use toxide_schema::{EnvConfig, LintSection, Manifest, ToxSection};

#[derive(Debug, Serialize)]
struct Overview<'a> {
    toxinidir: String,
    workdir: String,
    tox: &'a ToxSection,
    lint: Vec<LintSection>,
}

pub fn run(
    orch: &Orchestrator,
    env: Option<&str>,
    section: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let manifest = orch.load_manifest().map_err(|e| e.to_string())?;
    match (env, section) {
        (Some(name), _) => show_env(orch, &manifest, name, json),
        (None, Some(name)) => show_section(&manifest, name, json),
        (None, None) => show_overview(orch, &manifest, json),
    }
}

fn show_env(
    orch: &Orchestrator,
    manifest: &Manifest,
    name: &str,
    json: bool,
) -> Result<u8, String> {
    let env = orch.resolve(manifest, name).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&env)?);
    } else {
        print_env(&env);
    }
    Ok(EXIT_SUCCESS)
}

fn print_env(env: &EnvConfig) {
    println!("[testenv:{}]", env.name);
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    println!("description = {}", opt(&env.description));
    println!("basepython = {}", opt(&env.basepython));
    print_list(
        "setenv",
        &env
            .setenv
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>(),
    );
    print_list("passenv", &env.passenv);
    print_list("deps", &env.deps);
    println!("install_command = {}", env.install_command);
    print_list("commands", &env.commands);
    println!("changedir = {}", env.changedir);
    print_list("allowlist_externals", &env.allowlist_externals);
    for (key, value) in [
        ("usedevelop", env.usedevelop),
        ("skip_install", env.skip_install),
        ("ignore_errors", env.ignore_errors),
        ("ignore_outcome", env.ignore_outcome),
        ("recreate", env.recreate),
        ("sitepackages", env.sitepackages),
        ("skipsdist", env.skipsdist),
        ("distribute", env.distribute),
    ] {
        println!("{key} = {value}");
    }
}

fn print_list(key: &str, values: &[String]) {
    match values {
        [] => println!("{key} ="),
        [single] => println!("{key} = {single}"),
        many => {
            println!("{key} =");
            for v in many {
                println!("    {v}");
            }
        }
    }
}

fn show_section(manifest: &Manifest, name: &str, json: bool) -> Result<u8, String> {
    let section = manifest
        .document()
        .section(name)
        .ok_or_else(|| format!("no section [{name}] in manifest"))?;
    if json {
        println!("{}", json_pretty(&section.entries)?);
    } else {
        println!("[{}]", section.name);
        for (key, value) in &section.entries {
            let lines: Vec<String> = value.lines().map(str::to_owned).collect();
            print_list(key, &lines);
        }
    }
    Ok(EXIT_SUCCESS)
}

fn show_overview(orch: &Orchestrator, manifest: &Manifest, json: bool) -> Result<u8, String> {
    let overview = Overview {
        toxinidir: manifest.toxinidir().display().to_string(),
        workdir: orch
            .workdir(manifest)
            .map_err(|e| e.to_string())?
            .display()
            .to_string(),
        tox: manifest.tox(),
        lint: manifest.lint_sections(),
    };
    if json {
        println!("{}", json_pretty(&overview)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("toxinidir = {}", overview.toxinidir);
    println!("toxworkdir = {}", overview.workdir);
    println!(
        "minversion = {}",
        overview.tox.minversion.as_deref().unwrap_or("")
    );
    println!("skipsdist = {}", overview.tox.skipsdist);
    println!(
        "skip_missing_interpreters = {}",
        overview.tox.skip_missing_interpreters
    );
    let envlist: Vec<String> = overview.tox.envlist.iter().map(ToString::to_string).collect();
    println!("envlist = {}", envlist.join(", "));
    for lint in &overview.lint {
        println!("[{}] {} option(s)", lint.name, lint.options.len());
    }
    Ok(EXIT_SUCCESS)
}
