//! Layered resolution of one environment's configuration.
//!
//! The layers are `[tox]` (only keys that are environment attributes),
//! `[testenv]` and `[testenv:NAME]`. `resolve` folds them into one key -> raw
//! value table, later layers winning, and then interprets each attribute.

use crate::envlist::{env_factors, filter_factor_conditions};
use crate::manifest::{parse_bool, Manifest, ManifestError, TOX_SECTION};
use crate::subst::expand_section_refs;
use crate::types::EnvName;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INSTALL_COMMAND: &str = "python -m pip install {opts} {packages}";

/// Keys that configure an environment. `whitelist_externals` is accepted as an
/// alias of `allowlist_externals`.
pub const ENV_KEYS: &[&str] = &[
    "description",
    "basepython",
    "setenv",
    "passenv",
    "deps",
    "install_command",
    "commands",
    "usedevelop",
    "distribute",
    "changedir",
    "skip_install",
    "ignore_errors",
    "ignore_outcome",
    "allowlist_externals",
    "whitelist_externals",
    "recreate",
    "sitepackages",
];

/// Fully resolved configuration of a single environment.
///
/// Values still contain materialize-phase tokens such as `{envdir}` and
/// `{posargs}`; section references and factor conditions are already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub name: EnvName,
    pub description: Option<String>,
    pub basepython: Option<String>,
    pub setenv: IndexMap<String, String>,
    pub passenv: Vec<String>,
    pub deps: Vec<String>,
    pub install_command: String,
    pub commands: Vec<String>,
    pub usedevelop: bool,
    /// Legacy flag, carried through without effect.
    pub distribute: bool,
    pub changedir: String,
    pub skip_install: bool,
    pub ignore_errors: bool,
    pub ignore_outcome: bool,
    pub allowlist_externals: Vec<String>,
    pub recreate: bool,
    pub sitepackages: bool,
    pub skipsdist: bool,
    pub toxworkdir: String,
    pub skip_missing_interpreters: bool,
}

/// Resolve `env_name` against `manifest`.
///
/// Fails with [`ManifestError::UnknownEnvironment`] when the name is neither in the
/// envlist nor declared as `[testenv:NAME]`.
pub fn resolve(manifest: &Manifest, env_name: &str) -> Result<EnvConfig, ManifestError> {
    if !manifest.has_env(env_name) {
        return Err(ManifestError::UnknownEnvironment(env_name.to_owned()));
    }

    let layers = [
        manifest.tox_section(),
        manifest.base_env_section(),
        manifest.env_section(env_name),
    ];

    let mut merged: IndexMap<&str, (&str, &str)> = IndexMap::new();
    for section in layers.into_iter().flatten() {
        for (key, value) in &section.entries {
            let key = canonical_key(key);
            if section.name == TOX_SECTION && !ENV_KEYS.contains(&key) {
                continue;
            }
            merged.insert(key, (section.name.as_str(), value.as_str()));
        }
    }

    let doc = manifest.document();
    let value = |key: &str| -> Result<Option<(String, String)>, ManifestError> {
        match merged.get(key) {
            Some(&(section, raw)) => {
                let expanded = expand_section_refs(raw, doc)?;
                Ok(Some((
                    section.to_owned(),
                    filter_factor_conditions(&expanded, env_name),
                )))
            }
            None => Ok(None),
        }
    };
    let flag = |key: &str, default: bool| -> Result<bool, ManifestError> {
        match value(key)? {
            Some((section, v)) => parse_bool(&section, key, &v),
            None => Ok(default),
        }
    };
    let text = |key: &str| -> Result<Option<String>, ManifestError> {
        Ok(value(key)?
            .map(|(_, v)| v.trim().to_owned())
            .filter(|v| !v.is_empty()))
    };
    let lines = |key: &str| -> Result<Vec<String>, ManifestError> {
        Ok(value(key)?.map(|(_, v)| split_lines(&v)).unwrap_or_default())
    };
    let words = |key: &str| -> Result<Vec<String>, ManifestError> {
        Ok(value(key)?.map(|(_, v)| split_words(&v)).unwrap_or_default())
    };

    let tox = manifest.tox();
    Ok(EnvConfig {
        name: EnvName::new(env_name),
        description: text("description")?,
        basepython: text("basepython")?.or_else(|| default_basepython(env_name)),
        setenv: parse_setenv(&lines("setenv")?)?,
        passenv: words("passenv")?,
        deps: lines("deps")?,
        install_command: text("install_command")?
            .unwrap_or_else(|| DEFAULT_INSTALL_COMMAND.to_owned()),
        commands: lines("commands")?,
        usedevelop: flag("usedevelop", false)?,
        distribute: flag("distribute", false)?,
        changedir: text("changedir")?.unwrap_or_else(|| "{toxinidir}".to_owned()),
        skip_install: flag("skip_install", false)?,
        ignore_errors: flag("ignore_errors", false)?,
        ignore_outcome: flag("ignore_outcome", false)?,
        allowlist_externals: words("allowlist_externals")?,
        recreate: flag("recreate", false)?,
        sitepackages: flag("sitepackages", false)?,
        skipsdist: tox.skipsdist,
        toxworkdir: tox.toxworkdir.clone(),
        skip_missing_interpreters: tox.skip_missing_interpreters,
    })
}

/// Interpreter implied by a `pyNN` / `pypyN` factor: `py27` -> `python2.7`,
/// `py3` -> `python3`, `py310` -> `python3.10`.
pub fn default_basepython(env_name: &str) -> Option<String> {
    env_factors(env_name).into_iter().find_map(|factor| {
        if let Some(rest) = factor.strip_prefix("pypy") {
            return rest
                .bytes()
                .all(|b| b.is_ascii_digit())
                .then(|| format!("pypy{rest}"));
        }
        let digits = factor.strip_prefix("py")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let (major, minor) = digits.split_at(1);
        Some(if minor.is_empty() {
            format!("python{major}")
        } else {
            format!("python{major}.{minor}")
        })
    })
}

fn canonical_key(key: &str) -> &str {
    if key == "whitelist_externals" {
        "allowlist_externals"
    } else {
        key
    }
}

fn split_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

fn split_words(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_setenv(lines: &[String]) -> Result<IndexMap<String, String>, ManifestError> {
    let mut out = IndexMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once('=') else {
            return Err(ManifestError::InvalidSetenv(line.clone()));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(ManifestError::InvalidSetenv(line.clone()));
        }
        out.insert(name.to_owned(), value.trim().to_owned());
    }
    Ok(out)
}
