use toxide_schema::{EnvName, Manifest};

/// Selects every known environment: the envlist followed by the other
/// `[testenv:NAME]` sections.
pub const ALL_ENVS: &str = "ALL";

/// Decide which environments to run.
///
/// Explicit names (each entry may be comma-separated) win over `toxenv`, which
/// wins over the manifest's envlist. Unknown names are kept so that running them
/// reports a configuration error for that environment only.
pub fn select_envs(manifest: &Manifest, requested: &[String], toxenv: Option<&str>) -> Vec<EnvName> {
    let mut names: Vec<String> = requested
        .iter()
        .flat_map(|r| r.split(','))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .collect();

    if names.is_empty() {
        if let Some(toxenv) = toxenv {
            names = toxenv
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_owned)
                .collect();
        }
    }

    if names.is_empty() {
        return manifest.envlist().to_vec();
    }

    let mut selected: Vec<EnvName> = Vec::new();
    for name in names {
        if name == ALL_ENVS {
            for env in manifest.all_envs() {
                if !selected.contains(&env) {
                    selected.push(env);
                }
            }
        } else {
            let env = EnvName::new(name);
            if !selected.contains(&env) {
                selected.push(env);
            }
        }
    }
    selected
}
