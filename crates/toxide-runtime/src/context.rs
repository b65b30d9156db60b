use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use toxide_schema::EnvName;
use toxide_store::WorkLayout;

/// Host variables every command sees, in addition to `passenv`.
pub const HOST_PASSTHROUGH: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LANGUAGE",
    "LC_*",
    "TERM",
    "TMPDIR",
    "TEMP",
    "TMP",
    "SYSTEMROOT",
    "COMSPEC",
    "PATHEXT",
    "PIP_INDEX_URL",
    "PIP_EXTRA_INDEX_URL",
    "http_proxy",
    "https_proxy",
    "no_proxy",
];

const PATH_SEP: &str = if cfg!(windows) { ";" } else { ":" };

/// A materialized environment: its directories and the environment variables
/// its commands run with.
#[derive(Debug, Clone, Serialize)]
pub struct IsolatedContext {
    pub name: EnvName,
    pub envdir: PathBuf,
    pub envbindir: PathBuf,
    pub envtmpdir: PathBuf,
    pub envlogdir: PathBuf,
    pub envpython: PathBuf,
    pub basepython: Option<String>,
    pub sitepackages: bool,
    /// Whether an existing context was kept instead of recreated.
    pub reused: bool,
    pub env: BTreeMap<String, String>,
    pub allowlist_externals: Vec<String>,
}

impl IsolatedContext {
    pub fn new(layout: &WorkLayout, name: &EnvName) -> Self {
        Self {
            name: name.clone(),
            envdir: layout.env_path(name),
            envbindir: layout.env_bin_dir(name),
            envtmpdir: layout.env_tmp_dir(name),
            envlogdir: layout.env_log_dir(name),
            envpython: layout.env_python(name),
            basepython: None,
            sitepackages: false,
            reused: false,
            env: BTreeMap::new(),
            allowlist_externals: Vec::new(),
        }
    }

    pub fn has_venv(&self) -> bool {
        self.basepython.is_some()
    }

    pub fn search_path(&self) -> Option<&str> {
        self.env.get("PATH").map(String::as_str)
    }

    /// `{envlogdir}/{n}-commands.log`
    pub fn log_file(&self, n: usize) -> PathBuf {
        self.envlogdir.join(format!("{n}-commands.log"))
    }

    /// Whether running `resolved` (the located executable of `program`) stays
    /// within the environment: it lives under `envbindir`, or `allowlist_externals`
    /// names it by basename or full path (a trailing `*` matches a prefix).
    pub fn is_allowed(&self, program: &str, resolved: Option<&Path>) -> bool {
        if let Some(path) = resolved {
            if path.starts_with(&self.envbindir) {
                return true;
            }
        }
        let full = resolved.map(|p| p.to_string_lossy().into_owned());
        self.allowlist_externals.iter().any(|pattern| {
            matches_pattern(program, pattern)
                || full.as_deref().is_some_and(|f| matches_pattern(f, pattern))
        })
    }
}

/// Build the variables for commands of one environment.
///
/// Starts from the host variables named by [`HOST_PASSTHROUGH`] or `passenv`
/// (patterns may end in `*`), sets `VIRTUAL_ENV` when the context has a venv,
/// applies `setenv` on top and finally prefixes `PATH` with `envbindir`.
pub fn command_environment<H, S>(
    host: H,
    passenv: &[String],
    setenv: S,
    ctx: &IsolatedContext,
) -> BTreeMap<String, String>
where
    H: IntoIterator<Item = (String, String)>,
    S: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = host
        .into_iter()
        .filter(|(name, _)| {
            HOST_PASSTHROUGH.iter().any(|p| matches_pattern(name, p))
                || passenv.iter().any(|p| matches_pattern(name, p))
        })
        .collect();

    if ctx.has_venv() {
        env.insert(
            "VIRTUAL_ENV".to_owned(),
            ctx.envdir.to_string_lossy().into_owned(),
        );
    }
    env.extend(setenv);

    let bindir = ctx.envbindir.to_string_lossy().into_owned();
    let path = match env.get("PATH") {
        Some(existing) if !existing.is_empty() => format!("{bindir}{PATH_SEP}{existing}"),
        _ => bindir,
    };
    env.insert("PATH".to_owned(), path);
    env
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> IsolatedContext {
        let layout = WorkLayout::new("/src/.tox");
        IsolatedContext::new(&layout, &EnvName::new("py27"))
    }

    fn host() -> Vec<(String, String)> {
        vec![
            ("PATH".into(), "/usr/bin".into()),
            ("HOME".into(), "/home/dev".into()),
            ("LC_CTYPE".into(), "C.UTF-8".into()),
            ("SECRET_TOKEN".into(), "hunter2".into()),
            ("CI_JOB".into(), "7".into()),
        ]
    }

    #[test]
    fn host_environment_is_filtered() {
        let env = command_environment(host(), &[], Vec::new(), &ctx());
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/dev"));
        assert!(env.contains_key("LC_CTYPE"));
        assert!(!env.contains_key("SECRET_TOKEN"));
        assert!(!env.contains_key("CI_JOB"));
    }

    #[test]
    fn passenv_patterns_admit_host_variables() {
        let env = command_environment(host(), &["CI_*".to_owned()], Vec::new(), &ctx());
        assert_eq!(env.get("CI_JOB").map(String::as_str), Some("7"));
        assert!(!env.contains_key("SECRET_TOKEN"));
    }

    #[cfg(unix)]
    #[test]
    fn path_is_prefixed_with_envbindir() {
        let env = command_environment(host(), &[], Vec::new(), &ctx());
        assert_eq!(env["PATH"], "/src/.tox/py27/bin:/usr/bin");
    }

    #[cfg(unix)]
    #[test]
    fn setenv_wins_and_virtual_env_is_set_for_venvs() {
        let mut ctx = ctx();
        ctx.basepython = Some("python2.7".into());
        let env = command_environment(
            host(),
            &[],
            vec![
                ("HOME".to_owned(), "/tmp/home".to_owned()),
                ("LANG".to_owned(), "en_US.UTF-8".to_owned()),
            ],
            &ctx,
        );
        assert_eq!(env["VIRTUAL_ENV"], "/src/.tox/py27");
        assert_eq!(env["HOME"], "/tmp/home");
        assert_eq!(env["LANG"], "en_US.UTF-8");
    }

    #[test]
    fn no_virtual_env_without_venv() {
        let env = command_environment(host(), &[], Vec::new(), &ctx());
        assert!(!env.contains_key("VIRTUAL_ENV"));
    }

    #[cfg(unix)]
    #[test]
    fn allowlist_and_envbindir() {
        let mut ctx = ctx();
        ctx.allowlist_externals = vec!["bash".into(), "/opt/tools/*".into()];
        assert!(ctx.is_allowed("flake8", Some(Path::new("/src/.tox/py27/bin/flake8"))));
        assert!(ctx.is_allowed("bash", Some(Path::new("/bin/bash"))));
        assert!(ctx.is_allowed("lint", Some(Path::new("/opt/tools/lint"))));
        assert!(!ctx.is_allowed("make", Some(Path::new("/usr/bin/make"))));
        assert!(!ctx.is_allowed("make", None));
    }

    #[test]
    fn log_files_are_numbered() {
        assert!(ctx().log_file(3).ends_with("log/3-commands.log"));
    }
}
