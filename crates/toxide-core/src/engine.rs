use crate::concurrency::{shutdown_requested, EnvLock};
use crate::config::RunnerConfig;
use crate::events::{NullEvents, RunEvents};
use crate::lifecycle::validate_transition;
use crate::report::{CommandRecord, EnvResult, EnvStatus, RunReport};
use crate::CoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use toxide_runtime::{
    command_environment, locate_program, select_backend, ExecBackend, Invocation, IsolatedContext,
    RuntimeError,
};
use toxide_schema::{
    compute_fingerprint, parse_manifest_file, resolve, split_command_line, substitute, EnvConfig,
    EnvName, Manifest, ManifestError, SubstContext,
};
use toxide_store::{ContextState, EnvRecord, RecordStore, WorkLayout};
use tracing::{debug, info, warn};

type InterruptCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Runs environments described by a manifest.
///
/// The orchestrator owns no global state: everything it needs comes from the
/// [`RunnerConfig`] and the backend it was built with.
pub struct Orchestrator {
    config: RunnerConfig,
    backend: Arc<dyn ExecBackend>,
    interrupted: InterruptCheck,
}

/// A materialized environment, locked for the lifetime of the guard.
pub struct ContextGuard {
    pub context: IsolatedContext,
    subst: SubstContext,
    history: Vec<CommandRecord>,
    next_log: usize,
    records: RecordStore,
    _lock: EnvLock,
}

impl ContextGuard {
    /// Installation and test commands executed so far.
    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }

    pub fn substitution(&self) -> &SubstContext {
        &self.subst
    }

    fn next_log_file(&mut self) -> PathBuf {
        let path = self.context.log_file(self.next_log);
        self.next_log += 1;
        path
    }

    fn set_state(&self, to: ContextState) -> Result<(), CoreError> {
        let record = self.records.get(&self.context.name)?;
        validate_transition(record.state, to)?;
        self.records.update_state(&self.context.name, to)?;
        Ok(())
    }
}

/// What `run` produced for an environment whose commands did not fail it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOutcome {
    pub status: EnvStatus,
    pub commands: Vec<CommandRecord>,
}

impl Orchestrator {
    pub fn new(config: RunnerConfig) -> Result<Self, CoreError> {
        let backend: Arc<dyn ExecBackend> = Arc::from(select_backend(&config.backend)?);
        if !backend.available() {
            return Err(RuntimeError::BackendUnavailable(config.backend.clone()).into());
        }
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: RunnerConfig, backend: Arc<dyn ExecBackend>) -> Self {
        Self {
            config,
            backend,
            interrupted: Arc::new(shutdown_requested),
        }
    }

    /// Replace the Ctrl-C check, e.g. to simulate an interrupt.
    #[must_use]
    pub fn with_interrupt_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.interrupted = Arc::new(check);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn load_manifest(&self) -> Result<Manifest, CoreError> {
        info!("reading {}", self.config.manifest_path.display());
        Ok(parse_manifest_file(&self.config.manifest_path)?)
    }

    /// Resolve one environment. Unknown names fail with [`CoreError::Config`].
    pub fn resolve(&self, manifest: &Manifest, name: &str) -> Result<EnvConfig, CoreError> {
        resolve(manifest, name).map_err(|e| CoreError::config(name, e))
    }

    /// The work directory: `--workdir`, else `[tox] toxworkdir` relative to the
    /// manifest directory.
    pub fn workdir(&self, manifest: &Manifest) -> Result<PathBuf, CoreError> {
        if let Some(dir) = &self.config.workdir {
            return Ok(absolute(manifest.toxinidir(), dir));
        }
        let ctx = SubstContext::default()
            .with_var("toxinidir", path_str(manifest.toxinidir()))
            .with_var("homedir", home_dir());
        let raw = substitute(&manifest.tox().toxworkdir, &ctx)?;
        Ok(absolute(manifest.toxinidir(), Path::new(raw.trim())))
    }

    pub fn records(&self, manifest: &Manifest) -> Result<RecordStore, CoreError> {
        Ok(RecordStore::new(WorkLayout::new(self.workdir(manifest)?)))
    }

    pub fn materialize(
        &self,
        manifest: &Manifest,
        env: &EnvConfig,
    ) -> Result<ContextGuard, CoreError> {
        self.materialize_with(manifest, env, &mut NullEvents)
    }

    /// Lock, create or reuse, and install the isolated context of `env`.
    #[allow(clippy::too_many_lines)]
    pub fn materialize_with(
        &self,
        manifest: &Manifest,
        env: &EnvConfig,
        events: &mut dyn RunEvents,
    ) -> Result<ContextGuard, CoreError> {
        let name = &env.name;
        let layout = WorkLayout::new(self.workdir(manifest)?);
        layout.initialize()?;
        toxide_store::validate_env_name(name)?;

        let lock = EnvLock::try_acquire(&layout.lock_file(name))?
            .ok_or_else(|| CoreError::Locked(name.to_string()))?;
        let records = RecordStore::new(layout.clone());

        let mut context = IsolatedContext::new(&layout, name);
        context.basepython.clone_from(&env.basepython);
        context.sitepackages = env.sitepackages;

        let fingerprint = compute_fingerprint(env);
        context.reused = self.can_reuse(&records, env, &fingerprint, &context);
        if context.reused {
            debug!("{name}: reusing context {}", fingerprint.short());
        } else {
            info!("{name}: creating context {}", fingerprint.short());
            layout.remove_env(name)?;
        }
        layout.prepare_env(name)?;

        let subst = self.substitution_context(manifest, &context, &layout);
        let environ = substitute_setenv(env, &subst)?;
        let subst = SubstContext {
            environ: environ.clone(),
            ..subst
        };
        let setenv: Vec<(String, String)> = env
            .setenv
            .keys()
            .filter_map(|k| environ.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        context.env = command_environment(std::env::vars(), &env.passenv, setenv, &context);
        context.allowlist_externals = env
            .allowlist_externals
            .iter()
            .map(|entry| substitute(entry, &subst))
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::config(name, e))?;

        let mut guard = ContextGuard {
            context,
            subst,
            history: Vec::new(),
            next_log: 1,
            records,
            _lock: lock,
        };

        if !guard.context.reused {
            if let Some(basepython) = env.basepython.as_deref() {
                events.on_create(name, basepython);
                let created = self.backend.create(&guard.context);
                events.on_create_done(name, created.is_ok());
                created?;
            }
            guard.records.put(&EnvRecord::new(
                name.clone(),
                fingerprint,
                env.basepython.clone(),
            ))?;

            if !env.deps.is_empty() {
                let mut packages = Vec::new();
                for dep in &env.deps {
                    let words = substitute(dep, &guard.subst)
                        .and_then(|dep| dep_words(&dep))
                        .map_err(|e| CoreError::config(name, e))?;
                    packages.extend(words);
                }
                if let Err(e) = self.install(&mut guard, env, "deps", &packages, events) {
                    guard.set_state(ContextState::Broken)?;
                    return Err(e);
                }
            }
            guard.set_state(ContextState::Ready)?;
        }

        if let Some(package) = package_spec(env, manifest.toxinidir()) {
            if let Err(e) = self.install(&mut guard, env, "package", &package, events) {
                guard.set_state(ContextState::Broken)?;
                return Err(e);
            }
        }

        Ok(guard)
    }

    fn can_reuse(
        &self,
        records: &RecordStore,
        env: &EnvConfig,
        fingerprint: &toxide_schema::Fingerprint,
        context: &IsolatedContext,
    ) -> bool {
        if self.config.recreate || env.recreate || !records.exists(&env.name) {
            return false;
        }
        match records.get(&env.name) {
            Ok(record) => {
                record.fingerprint == *fingerprint
                    && record.state == ContextState::Ready
                    && (!context.has_venv() || context.envpython.exists())
            }
            Err(e) => {
                warn!("{}: discarding unreadable record: {e}", env.name);
                false
            }
        }
    }

    fn substitution_context(
        &self,
        manifest: &Manifest,
        context: &IsolatedContext,
        layout: &WorkLayout,
    ) -> SubstContext {
        SubstContext {
            posargs: self.config.posargs.clone(),
            environ: std::env::vars().collect(),
            ..SubstContext::default()
        }
        .with_var("envname", context.name.as_str())
        .with_var("envdir", path_str(&context.envdir))
        .with_var("envbindir", path_str(&context.envbindir))
        .with_var("envtmpdir", path_str(&context.envtmpdir))
        .with_var("envlogdir", path_str(&context.envlogdir))
        .with_var("envpython", path_str(&context.envpython))
        .with_var("toxinidir", path_str(manifest.toxinidir()))
        .with_var("toxworkdir", path_str(layout.root()))
        .with_var("homedir", home_dir())
    }

    /// One `install_command` invocation. A word that is exactly `{packages}`
    /// expands to the package words, `{opts}` to nothing.
    fn install(
        &self,
        guard: &mut ContextGuard,
        env: &EnvConfig,
        what: &str,
        packages: &[String],
        events: &mut dyn RunEvents,
    ) -> Result<(), CoreError> {
        let name = &env.name;
        let argv = install_argv(&env.install_command, packages, &guard.subst)
            .map_err(|e| CoreError::config(name, e))?;
        if argv.is_empty() {
            return Err(CoreError::Dependency {
                env: name.to_string(),
                message: "install_command is empty".to_owned(),
            });
        }

        let invocation = Invocation::new(name.clone(), argv, manifest_dir(&guard.subst))
            .with_log(guard.next_log_file());
        let command = invocation.display();
        events.on_install(name, what, &command);
        info!("{name}: installing {what}: {command}");

        let code = match self.backend.exec(&guard.context, &invocation) {
            Ok(code) => code,
            Err(RuntimeError::SpawnFailed { program, message }) => {
                return Err(CoreError::Dependency {
                    env: name.to_string(),
                    message: format!("cannot run '{program}': {message}"),
                });
            }
            Err(e) => return Err(e.into()),
        };
        guard.history.push(CommandRecord {
            command: command.clone(),
            exit_code: code,
            ignored: false,
        });
        if code != 0 {
            return Err(CoreError::Dependency {
                env: name.to_string(),
                message: format!("'{command}' exited with {code}"),
            });
        }
        Ok(())
    }

    pub fn run(&self, guard: &mut ContextGuard, env: &EnvConfig) -> Result<EnvOutcome, CoreError> {
        self.run_with(guard, env, &mut NullEvents)
    }

    /// Run the commands of `env` inside its materialized context.
    ///
    /// The first failing command ends the run with [`CoreError::Command`] unless
    /// `ignore_errors` is set (then the remaining commands still run) or
    /// `ignore_outcome` is set (then the failure is reported as ignored).
    pub fn run_with(
        &self,
        guard: &mut ContextGuard,
        env: &EnvConfig,
        events: &mut dyn RunEvents,
    ) -> Result<EnvOutcome, CoreError> {
        let name = &env.name;
        let changedir = substitute(&env.changedir, &guard.subst)
            .map_err(|e| CoreError::config(name, e))?;
        let cwd = absolute(&manifest_dir(&guard.subst), Path::new(changedir.trim()));
        if !cwd.is_dir() {
            return Err(CoreError::MissingChangedir {
                env: name.to_string(),
                path: cwd.display().to_string(),
            });
        }

        let mut commands = Vec::new();
        let mut failure: Option<(String, i32)> = None;
        let mut interrupted = false;

        for raw in &env.commands {
            if (self.interrupted)() {
                interrupted = true;
                break;
            }
            let (ignore_exit, raw) = match raw.trim().strip_prefix('-') {
                Some(rest) => (true, rest.trim_start()),
                None => (false, raw.trim()),
            };
            let line = substitute(raw, &guard.subst).map_err(|e| CoreError::config(name, e))?;
            let argv = split_command_line(&line).map_err(|e| CoreError::config(name, e))?;
            let Some(program) = argv.first().cloned() else {
                debug!("{name}: skipping empty command line");
                continue;
            };

            let located = locate_program(&program, guard.context.search_path(), &cwd);
            if !guard.context.is_allowed(&program, located.as_deref()) {
                warn!("{name}: '{program}' is not in the environment and not in allowlist_externals");
            }

            let invocation =
                Invocation::new(name.clone(), argv, &cwd).with_log(guard.next_log_file());
            let command = invocation.display();
            events.on_command(name, &cwd.display().to_string(), &command);
            info!("{name}: running {command}");

            let code = match self.backend.exec(&guard.context, &invocation) {
                Ok(code) => code,
                Err(RuntimeError::SpawnFailed { message, .. }) => {
                    warn!("{name}: cannot run '{program}': {message}");
                    127
                }
                Err(e) => return Err(e.into()),
            };
            let record = CommandRecord {
                command: command.clone(),
                exit_code: code,
                ignored: ignore_exit && code != 0,
            };
            guard.history.push(record.clone());
            commands.push(record);

            if code != 0 && !ignore_exit {
                failure.get_or_insert((command, code));
                if !env.ignore_errors {
                    break;
                }
            }
        }

        let status = match failure {
            None if interrupted => EnvStatus::Interrupted,
            None => EnvStatus::Passed,
            Some((command, code)) if env.ignore_outcome => {
                warn!("{name}: ignoring failure of '{command}' (exit {code})");
                EnvStatus::Ignored { command, code }
            }
            Some((command, code)) => {
                return Err(CoreError::Command {
                    env: name.to_string(),
                    command,
                    code,
                })
            }
        };
        Ok(EnvOutcome { status, commands })
    }

    pub fn run_all(&self, manifest: &Manifest, selection: &[EnvName]) -> RunReport {
        self.run_all_with(manifest, selection, &mut NullEvents)
    }

    /// Run every selected environment in order. A failure of one environment
    /// never stops the others; an interrupt marks the rest interrupted.
    pub fn run_all_with(
        &self,
        manifest: &Manifest,
        selection: &[EnvName],
        events: &mut dyn RunEvents,
    ) -> RunReport {
        let mut report = RunReport::default();
        for name in selection {
            events.on_env_start(name);
            let started = Instant::now();
            let result = if (self.interrupted)() {
                EnvResult {
                    name: name.clone(),
                    status: EnvStatus::Interrupted,
                    reused: false,
                    commands: Vec::new(),
                    duration_ms: 0,
                }
            } else {
                let mut result = self.run_env(manifest, name, events);
                result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                result
            };
            info!("{name}: {}", result.status.label());
            events.on_env_finish(&result);
            report.results.push(result);
        }
        report
    }

    fn run_env(&self, manifest: &Manifest, name: &EnvName, events: &mut dyn RunEvents) -> EnvResult {
        let mut result = EnvResult {
            name: name.clone(),
            status: EnvStatus::Passed,
            reused: false,
            commands: Vec::new(),
            duration_ms: 0,
        };

        let env = match self.resolve(manifest, name) {
            Ok(env) => env,
            Err(e) => {
                result.status = EnvStatus::from_error(&e, false);
                return result;
            }
        };
        let skip_missing = self
            .config
            .skip_missing_interpreters
            .unwrap_or(env.skip_missing_interpreters);

        let mut guard = match self.materialize_with(manifest, &env, events) {
            Ok(guard) => guard,
            Err(e) => {
                result.status = EnvStatus::from_error(&e, skip_missing);
                self.store_outcome(manifest, name, &result.status);
                return result;
            }
        };
        result.reused = guard.context.reused;
        result.status = match self.run_with(&mut guard, &env, events) {
            Ok(outcome) => outcome.status,
            Err(e) => EnvStatus::from_error(&e, skip_missing),
        };
        result.commands = guard.history().to_vec();
        if let Err(e) = guard
            .records
            .set_outcome(name, &result.status.label())
        {
            warn!("{name}: could not record outcome: {e}");
        }
        result
    }

    fn store_outcome(&self, manifest: &Manifest, name: &EnvName, status: &EnvStatus) {
        let Ok(records) = self.records(manifest) else {
            return;
        };
        if records.exists(name) {
            if let Err(e) = records.set_outcome(name, &status.label()) {
                warn!("{name}: could not record outcome: {e}");
            }
        }
    }
}

/// `setenv` values substituted in declaration order; later values can refer to
/// earlier ones through `{env:NAME}`. Returns the host environment layered with
/// the results.
fn substitute_setenv(
    env: &EnvConfig,
    base: &SubstContext,
) -> Result<BTreeMap<String, String>, CoreError> {
    let mut ctx = base.clone();
    for (key, raw) in &env.setenv {
        let value = substitute(raw, &ctx).map_err(|e| CoreError::config(&env.name, e))?;
        ctx.environ.insert(key.clone(), value);
    }
    Ok(ctx.environ)
}

/// Installer options (`-r requirements.txt`, `--index-url URL pkg`) split into
/// words; a requirement such as `six; python_version < "3"` is one argument.
fn dep_words(dep: &str) -> Result<Vec<String>, ManifestError> {
    let dep = dep.trim();
    if dep.starts_with('-') {
        split_command_line(dep)
    } else if dep.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![dep.to_owned()])
    }
}

/// The argv of `install_command`. The template is split before substitution so
/// that every package word stays a separate argument.
fn install_argv(
    template: &str,
    packages: &[String],
    subst: &SubstContext,
) -> Result<Vec<String>, ManifestError> {
    let ctx = subst
        .clone()
        .with_var("packages", packages.join(" "))
        .with_var("opts", "");
    let mut argv = Vec::new();
    for word in split_command_line(template)? {
        match word.as_str() {
            "{packages}" => argv.extend(packages.iter().cloned()),
            "{opts}" => {}
            _ => argv.push(substitute(&word, &ctx)?),
        }
    }
    Ok(argv)
}

/// The package installation every run performs, as `{packages}` words.
fn package_spec(env: &EnvConfig, toxinidir: &Path) -> Option<Vec<String>> {
    if env.skip_install {
        return None;
    }
    let dir = path_str(toxinidir);
    if env.usedevelop {
        Some(vec!["-e".to_owned(), dir])
    } else if !env.skipsdist {
        Some(vec![dir])
    } else {
        None
    }
}

fn manifest_dir(subst: &SubstContext) -> PathBuf {
    subst
        .vars
        .get("toxinidir")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default()
}
