use crate::backend::{ExecBackend, Invocation};
use crate::context::IsolatedContext;
use crate::prereq::{locate_interpreter, locate_program};
use crate::RuntimeError;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Runs commands as ordinary host processes and creates venvs with
/// `<basepython> -m venv`.
#[derive(Debug, Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ExecBackend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn available(&self) -> bool {
        true
    }

    fn create(&self, ctx: &IsolatedContext) -> Result<(), RuntimeError> {
        let Some(basepython) = ctx.basepython.as_deref() else {
            return Ok(());
        };
        let interpreter =
            locate_interpreter(basepython).ok_or_else(|| RuntimeError::InterpreterNotFound {
                env: ctx.name.to_string(),
                basepython: basepython.to_owned(),
            })?;

        let mut cmd = Command::new(&interpreter);
        cmd.args(["-m", "venv"]);
        if ctx.sitepackages {
            cmd.arg("--system-site-packages");
        }
        cmd.arg(&ctx.envdir);
        info!("{}: creating virtualenv with {}", ctx.name, interpreter.display());

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::VenvFailed {
                env: ctx.name.to_string(),
                message: stderr.trim().to_owned(),
            });
        }
        Ok(())
    }

    fn exec(&self, ctx: &IsolatedContext, invocation: &Invocation) -> Result<i32, RuntimeError> {
        let Some((program, args)) = invocation.argv.split_first() else {
            return Err(RuntimeError::ExecFailed("empty command line".to_owned()));
        };
        let executable = locate_program(program, ctx.search_path(), &invocation.cwd)
            .unwrap_or_else(|| PathBuf::from(program));
        debug!(
            "{}: exec {} in {}",
            ctx.name,
            executable.display(),
            invocation.cwd.display()
        );

        let log = match &invocation.log {
            Some(path) => Some(Arc::new(Mutex::new(open_log(path, invocation)?))),
            None => None,
        };

        let mut child = Command::new(&executable)
            .args(args)
            .current_dir(&invocation.cwd)
            .env_clear()
            .envs(&ctx.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::SpawnFailed {
                program: program.clone(),
                message: e.to_string(),
            })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tee(stdout, Stream::Stdout, log.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tee(stderr, Stream::Stderr, log.clone()));
        }

        let status = child.wait()?;
        for pump in pumps {
            pump.join()
                .map_err(|_| RuntimeError::ExecFailed("output copy thread panicked".to_owned()))?;
        }
        Ok(exit_code(status))
    }
}

fn open_log(path: &std::path::Path, invocation: &Invocation) -> Result<File, RuntimeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    writeln!(file, "cwd: {}", invocation.cwd.display())?;
    writeln!(file, "cmd: {}\n", invocation.display())?;
    Ok(file)
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Copy `source` to the terminal and, when given, to the shared log file.
fn tee<R>(mut source: R, stream: Stream, log: Option<Arc<Mutex<File>>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            let chunk = &buf[..n];
            let _ = match stream {
                Stream::Stdout => io::stdout().lock().write_all(chunk),
                Stream::Stderr => io::stderr().lock().write_all(chunk),
            };
            if let Some(log) = &log {
                if let Ok(mut file) = log.lock() {
                    let _ = file.write_all(chunk);
                }
            }
        }
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
