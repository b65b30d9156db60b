mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;
use toxide_core::{install_signal_handler, Orchestrator, RunnerConfig, UserDefaults};

#[derive(Debug, Parser)]
#[command(
    name = "toxide",
    version,
    about = "Run test and lint environments described by a tox.ini"
)]
struct Cli {
    /// Manifest file.
    #[arg(short = 'c', long = "config", default_value = toxide_core::DEFAULT_MANIFEST, global = true)]
    manifest: PathBuf,

    /// Work directory for isolated contexts (overrides [tox] toxworkdir).
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Execution backend: host or mock.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Materialize and run environments (default selection: TOXENV, then envlist).
    Run {
        /// Environments to run; ALL selects every environment.
        envs: Vec<String>,
        /// Environments to run, comma-separated.
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        /// Recreate contexts even when they could be reused.
        #[arg(short, long, default_value_t = false)]
        recreate: bool,
        /// Report environments with a missing interpreter as skipped.
        #[arg(long, default_value_t = false)]
        skip_missing_interpreters: bool,
        /// Write the run report as JSON to this file.
        #[arg(long)]
        result_json: Option<PathBuf>,
        /// Positional arguments substituted for {posargs} (after --).
        #[arg(last = true)]
        posargs: Vec<String>,
    },
    /// List environments with their descriptions.
    List {
        /// Include environments that are not in the envlist.
        #[arg(short, long, default_value_t = false)]
        all: bool,
    },
    /// Show the resolved configuration of an environment, or a raw section.
    Config {
        /// Environment to resolve.
        #[arg(short = 'e', long = "env")]
        env: Option<String>,
        /// Raw manifest section to print, e.g. flake8.
        #[arg(long, conflicts_with = "env")]
        section: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TOXIDE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let defaults = match UserDefaults::load() {
        Ok(defaults) => defaults,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let mut config = RunnerConfig::from_defaults(&cli.manifest, &defaults);
    if let Some(workdir) = cli.workdir {
        config.workdir = Some(workdir);
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Run {
            envs,
            env,
            recreate,
            skip_missing_interpreters,
            result_json,
            posargs,
        } => {
            config.recreate = recreate;
            config.posargs = posargs;
            if skip_missing_interpreters {
                config.skip_missing_interpreters = Some(true);
            }
            let requested: Vec<String> = env.into_iter().chain(envs).collect();
            orchestrator(config).and_then(|orch| {
                commands::run::run(&orch, &requested, result_json.as_deref(), json_output)
            })
        }
        Commands::List { all } => {
            orchestrator(config).and_then(|orch| commands::list::run(&orch, all, json_output))
        }
        Commands::Config { env, section } => orchestrator(config).and_then(|orch| {
            commands::config::run(&orch, env.as_deref(), section.as_deref(), json_output)
        }),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn orchestrator(config: RunnerConfig) -> Result<Orchestrator, String> {
    Orchestrator::new(config).map_err(|e| e.to_string())
}
