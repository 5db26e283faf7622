//! repos-ratelimit: inspect and exercise the provider rate limiters used by `repos`

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

use repos_ratelimit::commands::{handle_profiles_command, handle_simulate_command, SimulateOptions};

/// Adaptive per-service rate limiting for GitHub, GitLab and Gitea clients
#[derive(Debug, Parser)]
#[command(name = "repos-ratelimit", version, about)]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity,

    #[command(subcommand)]
    command: Command,
}

/// `-v` raises and `-q` lowers the log level; warnings are shown by default
#[derive(Debug, Args)]
struct Verbosity {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl Verbosity {
    fn log_level_filter(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the effective rate limit profile table
    Profiles {
        /// Profile override file (defaults to $REPOS_RATELIMIT_CONFIG or the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run a limiter against a simulated provider and print its statistics
    Simulate {
        /// Service profile to use (github, gitlab, gitea or a configured name)
        #[arg(long, default_value = "github")]
        service: String,

        /// Number of requests to send
        #[arg(long, default_value_t = 200)]
        requests: usize,

        /// Quota the simulated provider enforces per window
        #[arg(long, default_value_t = 50)]
        limit: u64,

        /// Provider window length in milliseconds
        #[arg(long, default_value_t = 2000)]
        window_ms: u64,

        /// Concurrent clients (default: CPU cores + 2, capped at 12)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Give up on a single wait after this many milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,

        /// Profile override file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Installs env_logger; `RUST_LOG` wins over the verbosity flags
fn init_logging(verbosity: &Verbosity) {
    let env = Env::default().filter_or("RUST_LOG", "warn");
    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("repos_ratelimit", verbosity.log_level_filter());
    }

    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);

    match cli.command {
        Command::Profiles { config, json } => handle_profiles_command(config.as_deref(), json),
        Command::Simulate {
            service,
            requests,
            limit,
            window_ms,
            concurrency,
            timeout_ms,
            config,
            json,
        } => {
            handle_simulate_command(SimulateOptions {
                service,
                requests,
                limit,
                window: Duration::from_millis(window_ms),
                concurrency,
                timeout: Duration::from_millis(timeout_ms),
                config,
                json,
            })
            .await
        }
    }
}
