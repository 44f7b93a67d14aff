//! Command-line interface for the Ambrosia launcher.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{runtime::RuntimeMode, services::ServiceName};

/// Verbosity accepted by `--log-level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    #[value(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive for `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Command-line interface for the Ambrosia launcher.
#[derive(Parser)]
#[command(name = "ambrosia-launcher", version, author)]
#[command(about = "Starts and supervises the Ambrosia POS services", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Path to the launcher settings (defaults to `~/.Ambrosia-POS/launcher.yaml`).
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Home directory holding `.Ambrosia-POS` and `.phoenix`.
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Directory with the bundled runtimes of a packaged install.
    #[arg(long, value_name = "DIR", global = true)]
    pub resources_dir: Option<PathBuf>,

    /// Source checkout used in development mode.
    #[arg(long, value_name = "DIR", global = true)]
    pub project_dir: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Development/production switch shared by several commands.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ModeArgs {
    /// Use fixed ports and PATH commands; phoenixd and the backend are
    /// expected to be running already.
    #[arg(long)]
    pub dev: bool,
}

impl ModeArgs {
    pub fn mode(&self) -> RuntimeMode {
        if self.dev {
            RuntimeMode::Development
        } else {
            RuntimeMode::Production
        }
    }
}

/// Available commands for the launcher.
#[derive(Subcommand)]
pub enum Commands {
    /// Start all services and keep them running until interrupted.
    Start {
        #[command(flatten)]
        mode: ModeArgs,

        /// Print lifecycle events as JSON lines.
        #[arg(long)]
        json_events: bool,
    },

    /// Allocate ports and write the configuration files without starting anything.
    Init {
        #[command(flatten)]
        mode: ModeArgs,
    },

    /// Show the ports that would be assigned to each service.
    Ports {
        #[command(flatten)]
        mode: ModeArgs,
    },

    /// Show today's log for a service.
    Logs {
        /// One of phoenixd, backend or nextjs.
        service: ServiceName,

        /// Number of lines to show (default: 50).
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Work with the backend's recovery secret.
    Secret {
        #[command(subcommand)]
        command: SecretCommand,
    },
}

#[derive(Subcommand)]
pub enum SecretCommand {
    /// Check whether a mnemonic is a valid BIP39 phrase.
    Check {
        /// The words of the mnemonic, quoted or as separate arguments.
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
