//! update-scout: one discovery pass against a firewall console.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

mod cli;

#[derive(Parser)]
#[command(
    name = "update-scout",
    about = "Find the newest signature update on a firewall console, record it and archive its release notes",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    /// Also reads UPDATE_SCOUT_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, find the latest update, store it and archive its notes (default).
    Run,

    /// Check configuration, browser, download directory and store.
    Doctor,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   update-scout completions bash > ~/.local/share/bash-completion/completions/update-scout
    ///   update-scout completions zsh > ~/.zfunc/_update-scout
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cli::run_cmd::run(cli.config.as_deref(), cli.json).await,
        Commands::Doctor => cli::doctor::run(cli.config.as_deref(), cli.json).await,
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "update-scout",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
