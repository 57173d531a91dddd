//! `bridgectl`: drive the node bridge from a shell.
//!
//! Runs every command against the in-process loopback node, printing base64
//! replies and JSON events on stdout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bridgectl::{config_path, init_config, list_methods, CliError, Session};
use clap::{Parser, Subcommand};
use nodebridge_config::Config;
use registry::InvocationKind;

/// Command-line interface configuration for bridgectl.
#[derive(Parser, Debug)]
#[command(name = "bridgectl", about = "Exercise the node bridge against a loopback node", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Namespace of the node session
    #[arg(long, global = true)]
    namespace: Option<String>,
    /// Milliseconds to wait for each stream delivery
    #[arg(long, default_value_t = 1000, global = true)]
    wait_ms: u64,
}

/// Available bridgectl commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List the methods the bridge routes
    Methods {
        /// Restrict to one table (unary, server-stream, bidi-stream)
        #[arg(long)]
        kind: Option<InvocationKind>,
    },
    /// Invoke a unary method and print the base64 reply
    Call {
        method: String,
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Start a server stream and print its events as JSON lines
    Subscribe {
        method: String,
        #[arg(long, default_value = "")]
        payload: String,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Open the channel acceptor, write one message and print the reply
    Accept {
        #[arg(long)]
        message: String,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

/// Main entry point for the bridgectl application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = config_path(cli.config)?;
    if let Commands::Config { action } = &cli.cmd {
        return run_config(action, &path);
    }

    let config = Config::load_or_default(&path)?;
    nodebridge_logging::init(&config.logging)?;
    nodebridge_logging::trace("bridgectl", &format!("config from {}", path.display()));

    let namespace = cli.namespace.unwrap_or_else(|| config.bridge.default_namespace.clone());
    let wait = Duration::from_millis(cli.wait_ms);
    let mut stdout = std::io::stdout().lock();

    match cli.cmd {
        Commands::Methods { kind } => list_methods(kind, &mut stdout)?,
        Commands::Call { method, payload } => {
            let session = Session::loopback(&config.bridge)?;
            writeln!(stdout, "{}", session.call(&namespace, &method, &payload).await?)?;
        }
        Commands::Subscribe { method, payload, count } => {
            let session = Session::loopback(&config.bridge)?;
            let events = session.subscribe(&namespace, &method, &payload, count, wait).await?;
            for event in &events {
                writeln!(stdout, "{}", serde_json::to_string(event)?)?;
            }
            if let Some(error) = events.iter().find_map(|event| event.error.clone()) {
                return Err(CliError::Message(error));
            }
        }
        Commands::Accept { message } => {
            let session = Session::loopback(&config.bridge)?;
            writeln!(stdout, "{}", session.accept(&namespace, &message, wait).await?)?;
        }
        // Handled before logging is set up.
        Commands::Config { .. } => {}
    }
    Ok(())
}

fn run_config(action: &ConfigAction, path: &std::path::Path) -> Result<(), CliError> {
    match action {
        ConfigAction::Init { force } => {
            init_config(path, *force)?;
            println!("wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load_or_default(path)?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}
