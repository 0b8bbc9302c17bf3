//! smbova
//!
//! Command-line access to network file shares.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand};
use client::config::Config;
use client::{Dispatcher, ShareClient};
use protocol::{Command, Response, TextEncoding};

/// smbova - browse, read and transfer files on network shares.
#[derive(Parser, Debug)]
#[command(name = "smbova")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Account name for the session (overrides the configuration)
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Password for the session (overrides the configuration)
    #[arg(short, long, global = true)]
    pub password: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List a network, server, share or directory
    #[command(alias = "ls")]
    List {
        /// Remote address, e.g. smb://nas/public/
        path: String,
    },

    /// Print a remote file as text
    #[command(alias = "cat")]
    ReadText {
        /// Remote file address
        path: String,

        /// Text encoding (utf-8, utf-16le, utf-16be, latin1)
        #[arg(long, short, default_value = "utf-8")]
        encoding: TextEncoding,
    },

    /// Print a remote file as base64
    ReadBytes {
        /// Remote file address
        path: String,
    },

    /// Create an empty file
    #[command(alias = "touch")]
    CreateFile {
        /// Remote file address
        path: String,
    },

    /// Create an empty directory
    #[command(alias = "mkdir")]
    CreateDirectory {
        /// Remote directory address
        path: String,
    },

    /// Delete a file or directory tree
    #[command(alias = "rm")]
    Delete {
        /// Remote address
        path: String,
    },

    /// Rename an entry within its share
    Rename {
        /// Current address
        path: String,
        /// New address
        new_path: String,
    },

    /// Copy an entry
    #[command(alias = "cp")]
    Copy {
        /// Source address
        path: String,
        /// Destination address
        new_path: String,
    },

    /// Copy an entry, then delete the source
    #[command(alias = "mv")]
    Move {
        /// Source address
        path: String,
        /// Destination address
        new_path: String,
    },

    /// Upload a local file
    Upload {
        /// Local file to read
        local_path: PathBuf,
        /// Remote file address
        remote_path: String,
    },

    /// Download a remote file
    Download {
        /// Remote file address
        remote_path: String,
        /// Local file to write
        local_path: PathBuf,
    },
}

impl Commands {
    /// Convert to the boundary command.
    pub fn into_command(self) -> Command {
        match self {
            Commands::List { path } => Command::List { path },
            Commands::ReadText { path, encoding } => Command::ReadText { path, encoding },
            Commands::ReadBytes { path } => Command::ReadByteArray { path },
            Commands::CreateFile { path } => Command::CreateFile { path },
            Commands::CreateDirectory { path } => Command::CreateDirectory { path },
            Commands::Delete { path } => Command::Delete { path },
            Commands::Rename { path, new_path } => Command::Rename { path, new_path },
            Commands::Copy { path, new_path } => Command::Copy { path, new_path },
            Commands::Move { path, new_path } => Command::Move { path, new_path },
            Commands::Upload {
                local_path,
                remote_path,
            } => Command::Upload {
                local_path: local_path.display().to_string(),
                remote_path,
            },
            Commands::Download {
                remote_path,
                local_path,
            } => Command::Download {
                remote_path,
                local_path: local_path.display().to_string(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let config = resolve_config(config, &cli)?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config, cli.verbose))
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(
        log_level = %config.client.log_level,
        shares = config.shares.len(),
        "Configuration loaded"
    );

    let dispatcher = Dispatcher::new(ShareClient::from_config(&config));
    let command = cli.command.into_command();
    let name = command.name();

    let last_percent = AtomicU8::new(u8::MAX);
    let result = dispatcher
        .dispatch_with_progress(command, move |fraction| {
            let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;
            if last_percent.swap(percent, Ordering::Relaxed) != percent {
                eprint!("\r{name}: {percent:>3}%");
                if percent == 100 {
                    eprintln!();
                }
            }
        })
        .await;

    match result {
        Ok(response) => {
            println!("{}", render_response(&response)?);
            Ok(())
        }
        Err(e) => {
            let message = e.to_error_message(Some(name.to_string()));
            eprintln!("{}", serde_json::to_string_pretty(&message)?);
            std::process::exit(1);
        }
    }
}

/// Apply environment variable overrides, then command line credentials, and
/// validate the result.
fn resolve_config(mut config: Config, cli: &Cli) -> anyhow::Result<Config> {
    config.apply_env_overrides();
    if let Some(username) = &cli.username {
        config.auth.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.auth.password = password.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Tracing filter for a resolved configuration.
fn log_filter(config: &Config, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.client.log_level.to_lowercase()
    }
}

/// Render a response as JSON, encoding raw bytes as base64.
fn render_response(response: &Response) -> anyhow::Result<String> {
    let value = match response {
        Response::Bytes(data) => serde_json::json!({
            "kind": "bytes",
            "value": base64::engine::general_purpose::STANDARD.encode(data),
        }),
        other => serde_json::to_value(other).context("Failed to encode response")?,
    };
    serde_json::to_string_pretty(&value).context("Failed to encode response")
}
