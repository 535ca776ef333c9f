//! Optipack CLI - Batch image resizing and re-encoding with streamed ZIP output.
//!
//! Optipack resizes and re-encodes images (JPEG, PNG, WebP and pass-through
//! formats) and packs batches into a ZIP archive that is streamed while it is
//! being built. It runs as an HTTP service or as a one-shot command.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP server
//! optipack serve --port 3002
//!
//! # Transform a single image
//! optipack process photo.jpg --width 800 --keep-aspect --format webp
//!
//! # Transform a directory into an archive
//! optipack batch ./photos/ --output photos.zip --width 1200 --keep-aspect
//!
//! # View configuration
//! optipack config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;
mod server;

/// Optipack - Batch image resizing and re-encoding with streamed ZIP output.
#[derive(Parser, Debug)]
#[command(name = "optipack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve(cli::serve::ServeArgs),

    /// Transform a single image
    Process(cli::process::ProcessArgs),

    /// Transform a directory of images into a ZIP archive
    Batch(cli::batch::BatchArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),

    /// Print the size presets
    Presets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI overrides.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match optipack_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `optipack config path`."
            );
            optipack_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Optipack v{}", optipack_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args).await,
        Commands::Process(args) => cli::process::execute(args).await,
        Commands::Batch(args) => cli::batch::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
        Commands::Presets => cli::presets::execute().await,
    }
}
