//! The `optipack serve` command: run the HTTP server.

use clap::Args;
use optipack_core::{BatchService, Config};
use std::net::SocketAddr;
use std::path::PathBuf;

use super::expand_path;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory of static files served for unknown paths (overrides config)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Number of parallel workers per batch (overrides config)
    #[arg(long)]
    pub parallel: Option<usize>,
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(parallel) = args.parallel {
        anyhow::ensure!(parallel > 0, "--parallel must be at least 1");
        config.processing.parallel_workers = parallel;
    }

    let static_dir = match args.static_dir {
        Some(dir) => Some(expand_path(&dir)),
        None => config.static_dir(),
    };
    if let Some(dir) = &static_dir {
        anyhow::ensure!(dir.is_dir(), "Static directory not found: {}", dir.display());
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    tracing::info!(
        "Starting optipack v{} ({} workers, {} MB per image, {} images per batch)",
        optipack_core::VERSION,
        config.processing.parallel_workers,
        config.limits.max_file_size_mb,
        config.limits.max_batch_items
    );

    crate::server::serve(BatchService::new(config), addr, static_dir).await
}
