//! Head pose HTTP service.

use anyhow::{Context, Result};
use clap::Parser;
use head_pose_server::{
    app::{HeadPoseApp, Models},
    config::Config,
    server,
};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Head Pose Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let models = Models::load(&config).context("Failed to load models")?;
    let app = HeadPoseApp::new(models, &config)?;

    server::serve(app, &config.server).await?;

    Ok(())
}
