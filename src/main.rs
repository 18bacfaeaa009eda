//! Robot streamer CLI application

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use robot_mjpeg_streamer::config::Config;
use robot_mjpeg_streamer::{
    Capture, CommandListener, CommandRegistry, DestinationRegistry, LogActuator, Streamer,
    SubscriptionListener,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "robot-streamer")]
#[command(about = "MJPEG-over-UDP camera streamer with UDP command channel")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    info!("Robot streamer starting");
    info!(config_path = %cli.config, "Loading configuration");

    let config = Config::load_or_default(&cli.config)?;

    info!(
        subscribe_port = %config.network.subscribe_port,
        command_port = %config.network.command_port,
        fps = %config.camera.fps,
        "Configuration loaded"
    );

    // Shared registries, handed to every worker at construction
    let destination = Arc::new(DestinationRegistry::new());
    let commands = Arc::new(CommandRegistry::new());

    // Camera first: a camera that cannot open must fail startup visibly
    let mut capture = Capture::new(config.camera.clone())?;
    let frame_rx = capture.start().await?;

    let any_addr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

    let subscriptions = SubscriptionListener::bind(
        SocketAddr::new(any_addr, config.network.subscribe_port),
        Arc::clone(&destination),
        config.network.default_video_port,
    )
    .await?;

    let command_listener = CommandListener::bind(
        SocketAddr::new(any_addr, config.network.command_port),
        Arc::clone(&destination),
        Arc::clone(&commands),
        Arc::new(LogActuator),
        config.network.default_video_port,
    )
    .await?;

    let streamer = Streamer::new(
        config.network.magic,
        config.network.max_payload,
        config.camera.fps,
        Arc::clone(&destination),
        frame_rx,
    )
    .await?;

    tokio::spawn(subscriptions.run());
    tokio::spawn(command_listener.run());
    tokio::spawn(streamer.run());

    info!("All workers running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    capture.stop().await?;

    Ok(())
}
