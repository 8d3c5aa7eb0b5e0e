//! pxs-server entry point.
//!
//! ```text
//! pxs-server                     Listen with defaults
//! pxs-server --config <path>     Load a custom config TOML
//! pxs-server --port <port>       Override the listen port
//! pxs-server --gen-config        Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pxs_core::StreamServer;
use pxs_server::config::ServerConfig;
use pxs_server::consumer::FrameConsumer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pxs-server", about = "Headless pixel-stream receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pxs-server.toml")]
    config: PathBuf,

    /// Listen port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Decode JPEG segments on arrival (overrides config).
    #[arg(long)]
    decode: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.listen_port = port;
    }
    if cli.decode {
        config.consumer.decode_segments = true;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pxs-server v{}", env!("CARGO_PKG_VERSION"));
    info!("max buffered frames: {}", config.dispatcher.max_buffered_frames);
    info!("decode segments: {}", config.consumer.decode_segments);

    let server = StreamServer::bind(config.bind_address(), config.dispatcher.clone()).await?;
    let (handle, events) = server.spawn()?;

    // Ctrl-C handler.
    let shutdown = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        shutdown.shutdown();
    });

    let stats = FrameConsumer::new(handle, &config.consumer).run(events).await;
    for (stream_id, stats) in stats {
        info!(stream = %stream_id, frames = stats.frames, bytes = stats.bytes, "final");
    }
    info!("pxs-server stopped");
    Ok(())
}
