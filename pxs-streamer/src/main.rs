//! pxs-streamer entry point.
//!
//! ```text
//! pxs-streamer                       Stream with defaults
//! pxs-streamer --config <path>       Load a custom config TOML
//! pxs-streamer --server <host:port>  Override the server address
//! pxs-streamer --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pxs_streamer::config::StreamerConfig;
use pxs_streamer::pattern::Band;
use pxs_streamer::producer::run_producer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pxs-streamer", about = "Stream a synthetic test pattern")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pxs-streamer.toml")]
    config: PathBuf,

    /// Server address (overrides config). Example: 127.0.0.1:1701
    #[arg(short, long)]
    server: Option<String>,

    /// Stream identifier (overrides config).
    #[arg(long)]
    stream_id: Option<String>,

    /// Number of frames to send, 0 for unlimited (overrides config).
    #[arg(long)]
    frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&StreamerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = StreamerConfig::load(&cli.config);
    if let Some(addr) = cli.server {
        config.network.server_address = addr;
    }
    if let Some(id) = cli.stream_id {
        config.stream.stream_id = id;
    }
    if let Some(frames) = cli.frames {
        config.stream.frames = frames;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pxs-streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", config.network.server_address);
    info!(
        "stream {}: {}x{} @ {} fps, {} source(s)",
        config.stream.stream_id,
        config.stream.width,
        config.stream.height,
        config.stream.fps,
        config.stream.sources
    );

    let running = Arc::new(AtomicBool::new(true));

    // Ctrl-C handler.
    let stop = Arc::clone(&running);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping");
        stop.store(false, Ordering::SeqCst);
    });

    let config = Arc::new(config);
    let mut producers = Vec::new();
    for band in Band::split(config.stream.width, config.stream.sources) {
        let config = Arc::clone(&config);
        let running = Arc::clone(&running);
        producers.push(tokio::spawn(async move {
            run_producer(&config, band, running).await
        }));
    }

    let mut total = 0;
    for producer in producers {
        match producer.await? {
            Ok(sent) => total += sent,
            Err(e) => error!("producer failed: {e}"),
        }
    }
    info!(frames = total, "pxs-streamer stopped");
    Ok(())
}
