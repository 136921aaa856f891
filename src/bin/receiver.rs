//! Stream Receiver Application
//!
//! Connects to a PCM sender over TCP and plays the stream on an output
//! device until interrupted or the stream breaks.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_stream_player::{
    audio::{list_output_devices, CpalSinkFactory},
    config::AppConfig,
    StreamController,
};

#[derive(Parser, Debug)]
#[command(name = "receiver", version, about = "Play raw PCM audio streamed over TCP")]
struct Args {
    /// Sender host name or address
    #[arg(long)]
    host: Option<String>,

    /// Sender TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Sample rate in Hz
    #[arg(short, long)]
    rate: Option<u32>,

    /// Bits per sample: 8, 16, 24 or 32 (float)
    #[arg(short, long)]
    bits: Option<u16>,

    /// Single channel stream
    #[arg(long)]
    mono: bool,

    /// Packet duration in milliseconds
    #[arg(long)]
    buffer_ms: Option<u32>,

    /// Size packets from the output device's minimum buffer
    #[arg(long)]
    min_buffer: bool,

    /// Request the device's low latency mode
    #[arg(long)]
    low_latency: bool,

    /// Reconnect with backoff when the connection drops
    #[arg(long)]
    retry: bool,

    /// Look for the sender on the USB tethering subnet
    #[arg(long)]
    gateway: bool,

    /// Output device name
    #[arg(short, long)]
    device: Option<String>,

    /// Config file, defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        let stream = &mut config.stream;
        if let Some(host) = &self.host {
            stream.host = host.clone();
        }
        if let Some(port) = self.port {
            stream.port = port;
        }
        if let Some(rate) = self.rate {
            stream.sample_rate = rate;
        }
        if let Some(bits) = self.bits {
            stream.bit_depth = bits;
        }
        if self.mono {
            stream.channels = 1;
        }
        if let Some(buffer_ms) = self.buffer_ms {
            stream.buffer_ms = buffer_ms;
        }
        if let Some(device) = &self.device {
            stream.output_device = Some(device.clone());
        }
        stream.use_device_min_buffer |= self.min_buffer;
        stream.low_latency_mode |= self.low_latency;
        stream.retry_on_disconnect |= self.retry;
        stream.use_gateway_discovery |= self.gateway;
    }
}

fn print_devices() {
    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    args.apply(&mut config);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    tracing::info!("Starting PCM Stream Receiver");

    if args.save_config {
        config
            .save(&config_path)
            .with_context(|| format!("saving {}", config_path.display()))?;
        tracing::info!("Configuration saved to {}", config_path.display());
    }

    let (controller, mut events) =
        StreamController::new(Arc::new(CpalSinkFactory), config.retry.clone());
    let id = controller.play(config.stream.clone())?;
    tracing::info!("Streaming from {}", config.stream.endpoint());

    let stats_interval = config.logging.stats_interval_secs;
    let mut stats_timer =
        tokio::time::interval(Duration::from_secs(stats_interval.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if controller.handle_event(event) == Some(id) {
                    break;
                }
            }
            _ = stats_timer.tick(), if stats_interval > 0 => {
                for stream in controller.streams() {
                    tracing::info!(
                        "{} {:?}: {} read, {} written, {} dropped ({:.1}%), {} connections",
                        stream.endpoint,
                        stream.state,
                        stream.stats.packets_read,
                        stream.stats.packets_written,
                        stream.stats.packets_dropped,
                        stream.stats.drop_rate() * 100.0,
                        stream.stats.connections
                    );
                }
            }
        }
    }

    controller.stop_all();
    // Give the worker threads a moment to release the device
    tokio::time::sleep(Duration::from_millis(200)).await;
    tracing::info!("Receiver stopped");
    Ok(())
}
