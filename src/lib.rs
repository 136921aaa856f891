//! # PCM Stream Player
//!
//! Low-latency playback of raw PCM audio received over TCP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        StreamController (owner)                      │
//! │   play / add_stream / stop / set_volume        ◄── PipelineEvent ──┐ │
//! └──────────────┬───────────────────────────────────────────────────┼──┘
//!                │ one Pipeline per stream                           │
//!                ▼                                                   │
//! ┌──────────────────────────────────────────────────────────────────┼──┐
//! │                              Pipeline                            │  │
//! │                                                                  │  │
//! │  ┌─────────────────────┐   offer    ┌──────────────┐             │  │
//! │  │ NetworkReader       │ ─────────► │ Stream queue │             │  │
//! │  │ thread "net:h:p"    │  (drop     │  (3 packets) │             │  │
//! │  │ TCP + retry backoff │   newest)  └──────┬───────┘             │  │
//! │  └─────────┬───────────┘                   │ take                │  │
//! │            │ acquire            ┌──────────▼──────────┐          │  │
//! │     ┌──────┴───────┐  release   │ AudioWriter         │          │  │
//! │     │ Packet pool  │ ◄───────── │ thread "audio:h:p"  │          │  │
//! │     │ (5 buffers)  │            │ owns the AudioSink  │          │  │
//! │     └──────────────┘            └──────────┬──────────┘          │  │
//! │                                            ▼                     │  │
//! │                                  cpal output device              │  │
//! │                                                                  │  │
//! │   reader gives up ──────────── StreamBroken (once) ──────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod shutdown;
pub mod stats;

pub use config::{AppConfig, RetryConfig, StreamConfig};
pub use controller::{StreamController, StreamInfo};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineEvent, PipelineId, PipelineState};

/// Application-wide constants
pub mod constants {
    /// Default sample rate in Hz
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default bit depth (32-bit float)
    pub const DEFAULT_BIT_DEPTH: u16 = 32;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default packet duration in milliseconds
    pub const DEFAULT_BUFFER_MS: u32 = 50;

    /// Packet durations at or below this use the default
    pub const MIN_BUFFER_MS: u32 = 5;

    /// Default TCP port of the sender
    pub const DEFAULT_PORT: u16 = 12345;

    /// Stream queue capacity in packets
    pub const NUM_PACKETS: usize = 3;

    /// Connect and read timeout
    pub const SOCKET_TIMEOUT_MS: u64 = 5000;

    /// Per-host timeout during gateway discovery
    pub const PROBE_TIMEOUT_MS: u64 = 1000;

    /// Echo port used to probe hosts
    pub const PROBE_PORT: u16 = 7;

    /// Substring identifying a USB tethering interface
    pub const TETHER_INTERFACE_MARKER: &str = "rndis";

    /// Reconnect backoff: (sleep seconds, attempts) per tier
    pub const DEFAULT_RETRY_TIERS: &[(u64, u32)] = &[(5, 12), (20, 6), (60, 2)];

    /// Config file name inside the config directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
