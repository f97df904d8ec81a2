//! # OSC Recorder
//!
//! Captures Open Sound Control streams over UDP, previews the latest value
//! per address, records frame-quantized time series for timeline playback,
//! and emits OSC and Art-Net DMX.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── HOST ─────────────────────────────────┐
//! │                                                                       │
//! │   UI / app shell ──► RecorderBridge (bridge::host)                    │
//! │                        │  pending calls: id ─► oneshot               │
//! │                        │  status fan-out (broadcast)                  │
//! │   OscSender / ArtNetSender (network::sender) ──► UDP out              │
//! └────────────────────────┼──────────────────────────────────────────────┘
//!                          │ RpcEnvelope {id, method, payload}  ▲ WorkerEvent
//!                          ▼                                    │
//! ┌──────────────────────────────── WORKER ───────────────────────────────┐
//! │                                                                       │
//! │   UDP in ──► UdpChannel (network::listener)                           │
//! │                 │ codec::decoder  (bundles flattened)                 │
//! │                 ▼ first finite numeric arg                            │
//! │            RecorderEngine (recorder::engine)                          │
//! │              ├─ latest value per address                              │
//! │              ├─ preview cache  (idle: latest sample per address)      │
//! │              └─ record queue   (armed+playing: one item per frame)    │
//! │                 ▲                                                     │
//! │            FrameScheduler tick ── frames computed from wall clock     │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod recorder;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Record queue capacity; overflow drops the oldest items
    pub const RECORD_QUEUE_MAX_ITEMS: usize = 50_000_000;

    /// Distinct addresses held in the preview cache
    pub const PREVIEW_MAX_ITEMS: usize = 65_536;

    /// Maximum items returned by one drain
    pub const DRAIN_CHUNK_SIZE: usize = 8_192;

    /// Drained prefix size that allows record queue compaction
    pub const COMPACT_THRESHOLD: usize = 65_536;

    /// Bundles nested deeper than this are dropped
    pub const MAX_BUNDLE_DEPTH: usize = 32;

    /// Default project frame rate
    pub const DEFAULT_FPS: f64 = 30.0;

    /// Default project length in seconds
    pub const DEFAULT_PROJECT_LENGTH_SECS: f64 = 120.0;

    /// Lower bound of the frame polling period in milliseconds
    pub const MIN_TICK_MS: f64 = 2.0;

    /// Default bind address for listeners
    pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

    /// Default recorder input port
    pub const DEFAULT_LISTEN_PORT: u16 = 9001;

    /// Default live control input port
    pub const DEFAULT_CONTROL_PORT: u16 = 9002;

    /// Default host for outbound OSC and Art-Net
    pub const DEFAULT_SEND_HOST: &str = "127.0.0.1";

    /// Default outbound OSC port
    pub const DEFAULT_OSC_SEND_PORT: u16 = 9000;

    /// Standard Art-Net port
    pub const DEFAULT_ARTNET_PORT: u16 = 6454;

    /// Largest UDP datagram accepted
    pub const MAX_DATAGRAM_SIZE: usize = 65_536;
}
