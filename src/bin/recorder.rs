//! OSC Recorder Application
//!
//! Runs the recorder worker behind the bridge, listens for OSC and prints
//! what it drains. Usage:
//!
//! ```text
//! recorder [CONFIG.toml] [--record] [--control]
//! ```
//!
//! `--record` arms and starts a session at playhead 0; `--control` also logs
//! the live control stream on the configured control port.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osc_recorder::{
    bridge::RecorderBridge,
    config::AppConfig,
    network::{ListenerState, UdpChannel},
    recorder::RecordingConfig,
};

const DRAIN_INTERVAL: Duration = Duration::from_millis(250);

struct Args {
    config_path: Option<PathBuf>,
    record: bool,
    control: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        record: false,
        control: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--record" => args.record = true,
            "--control" => args.control = true,
            path => args.config_path = Some(PathBuf::from(path)),
        }
    }
    args
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let config = AppConfig::load_or_default(args.config_path.as_deref())
        .context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting OSC Recorder");

    let bridge = RecorderBridge::new(&config);

    let mut status = bridge.subscribe_status();
    tokio::spawn(async move {
        while let Ok(event) = status.recv().await {
            match event.status {
                ListenerState::Error => tracing::warn!(
                    "Listener error on port {:?}: {}",
                    event.port,
                    event.error.as_deref().unwrap_or("unknown")
                ),
                state => tracing::info!("Listener {:?} (port {:?})", state, event.port),
            }
        }
    });

    let reply = bridge
        .start_listener(Some(f64::from(config.network.listen_port)))
        .await;
    if !reply.ok {
        bail!(
            "Could not listen on port {}: {}",
            config.network.listen_port,
            reply.error.unwrap_or_default()
        );
    }

    if args.record {
        let now = chrono::Utc::now().timestamp_millis() as f64;
        let ack = bridge
            .set_recording_config(RecordingConfig {
                armed: true,
                playing: true,
                fps: Some(config.recorder.fps),
                start_wall_ms: Some(now),
                start_playhead: Some(0.0),
                project_length: Some(config.recorder.project_length),
            })
            .await;
        if !ack.ok {
            bail!("Could not start recording: {}", ack.error.unwrap_or_default());
        }
        tracing::info!(
            "Recording at {} fps for up to {} s",
            config.recorder.fps,
            config.recorder.project_length
        );
    }

    if args.control {
        let mut control = UdpChannel::new(config.network.bind_address.clone());
        control
            .start(config.network.control_port)
            .await
            .context("Failed to open control listener")?;
        tokio::spawn(async move {
            loop {
                match control.recv().await {
                    Ok(messages) => {
                        for received in messages {
                            tracing::info!(
                                "control {} = {} from {}",
                                received.message.address,
                                received.value,
                                received.source
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Control listener stopped: {}", e);
                        break;
                    }
                }
            }
        });
    }

    tracing::info!("Running - press Ctrl+C to stop");

    let mut drain_timer = tokio::time::interval(DRAIN_INTERVAL);
    let mut total = 0usize;
    loop {
        tokio::select! {
            _ = drain_timer.tick() => {
                let drained = bridge.drain_buffer(None).await;
                if !drained.ok {
                    tracing::warn!("Drain failed: {}", drained.error.unwrap_or_default());
                    continue;
                }
                total += drained.items.len();
                for item in &drained.items {
                    tracing::debug!("{} = {}", item.address(), item.value());
                }
                if !drained.items.is_empty() {
                    tracing::info!(
                        "Drained {} items ({} total, {} remaining, {} dropped)",
                        drained.items.len(),
                        total,
                        drained.remaining,
                        drained.dropped
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    bridge.stop_listener().await;
    bridge.shutdown();
    Ok(())
}
