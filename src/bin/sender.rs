//! OSC / Art-Net Test Sender
//!
//! Emits a sweep of values for checking a rig. Usage:
//!
//! ```text
//! sender osc    [HOST] [PORT] [ADDRESS]
//! sender artnet [HOST] [PORT] [UNIVERSE]
//! ```
//!
//! Defaults come from the config file's network section.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osc_recorder::{
    codec::{artnet::CHANNEL_COUNT, ArtDmxFrame},
    config::AppConfig,
    network::{normalize_host, normalize_port, ArtNetSender, OscSender, SendReport},
};

const SEND_INTERVAL: Duration = Duration::from_millis(33);

/// Steps in one 0..1 sweep
const SWEEP_STEPS: u32 = 100;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load_or_default(None)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or("osc");
    let host_arg = args.get(1).map(String::as_str);
    let port_arg = args.get(2).and_then(|p| p.parse::<f64>().ok());

    match mode {
        "osc" => {
            let host = normalize_host(host_arg.or(Some(config.network.osc_target_host.as_str())));
            let port = normalize_port(port_arg, config.network.osc_target_port);
            let address = args.get(3).cloned().unwrap_or_else(|| "/test/sweep".into());
            send_osc_sweep(&host, port, &address).await
        }
        "artnet" => {
            let host = normalize_host(host_arg.or(Some(config.network.artnet_host.as_str())));
            let port = normalize_port(port_arg, config.network.artnet_port);
            let universe = args.get(3).and_then(|u| u.parse::<f64>().ok()).unwrap_or(0.0);
            send_artnet_chase(&host, port, universe).await
        }
        other => bail!("Unknown mode '{}', expected 'osc' or 'artnet'", other),
    }
}

async fn send_osc_sweep(host: &str, port: u16, address: &str) -> Result<()> {
    let mut sender = OscSender::new()?;
    tracing::info!("Sending {} to {}:{} - press Ctrl+C to stop", address, host, port);

    let mut timer = tokio::time::interval(SEND_INTERVAL);
    let mut step = 0u32;
    loop {
        tokio::select! {
            _ = timer.tick() => {
                let value = f64::from(step % SWEEP_STEPS) / f64::from(SWEEP_STEPS - 1);
                let report = SendReport::from(sender.send_float(host, port, address, value).await);
                if !report.ok {
                    tracing::warn!("Send failed: {}", report.error.unwrap_or_default());
                }
                step = step.wrapping_add(1);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Sent {} OSC packets", sender.packets_sent());
    Ok(())
}

async fn send_artnet_chase(host: &str, port: u16, universe: f64) -> Result<()> {
    let mut sender = ArtNetSender::new()?;
    tracing::info!(
        "Sending Art-Net universe {} to {}:{} - press Ctrl+C to stop",
        universe,
        host,
        port
    );

    let mut timer = tokio::time::interval(SEND_INTERVAL);
    let mut sequence = 1u32;
    let mut channels = vec![0.0f64; CHANNEL_COUNT];
    loop {
        tokio::select! {
            _ = timer.tick() => {
                let lit = sequence as usize % CHANNEL_COUNT;
                channels.iter_mut().for_each(|c| *c = 0.0);
                channels[lit] = 255.0;

                let frame = ArtDmxFrame::new(universe, f64::from(sequence % 256), &channels);
                let report = SendReport::from(sender.send(host, port, &frame).await);
                if !report.ok {
                    tracing::warn!("Send failed: {}", report.error.unwrap_or_default());
                }
                sequence = sequence.wrapping_add(1);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Sent {} Art-Net packets", sender.packets_sent());
    Ok(())
}
