//! `wheelhouse` - run the running-wheel host engine against real serial ports.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tokio::runtime::Handle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use wheelhouse_core::{EngineConfig, TagId};
use wheelhouse_engine::{Engine, EngineEvent, TracingLog};
use wheelhouse_hardware::{BlockingProbe, SystemSerial};

/// Host engine for RFID running-wheel cages
#[derive(Parser, Debug)]
#[command(name = "wheelhouse", version, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Absolute lock distance for a tag, e.g. `--lock 3A00112233=5000`
    #[arg(long = "lock", value_name = "TAG=CM", value_parser = parse_lock)]
    locks: Vec<(TagId, f64)>,

    /// Only use ports whose name starts with this prefix
    #[arg(long)]
    port_filter: Option<String>,
}

fn parse_lock(s: &str) -> std::result::Result<(TagId, f64), String> {
    let (tag, distance) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=CM, got '{s}'"))?;
    let tag = TagId::new(tag).map_err(|e| e.to_string())?;
    let distance = distance
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid distance '{distance}': {e}"))?;
    Ok((tag, distance))
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(prefix) = &args.port_filter {
        config.port_filter = Some(prefix.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = load_config(&args)?;
    let baud_rate = config.baud_rate;
    let tick = config.tick();

    let mut engine = Engine::new(
        config,
        SystemSerial::new(baud_rate),
        BlockingProbe::new(Handle::current(), baud_rate),
        TracingLog,
    )
    .context("invalid engine configuration")?;

    for (tag, distance) in &args.locks {
        engine
            .set_lock(tag, *distance)
            .with_context(|| format!("invalid lock distance for {tag}"))?;
        info!(tag = %tag, lock_distance = distance, "lock distance set");
    }

    info!(version = wheelhouse_core::VERSION, "wheelhouse started, press Ctrl-C to stop");

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            instant = ticker.tick() => {
                for event in engine.tick(instant.into_std(), Local::now().naive_local()) {
                    report(&event);
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    for event in engine.pause() {
        report(&event);
    }
    for (tag, state) in engine.ledger().iter() {
        info!(
            tag = %tag,
            distance = state.distance,
            lock_distance = state.lock_distance,
            locked = state.is_locked(),
            "final tag state"
        );
    }
    info!("wheelhouse stopped");
    Ok(())
}

fn report(event: &EngineEvent) {
    match event {
        EngineEvent::PortStateChanged { port, from, to } => {
            info!(port = %port, %from, %to, "port state changed");
        }
        EngineEvent::ChecksumMismatch { port, count } => {
            warn!(port = %port, count, "tag checksum mismatch");
        }
        other => debug!(event = ?other, "engine event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lock() {
        let (tag, distance) = parse_lock("3a00112233=1250.5").unwrap();
        assert_eq!(tag.as_str(), "3A00112233");
        assert_eq!(distance, 1250.5);

        assert!(parse_lock("3A00112233").is_err());
        assert!(parse_lock("nothex=10").is_err());
        assert!(parse_lock("3A00112233=far").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "wheelhouse",
            "--lock",
            "3A00112233=100",
            "--lock",
            "0102030405=200",
            "--port-filter",
            "/dev/ttyACM",
        ]);
        assert_eq!(args.locks.len(), 2);
        assert_eq!(args.log_level, "info");

        let config = load_config(&args).unwrap();
        assert_eq!(config.port_filter.as_deref(), Some("/dev/ttyACM"));
    }
}
