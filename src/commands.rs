//! Command handlers for the CLI

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use wifilight::{AppConfig, DeviceEntry};
use wifilight_device::{
    names, parse_hex_color, DeviceConfig, DeviceRegistry, LightDevice, MemoryStore, StateStore,
};
use wifilight_transport::protocol::timing;
use wifilight_transport::Family;

use crate::cli::Target;

/// Longest wait for a queued command sequence to be written
const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// What a one-shot invocation does once the device is up
pub enum Action {
    On,
    Off,
    Color { color: String, transition: u32 },
    Brightness { percent: u8, transition: u32 },
    Temperature { kelvin: u32, transition: u32 },
    Program { program: u8, speed: u8 },
    Command(String),
    Status,
    Pair,
    Unpair,
}

/// Start every configured device and log state changes until Ctrl-C
pub async fn run(config: AppConfig) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let mut changes = store.subscribe();
    let mut registry = DeviceRegistry::new(store.clone());

    let devices = config.device_configs();
    if devices.is_empty() {
        warn!("No devices configured");
    }
    for device in devices {
        let id = device.id.clone();
        if let Err(e) = registry.spawn(device).await {
            error!(id = %id, error = %e, "failed to start device");
        }
    }
    info!("Running {} devices, press Ctrl-C to stop", registry.len());

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(c) => info!(id = %c.channel, "{} = {}", c.name, c.value),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "state log fell behind"),
                Err(RecvError::Closed) => break,
            },
            res = tokio::signal::ctrl_c() => {
                res.context("waiting for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
        }
    }

    registry.shutdown_all().await;
    Ok(())
}

/// Add or replace the entry for `target` and write the config back
pub fn add(path: &Path, target: &Target, poll_interval: Option<u64>) -> Result<()> {
    let family: Family = target.family.parse()?;
    let mut config = AppConfig::load(path)?;
    let entry = DeviceEntry {
        ip: target.ip.clone(),
        port: target.port,
        family: Some(family.name().to_string()),
        name: None,
        poll_interval,
        connect_on_write: target.connect_on_write,
    };

    match config.devices.iter_mut().find(|d| d.ip == entry.ip) {
        Some(existing) => {
            info!(ip = %entry.ip, "replacing device entry");
            *existing = entry;
        }
        None => config.devices.push(entry),
    }
    config.save(path)?;
    info!("Saved {} devices to {:?}", config.devices.len(), path);
    Ok(())
}

/// Connect to one controller, run `action` and wait until it is on the wire
pub async fn one_shot(target: &Target, action: Action) -> Result<()> {
    let family: Family = target.family.parse()?;
    let mut config = DeviceConfig::new(target.ip.clone(), family)
        .with_poll_interval(None)
        .with_connect_per_write(target.connect_on_write);
    if let Some(port) = target.port {
        config = config.with_port(port);
    }
    if let Some(zone) = target.zone {
        config = config.with_zone(zone);
    }

    let store = Arc::new(MemoryStore::new());
    let device = LightDevice::spawn(config, store.clone())?;
    let connect_timeout = Duration::from_millis(timing::CONNECT_TIMEOUT_MS) + Duration::from_secs(1);
    if !wait_for_value(&store, device.id(), names::REACHABLE, connect_timeout).await {
        device.shutdown().await.ok();
        bail!("{} ({}) is not reachable", device.id(), family);
    }

    let result = perform(&device, &store, action).await;
    if result.is_ok() {
        settle(&device).await?;
    }
    device.shutdown().await.ok();
    result
}

async fn perform(device: &LightDevice, store: &MemoryStore, action: Action) -> Result<()> {
    match action {
        Action::On => device.power_on().await?,
        Action::Off => device.power_off().await?,
        Action::Color { color, transition } => {
            let color = parse_hex_color(&color)?;
            device.set_color(color, transition).await?;
        }
        Action::Brightness {
            percent,
            transition,
        } => device.set_brightness(percent, transition).await?,
        Action::Temperature { kelvin, transition } => {
            device.set_color_temperature(kelvin, transition).await?
        }
        Action::Program { program, speed } => device.select_program(program, speed).await?,
        Action::Command(text) => device.run_command(&text).await?,
        Action::Pair => device.pair().await?,
        Action::Unpair => device.unpair().await?,
        Action::Status => print_status(device, store).await?,
    }
    Ok(())
}

async fn print_status(device: &LightDevice, store: &MemoryStore) -> Result<()> {
    let spec = device.family().spec(None);
    if spec.has_status() {
        if store.get(device.id(), names::RGB).is_none()
            && !wait_for_value(store, device.id(), names::RGB, STATUS_TIMEOUT).await
        {
            warn!("No status reply from {}", device.id());
        }
    } else {
        info!("{} does not report its state", spec.family);
    }

    let snapshot = device.state().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if spec.has_status() {
        let program = spec.program_name(snapshot.state.program).unwrap_or("unknown");
        println!("program: {} ({})", snapshot.state.program, program);
    }
    Ok(())
}

/// Wait until `name` has a truthy committed value on channel `id`
async fn wait_for_value(store: &MemoryStore, id: &str, name: &str, limit: Duration) -> bool {
    let mut changes = store.subscribe();
    let present = |v: Option<serde_json::Value>| v.is_some_and(|v| v != serde_json::Value::Bool(false));
    if present(store.get(id, name)) {
        return true;
    }

    let deadline = Instant::now() + limit;
    loop {
        match timeout(deadline.saturating_duration_since(Instant::now()), changes.recv()).await {
            Ok(Ok(change)) if change.channel == id && change.name == name => {
                if present(Some(change.value)) {
                    return true;
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(RecvError::Lagged(_))) => {
                if present(store.get(id, name)) {
                    return true;
                }
            }
            Ok(Err(RecvError::Closed)) | Err(_) => return false,
        }
    }
}

/// Wait for the command queue to drain
async fn settle(device: &LightDevice) -> Result<()> {
    let start = Instant::now();
    loop {
        let snapshot = device.state().await?;
        if snapshot.queued == 0 && !snapshot.program_active {
            debug!(elapsed = ?start.elapsed(), "queue drained");
            return Ok(());
        }
        if start.elapsed() > SETTLE_TIMEOUT {
            bail!("{} commands still queued", snapshot.queued);
        }
        sleep(Duration::from_millis(50)).await;
    }
}
