//! Lyngdorf Control
//!
//! Connects to the configured processor, optionally runs one command, then
//! logs every state change until interrupted.
//!
//! Usage: `lyngdorf-control [COMMAND [ARG]]`, e.g. `state json` or `volume -35`

use lyngdorf_control::bus::DeviceEvent;
use lyngdorf_control::{config, Lyngdorf};

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lyngdorf_control=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Lyngdorf Control v{} ({})",
        env!("LYNGDORF_VERSION"),
        env!("LYNGDORF_GIT_SHA")
    );

    let config = config::load_config()?;
    let Some(device_config) = config.device else {
        bail!(
            "No device configured. Set LYNGDORF_HOST or add a [device] section to {}",
            config::get_config_dir().join("config.toml").display()
        );
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let device = Lyngdorf::new(device_config);
    let changes = device.changes();
    tokio::pin!(changes);

    device
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", device.host()))?;
    tracing::info!(
        "Connected to {} ({})",
        device.host(),
        device
            .model()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown model".to_string())
    );

    if let Some(command) = args.first() {
        if let Err(e) = run_command(&device, command, args.get(1).map(String::as_str)).await {
            tracing::warn!("{} failed: {}", command, e);
        }
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = changes.next() => match event {
                Some(DeviceEvent::StateChanged { param, value: Some(value) }) => {
                    tracing::info!("{} = {}", param, value);
                }
                Some(DeviceEvent::StateChanged { param, value: None }) => {
                    tracing::debug!("{} cleared", param);
                }
                Some(other) => tracing::info!("{:?}", other),
                None => break,
            },
        }
    }

    device.disconnect();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Run one command from the command line.
async fn run_command(device: &Lyngdorf, command: &str, arg: Option<&str>) -> Result<()> {
    match (command, arg) {
        ("state", Some("json")) => {
            println!("{}", serde_json::to_string_pretty(&device.snapshot())?);
        }
        ("state", _) => {
            let mut entries: Vec<_> = device.snapshot().into_iter().collect();
            entries.sort_by_key(|(param, _)| param.to_string());
            for (param, value) in entries {
                println!("{:<20} {}", param, value);
            }
        }
        ("on", _) => device.power_on().await?,
        ("off", _) => device.power_off().await?,
        ("mute", _) => device.mute(true).await?,
        ("unmute", _) => device.mute(false).await?,
        ("volume", Some(db)) => device.set_volume(db.parse()?).await?,
        ("level", Some(level)) => device.set_volume_level(level.parse()?).await?,
        ("lipsync", Some(ms)) => device.set_lipsync(ms.parse()?).await?,
        ("source", Some(name)) => device.set_source(name).await?,
        ("voicing", Some(name)) => device.set_voicing(name).await?,
        ("focus", Some(name)) => device.set_focus_position(name).await?,
        ("mode", Some(name)) => device.set_audio_mode(name).await?,
        ("volume" | "level" | "lipsync" | "source" | "voicing" | "focus" | "mode", None) => {
            bail!("{} needs an argument", command)
        }
        (name, arg) => {
            let arg = arg
                .map(|a| a.parse::<i64>())
                .transpose()
                .with_context(|| format!("{} takes an integer argument", name))?;
            device.send_command_by_name(name, arg).await?
        }
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
