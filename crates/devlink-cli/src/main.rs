//! # devlink
//!
//! Command-line client for a remote device server: list mirrored devices,
//! dump their state, watch live events, invoke methods and query the
//! server's installed packages.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::debug;

use devlink_client::{Client, Invocation, connect_with};
use devlink_core::logging::init_subscriber;
use devlink_settings::{ClientSettings, load_settings_from_path, settings_path};

/// devlink command-line client.
#[derive(Parser, Debug)]
#[command(name = "devlink", about = "Inspect and drive devices on a remote device server")]
struct Cli {
    /// Server root URL (overrides settings).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Path to the settings file (default `~/.devlink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List mirrored devices.
    Devices,
    /// Print one device's cached state as JSON.
    State {
        /// Device id.
        id: String,
    },
    /// Print sync events as JSON lines until interrupted.
    Watch {
        /// Only show events for this device.
        #[arg(long)]
        device: Option<String>,
    },
    /// Invoke a method on a device.
    Invoke {
        /// Device id.
        id: String,
        /// Method name, e.g. `turnOn`.
        method: String,
        /// Arguments; each is parsed as JSON, falling back to a plain string.
        args: Vec<String>,
    },
    /// List packages installed on the server.
    Packages,
}

fn resolve_settings(cli: &Cli) -> Result<ClientSettings> {
    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(ref url) = cli.url {
        settings.connection.base_url.clone_from(url);
    }
    if let Some(ref level) = cli.log_level {
        settings.logging.level.clone_from(level);
    }
    if cli.log_json {
        settings.logging.json = true;
    }
    settings.validate()?;
    Ok(settings)
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn run(client: &Client, command: Command) -> Result<()> {
    let registry = client.registry();
    match command {
        Command::Devices => {
            for id in registry.device_ids() {
                let Some(device) = registry.get_device_by_id(&id) else {
                    continue;
                };
                println!(
                    "{id}\t{}\t{}\t{}",
                    device.name().unwrap_or_default(),
                    device.device_type().unwrap_or_default(),
                    device.interfaces().join(",")
                );
            }
        }
        Command::State { id } => {
            let record = registry
                .get_device_state(&id)
                .with_context(|| format!("no device with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Watch { device } => {
            let registration = registry.listen(move |handle, details, data| {
                let id = handle.as_ref().map(|d| d.id().to_string());
                if device.is_some() && device != id {
                    return;
                }
                let line = json!({
                    "id": id,
                    "property": details.property,
                    "eventTime": details.event_time,
                    "eventInterface": details.event_interface,
                    "value": data,
                });
                println!("{line}");
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    res = &mut ctrl_c => {
                        res.context("failed to listen for ctrl-c")?;
                        break;
                    }
                    _ = ticker.tick() => {
                        if !client.is_connected() {
                            bail!("channel closed by server");
                        }
                    }
                }
            }
            let _ = registration.remove();
        }
        Command::Invoke { id, method, args } => {
            let device = registry
                .get_device_by_id(&id)
                .with_context(|| format!("no device with id {id}"))?;
            let args: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
            match device.invoke(&method, args)? {
                Invocation::Sent => println!("sent {method} to {id}"),
                Invocation::VideoStream(request) => {
                    println!("{}", serde_json::to_string(&request)?);
                }
            }
        }
        Command::Packages => {
            let packages = registry.get_installed_packages().await?;
            println!("{}", serde_json::to_string_pretty(&packages)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.json);
    debug!(base_url = %settings.connection.base_url, "connecting");

    let client = connect_with(&settings.connection)
        .await
        .with_context(|| format!("failed to connect to {}", settings.connection.base_url))?;
    let outcome = run(&client, cli.command).await;
    client.disconnect().await;
    outcome
}
