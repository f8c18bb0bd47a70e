//! WiRoc CLI - Command-line interface for WiRoc radio devices
//!
//! Scan for devices, read and write their properties, and follow punch
//! streams over Bluetooth LE.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wiroc_client::{WirocBuilder, WirocClient};
use wiroc_core::{DeviceId, PropertyValue, Record, TestPunchBoard, FIRMWARE_BULK_SCHEMA};
use wiroc_transport::BleLink;

mod config;
mod values;

use config::CliConfig;

/// WiRoc - configure and monitor WiRoc devices over Bluetooth LE
#[derive(Parser)]
#[command(name = "wiroc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List nearby BLE devices
    Scan {
        /// Only show devices advertising the WiRoc service
        #[arg(short, long)]
        wiroc_only: bool,
    },

    /// Read one or more properties
    Get {
        /// Device address
        device: String,

        /// Property names
        #[arg(required = true)]
        names: Vec<String>,

        /// Query the device even if the value is cached
        #[arg(short, long)]
        refresh: bool,
    },

    /// Write a property or run a device command
    Set {
        /// Device address
        device: String,

        /// Property or command name
        name: String,

        /// Value, or one value per field for multi-field commands
        values: Vec<String>,
    },

    /// Print the full property snapshot
    Dump {
        /// Device address
        device: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow punches registered by the device
    Punches {
        /// Device address
        device: String,
    },

    /// Send test punches and follow their delivery
    TestPunches {
        /// Device address
        device: String,

        /// Number of punches to send
        #[arg(short = 'n', long, default_value = "10")]
        count: u32,

        /// Seconds between punches
        #[arg(short, long, default_value = "1")]
        interval: u32,

        /// Wait for each punch to be acknowledged before the next one
        #[arg(short, long)]
        synchronized: bool,
    },

    /// Show version and config info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, cli.json_logs)?;

    let config = CliConfig::resolve(cli.config.as_deref())?;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    match cli.command {
        Commands::Scan { wiroc_only } => scan(&config, wiroc_only).await?,

        Commands::Get {
            device,
            names,
            refresh,
        } => {
            let (client, device) = open(&config, &device).await?;
            let result = get(&client, &device, &names, refresh).await;
            client.disconnect(&device).await?;
            result?;
        }

        Commands::Set {
            device,
            name,
            values,
        } => {
            let value = values::parse_set_value(&name, &values)?;
            let (client, device) = open(&config, &device).await?;
            let result = client.set_property(&device, &name, value).await;
            client.disconnect(&device).await?;

            let confirmed = result.with_context(|| format!("Failed to set {}", name))?;
            println!("{} {}", "OK".green().bold(), name.yellow());
            values::print_property(&name, &confirmed);
        }

        Commands::Dump { device, json } => {
            let (client, device) = open(&config, &device).await?;
            dump(&client, &device, json);
            client.disconnect(&device).await?;
        }

        Commands::Punches { device } => {
            let (client, device) = open(&config, &device).await?;
            follow_punches(&client, &device, &mut shutdown_rx).await?;
            client.disconnect(&device).await?;
        }

        Commands::TestPunches {
            device,
            count,
            interval,
            synchronized,
        } => {
            let (client, device) = open(&config, &device).await?;
            let result = run_test_punches(
                &client,
                &device,
                count,
                interval,
                synchronized,
                &mut shutdown_rx,
            )
            .await;
            client.disconnect(&device).await?;
            result?;
        }

        Commands::Info => print_info(cli.config.as_deref()),
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

async fn link(config: &CliConfig) -> Result<Arc<BleLink>> {
    let link = BleLink::with_config(config.ble.clone())
        .await
        .context("Failed to open Bluetooth adapter")?;
    Ok(Arc::new(link))
}

/// Build a client and connect to `address`
async fn open(config: &CliConfig, address: &str) -> Result<(WirocClient, DeviceId)> {
    let client = WirocBuilder::new()
        .config(config.client.clone())
        .build(link(config).await?)?;
    let device = DeviceId::from(address);

    println!("{} Connecting to {}", "WiRoc".cyan().bold(), device);
    client
        .connect(&device)
        .await
        .with_context(|| format!("Failed to connect to {}", device))?;

    Ok((client, device))
}

async fn scan(config: &CliConfig, wiroc_only: bool) -> Result<()> {
    println!(
        "{} Scanning for {} seconds",
        "WiRoc".cyan().bold(),
        config.ble.scan_duration_secs
    );

    let devices = link(config).await?.scan().await?;
    let mut shown = 0;

    for device in devices {
        if wiroc_only && !device.has_wiroc_service {
            continue;
        }
        shown += 1;

        let marker = if device.has_wiroc_service {
            "WiRoc".green().to_string()
        } else {
            "     ".to_string()
        };
        println!(
            "{} {}  {:<24} {}",
            marker,
            device.id.to_string().yellow(),
            device.name.as_deref().unwrap_or("(unnamed)"),
            device
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_default()
        );
    }

    if shown == 0 {
        println!("{}", "No devices found".red());
    }
    Ok(())
}

async fn get(client: &WirocClient, device: &DeviceId, names: &[String], refresh: bool) -> Result<()> {
    if refresh {
        let values = client.refresh_properties(device, names).await?;
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        values::print_properties(&names, &values);
        return Ok(());
    }

    for name in names {
        let value = client
            .get_property(device, name)
            .await
            .with_context(|| format!("Failed to read {}", name))?;
        values::print_property(name, &value);
    }
    Ok(())
}

fn dump(client: &WirocClient, device: &DeviceId, json: bool) {
    let snapshot: Vec<(&str, PropertyValue)> = FIRMWARE_BULK_SCHEMA
        .names
        .iter()
        .filter_map(|name| client.cached(device, name).map(|v| (*name, v)))
        .collect();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = snapshot
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&map).unwrap_or_default()
        );
        return;
    }

    for (name, value) in &snapshot {
        values::print_property(name, value);
    }
}

async fn follow_punches(
    client: &WirocClient,
    device: &DeviceId,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let _punches = client.on_punches_received(|batch| {
        for punch in &batch.punches {
            println!(
                "{} SI {} at station {} ({})",
                "PUNCH".cyan(),
                punch.sinumber.to_string().yellow(),
                punch.stationnumber,
                punch.timestamp
            );
        }
    });
    let (lost_tx, mut lost_rx) = mpsc::channel::<()>(1);
    let _lost = client.on_device_disconnected(move |event| {
        if !event.was_expected {
            let _ = lost_tx.try_send(());
        }
    });

    client.enable_punches_notification(device).await?;
    println!("{} Waiting for punches (Ctrl+C to stop)", "OK".green().bold());

    tokio::select! {
        _ = shutdown_rx.recv() => {}
        _ = lost_rx.recv() => println!("{}", "Connection lost".red()),
    }

    client.disable_punches_notification(device).await?;
    Ok(())
}

async fn run_test_punches(
    client: &WirocClient,
    device: &DeviceId,
    count: u32,
    interval: u32,
    synchronized: bool,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let board = Arc::new(Mutex::new(TestPunchBoard::new()));
    let progress = Arc::clone(&board);
    let _updates = client.on_test_punches_sent(move |batch| {
        let mut board = progress.lock();
        board.merge(&batch.punches);
        for punch in &batch.punches {
            println!(
                "{} #{} SI {} {:?} (tries: {})",
                "TEST".cyan(),
                punch.id,
                punch.sinumber,
                punch.status,
                punch.noofsendtries
            );
        }
    });

    client.enable_test_punches_notification(device).await?;

    let start: Record = [
        ("count".to_string(), count.to_string()),
        ("interval".to_string(), interval.to_string()),
        ("synchronized".to_string(), u8::from(synchronized).to_string()),
    ]
    .into_iter()
    .collect();
    client
        .set_property(device, "starttestpunches", start)
        .await
        .context("Failed to start test punches")?;

    println!(
        "{} Sending {} test punches (Ctrl+C to stop)",
        "OK".green().bold(),
        count
    );
    shutdown_rx.recv().await;

    client.disable_test_punches_notification(device).await?;
    println!("{} {} test punches tracked", "Done".green(), board.lock().len());
    Ok(())
}

fn print_info(config_path: Option<&std::path::Path>) {
    println!("{}", "WiRoc - Bluetooth LE configuration tool".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!(
        "Config:     {}",
        config_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| config::default_config_file().display().to_string())
    );
    println!(
        "Snapshot:   bulk schema v{} ({} properties)",
        FIRMWARE_BULK_SCHEMA.version,
        FIRMWARE_BULK_SCHEMA.len()
    );
    println!();
    println!("{}", "Examples:".green());
    println!("  wiroc scan --wiroc-only                      # Find WiRoc units");
    println!("  wiroc get B8:27:EB:11:22:33 batterylevel     # Read a property");
    println!("  wiroc set B8:27:EB:11:22:33 channel 3        # Write a property");
    println!("  wiroc punches B8:27:EB:11:22:33              # Follow punches");
}
