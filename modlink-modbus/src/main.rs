//! Modbus link agent.
//!
//! Connects to one Modbus device (TCP or RTU/serial), polls the configured
//! attribute links and prints every update to stdout as a JSON line.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use modlink_common::{AttributeRef, LoggingConfig, Value};
use modlink_modbus::config::ModbusAgentConfig;
use modlink_modbus::{ChannelSink, ModbusProtocol};
use std::path::PathBuf;
use tracing::{error, info};

/// Modbus link agent (TCP/RTU).
#[derive(Parser, Debug)]
#[command(name = "modlink-modbus")]
#[command(about = "Polls Modbus attribute links and writes values to the device")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every configured link until Ctrl+C (default).
    Run,
    /// Write one value through a configured link and exit.
    Write {
        /// Asset id of the link
        #[arg(long)]
        asset: String,

        /// Attribute name of the link
        #[arg(long)]
        attribute: String,

        /// Value as JSON, e.g. `42`, `true` or `"on"`
        #[arg(long)]
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ModbusAgentConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    modlink_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Loaded configuration from {:?}", args.config);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Write {
            asset,
            attribute,
            value,
        } => write(config, AttributeRef::new(asset, attribute), &value).await,
    }
}

async fn run(config: ModbusAgentConfig) -> Result<()> {
    let (sink, mut updates) = ChannelSink::new();
    let protocol = ModbusProtocol::connect_to(config.device.clone(), sink);

    info!(
        protocol = protocol.protocol_name(),
        uri = %protocol.instance_uri(),
        "Starting modlink-modbus"
    );
    protocol
        .start()
        .await
        .context("Failed to connect to Modbus device")?;

    for link in &config.links {
        protocol.on_link(link.attribute_ref(), link.value_type, link.link.clone())?;
    }
    info!(links = config.links.len(), "Modbus agent running");

    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize update: {}", e),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let health = protocol.health();
    protocol.stop().await;
    drop(protocol);
    let _ = printer.await;

    info!(
        polls_ok = health.polls_ok,
        polls_failed = health.polls_failed,
        "Modbus agent stopped"
    );
    Ok(())
}

async fn write(config: ModbusAgentConfig, attribute_ref: AttributeRef, raw: &str) -> Result<()> {
    let Some(link) = config
        .links
        .iter()
        .find(|link| link.attribute_ref() == attribute_ref)
    else {
        bail!("No link configured for {}", attribute_ref);
    };
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid JSON value: {}", raw))?;

    let (sink, _updates) = ChannelSink::new();
    let protocol = ModbusProtocol::connect_to(config.device.clone(), sink);
    protocol
        .start()
        .await
        .context("Failed to connect to Modbus device")?;

    let result = protocol.on_write(&attribute_ref, &link.link, &value).await;
    protocol.stop().await;

    match result? {
        Some(ack) => println!("{}", serde_json::to_string(&ack)?),
        None => bail!("Link for {} is read-only", attribute_ref),
    }
    Ok(())
}
