use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::config::settings::{Config, TransportKind};
use crate::modbus::client::{ModbusConnector, TcpModbusConnector};
use crate::modbus::decoder::{RegisterInterpretations, REGISTERS_PER_PARAMETER};
use crate::protocol::frame::FrameCodec;
use crate::services::collector_service::build_cycle;
use crate::storage::{open_sink, MemorySink, PersistenceSink};

/// Run a one-shot subcommand. Returns `false` when no subcommand was given
/// and the collector should run as a service.
pub async fn handle_subcommands(matches: &ArgMatches, config: &Config) -> Result<bool> {
    if let Some(sub) = matches.subcommand_matches("read-once") {
        read_once(config, sub.get_flag("no-save")).await?;
        return Ok(true);
    }

    if matches.subcommand_matches("probe").is_some() {
        probe(config).await?;
        return Ok(true);
    }

    if let Some(sub) = matches.subcommand_matches("frame") {
        frame_tool(sub)?;
        return Ok(true);
    }

    if let Some(sub) = matches.subcommand_matches("init-config") {
        let path = sub
            .get_one::<String>("path")
            .map(String::as_str)
            .unwrap_or("config.toml");
        init_config(config, path, sub.get_flag("force"))?;
        return Ok(true);
    }

    Ok(false)
}

async fn read_once(config: &Config, no_save: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    info!("🔍 Executing read-once command...");

    let sink: Arc<dyn PersistenceSink> = if no_save {
        Arc::new(MemorySink::new())
    } else {
        open_sink(&config.storage).await.context("Failed to open storage")?
    };

    let cycle = build_cycle(config, sink.clone());
    let readings = cycle.read().await.context("Acquisition failed")?;

    println!("📊 {} readings from {}", readings.len(), cycle.transport().endpoint());
    for reading in &readings {
        println!("  [{}] {:<40} {:>14.4} {}", reading.index, reading.name, reading.value, reading.unit);
    }

    if !no_save {
        sink.save(&readings, cycle.device_id())
            .await
            .context("Failed to persist readings")?;
        println!("💾 Saved to {} ({})", sink.destination(), sink.sink_type());
    }
    sink.close().await;
    Ok(())
}

async fn probe(config: &Config) -> Result<()> {
    if config.acquisition.transport != TransportKind::Fieldbus {
        warn!("⚠️  probe always talks Modbus TCP, ignoring the configured transport");
    }

    let connector = TcpModbusConnector::new(&config.fieldbus);
    println!("🔬 Probing {} (unit {})", connector.endpoint(), config.fieldbus.unit_id);
    let client = connector.connect().await.context("Connection failed")?;

    for parameter in &config.fieldbus.parameters {
        match client
            .read_holding_registers(parameter.address, REGISTERS_PER_PARAMETER)
            .await
            .and_then(|raw| RegisterInterpretations::from_bytes(&raw))
        {
            Ok(probe) => {
                println!("{} (0x{:04X}, {})", parameter.name, parameter.address, parameter.unit);
                println!(
                    "  registers:    0x{:04X} 0x{:04X}",
                    probe.registers[0], probe.registers[1]
                );
                println!("  straight:     {}", probe.straight);
                println!("  word_swapped: {}", probe.word_swapped);
                println!("  u16:          {}", probe.raw_u16);
            }
            Err(e) => println!("{} (0x{:04X}): ❌ {}", parameter.name, parameter.address, e),
        }
    }

    client.disconnect().await;
    Ok(())
}

fn frame_tool(matches: &ArgMatches) -> Result<()> {
    if let Some(sub) = matches.subcommand_matches("encode") {
        let payload = sub.get_one::<String>("payload").map(String::as_str).unwrap_or_default();
        println!("{}", FrameCodec::encode(payload)?);
        return Ok(());
    }

    if let Some(sub) = matches.subcommand_matches("decode") {
        let frame = sub.get_one::<String>("frame").map(String::as_str).unwrap_or_default();
        let payload = FrameCodec::decode(frame.as_bytes())?;
        println!("{}", String::from_utf8_lossy(payload));
        return Ok(());
    }

    bail!("frame requires 'encode' or 'decode'")
}

fn init_config(config: &Config, path: &str, force: bool) -> Result<()> {
    if Path::new(path).exists() && !force {
        bail!("{} already exists, use --force to overwrite", path);
    }
    config.save_to_file(path)?;
    println!("📝 Configuration template written to {}", path);
    if config.fieldbus.byte_order.is_none() {
        println!("💡 Set fieldbus.byte_order before starting (run 'probe' to find it)");
    }
    Ok(())
}
