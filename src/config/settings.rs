use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::modbus::decoder::{ByteOrder, RegisterFormat};
use crate::utils::error::AcquisitionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Collector identification
    #[serde(default)]
    pub collector_uuid: String,
    #[serde(default)]
    pub collector_name: String,
    /// Identifier written alongside every persisted batch.
    pub device_id: String,

    pub acquisition: AcquisitionConfig,
    pub fieldbus: FieldbusConfig,
    pub framed_socket: FramedSocketConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Fieldbus,
    FramedSocket,
}

impl std::str::FromStr for TransportKind {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fieldbus" | "modbus" => Ok(TransportKind::Fieldbus),
            "framed_socket" | "framed" | "socket" => Ok(TransportKind::FramedSocket),
            _ => Err(AcquisitionError::ConfigError(format!(
                "Unknown transport '{}'. Expected: fieldbus, framed_socket",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub interval_seconds: u64,
    pub transport: TransportKind,
}

/// One entry of the meter's register map. The table order defines the
/// output index of each reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterParameterDefinition {
    pub name: String,
    pub address: u16,
    pub unit: String,
    #[serde(default)]
    pub format: RegisterFormat,
}

impl MeterParameterDefinition {
    pub fn new(name: &str, address: u16, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            address,
            unit: unit.to_string(),
            format: RegisterFormat::Float32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldbusConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    /// Word order of 32-bit values. Meter firmwares disagree, so there is no
    /// default: it must be set for every field-bus deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_order: Option<ByteOrder>,
    pub parameters: Vec<MeterParameterDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramedSocketConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub buffer_size: usize,
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Sqlite,
    JsonFile,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite: SqliteConfig,
    pub json_file: JsonFileConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: SqliteConfig::default(),
            json_file: JsonFileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    pub database_path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub enable_wal: bool,
    pub sync_mode: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_path: "data/energy_data.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 30000,
            enable_wal: true,
            sync_mode: "NORMAL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFileConfig {
    pub path: String,
    pub pretty: bool,
}

impl Default for JsonFileConfig {
    fn default() -> Self {
        Self {
            path: "final.json".to_string(),
            pretty: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
    pub index_file: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: None,
            index_file: "energy_dashboard.html".to_string(),
        }
    }
}

/// Register map of the three-phase meter the collector was first deployed
/// against.
pub fn default_parameter_table() -> Vec<MeterParameterDefinition> {
    vec![
        MeterParameterDefinition::new("Phase Voltage Average", 0x0106, "V"),
        MeterParameterDefinition::new("Three-Phase Average Current", 0x0126, "A"),
        MeterParameterDefinition::new("Frequency", 0x0142, "Hz"),
        MeterParameterDefinition::new("Three-Phase Forward Active Power", 0x015C, "kW"),
        MeterParameterDefinition::new("Three-Phase Reverse Active Power", 0x015E, "kW"),
        MeterParameterDefinition::new("Line Active Power Factor", 0x0132, "N/A"),
        MeterParameterDefinition::new("Current Harmonic Distortion", 0x0188, "%"),
        MeterParameterDefinition::new("Current Harmonic Distortion", 0x018A, "%"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collector_uuid: Uuid::new_v4().to_string(),
            collector_name: "Energy Meter Collector".to_string(),
            device_id: "DPMC530E".to_string(),

            acquisition: AcquisitionConfig {
                interval_seconds: 5,
                transport: TransportKind::Fieldbus,
            },

            fieldbus: FieldbusConfig {
                host: "192.168.1.9".to_string(),
                port: 502,
                unit_id: 2,
                connect_timeout_ms: 10000,
                request_timeout_ms: 10000,
                idle_timeout_ms: 60000,
                byte_order: None,
                parameters: default_parameter_table(),
            },

            framed_socket: FramedSocketConfig {
                host: "localhost".to_string(),
                port: 8888,
                connect_timeout_ms: 5000,
                read_timeout_ms: 5000,
                buffer_size: 4096,
                command: "query".to_string(),
            },

            storage: StorageConfig::default(),

            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Start from the config file (if given) and apply command line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, AcquisitionError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => {
                info!("📄 Loading configuration from {}", path);
                Self::from_file(path)?
            }
            None => {
                warn!("⚠️  No configuration file given, using built-in defaults");
                Self::default()
            }
        };

        if let Some(interval) = matches.get_one::<u64>("interval") {
            config.acquisition.interval_seconds = *interval;
        }
        if let Some(transport) = matches.get_one::<String>("transport") {
            config.acquisition.transport = transport.parse()?;
        }
        if let Some(host) = matches.get_one::<String>("host") {
            match config.acquisition.transport {
                TransportKind::Fieldbus => config.fieldbus.host = host.clone(),
                TransportKind::FramedSocket => config.framed_socket.host = host.clone(),
            }
        }
        if let Some(port) = matches.get_one::<u16>("port") {
            match config.acquisition.transport {
                TransportKind::Fieldbus => config.fieldbus.port = *port,
                TransportKind::FramedSocket => config.framed_socket.port = *port,
            }
        }
        if let Some(order) = matches.get_one::<String>("byte-order") {
            config.fieldbus.byte_order = Some(order.parse()?);
        }
        if let Some(api_port) = matches.get_one::<u16>("api-port") {
            config.api.port = *api_port;
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AcquisitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AcquisitionError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, AcquisitionError> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| AcquisitionError::ConfigError(format!("Invalid configuration: {}", e)))?;

        if config.collector_uuid.is_empty() {
            config.collector_uuid = Uuid::new_v4().to_string();
        }
        if config.collector_name.is_empty() {
            config.collector_name = "Energy Meter Collector".to_string();
        }

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AcquisitionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AcquisitionError::ConfigError(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AcquisitionError::ConfigError(format!("Failed to serialize: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            AcquisitionError::ConfigError(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if self.acquisition.interval_seconds == 0 {
            return Err(AcquisitionError::ConfigError(
                "acquisition.interval_seconds must be greater than 0".to_string(),
            ));
        }

        match self.acquisition.transport {
            TransportKind::Fieldbus => {
                if self.fieldbus.parameters.is_empty() {
                    return Err(AcquisitionError::ConfigError(
                        "fieldbus.parameters must list at least one register".to_string(),
                    ));
                }
                if self.fieldbus.byte_order.is_none() {
                    return Err(AcquisitionError::ConfigError(
                        "fieldbus.byte_order must be set to \"straight\" or \"word_swapped\" \
                         (run the probe command to find out which one the meter uses)"
                            .to_string(),
                    ));
                }
            }
            TransportKind::FramedSocket => {
                if self.framed_socket.buffer_size == 0 {
                    return Err(AcquisitionError::ConfigError(
                        "framed_socket.buffer_size must be greater than 0".to_string(),
                    ));
                }
                if self.framed_socket.command.is_empty() {
                    return Err(AcquisitionError::ConfigError(
                        "framed_socket.command must not be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// The register map, frozen for the lifetime of the process.
    pub fn parameter_table(&self) -> Arc<[MeterParameterDefinition]> {
        Arc::from(self.fieldbus.parameters.clone())
    }
}
