use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Client, Context, Reader};
use tokio_modbus::Slave;

use super::decoder::words_to_bytes;
use crate::config::settings::FieldbusConfig;
use crate::utils::error::AcquisitionError;

#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    /// Read `count` holding registers, returned as big-endian bytes in wire
    /// order (two bytes per register).
    async fn read_holding_registers(&self, start_addr: u16, count: u16) -> Result<Vec<u8>, AcquisitionError>;

    async fn disconnect(&self);
}

/// Opens one client session. The field-bus transport connects once per
/// cycle and never pools sessions.
#[async_trait]
pub trait ModbusConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ModbusClientTrait>, AcquisitionError>;

    fn endpoint(&self) -> String;
}

pub struct ModbusClient {
    ctx: Mutex<Context>,
    request_timeout: Duration,
    endpoint: String,
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn read_holding_registers(&self, start_addr: u16, count: u16) -> Result<Vec<u8>, AcquisitionError> {
        debug!("📊 Reading {} registers at 0x{:04X} from {}", count, start_addr, self.endpoint);

        let mut ctx = self.ctx.lock().await;
        let response = timeout(self.request_timeout, ctx.read_holding_registers(start_addr, count))
            .await
            .map_err(|_| {
                AcquisitionError::Timeout(format!(
                    "No response for register 0x{:04X} within {:?}",
                    start_addr, self.request_timeout
                ))
            })?;

        match response {
            Ok(Ok(words)) => {
                let bytes = words_to_bytes(&words);
                debug!("📥 0x{:04X}: {}", start_addr, hex::encode_upper(&bytes));
                Ok(bytes)
            }
            Ok(Err(exception)) => Err(AcquisitionError::DeviceException(format!(
                "{:?} for register 0x{:04X}",
                exception, start_addr
            ))),
            Err(e) => Err(AcquisitionError::ConnectionError(format!(
                "Modbus request to {} failed: {}",
                self.endpoint, e
            ))),
        }
    }

    async fn disconnect(&self) {
        let mut ctx = self.ctx.lock().await;
        if let Err(e) = ctx.disconnect().await {
            warn!("⚠️  Error while disconnecting from {}: {}", self.endpoint, e);
        }
    }
}

pub struct TcpModbusConnector {
    host: String,
    port: u16,
    unit_id: u8,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl TcpModbusConnector {
    pub fn new(config: &FieldbusConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            unit_id: config.unit_id,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    async fn open(&self) -> Result<Context, AcquisitionError> {
        let endpoint = self.endpoint();
        let socket_addr = tokio::net::lookup_host(&endpoint)
            .await
            .map_err(|e| AcquisitionError::ConnectionError(format!("Cannot resolve {}: {}", endpoint, e)))?
            .next()
            .ok_or_else(|| AcquisitionError::ConnectionError(format!("No address found for {}", endpoint)))?;

        tcp::connect_slave(socket_addr, Slave(self.unit_id))
            .await
            .map_err(|e| AcquisitionError::ConnectionError(format!("Failed to connect to {}: {}", endpoint, e)))
    }
}

#[async_trait]
impl ModbusConnector for TcpModbusConnector {
    async fn connect(&self) -> Result<Box<dyn ModbusClientTrait>, AcquisitionError> {
        let endpoint = self.endpoint();
        debug!("🔌 Connecting to Modbus TCP {} (unit {})", endpoint, self.unit_id);

        let ctx = match timeout(self.connect_timeout, self.open()).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => {
                error!("❌ {}", e);
                return Err(e);
            }
            Err(_) => {
                error!("❌ Connection to {} timed out after {:?}", endpoint, self.connect_timeout);
                return Err(AcquisitionError::Timeout(format!(
                    "Connecting to {} took longer than {:?}",
                    endpoint, self.connect_timeout
                )));
            }
        };

        info!("🔗 Connected to Modbus TCP {} (unit {})", endpoint, self.unit_id);
        Ok(Box::new(ModbusClient {
            ctx: Mutex::new(ctx),
            request_timeout: self.request_timeout,
            endpoint,
        }))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
