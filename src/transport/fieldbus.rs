use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{Batch, RegisterSample, TransportClient};
use crate::config::settings::MeterParameterDefinition;
use crate::modbus::client::ModbusConnector;
use crate::modbus::decoder::REGISTERS_PER_PARAMETER;
use crate::utils::error::AcquisitionError;

/// Reads every configured parameter over one Modbus session per cycle.
pub struct FieldbusTransport {
    connector: Arc<dyn ModbusConnector>,
    parameters: Arc<[MeterParameterDefinition]>,
    idle_timeout: Duration,
}

impl FieldbusTransport {
    pub fn new(
        connector: Arc<dyn ModbusConnector>,
        parameters: Arc<[MeterParameterDefinition]>,
        idle_timeout_ms: u64,
    ) -> Self {
        Self {
            connector,
            parameters,
            idle_timeout: Duration::from_millis(idle_timeout_ms),
        }
    }

}

#[async_trait]
impl TransportClient for FieldbusTransport {
    async fn fetch_batch(&self) -> Result<Batch, AcquisitionError> {
        let client = self.connector.connect().await?;

        // The session is dropped once it has been open for the idle timeout,
        // even if parameters remain.
        let deadline = Instant::now() + self.idle_timeout;
        let mut samples = Vec::with_capacity(self.parameters.len());

        for (index, parameter) in self.parameters.iter().enumerate() {
            if Instant::now() >= deadline {
                warn!(
                    "⏱️  Session idle timeout reached, skipping {} remaining parameters starting at '{}'",
                    self.parameters.len() - index,
                    parameter.name
                );
                break;
            }

            match client
                .read_holding_registers(parameter.address, REGISTERS_PER_PARAMETER)
                .await
            {
                Ok(raw) => samples.push(RegisterSample {
                    index,
                    raw: Bytes::from(raw),
                }),
                // A timed-out request may still be answered later, so the
                // session cannot be trusted for the remaining parameters.
                Err(e) if e.is_transport() => {
                    warn!(
                        "⚠️  Session to {} failed at '{}' (register 0x{:04X}), aborting cycle",
                        self.connector.endpoint(),
                        parameter.name,
                        parameter.address
                    );
                    client.disconnect().await;
                    return Err(e);
                }
                Err(e) => warn!(
                    "⚠️  Skipping '{}' (register 0x{:04X}): {}",
                    parameter.name, parameter.address, e
                ),
            }
        }

        client.disconnect().await;
        debug!(
            "📦 Read {}/{} parameters from {}",
            samples.len(),
            self.parameters.len(),
            self.connector.endpoint()
        );
        Ok(Batch::Registers(samples))
    }

    fn transport_type(&self) -> &str {
        "fieldbus"
    }

    fn endpoint(&self) -> String {
        self.connector.endpoint()
    }
}
