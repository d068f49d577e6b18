//! "Fetch one batch" over either acquisition path.
//!
//! Transports never retry. A transport-level failure ends the cycle and the
//! scheduler simply tries again on the next tick.

pub mod fieldbus;
pub mod framed;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::settings::{Config, TransportKind};
use crate::modbus::client::TcpModbusConnector;
use crate::utils::error::AcquisitionError;

pub use fieldbus::FieldbusTransport;
pub use framed::FramedSocketTransport;

/// Raw bytes read for one parameter of the register table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSample {
    /// Position of the parameter in the configured table.
    pub index: usize,
    pub raw: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    /// One sample per successfully read parameter, in table order. Failed
    /// parameters are absent.
    Registers(Vec<RegisterSample>),
    /// Sanitized bytes of one framed response, not yet validated.
    Frame(Bytes),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Registers(samples) => samples.len(),
            Batch::Frame(raw) => raw.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn fetch_batch(&self) -> Result<Batch, AcquisitionError>;

    fn transport_type(&self) -> &str;
    fn endpoint(&self) -> String;
}

pub fn build_transport(config: &Config) -> Arc<dyn TransportClient> {
    match config.acquisition.transport {
        TransportKind::Fieldbus => Arc::new(FieldbusTransport::new(
            Arc::new(TcpModbusConnector::new(&config.fieldbus)),
            config.parameter_table(),
            config.fieldbus.idle_timeout_ms,
        )),
        TransportKind::FramedSocket => Arc::new(FramedSocketTransport::new(&config.framed_socket)),
    }
}
