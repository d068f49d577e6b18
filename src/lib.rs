//! Energy meter acquisition library
//!
//! Polls a three-phase energy meter either directly over Modbus TCP or through
//! an acquisition server speaking a length-prefixed, checksummed socket
//! protocol, and keeps the latest batch of readings available to a dashboard.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod protocol;
pub mod services;
pub mod storage;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use modbus::{ByteOrder, RegisterDecoder, RegisterFormat};
pub use protocol::FrameCodec;
pub use services::{AcquisitionScheduler, CollectorService, SchedulerState};
pub use storage::{MeterReading, PersistenceSink};
pub use transport::{Batch, TransportClient};
pub use utils::error::AcquisitionError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
