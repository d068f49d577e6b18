pub mod client;
pub mod decoder;

pub use client::{ModbusClient, ModbusClientTrait, ModbusConnector, TcpModbusConnector};
pub use decoder::{ByteOrder, RegisterDecoder, RegisterFormat, RegisterInterpretations};
