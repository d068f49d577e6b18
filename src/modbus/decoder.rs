//! Register pair decoding.
//!
//! A meter exposes every 32-bit quantity as two consecutive 16-bit holding
//! registers. Which register carries the high word depends on the meter
//! firmware, so the word order is a deployment setting (`ByteOrder`) rather
//! than something the decoder guesses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::AcquisitionError;

/// Number of bytes returned for a two-register read.
pub const REGISTER_PAIR_LEN: usize = 4;

/// Number of registers requested per parameter.
pub const REGISTERS_PER_PARAMETER: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Bytes taken as received: ABCD, big-endian IEEE-754.
    Straight,
    /// The two 16-bit words swapped before reinterpretation: CDAB.
    WordSwapped,
}

impl ByteOrder {
    pub const fn description(&self) -> &'static str {
        match self {
            ByteOrder::Straight => "Straight big-endian (ABCD)",
            ByteOrder::WordSwapped => "Word-swapped big-endian (CDAB)",
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ByteOrder::Straight => "straight",
            ByteOrder::WordSwapped => "word_swapped",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ByteOrder {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "straight" | "abcd" | "bigendian" | "big" => Ok(ByteOrder::Straight),
            "wordswapped" | "wordswap" | "cdab" | "swapped" => Ok(ByteOrder::WordSwapped),
            _ => Err(AcquisitionError::ConfigError(format!(
                "Unknown byte order '{}'. Expected: straight, word_swapped",
                s
            ))),
        }
    }
}

/// How a parameter's register pair is turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterFormat {
    /// IEEE-754 single precision spread over both registers.
    #[default]
    Float32,
    /// Unsigned integer held in the first register only.
    U16,
}

impl fmt::Display for RegisterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterFormat::Float32 => write!(f, "float32"),
            RegisterFormat::U16 => write!(f, "u16"),
        }
    }
}

fn take_pair(data: &[u8]) -> Result<[u8; REGISTER_PAIR_LEN], AcquisitionError> {
    if data.len() < REGISTER_PAIR_LEN {
        return Err(AcquisitionError::InsufficientData {
            expected: REGISTER_PAIR_LEN,
            actual: data.len(),
        });
    }
    Ok([data[0], data[1], data[2], data[3]])
}

/// Swap the two 16-bit words of a register pair: `[A, B, C, D]` -> `[C, D, A, B]`.
pub fn swap_words(pair: [u8; REGISTER_PAIR_LEN]) -> [u8; REGISTER_PAIR_LEN] {
    [pair[2], pair[3], pair[0], pair[1]]
}

pub fn decode_f32(data: &[u8], order: ByteOrder) -> Result<f32, AcquisitionError> {
    let pair = take_pair(data)?;
    let bytes = match order {
        ByteOrder::Straight => pair,
        ByteOrder::WordSwapped => swap_words(pair),
    };
    Ok(f32::from_be_bytes(bytes))
}

/// Raw integer in the first register. Still requires the whole pair so that a
/// short read is reported the same way for every format.
pub fn decode_u16(data: &[u8]) -> Result<u16, AcquisitionError> {
    let pair = take_pair(data)?;
    Ok(u16::from_be_bytes([pair[0], pair[1]]))
}

pub fn decode_register_pair(
    data: &[u8],
    format: RegisterFormat,
    order: ByteOrder,
) -> Result<f64, AcquisitionError> {
    match format {
        RegisterFormat::Float32 => decode_f32(data, order).map(f64::from),
        RegisterFormat::U16 => decode_u16(data).map(f64::from),
    }
}

/// Decoder bound to one meter's word order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDecoder {
    order: ByteOrder,
}

impl RegisterDecoder {
    pub fn new(order: ByteOrder) -> Self {
        Self { order }
    }

    pub fn decode(&self, data: &[u8], format: RegisterFormat) -> Result<f64, AcquisitionError> {
        decode_register_pair(data, format, self.order)
    }
}

/// Flatten register words into the byte stream a meter puts on the wire.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Every interpretation of one register pair, used by the probe command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterInterpretations {
    pub registers: [u16; 2],
    pub straight: f32,
    pub word_swapped: f32,
    pub raw_u16: u16,
}

impl RegisterInterpretations {
    pub fn from_bytes(data: &[u8]) -> Result<Self, AcquisitionError> {
        let pair = take_pair(data)?;
        Ok(Self {
            registers: [
                u16::from_be_bytes([pair[0], pair[1]]),
                u16::from_be_bytes([pair[2], pair[3]]),
            ],
            straight: decode_f32(&pair, ByteOrder::Straight)?,
            word_swapped: decode_f32(&pair, ByteOrder::WordSwapped)?,
            raw_u16: decode_u16(&pair)?,
        })
    }
}
