pub mod checksum;
pub mod frame;
pub mod payload;

pub use checksum::{checksum_byte, checksum_hex};
pub use frame::{sanitize_printable, Frame, FrameCodec};
pub use payload::decode_readings;
