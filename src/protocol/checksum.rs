/// Single-byte sum of the payload, modulo 256.
pub fn checksum_byte(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte))
}

/// The checksum as it travels on the wire: two uppercase hex digits.
pub fn checksum_hex(data: &[u8]) -> String {
    format!("{:02X}", checksum_byte(data))
}
