//! Length-prefixed, checksummed frames spoken to the acquisition server.
//!
//! ```text
//! +----------------+-----------------+--------------+
//! | 6 ASCII digits |    payload      | 2 hex digits |
//! |  len(payload)+2|                 |   checksum   |
//! +----------------+-----------------+--------------+
//! ```
//!
//! `"query"` travels as `000007query36`.

use log::debug;

use crate::protocol::checksum::checksum_hex;
use crate::utils::error::AcquisitionError;

pub const LENGTH_FIELD_LEN: usize = 6;
pub const CHECKSUM_LEN: usize = 2;
/// Largest value a 6-digit length field can carry.
pub const MAX_LENGTH_VALUE: usize = 999_999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Value of the length field: payload length plus the checksum digits.
    pub length: usize,
    pub payload: Vec<u8>,
    pub checksum: String,
}

impl Frame {
    pub fn new(payload: &[u8]) -> Result<Self, AcquisitionError> {
        let length = payload.len() + CHECKSUM_LEN;
        if length > MAX_LENGTH_VALUE {
            return Err(AcquisitionError::FrameTooLong { length });
        }
        Ok(Self {
            length,
            payload: payload.to_vec(),
            checksum: checksum_hex(payload),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LENGTH_FIELD_LEN + self.length);
        out.extend_from_slice(format!("{:06}", self.length).as_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(self.checksum.as_bytes());
        out
    }
}

pub struct FrameCodec;

impl FrameCodec {
    pub fn encode(payload: &str) -> Result<String, AcquisitionError> {
        let frame = Frame::new(payload.as_bytes())?;
        Ok(format!("{:06}{}{}", frame.length, payload, frame.checksum))
    }

    pub fn encode_bytes(payload: &[u8]) -> Result<Vec<u8>, AcquisitionError> {
        Frame::new(payload).map(|frame| frame.to_bytes())
    }

    /// Parse the length field. Returns the declared value `N`; the complete
    /// frame spans `6 + N` bytes.
    pub fn declared_length(raw: &[u8]) -> Result<usize, AcquisitionError> {
        if raw.len() < LENGTH_FIELD_LEN {
            return Err(AcquisitionError::FrameTooShort {
                needed: LENGTH_FIELD_LEN,
                actual: raw.len(),
            });
        }

        let mut length = 0usize;
        for (position, &byte) in raw[..LENGTH_FIELD_LEN].iter().enumerate() {
            if !byte.is_ascii_digit() {
                return Err(AcquisitionError::MalformedLength { position, byte });
            }
            length = length * 10 + usize::from(byte - b'0');
        }
        Ok(length)
    }

    /// Validate one frame and return its payload. Bytes after the frame are
    /// ignored.
    pub fn decode(raw: &[u8]) -> Result<&[u8], AcquisitionError> {
        let length = Self::declared_length(raw)?;

        // A frame must at least hold its own checksum
        if length < CHECKSUM_LEN {
            return Err(AcquisitionError::FrameTooShort {
                needed: LENGTH_FIELD_LEN + CHECKSUM_LEN,
                actual: LENGTH_FIELD_LEN + length,
            });
        }

        let frame_end = LENGTH_FIELD_LEN + length;
        if raw.len() < frame_end {
            return Err(AcquisitionError::FrameTooShort {
                needed: frame_end,
                actual: raw.len(),
            });
        }
        if raw.len() > frame_end {
            debug!("Ignoring {} bytes after frame end", raw.len() - frame_end);
        }

        let payload_end = frame_end - CHECKSUM_LEN;
        let payload = &raw[LENGTH_FIELD_LEN..payload_end];
        let received = &raw[payload_end..frame_end];
        let calculated = checksum_hex(payload);

        if !received.eq_ignore_ascii_case(calculated.as_bytes()) {
            return Err(AcquisitionError::ChecksumMismatch {
                received: String::from_utf8_lossy(received).into_owned(),
                calculated,
            });
        }

        Ok(payload)
    }

    /// True once `raw` holds at least one complete frame, or can never become
    /// one because the length field is malformed.
    pub fn is_complete(raw: &[u8]) -> bool {
        match Self::declared_length(raw) {
            Ok(length) => raw.len() >= LENGTH_FIELD_LEN + length,
            Err(AcquisitionError::MalformedLength { .. }) => true,
            Err(_) => false,
        }
    }
}

/// Drop every byte outside printable ASCII (0x20..=0x7E).
pub fn sanitize_printable(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .copied()
        .filter(|byte| (0x20..=0x7E).contains(byte))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_query() {
        assert_eq!(FrameCodec::encode("query").unwrap(), "000007query36");
        assert_eq!(FrameCodec::encode_bytes(b"query").unwrap(), b"000007query36".to_vec());
    }

    #[test]
    fn test_encode_empty_payload() {
        assert_eq!(FrameCodec::encode("").unwrap(), "00000200");
        assert_eq!(FrameCodec::decode(b"00000200").unwrap(), b"");
    }

    #[test]
    fn test_round_trip_printable_payloads() {
        let all_printable: String = (0x20u8..=0x7E).map(char::from).collect();
        let payloads = [
            "query",
            "[{\"index\":0,\"name\":\"V_avg\",\"value\":230.5,\"unit\":\"V\"}]",
            " ",
            "~~~~",
            all_printable.as_str(),
        ];
        for payload in payloads {
            let encoded = FrameCodec::encode(payload).unwrap();
            assert_eq!(FrameCodec::decode(encoded.as_bytes()).unwrap(), payload.as_bytes());
        }
    }

    proptest! {
        #[test]
        fn prop_round_trip_any_printable_payload(payload in "[ -~]{0,512}") {
            let encoded = FrameCodec::encode(&payload).unwrap();
            prop_assert!(FrameCodec::is_complete(encoded.as_bytes()));
            prop_assert_eq!(FrameCodec::decode(encoded.as_bytes()).unwrap(), payload.as_bytes());
        }

        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = FrameCodec::decode(&raw);
        }
    }

    #[test]
    fn test_decode_too_short() {
        match FrameCodec::decode(b"0000") {
            Err(AcquisitionError::FrameTooShort { needed, actual }) => {
                assert_eq!(needed, 6);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated_body() {
        match FrameCodec::decode(b"000007quer") {
            Err(AcquisitionError::FrameTooShort { needed, actual }) => {
                assert_eq!(needed, 13);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_non_digit_length() {
        match FrameCodec::decode(b"00a007query36") {
            Err(AcquisitionError::MalformedLength { position, byte }) => {
                assert_eq!(position, 2);
                assert_eq!(byte, b'a');
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            FrameCodec::decode(b" 00007query36"),
            Err(AcquisitionError::MalformedLength { position: 0, .. })
        ));
    }

    #[test]
    fn test_decode_length_below_checksum_size() {
        assert!(matches!(
            FrameCodec::decode(b"000001X"),
            Err(AcquisitionError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn test_decode_tampered_checksum() {
        match FrameCodec::decode(b"000007query37") {
            Err(AcquisitionError::ChecksumMismatch { received, calculated }) => {
                assert_eq!(received, "37");
                assert_eq!(calculated, "36");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            FrameCodec::decode(b"000007queryZZ"),
            Err(AcquisitionError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_tampered_payload() {
        assert!(matches!(
            FrameCodec::decode(b"000007qUery36"),
            Err(AcquisitionError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_checksum_case_insensitive() {
        // "[]" sums to 0xB8
        assert_eq!(FrameCodec::decode(b"000004[]b8").unwrap(), b"[]");
        assert_eq!(FrameCodec::decode(b"000004[]B8").unwrap(), b"[]");
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(FrameCodec::decode(b"000007query36garbage").unwrap(), b"query");
    }

    #[test]
    fn test_is_complete() {
        assert!(!FrameCodec::is_complete(b"0000"));
        assert!(!FrameCodec::is_complete(b"000007que"));
        assert!(FrameCodec::is_complete(b"000007query36"));
        assert!(FrameCodec::is_complete(b"00x007"));
    }

    #[test]
    fn test_sanitize_printable() {
        let raw = b"\x00\x00000007\r\nquery36\xff\x7f";
        assert_eq!(sanitize_printable(raw), b"000007query36".to_vec());
        assert_eq!(FrameCodec::decode(&sanitize_printable(raw)).unwrap(), b"query");
    }

    #[test]
    fn test_frame_fields() {
        let frame = Frame::new(b"query").unwrap();
        assert_eq!(frame.length, 7);
        assert_eq!(frame.checksum, "36");
        assert_eq!(frame.to_bytes(), b"000007query36".to_vec());
    }

    #[test]
    fn test_frame_too_long() {
        let payload = vec![b'a'; MAX_LENGTH_VALUE];
        assert!(matches!(
            Frame::new(&payload),
            Err(AcquisitionError::FrameTooLong { .. })
        ));
    }
}
