use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Device exception: {0}")]
    DeviceException(String),

    #[error("Frame too short: need {needed} bytes, got {actual}")]
    FrameTooShort { needed: usize, actual: usize },

    #[error("Frame too long: length field {length} exceeds 999999")]
    FrameTooLong { length: usize },

    #[error("Malformed length field: byte 0x{byte:02X} at position {position} is not an ASCII digit")]
    MalformedLength { position: usize, byte: u8 },

    #[error("Checksum mismatch: received={received}, calculated={calculated}")]
    ChecksumMismatch { received: String, calculated: String },

    #[error("Payload decode error: {0}")]
    PayloadDecode(String),

    #[error("No readings in batch")]
    NoReadings,

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AcquisitionError {
    /// Transport-level failures abort the whole cycle; everything else is
    /// scoped to a single frame or parameter.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AcquisitionError::ConnectionError(_) | AcquisitionError::Timeout(_)
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for AcquisitionError {
    fn from(err: sqlx::Error) -> Self {
        AcquisitionError::PersistenceError(format!("Database error: {}", err))
    }
}

impl From<std::io::Error> for AcquisitionError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => AcquisitionError::Timeout(err.to_string()),
            _ => AcquisitionError::ConnectionError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AcquisitionError {
    fn from(err: serde_json::Error) -> Self {
        AcquisitionError::PayloadDecode(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AcquisitionError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AcquisitionError::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(AcquisitionError::ConnectionError("refused".into()).is_transport());
        assert!(AcquisitionError::Timeout("read".into()).is_transport());
        assert!(!AcquisitionError::ChecksumMismatch {
            received: "00".into(),
            calculated: "36".into()
        }
        .is_transport());
        assert!(!AcquisitionError::PersistenceError("disk full".into()).is_transport());
    }

    #[test]
    fn test_io_error_mapping() {
        let timed_out: AcquisitionError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "read").into();
        assert!(matches!(timed_out, AcquisitionError::Timeout(_)));

        let refused: AcquisitionError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(refused, AcquisitionError::ConnectionError(_)));
        assert!(refused.is_transport());
    }

    #[test]
    fn test_malformed_length_message_names_position() {
        let err = AcquisitionError::MalformedLength { position: 3, byte: b'x' };
        assert_eq!(
            err.to_string(),
            "Malformed length field: byte 0x78 at position 3 is not an ASCII digit"
        );
    }
}
