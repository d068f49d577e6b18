use serde::Deserialize;

use crate::storage::models::MeterReading;
use crate::utils::error::AcquisitionError;

/// Servers in the field send `value` either as a JSON number or as a string
/// holding a decimal number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct WireReading {
    index: usize,
    name: String,
    value: WireValue,
    #[serde(default)]
    unit: String,
}

impl WireReading {
    fn into_reading(self) -> Result<MeterReading, AcquisitionError> {
        let value = match self.value {
            WireValue::Number(v) => v,
            WireValue::Text(text) => text.trim().parse::<f64>().map_err(|_| {
                AcquisitionError::PayloadDecode(format!(
                    "Reading '{}' has non-numeric value '{}'",
                    self.name, text
                ))
            })?,
        };
        if !value.is_finite() {
            return Err(AcquisitionError::PayloadDecode(format!(
                "Reading '{}' has non-finite value {}",
                self.name, value
            )));
        }
        Ok(MeterReading::new(self.index, self.name, value, self.unit))
    }
}

/// Decode a frame payload holding a JSON array of readings.
pub fn decode_readings(payload: &[u8]) -> Result<Vec<MeterReading>, AcquisitionError> {
    let wire: Vec<WireReading> = serde_json::from_slice(payload)?;
    wire.into_iter().map(WireReading::into_reading).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values() {
        let payload = br#"[{"index":0,"name":"V_avg","value":230.5,"unit":"V"},{"index":1,"name":"I_avg","value":4,"unit":"A"}]"#;
        let readings = decode_readings(payload).unwrap();
        assert_eq!(
            readings,
            vec![
                MeterReading::new(0, "V_avg", 230.5, "V"),
                MeterReading::new(1, "I_avg", 4.0, "A"),
            ]
        );
    }

    #[test]
    fn test_string_values() {
        let payload = br#"[{"index":2,"name":"Frequency","value":" 49.98 ","unit":"Hz"}]"#;
        let readings = decode_readings(payload).unwrap();
        assert_eq!(readings[0].value, 49.98);
        assert_eq!(readings[0].index, 2);
    }

    #[test]
    fn test_empty_array() {
        assert!(decode_readings(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_payloads() {
        let cases: [&[u8]; 8] = [
            b"query",
            b"{\"index\":0}",
            br#"[{"index":0,"name":"V","value":"abc","unit":"V"}]"#,
            br#"[{"index":0,"name":"V","value":"NaN","unit":"V"}]"#,
            br#"[{"index":0,"name":"V","value":"inf","unit":"V"}]"#,
            br#"[{"index":0,"name":"V","value":"-infinity","unit":"V"}]"#,
            br#"[{"index":0,"name":"V","value":true,"unit":"V"}]"#,
            br#"[{"name":"V","value":1.0,"unit":"V"}]"#,
        ];
        for payload in cases {
            assert!(
                matches!(decode_readings(payload), Err(AcquisitionError::PayloadDecode(_))),
                "payload {:?} should be rejected",
                String::from_utf8_lossy(payload)
            );
        }
    }
}
