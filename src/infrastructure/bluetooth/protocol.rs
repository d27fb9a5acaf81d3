//! Nap lamp wire protocol
//!
//! The lamp exposes one writable control characteristic. Both start and stop
//! go to the same characteristic; only the payload differs:
//!
//! ```text
//! stop  : "0"
//! start : "<method>-<nap min>-<breathing light min>-<wake-up light min>"
//! ```
//!
//! The payload is handed to the transport base64 encoded, one byte per
//! character. There is no framing, checksum or response.

use crate::domain::session::SessionCommand;
use crate::error::BleError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use uuid::Uuid;

/// Lamp control service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x8c6332b8_bf32_4220_ad31_0d8c19003330);

/// Control characteristic, shared by start and stop
pub const CONTROL_CHAR_UUID: Uuid = Uuid::from_u128(0x3a7f4056_0b5b_40be_99ba_fbe21644bd47);

/// Default discovery window
pub const SCAN_WINDOW_SECS: u64 = 10;

/// Base64 encode a command payload.
///
/// Only single-byte characters are allowed, so non-ASCII payloads are rejected
/// rather than silently widened to UTF-8.
pub fn encode_payload(payload: &str) -> Result<String, BleError> {
    if !payload.is_ascii() {
        return Err(BleError::InvalidPayload(format!(
            "non-ASCII payload {:?}",
            payload
        )));
    }
    Ok(STANDARD.encode(payload.as_bytes()))
}

pub fn encode_command(command: &SessionCommand) -> Result<String, BleError> {
    encode_payload(&command.payload())
}

/// Raw bytes for transports that take bytes rather than base64.
pub fn decode_value(value: &str) -> Result<Vec<u8>, BleError> {
    STANDARD
        .decode(value)
        .map_err(|e| BleError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{BreathingMethod, SessionConfig};

    #[test]
    fn test_uuid_constants() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "8c6332b8-bf32-4220-ad31-0d8c19003330"
        );
        assert_eq!(
            CONTROL_CHAR_UUID.to_string(),
            "3a7f4056-0b5b-40be-99ba-fbe21644bd47"
        );
    }

    #[test]
    fn test_stop_encoding() {
        assert_eq!(encode_command(&SessionCommand::Stop).unwrap(), "MA==");
    }

    #[test]
    fn test_start_encoding() {
        let config = SessionConfig {
            nap_duration: 3,
            breathing_method: BreathingMethod::FourSevenEight,
            breathing_light_duration: 5,
            wake_up_light_duration: 1,
        };
        let encoded = encode_command(&SessionCommand::Start(config)).unwrap();
        assert_eq!(encoded, "NC03LTgtMy01LTE=");
        assert_eq!(decode_value(&encoded).unwrap(), b"4-7-8-3-5-1");
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(matches!(
            encode_payload("sieste-é"),
            Err(BleError::InvalidPayload(_))
        ));
    }
}
