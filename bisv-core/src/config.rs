//! IO-Link master configuration records
//!
//! The read head exposes one IO-Link master port whose behavior is
//! controlled by a single configuration record. The session layer keeps
//! the last confirmed device-side record and compares it structurally
//! against the record required by the current resource claims, so
//! equality here must be exact field-by-field comparison over the full
//! schema. The derived `PartialEq` gives exactly that.

use serde::{Deserialize, Serialize};

/// Serial number the session always writes to the device.
///
/// The device requires the field on every config write but this stack
/// never programs a real serial number.
pub const DEFAULT_SERIAL_NUMBER: &str = "0000000000000000";

/// Operating mode of a configurable device pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    /// Digital input, normally open.
    NormallyOpen,
    /// Digital input, normally closed.
    NormallyClosed,
    /// Pin 4 only: IO-Link communication.
    IoLink,
}

impl PinMode {
    /// Decode the wire value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PinMode::NormallyOpen),
            1 => Some(PinMode::NormallyClosed),
            4 => Some(PinMode::IoLink),
            _ => None,
        }
    }

    /// Encode to the wire value.
    pub fn to_byte(self) -> u8 {
        match self {
            PinMode::NormallyOpen => 0,
            PinMode::NormallyClosed => 1,
            PinMode::IoLink => 4,
        }
    }
}

/// Caller-facing parameters of an IO-Link port claim.
///
/// A subset of [`IoLinkMasterConfig`]: pin modes, parameter server
/// settings and the serial number are owned by the session layer and
/// not settable per claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLinkPortConfig {
    pub cycle_time_base: u8,
    pub cycle_time: u8,
    pub safe_state: u8,
    pub validation_mode: u8,
    pub vendor_id: u16,
    pub device_id: u32,
    pub output_length: u8,
    pub input_length: u8,
}

impl IoLinkPortConfig {
    /// Defaults written while no IO-Link claim is held.
    pub fn unclaimed() -> Self {
        Self {
            cycle_time_base: 0,
            cycle_time: 0,
            safe_state: 0,
            validation_mode: 0,
            vendor_id: 0,
            device_id: 0,
            output_length: 0,
            input_length: 0,
        }
    }
}

/// The device's IO-Link master configuration record.
///
/// This is the record read from and written to the device as a whole;
/// partial updates are not possible. Two records are equal exactly when
/// every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLinkMasterConfig {
    pub cycle_time_base: u8,
    pub cycle_time: u8,
    pub safe_state: u8,
    pub validation_mode: u8,
    pub vendor_id: u16,
    pub device_id: u32,
    pub output_length: u8,
    pub input_length: u8,
    pub pin2_mode: PinMode,
    pub pin4_mode: PinMode,
    pub parameter_server_mode: u8,
    pub parameter_upload_enabled: bool,
    pub parameter_download_enabled: bool,
    /// 16 ASCII characters.
    pub serial_number: String,
}

impl IoLinkMasterConfig {
    /// Build a full record from port parameters and pin modes.
    pub fn from_port_config(port: &IoLinkPortConfig, pin2_mode: PinMode, pin4_mode: PinMode) -> Self {
        Self {
            cycle_time_base: port.cycle_time_base,
            cycle_time: port.cycle_time,
            safe_state: port.safe_state,
            validation_mode: port.validation_mode,
            vendor_id: port.vendor_id,
            device_id: port.device_id,
            output_length: port.output_length,
            input_length: port.input_length,
            pin2_mode,
            pin4_mode,
            parameter_server_mode: 0,
            parameter_upload_enabled: false,
            parameter_download_enabled: false,
            serial_number: DEFAULT_SERIAL_NUMBER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_mode_round_trip() {
        for mode in [PinMode::NormallyOpen, PinMode::NormallyClosed, PinMode::IoLink] {
            assert_eq!(PinMode::from_byte(mode.to_byte()), Some(mode));
        }
        assert_eq!(PinMode::from_byte(7), None);
    }

    #[test]
    fn test_structural_equality_is_field_by_field() {
        let port = IoLinkPortConfig {
            cycle_time_base: 1,
            cycle_time: 20,
            safe_state: 0,
            validation_mode: 2,
            vendor_id: 888,
            device_id: 0x0001_0203,
            output_length: 4,
            input_length: 2,
        };
        let a = IoLinkMasterConfig::from_port_config(&port, PinMode::NormallyOpen, PinMode::IoLink);
        let mut b = a.clone();
        assert_eq!(a, b);

        b.parameter_upload_enabled = true;
        assert_ne!(a, b);
    }

    #[test]
    fn test_unclaimed_defaults_are_all_zero() {
        let cfg = IoLinkMasterConfig::from_port_config(
            &IoLinkPortConfig::unclaimed(),
            PinMode::NormallyOpen,
            PinMode::NormallyOpen,
        );
        assert_eq!(cfg.vendor_id, 0);
        assert_eq!(cfg.device_id, 0);
        assert_eq!(cfg.output_length, 0);
        assert_eq!(cfg.serial_number, DEFAULT_SERIAL_NUMBER);
    }
}
