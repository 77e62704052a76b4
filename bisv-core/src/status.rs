//! Device status codes
//!
//! Every response telegram carries a status byte. `Ok` and
//! `NoCarrierInRange` are the only codes that are not plain failures:
//! the latter is a normal outcome of a detection request and is mapped
//! to an empty carrier list by the session layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status byte returned by the read head with every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    NoCarrierInRange,
    AccessDenied,
    InvalidCommand,
    InvalidParameter,
    DeviceBusy,
    HardwareFault,
    /// Status byte not known to this stack.
    Other(u8),
}

impl StatusCode {
    /// Decode a status byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => StatusCode::Ok,
            0x01 => StatusCode::NoCarrierInRange,
            0x02 => StatusCode::AccessDenied,
            0x03 => StatusCode::InvalidCommand,
            0x04 => StatusCode::InvalidParameter,
            0x05 => StatusCode::DeviceBusy,
            0x06 => StatusCode::HardwareFault,
            other => StatusCode::Other(other),
        }
    }

    /// Encode to the wire byte.
    pub fn to_byte(self) -> u8 {
        match self {
            StatusCode::Ok => 0x00,
            StatusCode::NoCarrierInRange => 0x01,
            StatusCode::AccessDenied => 0x02,
            StatusCode::InvalidCommand => 0x03,
            StatusCode::InvalidParameter => 0x04,
            StatusCode::DeviceBusy => 0x05,
            StatusCode::HardwareFault => 0x06,
            StatusCode::Other(byte) => byte,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::NoCarrierInRange => "NO_CARRIER_IN_RANGE",
            StatusCode::AccessDenied => "ACCESS_DENIED",
            StatusCode::InvalidCommand => "INVALID_COMMAND",
            StatusCode::InvalidParameter => "INVALID_PARAMETER",
            StatusCode::DeviceBusy => "DEVICE_BUSY",
            StatusCode::HardwareFault => "HARDWARE_FAULT",
            StatusCode::Other(_) => "UNKNOWN",
        };
        write!(f, "{} (0x{:02X})", name, self.to_byte())
    }
}
