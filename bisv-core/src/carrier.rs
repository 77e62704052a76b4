//! Data carrier (RFID tag) model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which memory bank of a carrier a detection request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierDataType {
    /// EPC memory.
    Epc,
    /// Tag identifier memory.
    Tid,
    /// User memory.
    UserMemory,
}

impl CarrierDataType {
    /// ASCII code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            CarrierDataType::Epc => b'E',
            CarrierDataType::Tid => b'T',
            CarrierDataType::UserMemory => b'U',
        }
    }

    /// Decode the wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'E' => Some(CarrierDataType::Epc),
            b'T' => Some(CarrierDataType::Tid),
            b'U' => Some(CarrierDataType::UserMemory),
            _ => None,
        }
    }
}

impl fmt::Display for CarrierDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CarrierDataType::Epc => "EPC",
            CarrierDataType::Tid => "TID",
            CarrierDataType::UserMemory => "USER",
        })
    }
}

/// One carrier reported by a detection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedCarrier {
    pub data_type: CarrierDataType,
    /// Unique identifier bytes as reported by the device.
    pub uid: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_codes() {
        for data_type in [
            CarrierDataType::Epc,
            CarrierDataType::Tid,
            CarrierDataType::UserMemory,
        ] {
            assert_eq!(CarrierDataType::from_code(data_type.code()), Some(data_type));
        }
        assert_eq!(CarrierDataType::from_code(b'X'), None);
    }
}
