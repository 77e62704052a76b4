//! Telegram framing
//!
//! Every exchange with the read head is one request telegram followed
//! by one response telegram on the same TCP connection. A telegram is a
//! fixed 4-byte header followed by the payload:
//!
//! ```text
//! Version (1 byte): 0x01
//! Command (1 byte)
//! Payload length (2 bytes, big-endian)
//! Payload (variable)
//! ```
//!
//! A response echoes the request's command byte and its payload starts
//! with the device status byte.

use bisv_core::{BisvError, BisvResult};
use bytes::{BufMut, BytesMut};
use tokio::io::AsyncReadExt;

/// Protocol version this stack speaks.
pub const TELEGRAM_VERSION: u8 = 0x01;

/// Telegram header length in bytes.
pub const TELEGRAM_HEADER_LENGTH: usize = 4;

/// Maximum payload length accepted from the device.
pub const MAX_PAYLOAD_LENGTH: usize = 8192;

/// Telegram header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelegramHeader {
    command: u8,
    length: u16,
}

impl TelegramHeader {
    /// Create a new telegram header
    pub fn new(command: u8, length: u16) -> Self {
        Self { command, length }
    }

    /// Encode header to bytes (big-endian)
    pub fn encode(&self) -> Vec<u8> {
        let mut result = BytesMut::with_capacity(TELEGRAM_HEADER_LENGTH);
        result.put_u8(TELEGRAM_VERSION);
        result.put_u8(self.command);
        result.put_u16(self.length);
        result.to_vec()
    }

    /// Decode header from bytes
    pub fn decode(data: &[u8]) -> BisvResult<Self> {
        if data.len() < TELEGRAM_HEADER_LENGTH {
            return Err(BisvError::Telegram(format!(
                "telegram header too short: expected {}, got {}",
                TELEGRAM_HEADER_LENGTH,
                data.len()
            )));
        }

        let version = data[0];
        if version != TELEGRAM_VERSION {
            return Err(BisvError::Telegram(format!(
                "telegram version was {}, this stack is only compatible to version {}",
                version, TELEGRAM_VERSION
            )));
        }

        let command = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]);

        Ok(Self { command, length })
    }

    /// Get the command byte
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Get the payload length
    pub fn payload_length(&self) -> u16 {
        self.length
    }
}

/// One complete telegram (header plus payload)
#[derive(Debug, Clone)]
pub struct Telegram {
    header: TelegramHeader,
    payload: Vec<u8>,
}

impl Telegram {
    /// Create a telegram for a command and payload.
    pub fn new(command: u8, payload: Vec<u8>) -> Self {
        Self {
            header: TelegramHeader::new(command, payload.len() as u16),
            payload,
        }
    }

    /// Encode the telegram to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut result = self.header.encode();
        result.extend_from_slice(&self.payload);
        result
    }

    /// Read one telegram from a stream
    pub async fn read_from<S>(stream: &mut S) -> BisvResult<Self>
    where
        S: tokio::io::AsyncRead + Unpin,
    {
        let mut header_bytes = [0u8; TELEGRAM_HEADER_LENGTH];
        stream.read_exact(&mut header_bytes).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BisvError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "unexpected end of stream while reading telegram header",
                ))
            } else {
                BisvError::Connection(e)
            }
        })?;

        let header = TelegramHeader::decode(&header_bytes)?;
        let payload_length = header.payload_length() as usize;
        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(BisvError::Telegram(format!(
                "telegram payload too long: {} bytes",
                payload_length
            )));
        }

        let mut payload = vec![0u8; payload_length];
        stream.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BisvError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "unexpected end of stream while reading telegram payload",
                ))
            } else {
                BisvError::Connection(e)
            }
        })?;

        Ok(Self { header, payload })
    }

    /// Get the header
    pub fn header(&self) -> &TelegramHeader {
        &self.header
    }

    /// Get the payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode() {
        let header = TelegramHeader::new(0x30, 260);
        let encoded = header.encode();
        assert_eq!(encoded.len(), TELEGRAM_HEADER_LENGTH);
        assert_eq!(encoded[0], TELEGRAM_VERSION);

        let decoded = TelegramHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.command(), 0x30);
        assert_eq!(decoded.payload_length(), 260);
    }

    #[test]
    fn test_header_rejects_wrong_version() {
        let mut encoded = TelegramHeader::new(0x10, 0).encode();
        encoded[0] = 0x02;
        assert!(TelegramHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_header_rejects_short_input() {
        assert!(TelegramHeader::decode(&[0x01, 0x10]).is_err());
    }

    #[tokio::test]
    async fn test_telegram_round_trip_through_stream() {
        let telegram = Telegram::new(0x20, vec![0x02]);
        let encoded = telegram.encode();

        let mut reader = std::io::Cursor::new(encoded);
        let decoded = Telegram::read_from(&mut reader).await.unwrap();
        assert_eq!(decoded.header().command(), 0x20);
        assert_eq!(decoded.payload(), &[0x02]);
    }

    #[tokio::test]
    async fn test_truncated_payload_is_a_connection_error() {
        let telegram = Telegram::new(0x20, vec![1, 2, 3, 4]);
        let mut encoded = telegram.encode();
        encoded.truncate(encoded.len() - 2);

        let mut reader = std::io::Cursor::new(encoded);
        let err = Telegram::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, BisvError::Connection(_)));
    }
}
