//! Transport layer for BIS V RFID read heads
//!
//! This crate implements the request/response side of the device
//! protocol: the telegram framing, the typed command set and a TCP
//! client. The session layer in `bisv-session` only ever talks to the
//! [`Commands`] trait, so anything that can answer the command set,
//! including a test double, can stand in for a physical read head.

pub mod commands;
pub mod tcp;
pub mod telegram;

pub use bisv_core::{BisvError, BisvResult};
pub use commands::{
    AsyncOperationParams, CarrierDetection, Commands, ConfigRead, DetectCarriersRequest, PinRead,
};
pub use tcp::{TcpDevice, TcpSettings};
pub use telegram::{TELEGRAM_HEADER_LENGTH, Telegram, TelegramHeader};
