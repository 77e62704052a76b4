//! Session orchestration for BIS V RFID read heads
//!
//! This crate is the stateful layer on top of the raw request/response
//! transport in `bisv-transport`. It owns the invariants the transport
//! cannot give you:
//!
//! - at most one scanning/detection operation is in flight at any time
//! - pin 4 is used for IO-Link or as a digital input, never both
//! - the device-side configuration converges on what the current claim
//!   set requires before any dependent operation proceeds
//! - configuration transactions never interleave
//!
//! All of this is enforced through ordering and queuing on one Tokio
//! runtime; nothing here spawns worker threads of its own.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bisv_session::{ConnectOptions, PollOptions, Session};
//! use std::time::Duration;
//!
//! # async fn run() -> bisv_core::BisvResult<()> {
//! let session = Session::connect(ConnectOptions {
//!     ip_address: "192.168.10.2".parse().unwrap(),
//!     port: 10003,
//!     timeout: None,
//!     on_error: Box::new(|error| eprintln!("session failed: {error}")),
//! })
//! .await?;
//!
//! let pin = session.claim_pin_as_digital_input(2)?;
//! let poll = pin.poll(PollOptions {
//!     poll_interval: Duration::from_secs(1),
//!     on_read: Box::new(|outcome| println!("pin 2: {outcome:?}")),
//! });
//!
//! // ... later
//! poll.stop();
//! pin.release()?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod poll;
pub mod scan;
pub mod session;

mod config;
mod listener;
mod queue;

#[cfg(test)]
pub(crate) mod test_util;

pub use claims::{DigitalInputPin, IoLinkPort};
pub use poll::{PollHandle, PollOptions, ReadCallback};
pub use scan::{ScanCallback, ScanErrorCallback, ScanHandle, ScanOptions};
pub use session::{ConnectOptions, ErrorCallback, Session};
