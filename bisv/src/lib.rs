//! bisv - session layer for Balluff BIS V RFID read heads
//!
//! This library manages a single logical session with a network-attached
//! RFID read head: it tracks the device-side configuration against the
//! resources a caller has claimed, arbitrates the scanning hardware and
//! runs the polling and continuous-scan loops on top of the raw
//! request/response transport.
//!
//! # Architecture
//!
//! The workspace is organized in layers:
//!
//! - `bisv-core`: shared types, status codes, error handling
//! - `bisv-transport`: telegram framing, typed command set, TCP client
//! - `bisv-session`: session orchestration (claims, reconciler, scan
//!   slot, loops, lifecycle)
//! - `bisv`: this facade
//!
//! # Usage
//!
//! ```no_run
//! use bisv::{ConnectOptions, Session};
//! ```
//!
//! See the `examples/` directory for the two driver programs.

// Re-export core types
pub use bisv_core::{
    BisvError, BisvResult, CarrierDataType, DetectedCarrier, IoLinkMasterConfig, IoLinkPortConfig,
    PinMode, StatusCode,
};

// Re-export the session API
pub use bisv_session::{
    ConnectOptions, DigitalInputPin, ErrorCallback, IoLinkPort, PollHandle, PollOptions,
    ScanHandle, ScanOptions, Session,
};

// Re-export the transport layer for callers that bring their own
// device implementation
pub mod transport {
    pub use bisv_transport::*;
}
