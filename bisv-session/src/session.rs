//! Session lifecycle
//!
//! One [`Session`] owns one device connection. The lifecycle is a
//! one-way street: `Open` until either an explicit [`Session::close`]
//! or a fatal failure, after which every component treats its next step
//! as a no-op. The device handle is owned here exclusively; the other
//! modules borrow it through [`SessionInner::device`] and never keep it
//! across a lifecycle change.

use crate::claims::{self, ClaimState, DigitalInputPin, IoLinkPort};
use crate::listener;
use crate::queue::SerialQueue;
use crate::scan::{self, ANTENNA_NUMBER, ScanHandle, ScanOptions, ScanSlot};
use bisv_core::{
    BisvError, BisvResult, CarrierDataType, DetectedCarrier, IoLinkMasterConfig, IoLinkPortConfig,
};
use bisv_transport::{AsyncOperationParams, Commands, TcpDevice, TcpSettings};
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Session failure listener; invoked exactly once, on the first fatal
/// error.
pub type ErrorCallback = Box<dyn FnOnce(BisvError) + Send>;

/// Options for [`Session::connect`].
pub struct ConnectOptions {
    pub ip_address: IpAddr,
    pub port: u16,
    /// Per-request transport timeout; `None` keeps the transport
    /// default.
    pub timeout: Option<Duration>,
    pub on_error: ErrorCallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closed,
    Errored,
}

struct LifecycleState {
    lifecycle: Lifecycle,
    device: Option<Arc<dyn Commands>>,
}

pub(crate) struct SessionInner {
    state: Mutex<LifecycleState>,
    on_error: Mutex<Option<ErrorCallback>>,
    pub(crate) claims: Mutex<ClaimState>,
    /// Last confirmed device-side configuration; `None` until the first
    /// successful read.
    pub(crate) active_config: Mutex<Option<IoLinkMasterConfig>>,
    pub(crate) config_queue: SerialQueue,
    pub(crate) scan_slot: Arc<ScanSlot>,
}

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().lifecycle != Lifecycle::Open
    }

    /// Borrow the device handle. Fails once the session is closed or
    /// errored.
    pub(crate) fn device(&self) -> BisvResult<Arc<dyn Commands>> {
        let state = self.state.lock();
        match (state.lifecycle, &state.device) {
            (Lifecycle::Open, Some(device)) => Ok(device.clone()),
            _ => Err(BisvError::SessionClosed),
        }
    }

    /// Transition to `Errored`: close the transport and notify the
    /// session's error listener exactly once. A second transition
    /// attempt is a usage error and changes nothing.
    pub(crate) async fn fail(&self, error: BisvError) -> BisvResult<()> {
        let device = {
            let mut state = self.state.lock();
            match state.lifecycle {
                Lifecycle::Closed => {
                    return Err(BisvError::InvalidState("session already closed".to_string()));
                }
                Lifecycle::Errored => {
                    return Err(BisvError::InvalidState(
                        "session already errored".to_string(),
                    ));
                }
                Lifecycle::Open => {
                    state.lifecycle = Lifecycle::Errored;
                    state.device.take()
                }
            }
        };

        log::error!("session failed: {error}");

        if let Some(device) = device {
            device.close().await;
        }

        let on_error = self.on_error.lock().take();
        if let Some(on_error) = on_error {
            listener::deliver("session error", move || on_error(error));
        }

        Ok(())
    }

    /// Pass a device-call result through, turning any transport-class
    /// failure into a session failure first. The original error still
    /// reaches the caller; the session's error listener receives a
    /// description of it.
    pub(crate) async fn fail_on_transport_error<T>(&self, result: BisvResult<T>) -> BisvResult<T> {
        if let Err(error) = &result {
            if error.is_transport() {
                let description = BisvError::Connection(std::io::Error::other(error.to_string()));
                let _ = self
                    .fail(BisvError::context(
                        "transport failure, closing session",
                        description,
                    ))
                    .await;
            }
        }
        result
    }
}

/// One logical session with a read head.
///
/// Cheap to clone; all clones share the same underlying session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Connect to a read head over TCP.
    ///
    /// After the connection is established the device is forced out of
    /// any leftover asynchronous/cumulated scan mode. That reset is
    /// best-effort startup hygiene: a failure is logged, not returned.
    pub async fn connect(options: ConnectOptions) -> BisvResult<Session> {
        let address = SocketAddr::new(options.ip_address, options.port);
        let settings = match options.timeout {
            Some(timeout) => TcpSettings::with_timeout(address, timeout),
            None => TcpSettings::new(address),
        };

        let device = TcpDevice::connect(settings).await?;
        let session = Session::attach(Arc::new(device), options.on_error);
        session.startup_scan_mode_reset().await;

        Ok(session)
    }

    /// Wrap an already-connected device.
    ///
    /// The caller is responsible for the device being in its
    /// synchronous default scan mode; [`Session::connect`] performs
    /// that reset itself. Must be called from within a Tokio runtime.
    pub fn attach(device: Arc<dyn Commands>, on_error: ErrorCallback) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                state: Mutex::new(LifecycleState {
                    lifecycle: Lifecycle::Open,
                    device: Some(device),
                }),
                on_error: Mutex::new(Some(on_error)),
                claims: Mutex::new(ClaimState::new()),
                active_config: Mutex::new(None),
                config_queue: SerialQueue::new(),
                scan_slot: ScanSlot::new(),
            }),
        }
    }

    async fn startup_scan_mode_reset(&self) {
        let inner = &self.inner;

        let result = async {
            let _slot = inner.scan_slot.acquire()?;
            let device = inner.device()?;
            let status = inner
                .fail_on_transport_error(
                    device
                        .change_async_operation_parameter(&AsyncOperationParams::live(
                            ANTENNA_NUMBER,
                        ))
                        .await,
                )
                .await?;
            if !status.is_ok() {
                return Err(BisvError::from_status(status));
            }
            Ok(())
        }
        .await;

        if inner.is_closed() {
            return;
        }
        if let Err(error) = result {
            log::error!("initial scan stop failed: {error}");
        }
    }

    /// Claim a pin for digital input use.
    ///
    /// Fails when pin 4 is requested while the IO-Link port is claimed,
    /// or when the session is closed.
    pub fn claim_pin_as_digital_input(&self, pin_number: u8) -> BisvResult<DigitalInputPin> {
        claims::claim_pin_as_digital_input(&self.inner, pin_number)
    }

    /// Claim the IO-Link port.
    ///
    /// Fails when pin 4 is claimed as digital input, when the port is
    /// already claimed, or when the session is closed.
    pub fn claim_io_link(&self, port_config: IoLinkPortConfig) -> BisvResult<IoLinkPort> {
        claims::claim_io_link(&self.inner, port_config)
    }

    /// One-shot live detection of carriers currently in range.
    /// Scan-slot guarded.
    pub async fn detect_carriers_live(
        &self,
        data_type: CarrierDataType,
    ) -> BisvResult<Vec<DetectedCarrier>> {
        scan::detect_carriers_live(&self.inner, data_type).await
    }

    /// One-shot cumulated detection over `scan_time`. Scan-slot
    /// guarded.
    pub async fn detect_carriers_cumulated(
        &self,
        data_type: CarrierDataType,
        scan_time: Duration,
    ) -> BisvResult<Vec<DetectedCarrier>> {
        scan::detect_carriers_cumulated(&self.inner, data_type, scan_time).await
    }

    /// Start the continuous cumulated scan loop. Scan-slot guarded.
    pub fn scan_carriers_cumulated(&self, options: ScanOptions) -> BisvResult<ScanHandle> {
        scan::scan_carriers_cumulated(&self.inner, options)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close the session. Unconditional and idempotent: pending loops
    /// and reconciliations observe the closed state and stop without
    /// touching the device again.
    pub async fn close(&self) {
        let device = {
            let mut state = self.inner.state.lock();
            state.lifecycle = Lifecycle::Closed;
            state.device.take()
        };

        if let Some(device) = device {
            device.close().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<SessionInner> {
        &self.inner
    }
}
