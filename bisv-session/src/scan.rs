//! Scan slot arbitration and carrier detection
//!
//! The read head has one antenna, and every detection operation (a
//! one-shot live detect, a one-shot cumulated detect, the continuous
//! scan loop) drives that same hardware. The scan slot is the mutual
//! exclusion token for it: whoever holds the slot owns the scanning
//! hardware until their operation settles.

use crate::listener;
use crate::session::SessionInner;
use bisv_core::{BisvError, BisvResult, CarrierDataType, DetectedCarrier, StatusCode};
use bisv_transport::{AsyncOperationParams, DetectCarriersRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The device has a single antenna.
pub(crate) const ANTENNA_NUMBER: u8 = 0;

/// Carrier cap for one-shot detection requests.
const ONE_SHOT_MAX_CARRIERS: u16 = 999;

/// Mutual exclusion flag for the scanning hardware.
pub(crate) struct ScanSlot {
    busy: AtomicBool,
}

impl ScanSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            busy: AtomicBool::new(false),
        })
    }

    /// Take the slot. Fails synchronously when an operation is already
    /// in flight.
    pub(crate) fn acquire(self: &Arc<Self>) -> BisvResult<ScanSlotGuard> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(BisvError::InvalidState(
                "scan already in progress".to_string(),
            ));
        }
        Ok(ScanSlotGuard { slot: self.clone() })
    }
}

/// Releases the scan slot when the guarded operation settles, whether
/// it completed or failed.
pub(crate) struct ScanSlotGuard {
    slot: Arc<ScanSlot>,
}

impl Drop for ScanSlotGuard {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::SeqCst);
    }
}

async fn request_live_scan_mode(inner: &Arc<SessionInner>) -> BisvResult<()> {
    let device = inner.device()?;
    let status = inner
        .fail_on_transport_error(
            device
                .change_async_operation_parameter(&AsyncOperationParams::live(ANTENNA_NUMBER))
                .await,
        )
        .await?;

    if !status.is_ok() {
        return Err(BisvError::from_status(status));
    }
    Ok(())
}

/// Enter cumulated mode. Going to live mode first drops any stale
/// asynchronous list the device may still hold from a previous scan.
async fn request_cumulated_mode_and_flush(inner: &Arc<SessionInner>) -> BisvResult<()> {
    let device = inner.device()?;

    let status = inner
        .fail_on_transport_error(
            device
                .change_async_operation_parameter(&AsyncOperationParams::live(ANTENNA_NUMBER))
                .await,
        )
        .await?;
    if !status.is_ok() {
        return Err(BisvError::context(
            "flushing list / going to live mode failed",
            BisvError::from_status(status),
        ));
    }

    let status = inner
        .fail_on_transport_error(
            device
                .change_async_operation_parameter(&AsyncOperationParams::cumulated(ANTENNA_NUMBER))
                .await,
        )
        .await?;
    if !status.is_ok() {
        return Err(BisvError::context(
            "going to cumulated mode failed",
            BisvError::from_status(status),
        ));
    }

    Ok(())
}

/// Run one detection request. `NO_CARRIER_IN_RANGE` is a normal empty
/// result, not an error.
async fn detect_or_get_carriers(
    inner: &Arc<SessionInner>,
    data_type: CarrierDataType,
    max_number_carriers: u16,
) -> BisvResult<Vec<DetectedCarrier>> {
    let device = inner.device()?;
    let detection = inner
        .fail_on_transport_error(
            device
                .detect_data_carriers_extended(&DetectCarriersRequest {
                    antenna_number: ANTENNA_NUMBER,
                    data_type,
                    max_number_carriers,
                    only_selected: false,
                })
                .await,
        )
        .await?;

    match detection.status {
        StatusCode::Ok => Ok(detection.carriers),
        StatusCode::NoCarrierInRange => Ok(Vec::new()),
        status => Err(BisvError::from_status(status)),
    }
}

/// One-shot live detection.
pub(crate) async fn detect_carriers_live(
    inner: &Arc<SessionInner>,
    data_type: CarrierDataType,
) -> BisvResult<Vec<DetectedCarrier>> {
    inner.device()?;
    let _slot = inner.scan_slot.acquire()?;

    request_live_scan_mode(inner)
        .await
        .map_err(|e| BisvError::context("failed to request live scan mode", e))?;

    detect_or_get_carriers(inner, data_type, ONE_SHOT_MAX_CARRIERS)
        .await
        .map_err(|e| BisvError::context("failed to detect carriers", e))
}

/// One-shot cumulated detection: collect carriers for `scan_time`,
/// fetch the list, then restore live mode.
pub(crate) async fn detect_carriers_cumulated(
    inner: &Arc<SessionInner>,
    data_type: CarrierDataType,
    scan_time: Duration,
) -> BisvResult<Vec<DetectedCarrier>> {
    inner.device()?;
    let _slot = inner.scan_slot.acquire()?;

    request_cumulated_mode_and_flush(inner)
        .await
        .map_err(|e| BisvError::context("failed to request cumulated mode and flush", e))?;

    tokio::time::sleep(scan_time).await;

    let carriers = detect_or_get_carriers(inner, data_type, ONE_SHOT_MAX_CARRIERS)
        .await
        .map_err(|e| BisvError::context("failed to get carriers", e))?;

    request_live_scan_mode(inner)
        .await
        .map_err(|e| BisvError::context("failed to request live scan mode (reset)", e))?;

    Ok(carriers)
}

/// Carrier batch listener of the continuous scan loop.
pub type ScanCallback = Box<dyn FnMut(Vec<DetectedCarrier>) + Send>;

/// Terminal error listener of the continuous scan loop.
pub type ScanErrorCallback = Box<dyn FnOnce(BisvError) + Send>;

/// Options of the continuous scan loop.
pub struct ScanOptions {
    pub data_type: CarrierDataType,
    pub max_carriers_per_request: u16,
    pub request_interval: Duration,
    pub on_scan: ScanCallback,
    pub on_error: ScanErrorCallback,
}

impl ScanOptions {
    /// Options with the default request cap and interval.
    pub fn new(data_type: CarrierDataType, on_scan: ScanCallback, on_error: ScanErrorCallback) -> Self {
        Self {
            data_type,
            max_carriers_per_request: 12,
            request_interval: Duration::from_millis(500),
            on_scan,
            on_error,
        }
    }
}

#[derive(Default)]
struct ScanShared {
    stopped: AtomicBool,
    errored: AtomicBool,
}

/// Stop handle of a continuous scan loop.
pub struct ScanHandle {
    shared: Arc<ScanShared>,
}

impl std::fmt::Debug for ScanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanHandle").finish_non_exhaustive()
    }
}

impl ScanHandle {
    /// Stop the loop. The loop finishes any in-flight device call,
    /// restores live scan mode and releases the scan slot.
    pub fn stop(&self) -> BisvResult<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(BisvError::InvalidState("scan already stopped".to_string()));
        }
        if self.shared.errored.load(Ordering::SeqCst) {
            return Err(BisvError::InvalidState("scan already errored".to_string()));
        }

        self.shared.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Start the continuous cumulated scan loop.
pub(crate) fn scan_carriers_cumulated(
    inner: &Arc<SessionInner>,
    options: ScanOptions,
) -> BisvResult<ScanHandle> {
    inner.device()?;
    let slot = inner.scan_slot.acquire()?;

    let shared = Arc::new(ScanShared::default());
    let handle = ScanHandle {
        shared: shared.clone(),
    };

    let inner = inner.clone();
    tokio::spawn(async move {
        let ScanOptions {
            data_type,
            max_carriers_per_request,
            request_interval,
            mut on_scan,
            on_error,
        } = options;

        let error = run_scan(
            &inner,
            data_type,
            max_carriers_per_request,
            request_interval,
            &mut on_scan,
            &shared,
        )
        .await
        .err();

        drop(slot);

        if let Some(error) = error {
            if !shared.stopped.load(Ordering::SeqCst) {
                shared.errored.store(true, Ordering::SeqCst);
                listener::deliver("scan error", move || on_error(error));
            }
        }
    });

    Ok(handle)
}

async fn run_scan(
    inner: &Arc<SessionInner>,
    data_type: CarrierDataType,
    max_carriers_per_request: u16,
    request_interval: Duration,
    on_scan: &mut ScanCallback,
    shared: &ScanShared,
) -> BisvResult<()> {
    request_cumulated_mode_and_flush(inner)
        .await
        .map_err(|e| BisvError::context("failed to request cumulated mode and flush", e))?;

    let mut error: Option<BisvError> = None;

    while !shared.stopped.load(Ordering::SeqCst) && error.is_none() {
        tokio::time::sleep(request_interval).await;

        if shared.stopped.load(Ordering::SeqCst) {
            continue;
        }

        match detect_or_get_carriers(inner, data_type, max_carriers_per_request).await {
            Err(e) => {
                error = Some(BisvError::context("failed to get carriers", e));
            }
            Ok(carriers) => {
                if shared.stopped.load(Ordering::SeqCst) {
                    continue;
                }
                listener::deliver("scan", || on_scan(carriers));
            }
        }
    }

    if let Err(e) = request_live_scan_mode(inner).await {
        let restore_error = BisvError::context("failed to request live scan mode (reset)", e);
        match &error {
            // a primary error is already recorded; do not mask it with
            // the cleanup failure
            Some(_) => log::error!("{restore_error}"),
            None => error = Some(restore_error),
        }
    }

    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
