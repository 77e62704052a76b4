//! Configuration reconciler
//!
//! The device holds one IO-Link master configuration record, and the
//! session derives the record it needs from the current claim set. The
//! reconciler makes the device converge on the derived record while
//! writing as rarely as possible: a config write triggers a device-side
//! reconfiguration cycle, so redundant writes are not just wasteful but
//! disruptive.
//!
//! All reconcile attempts run through the session's serial task queue.
//! A burst of claim/release calls therefore produces a burst of queued
//! attempts, of which the first does the actual work after a debounce
//! window and the rest find the configuration already correct.

use crate::claims::ClaimState;
use crate::session::SessionInner;
use bisv_core::{BisvError, BisvResult, IoLinkMasterConfig, IoLinkPortConfig, PinMode, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Wait before touching the device so rapid claim churn collapses into
/// a single transaction.
pub(crate) const RECONFIGURE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Compute the configuration the current claim set requires.
pub(crate) fn derive_required_config(claims: &ClaimState) -> IoLinkMasterConfig {
    // inputs are always configured normally open for now
    let pin2_mode = PinMode::NormallyOpen;

    let mut pin4_mode = if claims.io_link.is_some() {
        PinMode::IoLink
    } else {
        PinMode::NormallyOpen
    };
    if claims.wants_pin4_as_digital_input() {
        pin4_mode = PinMode::NormallyOpen;
    }

    let port = claims
        .io_link
        .as_ref()
        .map(|claim| claim.config.clone())
        .unwrap_or_else(IoLinkPortConfig::unclaimed);

    IoLinkMasterConfig::from_port_config(&port, pin2_mode, pin4_mode)
}

/// Reconcile the device configuration with the claim set and wait for
/// the outcome.
pub(crate) async fn reconcile(inner: &Arc<SessionInner>) -> BisvResult<()> {
    let task_inner = inner.clone();
    inner
        .config_queue
        .submit(async move { run_reconcile(task_inner).await })
        .await?
}

/// Fire-and-forget reconcile used by claim and release calls.
///
/// Failures are logged and ignored at this call site only: a claim must
/// not fail because the device momentarily refuses a config
/// transaction. Operations that depend on the configuration being
/// correct await [`reconcile`] themselves and see the error.
pub(crate) fn trigger_reconcile(inner: &Arc<SessionInner>) {
    let inner = inner.clone();
    tokio::spawn(async move {
        if let Err(error) = reconcile(&inner).await {
            if inner.is_closed() {
                return;
            }
            log::error!("configuration update failed: {error}");
        }
    });
}

fn access_denied_error() -> BisvError {
    BisvError::context(
        "device answers ACCESS_DENIED on configuration writes, closing session",
        BisvError::from_status(StatusCode::AccessDenied),
    )
}

async fn run_reconcile(inner: Arc<SessionInner>) -> BisvResult<()> {
    if inner.is_closed() {
        return Ok(());
    }

    let mut required = derive_required_config(&inner.claims.lock());
    if inner.active_config.lock().as_ref() == Some(&required) {
        return Ok(());
    }

    tokio::time::sleep(RECONFIGURE_DEBOUNCE).await;

    if inner.is_closed() {
        return Ok(());
    }

    // a write always reconfigures the device, even with unchanged
    // contents, so read first and write only on an actual difference
    let device = match inner.device() {
        Ok(device) => device,
        Err(_) => return Ok(()),
    };

    let read = inner
        .fail_on_transport_error(device.read_io_link_master_config().await)
        .await
        .map_err(|e| BisvError::context("failed to read io-link master config", e))?;
    if !read.status.is_ok() {
        return Err(BisvError::context(
            "failed to read io-link master config",
            BisvError::from_status(read.status),
        ));
    }
    let Some(device_config) = read.config else {
        return Err(BisvError::context(
            "failed to read io-link master config",
            BisvError::Telegram("config record missing from response".to_string()),
        ));
    };

    *inner.active_config.lock() = Some(device_config);

    // the claim set may have changed while the read was in flight
    required = derive_required_config(&inner.claims.lock());
    if inner.active_config.lock().as_ref() == Some(&required) {
        log::debug!("active configuration already correct");
        return Ok(());
    }

    log::info!("active configuration differs, writing new configuration");

    let status = inner
        .fail_on_transport_error(device.write_io_link_master_config(&required).await)
        .await
        .map_err(|e| BisvError::context("failed to write io-link master config", e))?;

    if inner.is_closed() {
        return Ok(());
    }

    if status == StatusCode::AccessDenied {
        // some firmware revisions get stuck answering ACCESS_DENIED to
        // every config write; the only known recovery is reconnecting
        let _ = inner.fail(access_denied_error()).await;
        return Err(access_denied_error());
    } else if !status.is_ok() {
        return Err(BisvError::context(
            "failed to write io-link master config",
            BisvError::from_status(status),
        ));
    }

    *inner.active_config.lock() = Some(required);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bisv_core::DEFAULT_SERIAL_NUMBER;

    fn claims_with_pins(pins: &[u8]) -> ClaimState {
        let mut claims = ClaimState::new();
        for &pin_number in pins {
            claims.digital_inputs.push(crate::claims::DigitalInputClaim {
                id: pin_number as u64,
                pin_number,
            });
        }
        claims
    }

    #[test]
    fn test_no_claims_derives_all_defaults() {
        let required = derive_required_config(&ClaimState::new());
        assert_eq!(required.pin2_mode, PinMode::NormallyOpen);
        assert_eq!(required.pin4_mode, PinMode::NormallyOpen);
        assert_eq!(required.vendor_id, 0);
        assert_eq!(required.output_length, 0);
        assert_eq!(required.serial_number, DEFAULT_SERIAL_NUMBER);
    }

    #[test]
    fn test_io_link_claim_switches_pin4() {
        let mut claims = ClaimState::new();
        claims.io_link = Some(crate::claims::IoLinkClaim {
            id: 0,
            config: IoLinkPortConfig {
                cycle_time_base: 1,
                cycle_time: 20,
                safe_state: 0,
                validation_mode: 0,
                vendor_id: 888,
                device_id: 7,
                output_length: 4,
                input_length: 2,
            },
        });

        let required = derive_required_config(&claims);
        assert_eq!(required.pin4_mode, PinMode::IoLink);
        assert_eq!(required.vendor_id, 888);
        assert_eq!(required.output_length, 4);
        // serial number is never taken from the claim
        assert_eq!(required.serial_number, DEFAULT_SERIAL_NUMBER);
    }

    #[test]
    fn test_pin4_digital_input_overrides_pin_mode() {
        let claims = claims_with_pins(&[2, 4]);
        let required = derive_required_config(&claims);
        assert_eq!(required.pin4_mode, PinMode::NormallyOpen);
    }

    #[test]
    fn test_non_pin4_claims_do_not_affect_config() {
        let required = derive_required_config(&claims_with_pins(&[1, 2]));
        assert_eq!(required, derive_required_config(&ClaimState::new()));
    }

    mod reconciler {
        use crate::test_util::{
            MockDevice, attach, settle, stale_device_config, unclaimed_device_config,
        };
        use bisv_core::{PinMode, StatusCode};
        use bisv_transport::ConfigRead;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        fn counting_mock(
            reported: bisv_core::IoLinkMasterConfig,
        ) -> (MockDevice, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let writes = Arc::new(AtomicUsize::new(0));

            let mut mock = MockDevice::new();
            let read_counter = reads.clone();
            mock.expect_read_io_link_master_config().returning(move || {
                read_counter.fetch_add(1, Ordering::SeqCst);
                Ok(ConfigRead {
                    status: StatusCode::Ok,
                    config: Some(reported.clone()),
                })
            });
            let write_counter = writes.clone();
            mock.expect_write_io_link_master_config().returning(move |_| {
                write_counter.fetch_add(1, Ordering::SeqCst);
                Ok(StatusCode::Ok)
            });
            mock.expect_close().returning(|| ());

            (mock, reads, writes)
        }

        #[tokio::test(start_paused = true)]
        async fn test_no_write_when_device_already_matches() {
            let (mock, reads, writes) = counting_mock(unclaimed_device_config());
            let session = attach(mock);

            // non-pin-4 inputs do not change the required config, so
            // the first reconcile reads, confirms and stops there
            let _pin2 = session.claim_pin_as_digital_input(2).unwrap();
            settle().await;
            assert_eq!(reads.load(Ordering::SeqCst), 1);
            assert_eq!(writes.load(Ordering::SeqCst), 0);

            // the confirmed config short-circuits later reconciles
            // without any device traffic at all
            let _pin3 = session.claim_pin_as_digital_input(3).unwrap();
            settle().await;
            assert_eq!(reads.load(Ordering::SeqCst), 1);
            assert_eq!(writes.load(Ordering::SeqCst), 0);

            session.close().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_claim_churn_coalesces_to_one_transaction() {
            // device still carries a stale io-link setup, so a write is
            // actually required
            let (mock, reads, writes) = counting_mock(stale_device_config());
            let session = attach(mock);

            let pin2 = session.claim_pin_as_digital_input(2).unwrap();
            pin2.release().unwrap();
            let _pin3 = session.claim_pin_as_digital_input(3).unwrap();

            settle().await;
            assert_eq!(reads.load(Ordering::SeqCst), 1);
            assert_eq!(writes.load(Ordering::SeqCst), 1);

            session.close().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_written_config_reflects_final_claim_state() {
            let written = Arc::new(parking_lot::Mutex::new(Vec::new()));

            let mut mock = MockDevice::new();
            mock.expect_read_io_link_master_config().returning(|| {
                Ok(ConfigRead {
                    status: StatusCode::Ok,
                    config: Some(stale_device_config()),
                })
            });
            let written_sink = written.clone();
            mock.expect_write_io_link_master_config().returning(move |config| {
                written_sink.lock().push(config.clone());
                Ok(StatusCode::Ok)
            });
            mock.expect_close().returning(|| ());

            let session = attach(mock);
            let pin4 = session.claim_pin_as_digital_input(4).unwrap();
            settle().await;

            let configs = written.lock().clone();
            assert_eq!(configs.len(), 1);
            assert_eq!(configs[0].pin4_mode, PinMode::NormallyOpen);
            assert_eq!(configs[0].vendor_id, 0);

            drop(pin4);
            session.close().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_read_leaves_confirmed_state_untouched() {
            let reads = Arc::new(AtomicUsize::new(0));

            let mut mock = MockDevice::new();
            let read_counter = reads.clone();
            mock.expect_read_io_link_master_config().returning(move || {
                read_counter.fetch_add(1, Ordering::SeqCst);
                Ok(ConfigRead {
                    status: StatusCode::DeviceBusy,
                    config: None,
                })
            });
            mock.expect_close().returning(|| ());

            let session = attach(mock);
            let _pin2 = session.claim_pin_as_digital_input(2).unwrap();
            settle().await;
            assert_eq!(reads.load(Ordering::SeqCst), 1);

            // nothing was confirmed, so the next trigger reads again
            let _pin3 = session.claim_pin_as_digital_input(3).unwrap();
            settle().await;
            assert_eq!(reads.load(Ordering::SeqCst), 2);

            session.close().await;
        }
    }
}
