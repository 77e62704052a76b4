//! Resource claim registry
//!
//! Claims express which parts of the device a caller is using: digital
//! input pins and the IO-Link port. The registry enforces the one
//! hardware conflict the device has (pin 4 carries either IO-Link or a
//! digital input, never both), and every claim change triggers a
//! configuration reconciliation so the device converges on what the
//! claim set requires.
//!
//! Claims are tracked by identity (a per-session id), not by value:
//! two claims for the same pin are distinct, and releasing one leaves
//! the other in place.

use crate::config;
use crate::poll::{self, PollHandle, PollOptions};
use crate::session::SessionInner;
use bisv_core::{BisvError, BisvResult, IoLinkPortConfig};
use std::sync::Arc;

/// The pin that doubles as the IO-Link communication line.
pub(crate) const IO_LINK_PIN: u8 = 4;

#[derive(Debug)]
pub(crate) struct DigitalInputClaim {
    pub(crate) id: u64,
    pub(crate) pin_number: u8,
}

#[derive(Debug)]
pub(crate) struct IoLinkClaim {
    pub(crate) id: u64,
    pub(crate) config: IoLinkPortConfig,
}

#[derive(Debug)]
pub(crate) struct ClaimState {
    next_claim_id: u64,
    pub(crate) digital_inputs: Vec<DigitalInputClaim>,
    pub(crate) io_link: Option<IoLinkClaim>,
}

impl ClaimState {
    pub(crate) fn new() -> Self {
        Self {
            next_claim_id: 0,
            digital_inputs: Vec::new(),
            io_link: None,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_claim_id;
        self.next_claim_id += 1;
        id
    }

    pub(crate) fn wants_pin4_as_digital_input(&self) -> bool {
        self.digital_inputs
            .iter()
            .any(|claim| claim.pin_number == IO_LINK_PIN)
    }
}

/// Claim a pin for digital input use.
pub(crate) fn claim_pin_as_digital_input(
    inner: &Arc<SessionInner>,
    pin_number: u8,
) -> BisvResult<DigitalInputPin> {
    if inner.is_closed() {
        return Err(BisvError::SessionClosed);
    }

    let id = {
        let mut claims = inner.claims.lock();
        if pin_number == IO_LINK_PIN && claims.io_link.is_some() {
            return Err(BisvError::InvalidState(
                "pin 4 already claimed for io-link".to_string(),
            ));
        }

        let id = claims.allocate_id();
        claims.digital_inputs.push(DigitalInputClaim { id, pin_number });
        id
    };

    config::trigger_reconcile(inner);

    Ok(DigitalInputPin {
        inner: inner.clone(),
        id,
        pin_number,
    })
}

/// Claim the IO-Link port.
pub(crate) fn claim_io_link(
    inner: &Arc<SessionInner>,
    port_config: IoLinkPortConfig,
) -> BisvResult<IoLinkPort> {
    if inner.is_closed() {
        return Err(BisvError::SessionClosed);
    }

    let (id, output_length) = {
        let mut claims = inner.claims.lock();
        if claims.wants_pin4_as_digital_input() {
            return Err(BisvError::InvalidState(
                "pin 4 already claimed as digital input".to_string(),
            ));
        }
        if claims.io_link.is_some() {
            return Err(BisvError::InvalidState(
                "io-link already claimed".to_string(),
            ));
        }

        let id = claims.allocate_id();
        let output_length = port_config.output_length;
        claims.io_link = Some(IoLinkClaim {
            id,
            config: port_config,
        });
        (id, output_length)
    };

    config::trigger_reconcile(inner);

    Ok(IoLinkPort {
        inner: inner.clone(),
        id,
        output_length,
    })
}

/// Ownership of one pin configured as digital input.
pub struct DigitalInputPin {
    inner: Arc<SessionInner>,
    id: u64,
    pin_number: u8,
}

impl std::fmt::Debug for DigitalInputPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalInputPin")
            .field("id", &self.id)
            .field("pin_number", &self.pin_number)
            .finish()
    }
}

impl DigitalInputPin {
    pub fn pin_number(&self) -> u8 {
        self.pin_number
    }

    /// Start a polling loop on this pin. See [`crate::poll`].
    pub fn poll(&self, options: PollOptions) -> PollHandle {
        poll::start(self.inner.clone(), self.pin_number, options)
    }

    /// Release the claim. The pin may be reconfigured by the device
    /// once the reconciler catches up.
    pub fn release(&self) -> BisvResult<()> {
        let removed = {
            let mut claims = self.inner.claims.lock();
            let before = claims.digital_inputs.len();
            claims.digital_inputs.retain(|claim| claim.id != self.id);
            claims.digital_inputs.len() != before
        };

        if !removed {
            return Err(BisvError::InvalidState(
                "digital input already released".to_string(),
            ));
        }

        config::trigger_reconcile(&self.inner);
        Ok(())
    }
}

/// Ownership of the IO-Link port.
pub struct IoLinkPort {
    inner: Arc<SessionInner>,
    id: u64,
    output_length: u8,
}

impl std::fmt::Debug for IoLinkPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoLinkPort")
            .field("id", &self.id)
            .field("output_length", &self.output_length)
            .finish()
    }
}

impl IoLinkPort {
    pub fn output_length(&self) -> u8 {
        self.output_length
    }

    /// Write cyclic process data to the port's output area.
    ///
    /// Waits for the configuration to converge first, so a write issued
    /// right after the claim cannot race the reconfiguration.
    pub async fn write_cyclic_process_data(&self, offset: u16, data: &[u8]) -> BisvResult<()> {
        {
            let claims = self.inner.claims.lock();
            if claims.io_link.as_ref().map(|claim| claim.id) != Some(self.id) {
                return Err(BisvError::InvalidState(
                    "io-link already released".to_string(),
                ));
            }
        }

        if data.len() != self.output_length as usize {
            return Err(BisvError::InvalidArgument(format!(
                "invalid data length: expected {} bytes, got {}",
                self.output_length,
                data.len()
            )));
        }

        config::reconcile(&self.inner)
            .await
            .map_err(|e| BisvError::context("configuration failed", e))?;

        let device = self.inner.device()?;
        let status = self
            .inner
            .fail_on_transport_error(device.write_io_link_cyclic_process_data(offset, data).await)
            .await?;

        if !status.is_ok() {
            return Err(BisvError::context(
                "write io-link process data failed",
                BisvError::from_status(status),
            ));
        }

        Ok(())
    }

    /// Release the claim.
    pub fn release(&self) -> BisvResult<()> {
        let removed = {
            let mut claims = self.inner.claims.lock();
            match &claims.io_link {
                Some(claim) if claim.id == self.id => {
                    claims.io_link = None;
                    true
                }
                _ => false,
            }
        };

        if !removed {
            return Err(BisvError::InvalidState(
                "io-link already released".to_string(),
            ));
        }

        config::trigger_reconcile(&self.inner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_util::{
        MockDevice, attach, port_config, settle, unclaimed_device_config,
    };
    use bisv_core::{BisvError, StatusCode};
    use bisv_transport::ConfigRead;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A device that accepts every configuration transaction.
    fn benign_mock() -> MockDevice {
        let mut mock = MockDevice::new();
        mock.expect_read_io_link_master_config().returning(|| {
            Ok(ConfigRead {
                status: StatusCode::Ok,
                config: Some(unclaimed_device_config()),
            })
        });
        mock.expect_write_io_link_master_config()
            .returning(|_| Ok(StatusCode::Ok));
        mock.expect_close().returning(|| ());
        mock
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin4_and_io_link_are_mutually_exclusive() {
        let session = attach(benign_mock());

        let io_link = session.claim_io_link(port_config(4)).unwrap();
        let err = session.claim_pin_as_digital_input(4).unwrap_err();
        assert!(matches!(err, BisvError::InvalidState(_)));
        assert!(err.to_string().contains("pin 4"));

        // other pins are unaffected
        let pin2 = session.claim_pin_as_digital_input(2).unwrap();

        io_link.release().unwrap();
        let pin4 = session.claim_pin_as_digital_input(4).unwrap();

        // and the other direction
        let err = session.claim_io_link(port_config(4)).unwrap_err();
        assert!(err.to_string().contains("digital input"));

        pin4.release().unwrap();
        pin2.release().unwrap();
        session.claim_io_link(port_config(4)).unwrap();

        settle().await;
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_link_cannot_be_claimed_twice() {
        let session = attach(benign_mock());

        let _io_link = session.claim_io_link(port_config(4)).unwrap();
        let err = session.claim_io_link(port_config(4)).unwrap_err();
        assert!(err.to_string().contains("already claimed"));

        settle().await;
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_removes_only_its_own_claim() {
        let session = attach(benign_mock());

        // two claims with identical attributes stay distinguishable
        let first = session.claim_pin_as_digital_input(2).unwrap();
        let second = session.claim_pin_as_digital_input(2).unwrap();

        first.release().unwrap();
        assert!(first.release().is_err());
        second.release().unwrap();

        settle().await;
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_cyclic_process_data_rejects_wrong_length() {
        let writes = Arc::new(AtomicUsize::new(0));
        let write_counter = writes.clone();

        let mut mock = benign_mock();
        mock.expect_write_io_link_cyclic_process_data()
            .returning(move |_, _| {
                write_counter.fetch_add(1, Ordering::SeqCst);
                Ok(StatusCode::Ok)
            });

        let session = attach(mock);
        let port = session.claim_io_link(port_config(4)).unwrap();

        let err = port.write_cyclic_process_data(0, &[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, BisvError::InvalidArgument(_)));
        assert_eq!(writes.load(Ordering::SeqCst), 0);

        port.write_cyclic_process_data(0, &[1, 2, 3, 4]).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_after_release_is_rejected() {
        let session = attach(benign_mock());

        let port = session.claim_io_link(port_config(2)).unwrap();
        port.release().unwrap();

        let err = port.write_cyclic_process_data(0, &[0, 0]).await.unwrap_err();
        assert!(err.to_string().contains("released"));

        settle().await;
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_on_closed_session_fail_gracefully() {
        let mut mock = MockDevice::new();
        mock.expect_close().returning(|| ());

        let session = attach(mock);
        session.close().await;

        assert!(matches!(
            session.claim_pin_as_digital_input(2),
            Err(BisvError::SessionClosed)
        ));
        assert!(matches!(
            session.claim_io_link(port_config(4)),
            Err(BisvError::SessionClosed)
        ));
    }
}
