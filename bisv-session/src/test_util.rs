//! Test doubles and helpers shared by the session tests.

use crate::session::Session;
use bisv_core::{
    BisvError, BisvResult, IoLinkMasterConfig, IoLinkPortConfig, PinMode, StatusCode,
};
use bisv_transport::{
    AsyncOperationParams, CarrierDetection, Commands, ConfigRead, DetectCarriersRequest, PinRead,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

mockall::mock! {
    pub Device {}

    #[async_trait::async_trait]
    impl Commands for Device {
        async fn read_io_link_master_config(&self) -> BisvResult<ConfigRead>;
        async fn write_io_link_master_config(
            &self,
            config: &IoLinkMasterConfig,
        ) -> BisvResult<StatusCode>;
        async fn write_io_link_cyclic_process_data(
            &self,
            offset: u16,
            data: &[u8],
        ) -> BisvResult<StatusCode>;
        async fn read_digital_input_pin(&self, pin_number: u8) -> BisvResult<PinRead>;
        async fn change_async_operation_parameter(
            &self,
            params: &AsyncOperationParams,
        ) -> BisvResult<StatusCode>;
        async fn detect_data_carriers_extended(
            &self,
            request: &DetectCarriersRequest,
        ) -> BisvResult<CarrierDetection>;
        async fn close(&self);
    }
}

/// The config an unconfigured device reports: everything at defaults.
pub(crate) fn unclaimed_device_config() -> IoLinkMasterConfig {
    IoLinkMasterConfig::from_port_config(
        &IoLinkPortConfig::unclaimed(),
        PinMode::NormallyOpen,
        PinMode::NormallyOpen,
    )
}

/// A config left over from an earlier session: pin 4 still on IO-Link.
pub(crate) fn stale_device_config() -> IoLinkMasterConfig {
    let mut config = unclaimed_device_config();
    config.pin4_mode = PinMode::IoLink;
    config.vendor_id = 888;
    config.output_length = 4;
    config
}

pub(crate) fn port_config(output_length: u8) -> IoLinkPortConfig {
    IoLinkPortConfig {
        cycle_time_base: 1,
        cycle_time: 20,
        safe_state: 0,
        validation_mode: 0,
        vendor_id: 888,
        device_id: 7,
        output_length,
        input_length: 2,
    }
}

pub(crate) fn attach(mock: MockDevice) -> Session {
    Session::attach(Arc::new(mock), Box::new(|_| {}))
}

pub(crate) fn attach_with_error_capture(
    mock: MockDevice,
) -> (Session, Arc<Mutex<Vec<BisvError>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let session = Session::attach(
        Arc::new(mock),
        Box::new(move |error| sink.lock().push(error)),
    );
    (session, errors)
}

/// Fast-forward (paused) time far enough for queued reconciliations,
/// debounce windows included, to settle.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_secs(3)).await;
}

/// Poll `condition` until it holds, advancing (paused) time in small
/// steps. Panics when it never does.
pub(crate) async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held: {what}");
}
