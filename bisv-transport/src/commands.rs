//! Typed command set of the read head
//!
//! The [`Commands`] trait is the boundary the session layer programs
//! against: one method per request/response telegram pair. Transport
//! failures surface as `Err`; the device's own verdict travels as a
//! [`StatusCode`] inside `Ok`, because a non-OK status is a protocol
//! outcome, not a transport failure.

use async_trait::async_trait;
use bisv_core::{
    BisvError, BisvResult, CarrierDataType, DetectedCarrier, IoLinkMasterConfig, PinMode,
    StatusCode,
};
use bytes::{Buf, BufMut, BytesMut};

/// Command bytes understood by the read head.
pub mod command_code {
    pub const READ_IO_LINK_MASTER_CONFIG: u8 = 0x10;
    pub const WRITE_IO_LINK_MASTER_CONFIG: u8 = 0x11;
    pub const WRITE_IO_LINK_CYCLIC_PROCESS_DATA: u8 = 0x12;
    pub const READ_DIGITAL_INPUT_PIN: u8 = 0x20;
    pub const CHANGE_ASYNC_OPERATION_PARAMETER: u8 = 0x30;
    pub const DETECT_DATA_CARRIERS_EXTENDED: u8 = 0x31;
}

/// Parameters of the asynchronous scan-mode command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncOperationParams {
    pub antenna_number: u8,
    pub asynchronous: bool,
    pub comes_message: bool,
    pub goes_message: bool,
    pub cumulate: bool,
}

impl AsyncOperationParams {
    /// Live (synchronous) scan mode, the device default.
    pub fn live(antenna_number: u8) -> Self {
        Self {
            antenna_number,
            asynchronous: false,
            comes_message: false,
            goes_message: false,
            cumulate: false,
        }
    }

    /// Cumulated mode: the device collects detections into a list.
    pub fn cumulated(antenna_number: u8) -> Self {
        Self {
            antenna_number,
            asynchronous: true,
            comes_message: false,
            goes_message: false,
            cumulate: true,
        }
    }
}

/// Parameters of a carrier detection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectCarriersRequest {
    pub antenna_number: u8,
    pub data_type: CarrierDataType,
    pub max_number_carriers: u16,
    pub only_selected: bool,
}

/// Response of a configuration read.
#[derive(Debug, Clone)]
pub struct ConfigRead {
    pub status: StatusCode,
    /// Present when `status` is OK.
    pub config: Option<IoLinkMasterConfig>,
}

/// Response of a digital input read.
#[derive(Debug, Clone, Copy)]
pub struct PinRead {
    pub status: StatusCode,
    pub value: bool,
}

/// Response of a carrier detection request.
#[derive(Debug, Clone)]
pub struct CarrierDetection {
    pub status: StatusCode,
    pub carriers: Vec<DetectedCarrier>,
}

/// Request/response operations of a connected read head.
///
/// Implemented by [`TcpDevice`](crate::TcpDevice) for real hardware and
/// by mocks in tests. All methods take `&self`: implementations are
/// expected to serialize telegram exchanges internally.
#[async_trait]
pub trait Commands: Send + Sync {
    /// Read the current IO-Link master configuration record.
    async fn read_io_link_master_config(&self) -> BisvResult<ConfigRead>;

    /// Write the IO-Link master configuration record.
    ///
    /// Writing triggers a reconfiguration cycle on the device even when
    /// the record is unchanged, so callers should avoid redundant writes.
    async fn write_io_link_master_config(
        &self,
        config: &IoLinkMasterConfig,
    ) -> BisvResult<StatusCode>;

    /// Write cyclic process data to the IO-Link output area.
    async fn write_io_link_cyclic_process_data(
        &self,
        offset: u16,
        data: &[u8],
    ) -> BisvResult<StatusCode>;

    /// Read the current value of a digital input pin.
    async fn read_digital_input_pin(&self, pin_number: u8) -> BisvResult<PinRead>;

    /// Switch between live and asynchronous/cumulated scan operation.
    async fn change_async_operation_parameter(
        &self,
        params: &AsyncOperationParams,
    ) -> BisvResult<StatusCode>;

    /// Detect data carriers in range (live mode) or fetch the cumulated
    /// list (asynchronous mode).
    async fn detect_data_carriers_extended(
        &self,
        request: &DetectCarriersRequest,
    ) -> BisvResult<CarrierDetection>;

    /// Close the underlying connection. Idempotent.
    async fn close(&self);
}

/// Encoded length of an [`IoLinkMasterConfig`] record.
pub(crate) const MASTER_CONFIG_LENGTH: usize = 32;

pub(crate) fn encode_master_config(config: &IoLinkMasterConfig) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MASTER_CONFIG_LENGTH);
    buf.put_u8(config.cycle_time_base);
    buf.put_u8(config.cycle_time);
    buf.put_u8(config.safe_state);
    buf.put_u8(config.validation_mode);
    buf.put_u16(config.vendor_id);
    buf.put_u32(config.device_id);
    buf.put_u8(config.output_length);
    buf.put_u8(config.input_length);
    buf.put_u8(config.pin2_mode.to_byte());
    buf.put_u8(config.pin4_mode.to_byte());
    buf.put_u8(config.parameter_server_mode);
    let mut flags = 0u8;
    if config.parameter_upload_enabled {
        flags |= 0x01;
    }
    if config.parameter_download_enabled {
        flags |= 0x02;
    }
    buf.put_u8(flags);

    let mut serial = [b'0'; 16];
    for (slot, byte) in serial.iter_mut().zip(config.serial_number.bytes()) {
        *slot = byte;
    }
    buf.put_slice(&serial);

    buf.to_vec()
}

pub(crate) fn decode_master_config(mut data: &[u8]) -> BisvResult<IoLinkMasterConfig> {
    if data.len() < MASTER_CONFIG_LENGTH {
        return Err(BisvError::Telegram(format!(
            "io link master config too short: expected {} bytes, got {}",
            MASTER_CONFIG_LENGTH,
            data.len()
        )));
    }

    let cycle_time_base = data.get_u8();
    let cycle_time = data.get_u8();
    let safe_state = data.get_u8();
    let validation_mode = data.get_u8();
    let vendor_id = data.get_u16();
    let device_id = data.get_u32();
    let output_length = data.get_u8();
    let input_length = data.get_u8();

    let pin2_byte = data.get_u8();
    let pin2_mode = PinMode::from_byte(pin2_byte)
        .ok_or_else(|| BisvError::Telegram(format!("invalid pin 2 mode: {}", pin2_byte)))?;
    let pin4_byte = data.get_u8();
    let pin4_mode = PinMode::from_byte(pin4_byte)
        .ok_or_else(|| BisvError::Telegram(format!("invalid pin 4 mode: {}", pin4_byte)))?;

    let parameter_server_mode = data.get_u8();
    let flags = data.get_u8();

    let mut serial = [0u8; 16];
    data.copy_to_slice(&mut serial);
    let serial_number = String::from_utf8(serial.to_vec())
        .map_err(|_| BisvError::Telegram("serial number is not ASCII".to_string()))?;

    Ok(IoLinkMasterConfig {
        cycle_time_base,
        cycle_time,
        safe_state,
        validation_mode,
        vendor_id,
        device_id,
        output_length,
        input_length,
        pin2_mode,
        pin4_mode,
        parameter_server_mode,
        parameter_upload_enabled: flags & 0x01 != 0,
        parameter_download_enabled: flags & 0x02 != 0,
        serial_number,
    })
}

pub(crate) fn encode_async_operation_params(params: &AsyncOperationParams) -> Vec<u8> {
    let mut flags = 0u8;
    if params.asynchronous {
        flags |= 0x01;
    }
    if params.comes_message {
        flags |= 0x02;
    }
    if params.goes_message {
        flags |= 0x04;
    }
    if params.cumulate {
        flags |= 0x08;
    }
    vec![params.antenna_number, flags]
}

pub(crate) fn encode_detect_request(request: &DetectCarriersRequest) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(request.antenna_number);
    buf.put_u8(request.data_type.code());
    buf.put_u16(request.max_number_carriers);
    buf.put_u8(if request.only_selected { 1 } else { 0 });
    buf.to_vec()
}

pub(crate) fn decode_carriers(mut data: &[u8]) -> BisvResult<Vec<DetectedCarrier>> {
    if data.len() < 2 {
        return Err(BisvError::Telegram(
            "carrier list too short for count".to_string(),
        ));
    }

    let count = data.get_u16() as usize;
    let mut carriers = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(BisvError::Telegram(
                "carrier list truncated at carrier header".to_string(),
            ));
        }
        let code = data.get_u8();
        let data_type = CarrierDataType::from_code(code)
            .ok_or_else(|| BisvError::Telegram(format!("invalid carrier data type: {}", code)))?;
        let uid_length = data.get_u8() as usize;
        if data.len() < uid_length {
            return Err(BisvError::Telegram(
                "carrier list truncated at uid".to_string(),
            ));
        }
        let uid = data[..uid_length].to_vec();
        data.advance(uid_length);
        carriers.push(DetectedCarrier { data_type, uid });
    }

    Ok(carriers)
}
