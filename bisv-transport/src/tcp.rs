//! TCP client for the read head
//!
//! One [`TcpDevice`] owns one TCP connection. The device answers
//! strictly one telegram per request, so the whole exchange runs behind
//! a single async mutex: concurrent callers are serialized and never
//! interleave telegrams on the wire.

use crate::commands::{
    self, AsyncOperationParams, CarrierDetection, Commands, ConfigRead, DetectCarriersRequest,
    PinRead, command_code,
};
use crate::telegram::Telegram;
use async_trait::async_trait;
use bisv_core::{BisvError, BisvResult, IoLinkMasterConfig, StatusCode};
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

fn not_connected() -> BisvError {
    BisvError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "tcp stream not connected",
    ))
}

/// TCP transport settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings with the default request timeout
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Create TCP settings with an explicit timeout
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            timeout: Some(timeout),
        }
    }
}

/// TCP-connected read head
pub struct TcpDevice {
    stream: Mutex<Option<TcpStream>>,
    settings: TcpSettings,
}

impl TcpDevice {
    /// Connect to a read head.
    pub async fn connect(settings: TcpSettings) -> BisvResult<Self> {
        let stream = if let Some(timeout) = settings.timeout {
            tokio::time::timeout(timeout, TcpStream::connect(settings.address))
                .await
                .map_err(|_| BisvError::Timeout)?
                .map_err(BisvError::Connection)?
        } else {
            TcpStream::connect(settings.address)
                .await
                .map_err(BisvError::Connection)?
        };

        log::debug!("connected to read head at {}", settings.address);

        Ok(Self {
            stream: Mutex::new(Some(stream)),
            settings,
        })
    }

    /// Perform one request/response exchange.
    ///
    /// The broken stream is dropped on any transport failure so later
    /// calls fail fast with a not-connected error.
    async fn exchange(&self, command: u8, payload: Vec<u8>) -> BisvResult<(StatusCode, Vec<u8>)> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(not_connected)?;

        let result = Self::exchange_on(stream, command, payload, self.settings.timeout).await;
        if matches!(&result, Err(e) if e.is_transport()) {
            *guard = None;
        }
        result
    }

    async fn exchange_on(
        stream: &mut TcpStream,
        command: u8,
        payload: Vec<u8>,
        timeout: Option<Duration>,
    ) -> BisvResult<(StatusCode, Vec<u8>)> {
        let request = Telegram::new(command, payload).encode();

        let io = async {
            stream
                .write_all(&request)
                .await
                .map_err(BisvError::Connection)?;
            stream.flush().await.map_err(BisvError::Connection)?;
            Telegram::read_from(stream).await
        };

        let response = if let Some(timeout) = timeout {
            tokio::time::timeout(timeout, io)
                .await
                .map_err(|_| BisvError::Timeout)??
        } else {
            io.await?
        };

        if response.header().command() != command {
            return Err(BisvError::Telegram(format!(
                "response command mismatch: sent 0x{:02X}, got 0x{:02X}",
                command,
                response.header().command()
            )));
        }

        let payload = response.payload();
        let status_byte = *payload
            .first()
            .ok_or_else(|| BisvError::Telegram("response payload missing status byte".to_string()))?;

        Ok((StatusCode::from_byte(status_byte), payload[1..].to_vec()))
    }
}

#[async_trait]
impl Commands for TcpDevice {
    async fn read_io_link_master_config(&self) -> BisvResult<ConfigRead> {
        let (status, body) = self
            .exchange(command_code::READ_IO_LINK_MASTER_CONFIG, Vec::new())
            .await?;

        let config = if status.is_ok() {
            Some(commands::decode_master_config(&body)?)
        } else {
            None
        };

        Ok(ConfigRead { status, config })
    }

    async fn write_io_link_master_config(
        &self,
        config: &IoLinkMasterConfig,
    ) -> BisvResult<StatusCode> {
        let payload = commands::encode_master_config(config);
        let (status, _) = self
            .exchange(command_code::WRITE_IO_LINK_MASTER_CONFIG, payload)
            .await?;
        Ok(status)
    }

    async fn write_io_link_cyclic_process_data(
        &self,
        offset: u16,
        data: &[u8],
    ) -> BisvResult<StatusCode> {
        let mut payload = BytesMut::with_capacity(2 + data.len());
        payload.put_u16(offset);
        payload.put_slice(data);

        let (status, _) = self
            .exchange(
                command_code::WRITE_IO_LINK_CYCLIC_PROCESS_DATA,
                payload.to_vec(),
            )
            .await?;
        Ok(status)
    }

    async fn read_digital_input_pin(&self, pin_number: u8) -> BisvResult<PinRead> {
        let (status, body) = self
            .exchange(command_code::READ_DIGITAL_INPUT_PIN, vec![pin_number])
            .await?;

        let value = status.is_ok() && body.first().copied().unwrap_or(0) != 0;
        Ok(PinRead { status, value })
    }

    async fn change_async_operation_parameter(
        &self,
        params: &AsyncOperationParams,
    ) -> BisvResult<StatusCode> {
        let payload = commands::encode_async_operation_params(params);
        let (status, _) = self
            .exchange(command_code::CHANGE_ASYNC_OPERATION_PARAMETER, payload)
            .await?;
        Ok(status)
    }

    async fn detect_data_carriers_extended(
        &self,
        request: &DetectCarriersRequest,
    ) -> BisvResult<CarrierDetection> {
        let payload = commands::encode_detect_request(request);
        let (status, body) = self
            .exchange(command_code::DETECT_DATA_CARRIERS_EXTENDED, payload)
            .await?;

        let carriers = if status.is_ok() {
            commands::decode_carriers(&body)?
        } else {
            Vec::new()
        };

        Ok(CarrierDetection { status, carriers })
    }

    async fn close(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            let _ = stream.shutdown().await;
        }
    }
}
