use std::cmp::min;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::tcp;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Slave, SlaveContext};
use tracing::{debug, info, warn};

/// Configuration options for connecting and polling a Modbus TCP device.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// IP literal or DNS name of the device.
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Maximum number of registers to read in a single request; devices with quirks may require lower batch sizes.
    pub max_batch_size: Option<u16>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of retries per request after the initial attempt.
    pub retry_count: usize,
    /// Base delay between retries in milliseconds (exponential backoff).
    pub retry_backoff_ms: u64,
    /// Upper bound for retry backoff delay in milliseconds.
    pub retry_max_backoff_ms: u64,
    /// Optional delay between split reads to placate slower devices.
    pub inter_read_delay_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            max_batch_size: None,
            timeout_ms: 10_000,
            retry_count: 0,
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 2_000,
            inter_read_delay_ms: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid socket address {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("modbus transport error: {0}")]
    Modbus(std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("register address overflow")]
    AddressOverflow,
    #[error("transport is not connected")]
    NotConnected,
}

/// Register-oriented transport the telemetry decoder reads blocks from.
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    async fn open(&self) -> Result<(), ClientError>;

    async fn close(&self) -> Result<(), ClientError>;

    /// Reads `count` holding registers starting at `address` as big-endian bytes.
    async fn read_block(&self, address: u16, count: u16) -> Result<Vec<u8>, ClientError>;
}

#[derive(Debug)]
pub struct ModbusClient {
    config: ClientConfig,
    context: Mutex<Option<Context>>,
}

impl ModbusClient {
    /// Creates a client without connecting; call `open` before reading.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            context: Mutex::new(None),
        }
    }

    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::new(config);
        client.open().await?;
        Ok(client)
    }

    async fn resolve(&self) -> Result<Vec<SocketAddr>, ClientError> {
        let invalid = || ClientError::InvalidAddress(self.config.host.clone(), self.config.port);
        let addrs: Vec<SocketAddr> = lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|_| invalid())?
            .collect();
        if addrs.is_empty() {
            return Err(invalid());
        }
        Ok(addrs)
    }

    pub async fn read_range(&self, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(ClientError::NotConnected)?;
        let batch_size = self
            .config
            .max_batch_size
            .unwrap_or(count)
            .max(1u16);
        let mut remaining = count;
        let mut offset = 0u16;
        let mut out = Vec::with_capacity(count as usize);

        while remaining > 0 {
            let chunk = min(remaining, batch_size);
            let chunk_start = u16::try_from(u32::from(start) + u32::from(offset))
                .map_err(|_| ClientError::AddressOverflow)?;
            let values = self.read_chunk(ctx, chunk_start, chunk).await?;
            out.extend(values);
            remaining -= chunk;
            offset += chunk;

            if remaining > 0 {
                if let Some(delay_ms) = self.config.inter_read_delay_ms {
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        Ok(out)
    }

    async fn read_chunk(
        &self,
        ctx: &mut Context,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let unit_id = self.config.unit_id;
        ctx.set_slave(Slave(unit_id));
        let mut attempts = 0usize;

        loop {
            let request = ctx.read_holding_registers(start, count);
            let result = timeout(Duration::from_millis(self.config.timeout_ms), request).await;
            let last_error = match result {
                Ok(Ok(values)) => {
                    debug!(unit_id, start, count, "modbus read ok");
                    return Ok(values);
                }
                Ok(Err(err)) => {
                    warn!(unit_id, start, count, error = %err, "modbus read error");
                    ClientError::Modbus(err)
                }
                Err(_) => {
                    warn!(unit_id, start, count, "modbus read timeout");
                    ClientError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                }
            };

            if attempts >= self.config.retry_count {
                return Err(last_error);
            }

            let delay_ms = self.retry_delay_ms(attempts);
            attempts += 1;
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    fn retry_delay_ms(&self, attempt: usize) -> u64 {
        let base = self.config.retry_backoff_ms.max(1);
        let shift = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor);
        let max = self.config.retry_max_backoff_ms.max(base);
        min(delay, max)
    }
}

#[async_trait]
impl RegisterTransport for ModbusClient {
    /// Connects to the first resolved address that accepts.
    async fn open(&self) -> Result<(), ClientError> {
        let mut last_error = ClientError::NotConnected;
        for addr in self.resolve().await? {
            let connect = tcp::connect(addr);
            match timeout(Duration::from_millis(self.config.timeout_ms), connect).await {
                Ok(Ok(context)) => {
                    *self.context.lock().await = Some(context);
                    info!(host = %self.config.host, %addr, unit_id = self.config.unit_id, "modbus connected");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    debug!(%addr, error = %err, "modbus connect failed");
                    last_error = ClientError::Io(err);
                }
                Err(_) => {
                    debug!(%addr, "modbus connect timed out");
                    last_error = ClientError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    };
                }
            }
        }
        Err(last_error)
    }

    async fn close(&self) -> Result<(), ClientError> {
        let context = self.context.lock().await.take();
        match context {
            Some(mut ctx) => ctx.disconnect().await.map_err(ClientError::Io),
            None => Ok(()),
        }
    }

    async fn read_block(&self, address: u16, count: u16) -> Result<Vec<u8>, ClientError> {
        let registers = self.read_range(address, count).await?;
        Ok(registers.iter().flat_map(|word| word.to_be_bytes()).collect())
    }
}
