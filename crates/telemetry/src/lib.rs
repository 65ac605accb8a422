//! Surplus power estimation from inverter, meter and battery telemetry.

use async_trait::async_trait;
use thiserror::Error;

use modbus_client::ClientError;
use sunspec_parser::{BatteryInfo, CommonInfo, DecodeError};

pub mod balance;
pub mod solaredge;

pub use balance::exportable_power;
pub use solaredge::SolarEdgeSource;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("transport error: {0}")]
    Transport(#[from] ClientError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Which meter and battery instances to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// 0-based meter instance, up to 2.
    pub meter_index: u8,
    /// 0-based battery instance, up to 1.
    pub battery_index: u8,
}

/// Device identities read once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub inverter: CommonInfo,
    pub meter: CommonInfo,
    pub battery: Option<BatteryInfo>,
}

/// A source of the current exportable power figure.
#[async_trait]
pub trait PowerSource: Send {
    async fn open(&mut self) -> Result<(), TelemetryError>;

    async fn close(&mut self) -> Result<(), TelemetryError>;

    /// Reads device identities and detects optional equipment.
    async fn init(&mut self) -> Result<Inventory, TelemetryError>;

    /// Watts available for export; negative while importing.
    async fn current_export_power(&mut self) -> Result<f64, TelemetryError>;
}
