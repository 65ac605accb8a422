//! Appliance directory and remote start control.

use async_trait::async_trait;
use thiserror::Error;

pub mod miele;

pub use miele::{parse_device_list, parse_device_state, MieleClient, MieleConfig};

/// Appliance classes by their raw Miele type code.
pub mod device_type {
    pub const WASHING_MACHINE: u16 = 1;
    pub const TUMBLE_DRYER: u16 = 2;
    pub const DISHWASHER: u16 = 7;
    pub const WASHER_DRYER: u16 = 24;

    /// Classes that run a program once started and can be deferred.
    pub fn is_deferrable(device_type: u16) -> bool {
        matches!(
            device_type,
            WASHING_MACHINE | TUMBLE_DRYER | DISHWASHER | WASHER_DRYER
        )
    }
}

/// Raw Miele status codes.
pub mod device_status {
    pub const OFF: u16 = 1;
    pub const ON: u16 = 2;
    pub const PROGRAMMED: u16 = 3;
    pub const PROGRAMMED_WAITING_TO_START: u16 = 4;
    pub const RUNNING: u16 = 5;
    pub const PAUSE: u16 = 6;
    pub const END_PROGRAMMED: u16 = 7;
    pub const FAILURE: u16 = 8;
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected response {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub status: u16,
    pub full_remote_control: bool,
}

impl DeviceState {
    /// Programmed, waiting for a start signal, and accepting one remotely.
    pub fn is_waiting_for_remote_start(&self) -> bool {
        self.status == device_status::PROGRAMMED_WAITING_TO_START && self.full_remote_control
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Fabrication number.
    pub id: String,
    pub name: String,
    pub device_type: u16,
    pub state: DeviceState,
}

impl DeviceRecord {
    pub fn is_dispatch_candidate(&self) -> bool {
        device_type::is_deferrable(self.device_type) && self.state.is_waiting_for_remote_start()
    }
}

#[async_trait]
pub trait ApplianceControl: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ControlError>;

    async fn get_device_state(&self, id: &str) -> Result<DeviceState, ControlError>;

    async fn start_device(&self, id: &str) -> Result<(), ControlError>;
}
