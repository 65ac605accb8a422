//! Turns a surplus-power estimate into appliance start commands.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use appliance_client::{ApplianceControl, DeviceRecord};
use types::DispatchMode;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    /// Power assumed for every discovered appliance in automatic modes.
    pub auto_power: f64,
    /// Minimum time between two successful starts.
    pub start_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Manual,
            auto_power: 0.0,
            start_delay: Duration::from_secs(60),
        }
    }
}

/// An appliance the scheduler may start.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplianceDevice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Rated draw in watts.
    pub power: f64,
    #[serde(skip)]
    waiting: bool,
}

impl ApplianceDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, power: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            power,
            waiting: false,
        }
    }

    fn discovered(record: DeviceRecord, power: f64) -> Self {
        Self {
            id: record.id,
            name: record.name,
            power,
            waiting: true,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Values carried from one cycle to the next.
#[derive(Debug, Clone)]
pub struct DispatchState {
    pub mode: DispatchMode,
    pub next_start: Option<Instant>,
    pub inter_start_delay: Duration,
}

impl DispatchState {
    fn permits_start(&self, now: Instant) -> bool {
        self.next_start.map_or(true, |next| now >= next)
    }

    fn record_start(&mut self, now: Instant) {
        let candidate = now + self.inter_start_delay;
        self.next_start = Some(match self.next_start {
            Some(next) if next > candidate => next,
            _ => candidate,
        });
    }
}

pub struct Scheduler {
    devices: Vec<ApplianceDevice>,
    state: DispatchState,
    auto_power: f64,
}

impl Scheduler {
    pub fn new(config: DispatchConfig, devices: Vec<ApplianceDevice>) -> Self {
        // Automatic modes rebuild the list every cycle.
        let devices = if config.mode.is_automatic() {
            Vec::new()
        } else {
            devices
        };
        Self {
            devices,
            state: DispatchState {
                mode: config.mode,
                next_start: None,
                inter_start_delay: config.start_delay,
            },
            auto_power: config.auto_power,
        }
    }

    pub fn devices(&self) -> &[ApplianceDevice] {
        &self.devices
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn set_waiting(&mut self, index: usize, waiting: bool) {
        if let Some(device) = self.devices.get_mut(index) {
            device.waiting = waiting;
        }
    }

    /// Recomputes which appliances wait for a start. Returns whether any does.
    pub async fn refresh_waiting<C>(&mut self, control: &C) -> bool
    where
        C: ApplianceControl + ?Sized,
    {
        if self.state.mode.is_automatic() {
            self.refresh_discovered(control).await
        } else {
            self.refresh_configured(control).await
        }
    }

    async fn refresh_configured<C>(&mut self, control: &C) -> bool
    where
        C: ApplianceControl + ?Sized,
    {
        for index in 0..self.devices.len() {
            self.set_waiting(index, false);
            let id = self.devices[index].id.clone();
            match control.get_device_state(&id).await {
                Ok(state) => {
                    let waiting = state.is_waiting_for_remote_start();
                    debug!(
                        device = %id,
                        status = state.status,
                        remote = state.full_remote_control,
                        waiting,
                        "device state"
                    );
                    self.set_waiting(index, waiting);
                }
                Err(err) => {
                    warn!(device = %id, error = %err, "device state query failed");
                }
            }
        }

        self.devices.iter().any(ApplianceDevice::is_waiting)
    }

    async fn refresh_discovered<C>(&mut self, control: &C) -> bool
    where
        C: ApplianceControl + ?Sized,
    {
        self.devices.clear();
        let records = match control.list_devices().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "device listing failed");
                return false;
            }
        };

        let auto_power = self.auto_power;
        self.devices = records
            .into_iter()
            .filter(DeviceRecord::is_dispatch_candidate)
            .map(|record| ApplianceDevice::discovered(record, auto_power))
            .collect();
        debug!(count = self.devices.len(), "waiting devices discovered");

        !self.devices.is_empty()
    }

    /// Starts waiting appliances that fit into `available` watts.
    pub async fn dispatch<C>(&mut self, control: &C, available: f64) -> Vec<String>
    where
        C: ApplianceControl + ?Sized,
    {
        self.dispatch_at(control, available, Instant::now()).await
    }

    pub async fn dispatch_at<C>(&mut self, control: &C, available: f64, now: Instant) -> Vec<String>
    where
        C: ApplianceControl + ?Sized,
    {
        let mut available = available;
        let mut started = Vec::new();

        for index in 0..self.devices.len() {
            let device = &self.devices[index];
            if !device.waiting || device.power > available {
                continue;
            }
            if !self.state.permits_start(now) {
                debug!(device = %device.id, "start delayed by inter-start window");
                continue;
            }

            let id = device.id.clone();
            let power = device.power;
            info!(
                device = %id,
                name = %device.label(),
                power,
                available,
                mode = %self.state.mode,
                "starting device"
            );

            match control.start_device(&id).await {
                Ok(()) => {
                    if self.state.mode.deducts_budget() {
                        available -= power;
                    }
                    self.state.record_start(now);
                    self.set_waiting(index, false);
                    started.push(id);
                }
                Err(err) => {
                    warn!(device = %id, error = %err, "device start failed");
                }
            }
        }

        started
    }
}
