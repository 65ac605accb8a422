use async_trait::async_trait;
use tracing::{info, warn};

use modbus_client::RegisterTransport;
use sunspec_parser::{
    decode, BatteryInfo, BatterySample, InverterCommon, InverterSample, MeterCommon, MeterSample,
    Model,
};

use crate::{balance, Inventory, PowerSource, TelemetryConfig, TelemetryError};

/// Reads a SolarEdge inverter with its grid meter and optional battery.
pub struct SolarEdgeSource<T> {
    transport: T,
    config: TelemetryConfig,
    has_battery: bool,
}

impl<T: RegisterTransport> SolarEdgeSource<T> {
    pub fn new(transport: T, config: TelemetryConfig) -> Self {
        Self {
            transport,
            config,
            has_battery: false,
        }
    }

    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn read<M: Model>(&self, instance: u8) -> Result<M, TelemetryError> {
        let block = self
            .transport
            .read_block(M::address(instance), M::register_count())
            .await?;
        Ok(decode::<M>(&block)?)
    }
}

#[async_trait]
impl<T: RegisterTransport> PowerSource for SolarEdgeSource<T> {
    async fn open(&mut self) -> Result<(), TelemetryError> {
        Ok(self.transport.open().await?)
    }

    async fn close(&mut self) -> Result<(), TelemetryError> {
        Ok(self.transport.close().await?)
    }

    async fn init(&mut self) -> Result<Inventory, TelemetryError> {
        let inverter: InverterCommon = self.read(0).await?;
        if !inverter.has_sunspec_marker() {
            warn!(sunspec_id = inverter.sunspec_id, "inverter common block lacks SunSpec marker");
        }
        info!(
            manufacturer = %inverter.manufacturer,
            model = %inverter.model,
            serial = %inverter.serial_number,
            version = %inverter.version,
            "inverter"
        );

        let meter: MeterCommon = self.read(self.config.meter_index).await?;
        info!(
            index = self.config.meter_index,
            manufacturer = %meter.manufacturer,
            model = %meter.model,
            option = %meter.option,
            version = %meter.version,
            serial = %meter.serial_number,
            "meter"
        );

        let battery: BatteryInfo = self.read(self.config.battery_index).await?;
        self.has_battery = battery.is_present();
        let battery = if self.has_battery {
            info!(
                index = self.config.battery_index,
                manufacturer = %battery.manufacturer,
                model = %battery.model,
                version = %battery.firmware_version,
                serial = %battery.serial_number,
                rated_energy_wh = battery.rated_energy,
                max_charge_continuous_w = battery.max_charge_continuous_power,
                max_discharge_continuous_w = battery.max_discharge_continuous_power,
                max_charge_peak_w = battery.max_charge_peak_power,
                max_discharge_peak_w = battery.max_discharge_peak_power,
                "battery"
            );
            Some(battery)
        } else {
            info!("no battery detected");
            None
        };

        Ok(Inventory {
            inverter: inverter.identity(),
            meter: meter.identity(),
            battery,
        })
    }

    async fn current_export_power(&mut self) -> Result<f64, TelemetryError> {
        let inverter: InverterSample = self.read(0).await?;
        let meter: MeterSample = self.read(self.config.meter_index).await?;
        let battery: Option<BatterySample> = if self.has_battery {
            Some(self.read(self.config.battery_index).await?)
        } else {
            None
        };

        Ok(balance::exportable_power(&inverter, &meter, battery.as_ref()))
    }
}
