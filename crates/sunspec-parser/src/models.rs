//! SolarEdge SunSpec register blocks consumed by the dispatcher.
//!
//! Register addresses and layouts follow the SolarEdge SunSpec and storage
//! implementation notes. Meter and battery blocks repeat for additional
//! instances at a fixed stride.

use crate::layout::{ByteOrder, Field, FieldValues};
use crate::{apply_scale, DecodeError, Model};
use types::PointValue;

/// "SunS" marker stored in the first two registers of the inverter common block.
pub const SUNSPEC_ID: u32 = 0x5375_6e53;

pub mod inverter_status {
    pub const OFF: u16 = 1;
    pub const SLEEPING: u16 = 2;
    pub const STARTING: u16 = 3;
    pub const MPPT: u16 = 4;
    pub const THROTTLED: u16 = 5;
    pub const SHUTTING_DOWN: u16 = 6;
    pub const FAULT: u16 = 7;
    pub const STANDBY: u16 = 8;

    pub fn name(status: u16) -> &'static str {
        match status {
            OFF => "off",
            SLEEPING => "sleeping",
            STARTING => "starting",
            MPPT => "producing",
            THROTTLED => "throttled",
            SHUTTING_DOWN => "shutting_down",
            FAULT => "fault",
            STANDBY => "standby",
            _ => "unknown",
        }
    }
}

pub mod battery_status {
    pub const OFF: u32 = 1;
    pub const EMPTY: u32 = 2;
    pub const DISCHARGING: u32 = 3;
    pub const CHARGING: u32 = 4;
    pub const FULL: u32 = 5;
    pub const HOLDING: u32 = 6;
    pub const TESTING: u32 = 7;

    pub fn name(status: u32) -> &'static str {
        match status {
            OFF => "off",
            EMPTY => "empty",
            DISCHARGING => "discharging",
            CHARGING => "charging",
            FULL => "full",
            HOLDING => "holding",
            TESTING => "testing",
            _ => "unknown",
        }
    }
}

/// Identity shared by every device class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonInfo {
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub serial_number: String,
    pub device_address: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InverterCommon {
    pub sunspec_id: u32,
    pub model_id: u16,
    pub model_length: u16,
    pub manufacturer: String,
    pub model: String,
    /// Documented as 16 bytes but devices fill the full 32.
    pub version: String,
    pub serial_number: String,
    pub device_address: u16,
}

impl InverterCommon {
    pub fn has_sunspec_marker(&self) -> bool {
        self.sunspec_id == SUNSPEC_ID
    }

    pub fn identity(&self) -> CommonInfo {
        CommonInfo {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            version: self.version.clone(),
            serial_number: self.serial_number.clone(),
            device_address: self.device_address,
        }
    }
}

impl Model for InverterCommon {
    const NAME: &'static str = "inverter_common";
    const ADDRESS: u16 = 40_000;
    const LAYOUT: &'static [Field] = &[
        Field::u32("sunspec_id"),
        Field::u16("model_id"),
        Field::u16("model_length"),
        Field::text("manufacturer", 32),
        Field::text("model", 32),
        Field::text("version", 32),
        Field::text("serial_number", 32),
        Field::u16("device_address"),
    ];

    fn from_values(mut v: FieldValues) -> Result<Self, DecodeError> {
        Ok(Self {
            sunspec_id: v.u32()?,
            model_id: v.u16()?,
            model_length: v.u16()?,
            manufacturer: v.text()?,
            model: v.text()?,
            version: v.text()?,
            serial_number: v.text()?,
            device_address: v.u16()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InverterSample {
    pub model_id: u16,
    pub model_length: u16,
    pub ac_current: u16,
    pub ac_current_a: u16,
    pub ac_current_b: u16,
    pub ac_current_c: u16,
    pub ac_current_sf: i16,
    pub ac_voltage_ab: u16,
    pub ac_voltage_bc: u16,
    pub ac_voltage_ca: u16,
    pub ac_voltage_an: u16,
    pub ac_voltage_bn: u16,
    pub ac_voltage_cn: u16,
    pub ac_voltage_sf: i16,
    pub ac_power: i16,
    pub ac_power_sf: i16,
    pub ac_frequency: u16,
    pub ac_frequency_sf: i16,
    pub ac_va: i16,
    pub ac_va_sf: i16,
    pub ac_var: i16,
    pub ac_var_sf: i16,
    pub ac_pf: i16,
    pub ac_pf_sf: i16,
    pub ac_energy_wh: i32,
    pub ac_energy_wh_sf: i16,
    pub dc_current: u16,
    pub dc_current_sf: i16,
    pub dc_voltage: u16,
    pub dc_voltage_sf: i16,
    pub dc_power: i16,
    pub dc_power_sf: i16,
    pub temp_cabinet: i16,
    pub temp_sink: i16,
    pub temp_transformer: i16,
    pub temp_other: i16,
    pub temp_sf: i16,
    pub status: u16,
    pub status_vendor: u16,
}

impl InverterSample {
    pub fn ac_power_watts(&self) -> f64 {
        apply_scale(PointValue::I16(self.ac_power), self.ac_power_sf)
    }

    /// Solar production before conversion to AC.
    pub fn dc_power_watts(&self) -> f64 {
        apply_scale(PointValue::I16(self.dc_power), self.dc_power_sf)
    }

    pub fn ac_frequency_hz(&self) -> f64 {
        apply_scale(PointValue::U16(self.ac_frequency), self.ac_frequency_sf)
    }

    pub fn heat_sink_celsius(&self) -> f64 {
        apply_scale(PointValue::I16(self.temp_sink), self.temp_sf)
    }

    pub fn lifetime_energy_wh(&self) -> f64 {
        apply_scale(PointValue::I32(self.ac_energy_wh), self.ac_energy_wh_sf)
    }

    pub fn is_producing(&self) -> bool {
        matches!(self.status, inverter_status::MPPT | inverter_status::THROTTLED)
    }

    pub fn status_name(&self) -> &'static str {
        inverter_status::name(self.status)
    }
}

impl Model for InverterSample {
    const NAME: &'static str = "inverter";
    const ADDRESS: u16 = 40_069;
    const LAYOUT: &'static [Field] = &[
        Field::u16("model_id"),
        Field::u16("model_length"),
        Field::u16("ac_current"),
        Field::u16("ac_current_a"),
        Field::u16("ac_current_b"),
        Field::u16("ac_current_c"),
        Field::i16("ac_current_sf"),
        Field::u16("ac_voltage_ab"),
        Field::u16("ac_voltage_bc"),
        Field::u16("ac_voltage_ca"),
        Field::u16("ac_voltage_an"),
        Field::u16("ac_voltage_bn"),
        Field::u16("ac_voltage_cn"),
        Field::i16("ac_voltage_sf"),
        Field::i16("ac_power"),
        Field::i16("ac_power_sf"),
        Field::u16("ac_frequency"),
        Field::i16("ac_frequency_sf"),
        Field::i16("ac_va"),
        Field::i16("ac_va_sf"),
        Field::i16("ac_var"),
        Field::i16("ac_var_sf"),
        Field::i16("ac_pf"),
        Field::i16("ac_pf_sf"),
        Field::i32("ac_energy_wh"),
        Field::i16("ac_energy_wh_sf"),
        Field::u16("dc_current"),
        Field::i16("dc_current_sf"),
        Field::u16("dc_voltage"),
        Field::i16("dc_voltage_sf"),
        Field::i16("dc_power"),
        Field::i16("dc_power_sf"),
        Field::i16("temp_cabinet"),
        Field::i16("temp_sink"),
        Field::i16("temp_transformer"),
        Field::i16("temp_other"),
        Field::i16("temp_sf"),
        Field::u16("status"),
        Field::u16("status_vendor"),
    ];

    fn from_values(mut v: FieldValues) -> Result<Self, DecodeError> {
        Ok(Self {
            model_id: v.u16()?,
            model_length: v.u16()?,
            ac_current: v.u16()?,
            ac_current_a: v.u16()?,
            ac_current_b: v.u16()?,
            ac_current_c: v.u16()?,
            ac_current_sf: v.i16()?,
            ac_voltage_ab: v.u16()?,
            ac_voltage_bc: v.u16()?,
            ac_voltage_ca: v.u16()?,
            ac_voltage_an: v.u16()?,
            ac_voltage_bn: v.u16()?,
            ac_voltage_cn: v.u16()?,
            ac_voltage_sf: v.i16()?,
            ac_power: v.i16()?,
            ac_power_sf: v.i16()?,
            ac_frequency: v.u16()?,
            ac_frequency_sf: v.i16()?,
            ac_va: v.i16()?,
            ac_va_sf: v.i16()?,
            ac_var: v.i16()?,
            ac_var_sf: v.i16()?,
            ac_pf: v.i16()?,
            ac_pf_sf: v.i16()?,
            ac_energy_wh: v.i32()?,
            ac_energy_wh_sf: v.i16()?,
            dc_current: v.u16()?,
            dc_current_sf: v.i16()?,
            dc_voltage: v.u16()?,
            dc_voltage_sf: v.i16()?,
            dc_power: v.i16()?,
            dc_power_sf: v.i16()?,
            temp_cabinet: v.i16()?,
            temp_sink: v.i16()?,
            temp_transformer: v.i16()?,
            temp_other: v.i16()?,
            temp_sf: v.i16()?,
            status: v.u16()?,
            status_vendor: v.u16()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterCommon {
    pub model_id: u16,
    pub model_length: u16,
    pub manufacturer: String,
    pub model: String,
    pub option: String,
    pub version: String,
    pub serial_number: String,
    pub device_address: u16,
}

impl MeterCommon {
    pub fn identity(&self) -> CommonInfo {
        CommonInfo {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            version: self.version.clone(),
            serial_number: self.serial_number.clone(),
            device_address: self.device_address,
        }
    }
}

impl Model for MeterCommon {
    const NAME: &'static str = "meter_common";
    const ADDRESS: u16 = 40_121;
    const INSTANCE_STRIDE: u16 = 174;
    const LAYOUT: &'static [Field] = &[
        Field::u16("model_id"),
        Field::u16("model_length"),
        Field::text("manufacturer", 32),
        Field::text("model", 32),
        Field::text("option", 16),
        Field::text("version", 16),
        Field::text("serial_number", 32),
        Field::u16("device_address"),
    ];

    fn from_values(mut v: FieldValues) -> Result<Self, DecodeError> {
        Ok(Self {
            model_id: v.u16()?,
            model_length: v.u16()?,
            manufacturer: v.text()?,
            model: v.text()?,
            option: v.text()?,
            version: v.text()?,
            serial_number: v.text()?,
            device_address: v.u16()?,
        })
    }
}

/// Grid meter readings. Positive real power is export to the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    pub model_id: u16,
    pub model_length: u16,
    pub ac_current: u16,
    pub ac_current_a: u16,
    pub ac_current_b: u16,
    pub ac_current_c: u16,
    pub ac_current_sf: i16,
    pub ac_voltage_ln: u16,
    pub ac_voltage_an: u16,
    pub ac_voltage_bn: u16,
    pub ac_voltage_cn: u16,
    pub ac_voltage_ll: u16,
    pub ac_voltage_ab: u16,
    pub ac_voltage_bc: u16,
    pub ac_voltage_ca: u16,
    pub ac_voltage_sf: i16,
    pub ac_frequency: u16,
    pub ac_frequency_sf: i16,
    pub ac_power: i16,
    pub ac_power_a: i16,
    pub ac_power_b: i16,
    pub ac_power_c: i16,
    pub ac_power_sf: i16,
    pub ac_va: u16,
    pub ac_va_a: u16,
    pub ac_va_b: u16,
    pub ac_va_c: u16,
    pub ac_va_sf: i16,
    pub ac_var: u16,
    pub ac_var_a: u16,
    pub ac_var_b: u16,
    pub ac_var_c: u16,
    pub ac_var_sf: i16,
    pub ac_pf: u16,
    pub ac_pf_a: u16,
    pub ac_pf_b: u16,
    pub ac_pf_c: u16,
    pub ac_pf_sf: i16,
    pub exported: u32,
    pub exported_a: u32,
    pub exported_b: u32,
    pub exported_c: u32,
    pub imported: u32,
    pub imported_a: u32,
    pub imported_b: u32,
    pub imported_c: u32,
    pub energy_w_sf: i16,
    pub exported_va: u32,
    pub exported_va_a: u32,
    pub exported_va_b: u32,
    pub exported_va_c: u32,
    pub imported_va: u32,
    pub imported_va_a: u32,
    pub imported_va_b: u32,
    pub imported_va_c: u32,
    pub energy_va_sf: i16,
}

impl MeterSample {
    pub fn ac_power_watts(&self) -> f64 {
        apply_scale(PointValue::I16(self.ac_power), self.ac_power_sf)
    }

    pub fn exported_wh(&self) -> f64 {
        apply_scale(PointValue::U32(self.exported), self.energy_w_sf)
    }

    pub fn imported_wh(&self) -> f64 {
        apply_scale(PointValue::U32(self.imported), self.energy_w_sf)
    }
}

impl Model for MeterSample {
    const NAME: &'static str = "meter";
    const ADDRESS: u16 = 40_188;
    const INSTANCE_STRIDE: u16 = 174;
    const LAYOUT: &'static [Field] = &[
        Field::u16("model_id"),
        Field::u16("model_length"),
        Field::u16("ac_current"),
        Field::u16("ac_current_a"),
        Field::u16("ac_current_b"),
        Field::u16("ac_current_c"),
        Field::i16("ac_current_sf"),
        Field::u16("ac_voltage_ln"),
        Field::u16("ac_voltage_an"),
        Field::u16("ac_voltage_bn"),
        Field::u16("ac_voltage_cn"),
        Field::u16("ac_voltage_ll"),
        Field::u16("ac_voltage_ab"),
        Field::u16("ac_voltage_bc"),
        Field::u16("ac_voltage_ca"),
        Field::i16("ac_voltage_sf"),
        Field::u16("ac_frequency"),
        Field::i16("ac_frequency_sf"),
        Field::i16("ac_power"),
        Field::i16("ac_power_a"),
        Field::i16("ac_power_b"),
        Field::i16("ac_power_c"),
        Field::i16("ac_power_sf"),
        Field::u16("ac_va"),
        Field::u16("ac_va_a"),
        Field::u16("ac_va_b"),
        Field::u16("ac_va_c"),
        Field::i16("ac_va_sf"),
        Field::u16("ac_var"),
        Field::u16("ac_var_a"),
        Field::u16("ac_var_b"),
        Field::u16("ac_var_c"),
        Field::i16("ac_var_sf"),
        Field::u16("ac_pf"),
        Field::u16("ac_pf_a"),
        Field::u16("ac_pf_b"),
        Field::u16("ac_pf_c"),
        Field::i16("ac_pf_sf"),
        Field::u32("exported"),
        Field::u32("exported_a"),
        Field::u32("exported_b"),
        Field::u32("exported_c"),
        Field::u32("imported"),
        Field::u32("imported_a"),
        Field::u32("imported_b"),
        Field::u32("imported_c"),
        Field::i16("energy_w_sf"),
        Field::u32("exported_va"),
        Field::u32("exported_va_a"),
        Field::u32("exported_va_b"),
        Field::u32("exported_va_c"),
        Field::u32("imported_va"),
        Field::u32("imported_va_a"),
        Field::u32("imported_va_b"),
        Field::u32("imported_va_c"),
        Field::i16("energy_va_sf"),
        Field::reserved("reactive_energy", 66),
    ];

    fn from_values(mut v: FieldValues) -> Result<Self, DecodeError> {
        Ok(Self {
            model_id: v.u16()?,
            model_length: v.u16()?,
            ac_current: v.u16()?,
            ac_current_a: v.u16()?,
            ac_current_b: v.u16()?,
            ac_current_c: v.u16()?,
            ac_current_sf: v.i16()?,
            ac_voltage_ln: v.u16()?,
            ac_voltage_an: v.u16()?,
            ac_voltage_bn: v.u16()?,
            ac_voltage_cn: v.u16()?,
            ac_voltage_ll: v.u16()?,
            ac_voltage_ab: v.u16()?,
            ac_voltage_bc: v.u16()?,
            ac_voltage_ca: v.u16()?,
            ac_voltage_sf: v.i16()?,
            ac_frequency: v.u16()?,
            ac_frequency_sf: v.i16()?,
            ac_power: v.i16()?,
            ac_power_a: v.i16()?,
            ac_power_b: v.i16()?,
            ac_power_c: v.i16()?,
            ac_power_sf: v.i16()?,
            ac_va: v.u16()?,
            ac_va_a: v.u16()?,
            ac_va_b: v.u16()?,
            ac_va_c: v.u16()?,
            ac_va_sf: v.i16()?,
            ac_var: v.u16()?,
            ac_var_a: v.u16()?,
            ac_var_b: v.u16()?,
            ac_var_c: v.u16()?,
            ac_var_sf: v.i16()?,
            ac_pf: v.u16()?,
            ac_pf_a: v.u16()?,
            ac_pf_b: v.u16()?,
            ac_pf_c: v.u16()?,
            ac_pf_sf: v.i16()?,
            exported: v.u32()?,
            exported_a: v.u32()?,
            exported_b: v.u32()?,
            exported_c: v.u32()?,
            imported: v.u32()?,
            imported_a: v.u32()?,
            imported_b: v.u32()?,
            imported_c: v.u32()?,
            energy_w_sf: v.i16()?,
            exported_va: v.u32()?,
            exported_va_a: v.u32()?,
            exported_va_b: v.u32()?,
            exported_va_c: v.u32()?,
            imported_va: v.u32()?,
            imported_va_a: v.u32()?,
            imported_va_b: v.u32()?,
            imported_va_c: v.u32()?,
            energy_va_sf: v.i16()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryInfo {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub device_id: u16,
    pub rated_energy: f32,
    pub max_charge_continuous_power: f32,
    pub max_discharge_continuous_power: f32,
    pub max_charge_peak_power: f32,
    pub max_discharge_peak_power: f32,
}

impl BatteryInfo {
    /// An installation without a battery reports an all-zero manufacturer.
    pub fn is_present(&self) -> bool {
        !self.manufacturer.is_empty()
    }

    pub fn identity(&self) -> CommonInfo {
        CommonInfo {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            version: self.firmware_version.clone(),
            serial_number: self.serial_number.clone(),
            device_address: self.device_id,
        }
    }
}

impl Model for BatteryInfo {
    const NAME: &'static str = "battery_info";
    const ADDRESS: u16 = 0xE100;
    const INSTANCE_STRIDE: u16 = 0x100;
    const BYTE_ORDER: ByteOrder = ByteOrder::WordSwapped;
    const LAYOUT: &'static [Field] = &[
        Field::text("manufacturer", 32),
        Field::text("model", 32),
        Field::text("firmware_version", 32),
        Field::text("serial_number", 32),
        Field::u16("device_id"),
        Field::reserved("reserved", 2),
        Field::f32("rated_energy"),
        Field::f32("max_charge_continuous_power"),
        Field::f32("max_discharge_continuous_power"),
        Field::f32("max_charge_peak_power"),
        Field::f32("max_discharge_peak_power"),
    ];

    fn from_values(mut v: FieldValues) -> Result<Self, DecodeError> {
        Ok(Self {
            manufacturer: v.text()?,
            model: v.text()?,
            firmware_version: v.text()?,
            serial_number: v.text()?,
            device_id: v.u16()?,
            rated_energy: v.f32()?,
            max_charge_continuous_power: v.f32()?,
            max_discharge_continuous_power: v.f32()?,
            max_charge_peak_power: v.f32()?,
            max_discharge_peak_power: v.f32()?,
        })
    }
}

/// Battery readings. Instantaneous power is positive while charging.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySample {
    pub average_temperature: f32,
    pub max_temperature: f32,
    pub instantaneous_voltage: f32,
    pub instantaneous_current: f32,
    pub instantaneous_power: f32,
    pub lifetime_export_energy: u64,
    pub lifetime_import_energy: u64,
    pub max_energy: f32,
    pub available_energy: f32,
    pub state_of_health: f32,
    pub state_of_energy: f32,
    pub status: u32,
    pub status_internal: u32,
}

impl BatterySample {
    pub fn status_name(&self) -> &'static str {
        battery_status::name(self.status)
    }
}

impl Model for BatterySample {
    const NAME: &'static str = "battery";
    const ADDRESS: u16 = 0xE16C;
    const INSTANCE_STRIDE: u16 = 0x100;
    const BYTE_ORDER: ByteOrder = ByteOrder::WordSwapped;
    const LAYOUT: &'static [Field] = &[
        Field::f32("average_temperature"),
        Field::f32("max_temperature"),
        Field::f32("instantaneous_voltage"),
        Field::f32("instantaneous_current"),
        Field::f32("instantaneous_power"),
        Field::u64("lifetime_export_energy"),
        Field::u64("lifetime_import_energy"),
        Field::f32("max_energy"),
        Field::f32("available_energy"),
        Field::f32("state_of_health"),
        Field::f32("state_of_energy"),
        Field::u32("status"),
        Field::u32("status_internal"),
    ];

    fn from_values(mut v: FieldValues) -> Result<Self, DecodeError> {
        Ok(Self {
            average_temperature: v.f32()?,
            max_temperature: v.f32()?,
            instantaneous_voltage: v.f32()?,
            instantaneous_current: v.f32()?,
            instantaneous_power: v.f32()?,
            lifetime_export_energy: v.u64()?,
            lifetime_import_energy: v.u64()?,
            max_energy: v.f32()?,
            available_energy: v.f32()?,
            state_of_health: v.f32()?,
            state_of_energy: v.f32()?,
            status: v.u32()?,
            status_internal: v.u32()?,
        })
    }
}
