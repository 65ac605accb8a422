use sunspec_parser::{BatterySample, InverterSample, MeterSample};
use tracing::{debug, info};

/// Combines one set of samples into the power available to appliances.
///
/// The meter reports net export as positive power. Power flowing into the
/// battery is counted as surplus too, so appliances win over charging.
pub fn exportable_power(
    inverter: &InverterSample,
    meter: &MeterSample,
    battery: Option<&BatterySample>,
) -> f64 {
    if !inverter.is_producing() {
        // Informational only, the meter still tells the truth about surplus.
        info!(
            status = inverter.status,
            status_name = inverter.status_name(),
            "inverter not producing"
        );
    }

    debug!(
        ac_power = inverter.ac_power_watts(),
        dc_power = inverter.dc_power_watts(),
        heat_sink_c = inverter.heat_sink_celsius(),
        lifetime_wh = inverter.lifetime_energy_wh(),
        "inverter power"
    );

    let meter_power = meter.ac_power_watts();
    debug!(meter_power, "meter power");

    let mut export = meter_power;
    if let Some(battery) = battery {
        debug!(
            battery_power = battery.instantaneous_power,
            state_of_energy = battery.state_of_energy,
            status = battery.status_name(),
            "battery power"
        );
        export += f64::from(battery.instantaneous_power);
    }

    export
}
