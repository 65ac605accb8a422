use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use solar_dispatch::AppConfig;
use types::DispatchMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const OVERRIDES: &[&str] = &[
    "SOLAR_DISPATCH_CONFIG",
    "SOLAR_DISPATCH_MODE",
    "SOLAR_DISPATCH_AUTO_POWER",
    "SOLAR_DISPATCH_DEVICES",
    "INVERTER_ADDRESS",
    "INVERTER_PORT",
    "MIELE_CLIENT_ID",
    "MIELE_CLIENT_SECRET",
    "MIELE_USERNAME",
    "MIELE_PASSWORD",
];

fn clear_env() {
    for key in OVERRIDES {
        env::remove_var(key);
    }
}

#[test]
fn toml_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-valid.toml"));

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    config.validate().expect("validate config");

    assert_eq!(config.modbus.host, "192.168.188.167");
    assert_eq!(config.modbus.port, 1502);
    assert_eq!(config.modbus.retry_count, 1);
    assert_eq!(config.dispatch.mode, DispatchMode::Manual);
    assert_eq!(config.dispatch.start_delay, Duration::from_secs(120));
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.devices[1].power, 300.0);
    assert!(config.metrics_addr().expect("metrics addr").is_some());

    clear_env();
}

#[test]
fn json_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-valid.json"));

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    config.validate().expect("validate config");

    assert_eq!(config.dispatch.mode, DispatchMode::AutoAll);
    assert_eq!(config.dispatch.auto_power, 1200.0);
    assert_eq!(config.telemetry.meter_index, 1);
    assert_eq!(config.miele.vg, "de-DE");
    assert!(config.devices.is_empty());

    clear_env();
}

#[test]
fn invalid_config_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-invalid.toml"));

    let config = AppConfig::load().expect("load config");
    assert!(config.validate().is_err());

    clear_env();
}

#[test]
fn manual_mode_reads_device_file() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-devices-file.toml"));
    env::set_var("SOLAR_DISPATCH_DEVICES", fixture_path("devices.json"));

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    config.validate().expect("validate config");

    let ids: Vec<&str> = config.devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["000123456789", "000423456789"]);
    assert_eq!(config.devices[1].power, 1800.0);

    clear_env();
}

#[test]
fn missing_device_file_is_an_error() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-devices-file.toml"));
    env::set_var("SOLAR_DISPATCH_DEVICES", fixture_path("missing.json"));

    let mut config = AppConfig::load().expect("load config");
    assert!(config.resolve_devices().is_err());

    clear_env();
}

#[test]
fn environment_overrides_file_values() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("INVERTER_ADDRESS", "10.1.1.1");
    env::set_var("INVERTER_PORT", "502");
    env::set_var("SOLAR_DISPATCH_MODE", "auto");
    env::set_var("SOLAR_DISPATCH_AUTO_POWER", "900");
    env::set_var("MIELE_PASSWORD", "from-env");

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    config.validate().expect("validate config");

    assert_eq!(config.modbus.host, "10.1.1.1");
    assert_eq!(config.modbus.port, 502);
    assert_eq!(config.dispatch.mode, DispatchMode::AutoSingle);
    assert_eq!(config.dispatch.auto_power, 900.0);
    assert_eq!(config.miele.password, "from-env");

    clear_env();
}

#[test]
fn inverter_host_name_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("INVERTER_ADDRESS", "solaredge.fritz.box");

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    config.validate().expect("validate config");
    assert_eq!(config.modbus.host, "solaredge.fritz.box");

    clear_env();
}

#[test]
fn zero_power_device_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-devices-file.toml"));
    env::set_var("SOLAR_DISPATCH_DEVICES", fixture_path("devices-zero-power.json"));

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    config.validate().expect("validate config");
    assert_eq!(config.devices[0].power, 0.0);

    clear_env();
}

#[test]
fn unknown_mode_is_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_MODE", "sometimes");

    assert!(AppConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_credentials_fail_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("SOLAR_DISPATCH_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("MIELE_CLIENT_SECRET", "");

    let mut config = AppConfig::load().expect("load config");
    config.resolve_devices().expect("devices");
    assert!(config.validate().is_err());

    clear_env();
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
