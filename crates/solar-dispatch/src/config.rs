use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use appliance_client::MieleConfig;
use dispatcher::{ApplianceDevice, DispatchConfig};
use modbus_client::ClientConfig;
use poller_actor::ActorConfig;
use telemetry::TelemetryConfig;
use types::DispatchMode;

const DEFAULT_DEVICES_PATH: &str = "devices.json";
const MAX_METER_INDEX: u8 = 2;
const MAX_BATTERY_INDEX: u8 = 1;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub modbus: ClientConfig,
    pub telemetry: TelemetryConfig,
    pub poller: ActorConfig,
    pub dispatch: DispatchConfig,
    /// Appliance list file read in manual mode when no devices are given inline.
    pub devices_path: String,
    pub devices: Vec<ApplianceDevice>,
    pub miele: MieleConfig,
    pub metrics_listen: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Reads the appliance list file unless devices were configured inline.
    /// Automatic modes discover appliances and never read it.
    pub fn resolve_devices(&mut self) -> Result<()> {
        if self.dispatch.mode.is_automatic() || !self.devices.is_empty() {
            return Ok(());
        }

        let content = fs::read_to_string(&self.devices_path)
            .with_context(|| format!("read device list {}", self.devices_path))?;
        self.devices = serde_json::from_str(&content)
            .with_context(|| format!("parse device list {}", self.devices_path))?;
        Ok(())
    }

    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        self.metrics_listen
            .as_deref()
            .map(|listen| {
                listen
                    .parse::<SocketAddr>()
                    .with_context(|| format!("metrics.listen is not a socket address: {listen}"))
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.modbus.host.trim().is_empty() {
            anyhow::bail!("modbus.host must be non-empty");
        }
        if self.modbus.port == 0 {
            anyhow::bail!("modbus.port must be between 1 and 65535");
        }
        if let Some(max_batch) = self.modbus.max_batch_size {
            if max_batch == 0 {
                anyhow::bail!("modbus.max_batch_size must be >= 1");
            }
        }
        if self.modbus.timeout_ms == 0 {
            anyhow::bail!("modbus.timeout_ms must be >= 1");
        }
        if self.modbus.retry_backoff_ms == 0 {
            anyhow::bail!("modbus.retry_backoff_ms must be >= 1");
        }
        if self.modbus.retry_max_backoff_ms == 0 {
            anyhow::bail!("modbus.retry_max_backoff_ms must be >= 1");
        }
        if let Some(delay) = self.modbus.inter_read_delay_ms {
            if delay == 0 {
                anyhow::bail!("modbus.inter_read_delay_ms must be >= 1 when set");
            }
        }
        if self.telemetry.meter_index > MAX_METER_INDEX {
            anyhow::bail!("telemetry.meter_index must be between 0 and {MAX_METER_INDEX}");
        }
        if self.telemetry.battery_index > MAX_BATTERY_INDEX {
            anyhow::bail!("telemetry.battery_index must be between 0 and {MAX_BATTERY_INDEX}");
        }
        if self.poller.poll_interval.is_zero() {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }

        if self.dispatch.mode.is_automatic() {
            if !self.dispatch.auto_power.is_finite() || self.dispatch.auto_power <= 0.0 {
                anyhow::bail!("dispatch.auto_power must be > 0 in {} mode", self.dispatch.mode);
            }
        } else {
            if self.devices.is_empty() {
                anyhow::bail!("manual mode requires at least one device");
            }
            for device in &self.devices {
                if device.id.trim().is_empty() {
                    anyhow::bail!("device id must be non-empty");
                }
                if !device.power.is_finite() || device.power < 0.0 {
                    anyhow::bail!("device {} power must be >= 0", device.id);
                }
            }
        }

        for (name, value) in [
            ("miele.client_id", &self.miele.client_id),
            ("miele.client_secret", &self.miele.client_secret),
            ("miele.username", &self.miele.username),
            ("miele.password", &self.miele.password),
            ("miele.vg", &self.miele.vg),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{name} must be set");
            }
        }
        if !self.miele.base_url.starts_with("http://") && !self.miele.base_url.starts_with("https://") {
            anyhow::bail!("miele.base_url must be an http(s) URL");
        }
        if self.miele.timeout_ms == 0 {
            anyhow::bail!("miele.timeout_ms must be >= 1");
        }

        self.metrics_addr()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            modbus: ClientConfig::default(),
            telemetry: TelemetryConfig::default(),
            poller: ActorConfig::default(),
            dispatch: DispatchConfig::default(),
            devices_path: DEFAULT_DEVICES_PATH.to_string(),
            devices: Vec::new(),
            miele: MieleConfig::default(),
            metrics_listen: None,
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Ok(value) = env::var("INVERTER_ADDRESS") {
        config.modbus.host = value;
    }
    if let Some(port) = parse_env_u16("INVERTER_PORT") {
        config.modbus.port = port;
    }
    if let Some(unit_id) = parse_env_u8("SOLAR_DISPATCH_UNIT_ID") {
        config.modbus.unit_id = unit_id;
    }
    if let Some(timeout_ms) = parse_env_u64("SOLAR_DISPATCH_MODBUS_TIMEOUT_MS") {
        config.modbus.timeout_ms = timeout_ms;
    }
    if let Some(max_batch) = parse_env_u16("SOLAR_DISPATCH_MAX_BATCH_SIZE") {
        config.modbus.max_batch_size = Some(max_batch);
    }

    config.telemetry.meter_index =
        parse_env_u8("SOLAR_DISPATCH_METER_INDEX").unwrap_or(config.telemetry.meter_index);
    config.telemetry.battery_index =
        parse_env_u8("SOLAR_DISPATCH_BATTERY_INDEX").unwrap_or(config.telemetry.battery_index);

    if let Some(interval_ms) = parse_env_u64("SOLAR_DISPATCH_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }
    if let Some(pause_ms) = parse_env_u64("SOLAR_DISPATCH_RECONNECT_PAUSE_MS") {
        config.poller.reconnect_pause = Duration::from_millis(pause_ms);
    }

    if let Ok(value) = env::var("SOLAR_DISPATCH_MODE") {
        config.dispatch.mode = value
            .parse::<DispatchMode>()
            .map_err(|err| anyhow::anyhow!("SOLAR_DISPATCH_MODE: {err}"))?;
    }
    if let Some(power) = parse_env_f64("SOLAR_DISPATCH_AUTO_POWER") {
        config.dispatch.auto_power = power;
    }
    if let Some(delay_ms) = parse_env_u64("SOLAR_DISPATCH_START_DELAY_MS") {
        config.dispatch.start_delay = Duration::from_millis(delay_ms);
    }
    if let Ok(value) = env::var("SOLAR_DISPATCH_DEVICES") {
        config.devices_path = value;
        config.devices.clear();
    }

    if let Ok(value) = env::var("MIELE_CLIENT_ID") {
        config.miele.client_id = value;
    }
    if let Ok(value) = env::var("MIELE_CLIENT_SECRET") {
        config.miele.client_secret = value;
    }
    if let Ok(value) = env::var("MIELE_USERNAME") {
        config.miele.username = value;
    }
    if let Ok(value) = env::var("MIELE_PASSWORD") {
        config.miele.password = value;
    }
    if let Ok(value) = env::var("SOLAR_DISPATCH_VG") {
        config.miele.vg = value;
    }

    config.metrics_listen = env::var("SOLAR_DISPATCH_METRICS_LISTEN")
        .ok()
        .or(config.metrics_listen.take());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    modbus: Option<FileModbusConfig>,
    telemetry: Option<FileTelemetryConfig>,
    poller: Option<FilePollerConfig>,
    dispatch: Option<FileDispatchConfig>,
    devices: Option<Vec<ApplianceDevice>>,
    miele: Option<FileMieleConfig>,
    metrics: Option<FileMetricsConfig>,
}

#[derive(Debug, Deserialize)]
struct FileModbusConfig {
    host: Option<String>,
    port: Option<u16>,
    unit_id: Option<u8>,
    max_batch_size: Option<u16>,
    timeout_ms: Option<u64>,
    retry_count: Option<usize>,
    retry_backoff_ms: Option<u64>,
    retry_max_backoff_ms: Option<u64>,
    inter_read_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileTelemetryConfig {
    meter_index: Option<u8>,
    battery_index: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    reconnect_pause_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileDispatchConfig {
    mode: Option<DispatchMode>,
    auto_power: Option<f64>,
    start_delay_ms: Option<u64>,
    devices_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileMieleConfig {
    client_id: Option<String>,
    client_secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
    vg: Option<String>,
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileMetricsConfig {
    listen: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("SOLAR_DISPATCH_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut AppConfig, file: FileConfig) {
    if let Some(modbus) = file.modbus {
        if let Some(host) = modbus.host {
            config.modbus.host = host;
        }
        if let Some(port) = modbus.port {
            config.modbus.port = port;
        }
        if let Some(unit_id) = modbus.unit_id {
            config.modbus.unit_id = unit_id;
        }
        if let Some(max_batch) = modbus.max_batch_size {
            config.modbus.max_batch_size = Some(max_batch);
        }
        if let Some(timeout_ms) = modbus.timeout_ms {
            config.modbus.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = modbus.retry_count {
            config.modbus.retry_count = retry_count;
        }
        if let Some(backoff) = modbus.retry_backoff_ms {
            config.modbus.retry_backoff_ms = backoff;
        }
        if let Some(max_backoff) = modbus.retry_max_backoff_ms {
            config.modbus.retry_max_backoff_ms = max_backoff;
        }
        if let Some(delay) = modbus.inter_read_delay_ms {
            config.modbus.inter_read_delay_ms = Some(delay);
        }
    }

    if let Some(telemetry) = file.telemetry {
        if let Some(index) = telemetry.meter_index {
            config.telemetry.meter_index = index;
        }
        if let Some(index) = telemetry.battery_index {
            config.telemetry.battery_index = index;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(pause_ms) = poller.reconnect_pause_ms {
            config.poller.reconnect_pause = Duration::from_millis(pause_ms);
        }
    }

    if let Some(dispatch) = file.dispatch {
        if let Some(mode) = dispatch.mode {
            config.dispatch.mode = mode;
        }
        if let Some(power) = dispatch.auto_power {
            config.dispatch.auto_power = power;
        }
        if let Some(delay_ms) = dispatch.start_delay_ms {
            config.dispatch.start_delay = Duration::from_millis(delay_ms);
        }
        if let Some(path) = dispatch.devices_path {
            config.devices_path = path;
        }
    }

    if let Some(devices) = file.devices {
        config.devices = devices;
    }

    if let Some(miele) = file.miele {
        if let Some(value) = miele.client_id {
            config.miele.client_id = value;
        }
        if let Some(value) = miele.client_secret {
            config.miele.client_secret = value;
        }
        if let Some(value) = miele.username {
            config.miele.username = value;
        }
        if let Some(value) = miele.password {
            config.miele.password = value;
        }
        if let Some(value) = miele.vg {
            config.miele.vg = value;
        }
        if let Some(value) = miele.base_url {
            config.miele.base_url = value;
        }
        if let Some(timeout_ms) = miele.timeout_ms {
            config.miele.timeout_ms = timeout_ms;
        }
    }

    if let Some(metrics) = file.metrics {
        config.metrics_listen = metrics.listen;
    }
}

fn parse_env_u8(key: &str) -> Option<u8> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
