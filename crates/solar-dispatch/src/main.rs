use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use appliance_client::MieleClient;
use dispatcher::Scheduler;
use modbus_client::ModbusClient;
use poller_actor::PollerActor;
use solar_dispatch::AppConfig;
use telemetry::{PowerSource, SolarEdgeSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = parse_config_arg();
    let mut config = AppConfig::load_with_path(config_path).context("load config failed")?;
    config.resolve_devices().context("load device list failed")?;
    config.validate().context("config validation failed")?;

    if let Some(addr) = config.metrics_addr()? {
        install_metrics(addr)?;
    }

    info!(
        mode = %config.dispatch.mode,
        devices = config.devices.len(),
        auto_power = config.dispatch.auto_power,
        start_delay_s = config.dispatch.start_delay.as_secs(),
        poll_interval_ms = config.poller.poll_interval.as_millis() as u64,
        "starting solar dispatch"
    );
    for device in &config.devices {
        info!(device = %device.id, name = %device.name, power = device.power, "configured device");
    }

    let control = MieleClient::login(config.miele.clone())
        .await
        .context("miele login failed")?;

    let transport = ModbusClient::new(config.modbus.clone());
    let mut source = SolarEdgeSource::new(transport, config.telemetry.clone());
    source.open().await.context("inverter connect failed")?;
    source
        .init()
        .await
        .context("inverter identification failed")?;

    let scheduler = Scheduler::new(config.dispatch.clone(), config.devices.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let actor = PollerActor::new(
        source,
        control,
        scheduler,
        shutdown_rx.clone(),
        config.poller.clone(),
    );
    let mut actor_handle = tokio::spawn(actor.run());

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            if let Err(err) = (&mut actor_handle).await {
                warn!(error = %err, "poller task join failed");
            }
        }
        result = &mut actor_handle => {
            let _ = shutdown_tx.send(true);
            if let Err(err) = result {
                warn!(error = %err, "poller task failed");
            }
        }
    }

    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    info!("stopped");
    Ok(())
}

fn install_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("install prometheus exporter failed")?;

    describe_counter!("solar_dispatch_cycles_total", "Poll cycles run");
    describe_counter!(
        "solar_dispatch_telemetry_failures_total",
        "Cycles abandoned because telemetry could not be read"
    );
    describe_counter!("solar_dispatch_reconnects_total", "Inverter reconnect attempts");
    describe_counter!("solar_dispatch_appliance_starts_total", "Appliances started");
    describe_gauge!(
        "solar_dispatch_export_power_watts",
        "Last exportable power reading"
    );
    info!(%addr, "metrics exporter listening");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
