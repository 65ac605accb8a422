use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use appliance_client::ApplianceControl;
use dispatcher::Scheduler;
use telemetry::PowerSource;

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    /// Pause between closing and reopening the telemetry transport.
    pub reconnect_pause: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reconnect_pause: Duration::from_secs(2),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing was waiting, telemetry was not read.
    Idle,
    Dispatched { available: f64, started: Vec<String> },
    /// Telemetry failed and the transport was cycled.
    TelemetryFailed,
}

/// The polling task that owns the power source and the scheduler.
pub struct PollerActor<S, C> {
    source: S,
    control: C,
    scheduler: Scheduler,
    shutdown: watch::Receiver<bool>,
    config: ActorConfig,
}

impl<S, C> PollerActor<S, C>
where
    S: PowerSource,
    C: ApplianceControl,
{
    pub fn new(
        source: S,
        control: C,
        scheduler: Scheduler,
        shutdown: watch::Receiver<bool>,
        config: ActorConfig,
    ) -> Self {
        Self {
            source,
            control,
            scheduler,
            shutdown,
            config,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs ticks on a fixed period until shutdown is signalled, then closes
    /// the power source. A cycle that overruns the period delays the next
    /// tick instead of bunching ticks up.
    pub async fn run(mut self) -> S {
        let mut ticker = interval(self.config.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut iteration = 0u64;

        loop {
            if *self.shutdown.borrow() {
                info!("poller shutdown requested");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {},
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("poller shutdown requested");
                        break;
                    }
                    continue;
                }
            }

            let cycle_start = Instant::now();
            let outcome = self.poll_once().await;
            iteration = iteration.wrapping_add(1);
            debug!(
                iteration,
                elapsed_ms = cycle_start.elapsed().as_millis() as u64,
                outcome = ?outcome,
                "poll cycle complete"
            );
        }

        if let Err(err) = self.source.close().await {
            warn!(error = %err, "closing power source failed");
        }
        self.source
    }

    /// One full cycle: refresh waiting appliances, read telemetry, dispatch.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        counter!("solar_dispatch_cycles_total").increment(1);

        if !self.scheduler.refresh_waiting(&self.control).await {
            debug!("no device waiting");
            return CycleOutcome::Idle;
        }

        let available = match self.source.current_export_power().await {
            Ok(power) => power,
            Err(err) => {
                warn!(error = %err, "telemetry read failed");
                counter!("solar_dispatch_telemetry_failures_total").increment(1);
                self.reconnect().await;
                return CycleOutcome::TelemetryFailed;
            }
        };
        gauge!("solar_dispatch_export_power_watts").set(available);
        info!(available, "exportable power");

        let started = self.scheduler.dispatch(&self.control, available).await;
        if !started.is_empty() {
            counter!("solar_dispatch_appliance_starts_total").increment(started.len() as u64);
        }
        CycleOutcome::Dispatched { available, started }
    }

    async fn reconnect(&mut self) {
        counter!("solar_dispatch_reconnects_total").increment(1);
        if let Err(err) = self.source.close().await {
            warn!(error = %err, "closing power source failed");
        }
        sleep(self.config.reconnect_pause).await;
        match self.source.open().await {
            Ok(()) => info!("reconnected to inverter"),
            Err(err) => warn!(error = %err, "reconnect to inverter failed"),
        }
    }
}
