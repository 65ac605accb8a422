use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appliance_client::{ApplianceControl, ControlError, DeviceRecord, DeviceState};
use async_trait::async_trait;
use dispatcher::{ApplianceDevice, DispatchConfig, Scheduler};
use modbus_client::ClientError;
use poller_actor::{ActorConfig, CycleOutcome, PollerActor};
use telemetry::{Inventory, PowerSource, TelemetryError};
use tokio::sync::watch;
use tokio::time::Instant;
use types::DispatchMode;

#[derive(Default)]
struct FakeSource {
    readings: VecDeque<Result<f64, TelemetryError>>,
    reads: usize,
    opens: usize,
    failing_opens: usize,
    closes: usize,
}

impl FakeSource {
    fn scripted(readings: Vec<Result<f64, TelemetryError>>) -> Self {
        Self {
            readings: readings.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PowerSource for FakeSource {
    async fn open(&mut self) -> Result<(), TelemetryError> {
        self.opens += 1;
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(TelemetryError::Transport(ClientError::NotConnected));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TelemetryError> {
        self.closes += 1;
        Ok(())
    }

    async fn init(&mut self) -> Result<Inventory, TelemetryError> {
        Ok(Inventory::default())
    }

    async fn current_export_power(&mut self) -> Result<f64, TelemetryError> {
        self.reads += 1;
        self.readings.pop_front().unwrap_or(Ok(0.0))
    }
}

struct FakeControl {
    waiting: bool,
    started: Mutex<Vec<String>>,
}

impl FakeControl {
    fn new(waiting: bool) -> Self {
        Self {
            waiting,
            started: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ApplianceControl for FakeControl {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ControlError> {
        Ok(Vec::new())
    }

    async fn get_device_state(&self, _id: &str) -> Result<DeviceState, ControlError> {
        Ok(DeviceState {
            status: if self.waiting { 4 } else { 1 },
            full_remote_control: true,
        })
    }

    async fn start_device(&self, id: &str) -> Result<(), ControlError> {
        self.started.lock().expect("started lock").push(id.to_string());
        Ok(())
    }
}

fn scheduler() -> Scheduler {
    let config = DispatchConfig {
        mode: DispatchMode::Manual,
        auto_power: 0.0,
        start_delay: Duration::ZERO,
    };
    Scheduler::new(config, vec![ApplianceDevice::new("washer", "Washer", 500.0)])
}

fn actor(
    source: FakeSource,
    control: FakeControl,
) -> (PollerActor<FakeSource, FakeControl>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let config = ActorConfig {
        poll_interval: Duration::from_millis(10),
        reconnect_pause: Duration::ZERO,
    };
    (PollerActor::new(source, control, scheduler(), rx, config), tx)
}

#[tokio::test]
async fn idle_cycle_skips_telemetry() {
    let (mut actor, _tx) = actor(FakeSource::default(), FakeControl::new(false));

    assert_eq!(actor.poll_once().await, CycleOutcome::Idle);
    assert_eq!(actor.source().reads, 0);
}

#[tokio::test]
async fn waiting_device_is_started_with_fresh_reading() {
    let (mut actor, _tx) = actor(FakeSource::scripted(vec![Ok(750.0)]), FakeControl::new(true));

    let outcome = actor.poll_once().await;
    assert_eq!(
        outcome,
        CycleOutcome::Dispatched {
            available: 750.0,
            started: vec!["washer".to_string()],
        }
    );
    assert!(!actor.scheduler().devices()[0].is_waiting());
}

#[tokio::test]
async fn insufficient_power_starts_nothing() {
    let (mut actor, _tx) = actor(FakeSource::scripted(vec![Ok(120.0)]), FakeControl::new(true));

    let outcome = actor.poll_once().await;
    assert_eq!(
        outcome,
        CycleOutcome::Dispatched {
            available: 120.0,
            started: Vec::new(),
        }
    );
}

#[tokio::test]
async fn telemetry_failure_reconnects_once_without_dispatch() {
    let failure = Err(TelemetryError::Transport(ClientError::Timeout { timeout_ms: 10 }));
    let (mut actor, _tx) = actor(
        FakeSource::scripted(vec![failure, Ok(900.0)]),
        FakeControl::new(true),
    );

    assert_eq!(actor.poll_once().await, CycleOutcome::TelemetryFailed);
    assert_eq!(actor.source().closes, 1);
    assert_eq!(actor.source().opens, 1);
    assert!(actor.scheduler().devices()[0].is_waiting());

    // The next tick works on the reopened transport.
    assert!(matches!(
        actor.poll_once().await,
        CycleOutcome::Dispatched { ref started, .. } if started == &["washer".to_string()]
    ));
    assert_eq!(actor.source().opens, 1);
}

#[tokio::test]
async fn failed_reopen_keeps_polling() {
    let failure = Err(TelemetryError::Transport(ClientError::Timeout { timeout_ms: 10 }));
    let source = FakeSource {
        failing_opens: 1,
        ..FakeSource::scripted(vec![failure, Ok(900.0)])
    };
    let (mut actor, _tx) = actor(source, FakeControl::new(true));

    assert_eq!(actor.poll_once().await, CycleOutcome::TelemetryFailed);
    assert_eq!(actor.source().opens, 1);

    // No extra open before the next read.
    assert!(matches!(
        actor.poll_once().await,
        CycleOutcome::Dispatched { ref started, .. } if started == &["washer".to_string()]
    ));
    assert_eq!(actor.source().reads, 2);
    assert_eq!(actor.source().opens, 1);
}

/// Takes 3 s per state query and records when each query began.
struct SlowControl {
    queried_at: Arc<Mutex<Vec<Instant>>>,
}

#[async_trait]
impl ApplianceControl for SlowControl {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ControlError> {
        Ok(Vec::new())
    }

    async fn get_device_state(&self, _id: &str) -> Result<DeviceState, ControlError> {
        self.queried_at.lock().expect("queried lock").push(Instant::now());
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(DeviceState {
            status: 4,
            full_remote_control: true,
        })
    }

    async fn start_device(&self, _id: &str) -> Result<(), ControlError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn cycles_start_on_a_fixed_period() {
    let queried_at = Arc::new(Mutex::new(Vec::new()));
    let control = SlowControl {
        queried_at: Arc::clone(&queried_at),
    };
    let (tx, rx) = watch::channel(false);
    let config = ActorConfig {
        poll_interval: Duration::from_secs(5),
        reconnect_pause: Duration::ZERO,
    };
    // Zero watts keeps the washer waiting so every cycle queries it.
    let actor = PollerActor::new(FakeSource::default(), control, scheduler(), rx, config);
    let handle = tokio::spawn(actor.run());

    tokio::time::sleep(Duration::from_secs(17)).await;
    tx.send(true).expect("send shutdown");
    handle.await.expect("actor task");

    let queried_at = queried_at.lock().expect("queried lock");
    let gaps: Vec<u64> = queried_at
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_secs())
        .collect();
    assert_eq!(gaps, [5, 5, 5]);
}

#[tokio::test]
async fn run_stops_on_shutdown_and_closes_source() {
    let (actor, tx) = actor(FakeSource::default(), FakeControl::new(false));
    let handle = tokio::spawn(actor.run());

    tokio::time::sleep(Duration::from_millis(35)).await;
    tx.send(true).expect("send shutdown");

    let source = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("actor stopped")
        .expect("actor task");
    assert_eq!(source.closes, 1);
    assert_eq!(source.reads, 0);
}
