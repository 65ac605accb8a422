use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use appliance_client::{
    device_status, device_type, ApplianceControl, ControlError, DeviceRecord, DeviceState,
};
use async_trait::async_trait;
use dispatcher::{ApplianceDevice, DispatchConfig, Scheduler};
use tokio::time::Instant;
use types::DispatchMode;

#[derive(Default)]
struct FakeControl {
    states: HashMap<String, DeviceState>,
    listing: Mutex<Option<Vec<DeviceRecord>>>,
    failing_starts: HashSet<String>,
    started: Mutex<Vec<String>>,
    list_calls: Mutex<usize>,
}

impl FakeControl {
    fn with_waiting(ids: &[&str]) -> Self {
        let mut control = Self::default();
        for id in ids {
            control.states.insert((*id).to_string(), waiting_state());
        }
        control
    }

    fn set_listing(&self, records: Option<Vec<DeviceRecord>>) {
        *self.listing.lock().expect("listing lock") = records;
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().expect("started lock").clone()
    }

    fn list_calls(&self) -> usize {
        *self.list_calls.lock().expect("calls lock")
    }
}

#[async_trait]
impl ApplianceControl for FakeControl {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ControlError> {
        *self.list_calls.lock().expect("calls lock") += 1;
        self.listing
            .lock()
            .expect("listing lock")
            .clone()
            .ok_or_else(|| ControlError::Auth("listing unavailable".to_string()))
    }

    async fn get_device_state(&self, id: &str) -> Result<DeviceState, ControlError> {
        self.states.get(id).cloned().ok_or_else(|| ControlError::Status {
            status: 404,
            body: format!("unknown device {id}"),
        })
    }

    async fn start_device(&self, id: &str) -> Result<(), ControlError> {
        if self.failing_starts.contains(id) {
            return Err(ControlError::Status {
                status: 500,
                body: "start rejected".to_string(),
            });
        }
        self.started.lock().expect("started lock").push(id.to_string());
        Ok(())
    }
}

fn waiting_state() -> DeviceState {
    DeviceState {
        status: device_status::PROGRAMMED_WAITING_TO_START,
        full_remote_control: true,
    }
}

fn record(id: &str, device_type: u16, status: u16, remote: bool) -> DeviceRecord {
    DeviceRecord {
        id: id.to_string(),
        name: format!("device {id}"),
        device_type,
        state: DeviceState {
            status,
            full_remote_control: remote,
        },
    }
}

fn config(mode: DispatchMode, delay: Duration) -> DispatchConfig {
    DispatchConfig {
        mode,
        auto_power: 400.0,
        start_delay: delay,
    }
}

fn manual_devices() -> Vec<ApplianceDevice> {
    vec![
        ApplianceDevice::new("A", "washer", 500.0),
        ApplianceDevice::new("B", "dishwasher", 300.0),
    ]
}

#[tokio::test]
async fn manual_mode_deducts_budget_in_list_order() {
    let control = FakeControl::with_waiting(&["A", "B"]);
    let mut scheduler = Scheduler::new(config(DispatchMode::Manual, Duration::ZERO), manual_devices());

    assert!(scheduler.refresh_waiting(&control).await);
    let started = scheduler.dispatch(&control, 600.0).await;

    assert_eq!(started, ["A"]);
    assert!(!scheduler.devices()[0].is_waiting());
    assert!(scheduler.devices()[1].is_waiting());
}

#[tokio::test]
async fn auto_all_evaluates_each_device_independently() {
    let control = FakeControl::default();
    control.set_listing(Some(vec![
        record("A", device_type::WASHING_MACHINE, 4, true),
        record("B", device_type::DISHWASHER, 4, true),
    ]));
    let mut scheduler = Scheduler::new(config(DispatchMode::AutoAll, Duration::ZERO), Vec::new());

    assert!(scheduler.refresh_waiting(&control).await);
    let started = scheduler.dispatch(&control, 600.0).await;

    assert_eq!(started, ["A", "B"]);
}

#[tokio::test]
async fn auto_single_deducts_the_threshold() {
    let control = FakeControl::default();
    control.set_listing(Some(vec![
        record("A", device_type::WASHING_MACHINE, 4, true),
        record("B", device_type::TUMBLE_DRYER, 4, true),
    ]));
    let mut scheduler = Scheduler::new(config(DispatchMode::AutoSingle, Duration::ZERO), Vec::new());

    assert!(scheduler.refresh_waiting(&control).await);
    let started = scheduler.dispatch(&control, 600.0).await;

    assert_eq!(started, ["A"]);
    assert_eq!(scheduler.devices()[1].power, 400.0);
}

#[tokio::test]
async fn inter_start_delay_holds_later_devices() {
    let control = FakeControl::with_waiting(&["A", "B"]);
    let mut scheduler = Scheduler::new(
        config(DispatchMode::Manual, Duration::from_secs(120)),
        manual_devices(),
    );
    let t0 = Instant::now();

    scheduler.refresh_waiting(&control).await;
    assert_eq!(scheduler.dispatch_at(&control, 2_000.0, t0).await, ["A"]);
    assert!(scheduler.devices()[1].is_waiting());

    // "A" is running now, only "B" still waits.
    let later = FakeControl::with_waiting(&["B"]);
    let inside = t0 + Duration::from_secs(5);
    scheduler.refresh_waiting(&later).await;
    assert!(scheduler.dispatch_at(&later, 2_000.0, inside).await.is_empty());
    assert!(scheduler.devices()[1].is_waiting());

    let after = t0 + Duration::from_secs(120);
    scheduler.refresh_waiting(&later).await;
    assert_eq!(scheduler.dispatch_at(&later, 2_000.0, after).await, ["B"]);
}

#[tokio::test]
async fn earlier_clock_reading_does_not_reopen_window() {
    let control = FakeControl::with_waiting(&["A", "B"]);
    let mut scheduler = Scheduler::new(
        config(DispatchMode::Manual, Duration::from_secs(60)),
        manual_devices(),
    );
    let t0 = Instant::now();

    scheduler.refresh_waiting(&control).await;
    scheduler.dispatch_at(&control, 2_000.0, t0 + Duration::from_secs(100)).await;
    let first = scheduler.state().next_start.expect("next start");
    assert_eq!(first, t0 + Duration::from_secs(160));

    // An earlier clock reading cannot pull the window back.
    scheduler.refresh_waiting(&control).await;
    scheduler.dispatch_at(&control, 2_000.0, t0).await;
    assert_eq!(scheduler.state().next_start, Some(first));
}

#[tokio::test]
async fn manual_list_is_never_replaced_by_a_query() {
    let control = FakeControl::with_waiting(&["B"]);
    control.set_listing(Some(vec![record("Z", device_type::WASHING_MACHINE, 4, true)]));
    let mut scheduler = Scheduler::new(config(DispatchMode::Manual, Duration::ZERO), manual_devices());

    assert!(scheduler.refresh_waiting(&control).await);

    let ids: Vec<&str> = scheduler.devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["A", "B"]);
    assert_eq!(control.list_calls(), 0);
    assert!(!scheduler.devices()[0].is_waiting());
    assert!(scheduler.devices()[1].is_waiting());
}

#[tokio::test]
async fn state_query_failure_only_skips_that_device() {
    // "A" is unknown to the controller.
    let control = FakeControl::with_waiting(&["B"]);
    let mut scheduler = Scheduler::new(config(DispatchMode::Manual, Duration::ZERO), manual_devices());
    scheduler.set_waiting(0, true);

    assert!(scheduler.refresh_waiting(&control).await);
    assert!(!scheduler.devices()[0].is_waiting());
    assert_eq!(scheduler.dispatch(&control, 1_000.0).await, ["B"]);
}

#[tokio::test]
async fn automatic_list_is_rebuilt_and_filtered() {
    let control = FakeControl::default();
    control.set_listing(Some(vec![
        record("washer", device_type::WASHING_MACHINE, 4, true),
        record("dryer", device_type::TUMBLE_DRYER, 4, true),
        record("dishwasher", device_type::DISHWASHER, 4, true),
        record("combo", device_type::WASHER_DRYER, 4, true),
        record("oven", 12, 4, true),
        record("running", device_type::WASHING_MACHINE, device_status::RUNNING, true),
        record("local", device_type::DISHWASHER, 4, false),
    ]));
    let mut scheduler = Scheduler::new(config(DispatchMode::AutoSingle, Duration::ZERO), manual_devices());
    assert!(scheduler.devices().is_empty());

    assert!(scheduler.refresh_waiting(&control).await);
    let ids: Vec<&str> = scheduler.devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["washer", "dryer", "dishwasher", "combo"]);
    assert!(scheduler.devices().iter().all(|d| d.is_waiting() && d.power == 400.0));

    control.set_listing(Some(vec![record("combo", device_type::WASHER_DRYER, 4, true)]));
    assert!(scheduler.refresh_waiting(&control).await);
    let ids: Vec<&str> = scheduler.devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["combo"]);
}

#[tokio::test]
async fn listing_failure_clears_candidates() {
    let control = FakeControl::default();
    control.set_listing(Some(vec![record("washer", device_type::WASHING_MACHINE, 4, true)]));
    let mut scheduler = Scheduler::new(config(DispatchMode::AutoAll, Duration::ZERO), Vec::new());
    assert!(scheduler.refresh_waiting(&control).await);

    control.set_listing(None);
    assert!(!scheduler.refresh_waiting(&control).await);
    assert!(scheduler.devices().is_empty());
}

#[tokio::test]
async fn failed_start_keeps_device_waiting() {
    let mut control = FakeControl::with_waiting(&["A", "B"]);
    control.failing_starts.insert("A".to_string());
    let mut scheduler = Scheduler::new(config(DispatchMode::Manual, Duration::from_secs(60)), manual_devices());

    scheduler.refresh_waiting(&control).await;
    let started = scheduler.dispatch(&control, 1_000.0).await;

    assert_eq!(started, ["B"]);
    assert!(scheduler.devices()[0].is_waiting());
    assert_eq!(control.started(), ["B"]);
}

#[tokio::test]
async fn devices_above_budget_are_skipped() {
    let control = FakeControl::with_waiting(&["A", "B"]);
    let mut scheduler = Scheduler::new(config(DispatchMode::Manual, Duration::ZERO), manual_devices());

    scheduler.refresh_waiting(&control).await;
    assert_eq!(scheduler.dispatch(&control, 350.0).await, ["B"]);
    assert!(scheduler.dispatch(&control, 100.0).await.is_empty());
    assert!(scheduler.devices()[0].is_waiting());
}

#[test]
fn device_list_deserializes_without_names() {
    let devices: Vec<ApplianceDevice> =
        serde_json::from_str(r#"[{"id": "000123", "power": 500}]"#).expect("parse");
    assert_eq!(devices, [ApplianceDevice::new("000123", "", 500.0)]);
    assert!(!devices[0].is_waiting());
}
