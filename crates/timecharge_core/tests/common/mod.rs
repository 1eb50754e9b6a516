//! Shared fixture for the engine integration suites.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use timecharge_core::memory::InMemoryStore;
use timecharge_core::{
    DayMode, Engine, EngineConfig, Reconciliation, TimeBlock, TimeCharge, Timesheet, TrackedDay,
    TrackedTask,
};
use uuid::Uuid;

pub const EPS: f64 = 1e-9;

pub struct Fixture {
    pub store: InMemoryStore,
    pub engine: Arc<Engine>,
    pub user_id: Uuid,
    pub day: TrackedDay,
    pub timesheet: Timesheet,
}

impl Fixture {
    /// One user with Monday 2026-10-19 tracked and attached to its timesheet.
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        let engine = Arc::new(Engine::new(
            Arc::new(store.clone()),
            EngineConfig::default(),
        ));
        let user_id = Uuid::new_v4();
        let day = store
            .add_day(user_id, date(2026, 10, 19), DayMode::Normal)
            .unwrap();
        let timesheet = engine.timesheet_for_day(day.id).await.unwrap().unwrap();
        Self {
            store,
            engine,
            user_id,
            day,
            timesheet,
        }
    }

    pub fn code(&self, name: &str) -> Uuid {
        self.store.add_charge_code(name, &name.to_uppercase()).id
    }

    pub fn task(&self, codes: &[Uuid]) -> TrackedTask {
        self.store.add_task(self.day.id, codes).unwrap()
    }

    /// Persists a block, then reconciles it.
    pub async fn add_block(&self, task: &TrackedTask, start: DateTime<Utc>) -> TimeBlock {
        let block = self.store.add_block(task.id, start).unwrap();
        let outcome = self.engine.on_time_block_created(&block).await.unwrap();
        assert!(outcome.is_applied(), "unexpected {:?}", outcome);
        block
    }

    /// Removes a block, then reconciles it.
    pub async fn remove_block(&self, block: &TimeBlock) -> Reconciliation {
        self.store.remove_block(block.id).unwrap();
        self.engine.on_time_block_deleted(block).await.unwrap()
    }

    pub async fn charges(&self) -> Vec<TimeCharge> {
        self.engine.time_charges(self.timesheet.id).await.unwrap()
    }

    /// Charged minutes per code across the whole timesheet.
    pub async fn values(&self) -> BTreeMap<Uuid, f64> {
        let mut values = BTreeMap::new();
        for charge in self.charges().await {
            *values.entry(charge.charge_code_id).or_insert(0.0) += charge.value;
        }
        values
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A block start on the fixture's Monday.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, hour, minute, 0).unwrap()
}

pub fn assert_minutes(values: &BTreeMap<Uuid, f64>, code: Uuid, expected: f64) {
    let actual = values.get(&code).copied().unwrap_or(0.0);
    assert!(
        (actual - expected).abs() < EPS,
        "code {} holds {} minutes, expected {}",
        code,
        actual,
        expected
    );
}
