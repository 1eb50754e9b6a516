//! crates/timecharge_core/src/memory.rs
//!
//! An in-process implementation of the `RecordStore` port. It backs the
//! test suites and local tooling, and also carries the caller-side writes
//! (days, tasks, blocks) that a real API layer would perform.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::{
    ChargeCode, ChargeKey, DayMode, TimeBlock, TimeCharge, Timesheet, TrackedDay, TrackedTask,
};
use crate::ports::{
    LedgerTransaction, PortError, PortResult, RecordStore, SlotBlock, SlotStart,
};

#[derive(Default)]
struct State {
    days: HashMap<Uuid, TrackedDay>,
    tasks: HashMap<Uuid, TrackedTask>,
    blocks: HashMap<Uuid, TimeBlock>,
    charge_codes: HashMap<Uuid, ChargeCode>,
    timesheets: HashMap<Uuid, Timesheet>,
    charges: HashMap<ChargeKey, TimeCharge>,
    /// Ledger saves allowed before every further save fails.
    save_budget: Option<usize>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //=====================================================================================
    // Caller-side writes
    //=====================================================================================

    pub fn add_charge_code(&self, name: &str, code: &str) -> ChargeCode {
        let charge_code = ChargeCode {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: code.to_string(),
            description: None,
            expired: false,
        };
        self.state()
            .charge_codes
            .insert(charge_code.id, charge_code.clone());
        charge_code
    }

    pub fn add_day(&self, user_id: Uuid, date: NaiveDate, mode: DayMode) -> PortResult<TrackedDay> {
        let mut state = self.state();
        if state
            .days
            .values()
            .any(|d| d.user_id == user_id && d.date == date)
        {
            return Err(PortError::Conflict(format!(
                "User {} already tracks {}",
                user_id, date
            )));
        }
        let day = TrackedDay {
            id: Uuid::new_v4(),
            user_id,
            date,
            mode,
            timesheet_id: None,
        };
        state.days.insert(day.id, day.clone());
        Ok(day)
    }

    pub fn add_task(&self, day_id: Uuid, charge_code_ids: &[Uuid]) -> PortResult<TrackedTask> {
        let mut state = self.state();
        let day = state
            .days
            .get(&day_id)
            .ok_or_else(|| PortError::NotFound(format!("Tracked day {} not found", day_id)))?;
        let task = TrackedTask {
            id: Uuid::new_v4(),
            day_id,
            user_id: day.user_id,
            notes: None,
            overtime_enabled: false,
            charge_code_ids: charge_code_ids.to_vec(),
        };
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub fn set_task_charge_codes(
        &self,
        task_id: Uuid,
        charge_code_ids: &[Uuid],
    ) -> PortResult<TrackedTask> {
        let mut state = self.state();
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| PortError::NotFound(format!("Tracked task {} not found", task_id)))?;
        task.charge_code_ids = charge_code_ids.to_vec();
        Ok(task.clone())
    }

    /// Deletes a task and, in cascade, its blocks.
    pub fn remove_task(&self, task_id: Uuid) -> PortResult<TrackedTask> {
        let mut state = self.state();
        let task = state
            .tasks
            .remove(&task_id)
            .ok_or_else(|| PortError::NotFound(format!("Tracked task {} not found", task_id)))?;
        state.blocks.retain(|_, b| b.task_id != task_id);
        Ok(task)
    }

    pub fn add_block(&self, task_id: Uuid, start_time: DateTime<Utc>) -> PortResult<TimeBlock> {
        let mut state = self.state();
        let task = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| PortError::NotFound(format!("Tracked task {} not found", task_id)))?;
        if state
            .blocks
            .values()
            .any(|b| b.task_id == task_id && b.start_time == start_time)
        {
            return Err(PortError::Conflict(format!(
                "Task {} already holds {}",
                task_id, start_time
            )));
        }
        let block = TimeBlock {
            id: Uuid::new_v4(),
            task_id,
            user_id: task.user_id,
            start_time,
            minutes: None,
        };
        state.blocks.insert(block.id, block.clone());
        Ok(block)
    }

    pub fn remove_block(&self, block_id: Uuid) -> PortResult<TimeBlock> {
        self.state()
            .blocks
            .remove(&block_id)
            .ok_or_else(|| PortError::NotFound(format!("Time block {} not found", block_id)))
    }

    /// Lets `saves` more ledger saves succeed, then fails every save after.
    pub fn fail_saves_after(&self, saves: usize) {
        self.state().save_budget = Some(saves);
    }

    pub fn clear_save_failures(&self) {
        self.state().save_budget = None;
    }

    /// Every committed ledger row, across all timesheets.
    pub fn all_time_charges(&self) -> Vec<TimeCharge> {
        let mut charges: Vec<TimeCharge> = self.state().charges.values().cloned().collect();
        charges.sort_by_key(TimeCharge::key);
        charges
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn find_tracked_day(&self, day_id: Uuid) -> PortResult<Option<TrackedDay>> {
        Ok(self.state().days.get(&day_id).cloned())
    }

    async fn find_task(&self, task_id: Uuid) -> PortResult<Option<TrackedTask>> {
        Ok(self.state().tasks.get(&task_id).cloned())
    }

    async fn find_time_blocks_at(
        &self,
        user_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> PortResult<Vec<SlotBlock>> {
        Ok(self
            .state()
            .blocks
            .values()
            .filter(|b| b.user_id == user_id && b.start_time == start_time)
            .map(|b| SlotBlock {
                block_id: b.id,
                task_id: b.task_id,
            })
            .collect())
    }

    async fn list_distinct_block_start_times(
        &self,
        timesheet_id: Uuid,
    ) -> PortResult<Vec<SlotStart>> {
        let state = self.state();
        let day_ids: HashSet<Uuid> = state
            .days
            .values()
            .filter(|d| d.timesheet_id == Some(timesheet_id))
            .map(|d| d.id)
            .collect();
        let starts: BTreeSet<SlotStart> = state
            .blocks
            .values()
            .filter_map(|b| {
                let task = state.tasks.get(&b.task_id)?;
                day_ids.contains(&task.day_id).then_some(SlotStart {
                    day_id: task.day_id,
                    start_time: b.start_time,
                })
            })
            .collect();
        Ok(starts.into_iter().collect())
    }

    async fn find_timesheet(&self, timesheet_id: Uuid) -> PortResult<Option<Timesheet>> {
        Ok(self.state().timesheets.get(&timesheet_id).cloned())
    }

    async fn find_or_create_timesheet(
        &self,
        user_id: Uuid,
        week_ending_date: NaiveDate,
    ) -> PortResult<Timesheet> {
        let mut state = self.state();
        if let Some(existing) = state
            .timesheets
            .values()
            .find(|t| t.user_id == user_id && t.week_ending_date == week_ending_date)
        {
            return Ok(existing.clone());
        }
        let timesheet = Timesheet {
            id: Uuid::new_v4(),
            user_id,
            week_ending_date,
        };
        state.timesheets.insert(timesheet.id, timesheet.clone());
        Ok(timesheet)
    }

    async fn assign_timesheet(&self, day_id: Uuid, timesheet_id: Uuid) -> PortResult<()> {
        let mut state = self.state();
        let day = state
            .days
            .get_mut(&day_id)
            .ok_or_else(|| PortError::NotFound(format!("Tracked day {} not found", day_id)))?;
        day.timesheet_id = Some(timesheet_id);
        Ok(())
    }

    async fn list_timesheets(&self, user_id: Option<Uuid>) -> PortResult<Vec<Timesheet>> {
        let mut timesheets: Vec<Timesheet> = self
            .state()
            .timesheets
            .values()
            .filter(|t| user_id.map_or(true, |u| t.user_id == u))
            .cloned()
            .collect();
        timesheets.sort_by_key(|t| (t.week_ending_date, t.user_id));
        Ok(timesheets)
    }

    async fn list_time_charges(&self, timesheet_id: Uuid) -> PortResult<Vec<TimeCharge>> {
        let mut charges: Vec<TimeCharge> = self
            .state()
            .charges
            .values()
            .filter(|c| c.timesheet_id == timesheet_id)
            .cloned()
            .collect();
        charges.sort_by_key(|c| (c.date, c.charge_code_id));
        Ok(charges)
    }

    async fn begin(&self) -> PortResult<Box<dyn LedgerTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            staged: HashMap::new(),
            cleared: HashSet::new(),
        }))
    }
}

/// Staged ledger writes, applied to the store only on commit.
struct InMemoryTransaction {
    store: InMemoryStore,
    staged: HashMap<ChargeKey, TimeCharge>,
    cleared: HashSet<Uuid>,
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn find_or_create_time_charge(
        &mut self,
        timesheet_id: Uuid,
        day: &TrackedDay,
        charge_code_id: Uuid,
    ) -> PortResult<TimeCharge> {
        let key = ChargeKey {
            timesheet_id,
            day_id: day.id,
            charge_code_id,
        };
        if let Some(staged) = self.staged.get(&key) {
            return Ok(staged.clone());
        }
        if !self.cleared.contains(&timesheet_id) {
            if let Some(committed) = self.store.state().charges.get(&key) {
                return Ok(committed.clone());
            }
        }
        let created = TimeCharge {
            id: Uuid::new_v4(),
            timesheet_id,
            day_id: day.id,
            charge_code_id,
            date: day.date,
            value: 0.0,
        };
        self.staged.insert(key, created.clone());
        Ok(created)
    }

    async fn save_time_charge(&mut self, charge: &TimeCharge) -> PortResult<()> {
        {
            let mut state = self.store.state();
            if let Some(budget) = state.save_budget.as_mut() {
                if *budget == 0 {
                    return Err(PortError::Unexpected(
                        "Injected ledger save failure".to_string(),
                    ));
                }
                *budget -= 1;
            }
        }
        self.staged.insert(charge.key(), charge.clone());
        Ok(())
    }

    async fn delete_time_charges(&mut self, timesheet_id: Uuid) -> PortResult<u64> {
        let mut keys: HashSet<ChargeKey> = self
            .staged
            .keys()
            .filter(|k| k.timesheet_id == timesheet_id)
            .copied()
            .collect();
        if !self.cleared.contains(&timesheet_id) {
            keys.extend(
                self.store
                    .state()
                    .charges
                    .keys()
                    .filter(|k| k.timesheet_id == timesheet_id)
                    .copied(),
            );
        }
        self.staged.retain(|k, _| k.timesheet_id != timesheet_id);
        self.cleared.insert(timesheet_id);
        Ok(keys.len() as u64)
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let InMemoryTransaction {
            store,
            staged,
            cleared,
        } = *self;
        let mut state = store.state();
        for timesheet_id in &cleared {
            state.charges.retain(|k, _| k.timesheet_id != *timesheet_id);
        }
        for (key, charge) in staged {
            state.charges.insert(key, charge);
        }
        Ok(())
    }
}
