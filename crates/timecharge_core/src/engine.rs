//! crates/timecharge_core/src/engine.rs
//!
//! The reconciliation engine: entry points for block and task mutations,
//! timesheet resolution, and the `TimesheetUpdated` event stream.
//!
//! Every mutation of a user's ledger runs under that user's lock, for the
//! whole read-compute-write sequence. Reads of the ledger do not lock.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{TimeBlock, TimeCharge, Timesheet, TimesheetUpdated, TrackedDay, TrackedTask};
use crate::error::{EngineError, EngineResult, Reconciliation, SkipReason};
use crate::ports::RecordStore;
use crate::serializer::{KeyGuard, KeyedLocks};
use crate::weights::{SlotChange, WeightCalculator, BLOCK_MINUTES};
use crate::week::week_ending_date;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minutes represented by one time block.
    pub block_minutes: f64,
    /// Buffered `TimesheetUpdated` events per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_minutes: BLOCK_MINUTES,
            event_capacity: 256,
        }
    }
}

pub struct Engine {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) weights: WeightCalculator,
    locks: KeyedLocks<Uuid>,
    events: broadcast::Sender<TimesheetUpdated>,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store,
            weights: WeightCalculator::new(config.block_minutes),
            locks: KeyedLocks::new(),
            events,
        }
    }

    /// Receives one event per successful reconciliation from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TimesheetUpdated> {
        self.events.subscribe()
    }

    /// Takes `user_id`'s mutation lock until the scope is dropped.
    ///
    /// Callers that persist a block mutation themselves should do so while
    /// holding a scope and reconcile through it, so no other mutation of the
    /// same slot can land between the write and the reconciliation.
    pub async fn scope(&self, user_id: Uuid) -> MutationScope<'_> {
        MutationScope {
            engine: self,
            user_id,
            _guard: self.locks.lock(user_id).await,
        }
    }

    //=====================================================================================
    // Mutation hooks
    //=====================================================================================

    /// Reconciles the slot of a block that was just created.
    #[instrument(skip(self, block), fields(block_id = %block.id, start_time = %block.start_time))]
    pub async fn on_time_block_created(&self, block: &TimeBlock) -> EngineResult<Reconciliation> {
        self.scope(block.user_id)
            .await
            .time_block_created(block)
            .await
    }

    /// Reconciles the slot of a block that is being (or was just) deleted.
    #[instrument(skip(self, block), fields(block_id = %block.id, start_time = %block.start_time))]
    pub async fn on_time_block_deleted(&self, block: &TimeBlock) -> EngineResult<Reconciliation> {
        self.scope(block.user_id)
            .await
            .time_block_deleted(block)
            .await
    }

    /// Rebuilds the week of a task whose charge codes changed.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn on_task_charge_codes_changed(
        &self,
        task: &TrackedTask,
    ) -> EngineResult<Reconciliation> {
        self.scope(task.user_id).await.task_changed(task).await
    }

    /// Rebuilds the week of a task that was deleted along with its blocks.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn on_task_deleted_with_blocks(
        &self,
        task: &TrackedTask,
    ) -> EngineResult<Reconciliation> {
        self.scope(task.user_id).await.task_changed(task).await
    }

    /// Rebuilds a known timesheet from scratch.
    #[instrument(skip(self))]
    pub async fn resync_timesheet(&self, timesheet_id: Uuid) -> EngineResult<Reconciliation> {
        let Some(timesheet) = self.store.find_timesheet(timesheet_id).await? else {
            warn!(%timesheet_id, "Cannot resync an unknown timesheet");
            return Ok(Reconciliation::Skipped(SkipReason::UnknownTimesheet {
                timesheet_id,
            }));
        };
        let _guard = self.locks.lock(timesheet.user_id).await;
        let outcome = self.rebuild(&timesheet).await?;
        self.publish(timesheet.id);
        Ok(outcome)
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    /// Finds or creates the timesheet for a day's week and attaches the day to it.
    pub async fn timesheet_for_day(&self, day_id: Uuid) -> EngineResult<Option<Timesheet>> {
        let Some(day) = self.store.find_tracked_day(day_id).await? else {
            return Ok(None);
        };
        let _guard = self.locks.lock(day.user_id).await;
        // re-read under the lock, a resync may have attached it meanwhile
        let Some(day) = self.store.find_tracked_day(day_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.resolve_timesheet(&day).await?))
    }

    /// The ledger rows of a timesheet, as last committed.
    pub async fn time_charges(&self, timesheet_id: Uuid) -> EngineResult<Vec<TimeCharge>> {
        Ok(self.store.list_time_charges(timesheet_id).await?)
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    pub(crate) async fn resolve_timesheet(&self, day: &TrackedDay) -> EngineResult<Timesheet> {
        let week_ending = week_ending_date(day.date);
        let timesheet = self
            .store
            .find_or_create_timesheet(day.user_id, week_ending)
            .await?;
        if day.timesheet_id != Some(timesheet.id) {
            debug!(day_id = %day.id, timesheet_id = %timesheet.id, "Attaching day to timesheet");
            self.store.assign_timesheet(day.id, timesheet.id).await?;
        }
        Ok(timesheet)
    }

    pub(crate) fn publish(&self, timesheet_id: Uuid) {
        // no subscribers is fine
        let _ = self.events.send(TimesheetUpdated { timesheet_id });
    }
}

/// Exclusive right to mutate one user's ledger. Released on drop.
pub struct MutationScope<'a> {
    engine: &'a Engine,
    user_id: Uuid,
    _guard: KeyGuard<Uuid>,
}

impl MutationScope<'_> {
    pub async fn time_block_created(&self, block: &TimeBlock) -> EngineResult<Reconciliation> {
        self.check_owner(block.user_id)?;
        self.engine.reconcile_block(block, SlotChange::Added).await
    }

    pub async fn time_block_deleted(&self, block: &TimeBlock) -> EngineResult<Reconciliation> {
        self.check_owner(block.user_id)?;
        self.engine.reconcile_block(block, SlotChange::Removed).await
    }

    /// Full resync for the week of `task`; covers charge code changes and task deletion.
    pub async fn task_changed(&self, task: &TrackedTask) -> EngineResult<Reconciliation> {
        self.check_owner(task.user_id)?;
        self.engine.resync_day(task.day_id).await
    }

    fn check_owner(&self, user_id: Uuid) -> EngineResult<()> {
        if user_id == self.user_id {
            Ok(())
        } else {
            Err(EngineError::WrongScope {
                scope: self.user_id,
                owner: user_id,
            })
        }
    }
}
