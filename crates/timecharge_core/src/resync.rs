//! crates/timecharge_core/src/resync.rs
//!
//! Full resync: tear down every ledger row of a timesheet and rebuild them
//! by distributing each occupied slot from zero. Used whenever a change can
//! alter shares that were already charged, such as a task's charge codes
//! changing or a task with blocks disappearing.
//!
//! The weight calculator is driven directly here rather than through the
//! incremental path, so the user's lock is taken once per rebuild.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Timesheet, TrackedDay};
use crate::engine::Engine;
use crate::error::{EngineResult, Reconciliation, SkipReason};
use crate::ledger::LedgerBatch;
use crate::slot::resolve_slot;

impl Engine {
    /// Resolves (or creates) the timesheet of `day_id` and rebuilds it. Caller holds the lock.
    pub(crate) async fn resync_day(&self, day_id: Uuid) -> EngineResult<Reconciliation> {
        let Some(day) = self.store.find_tracked_day(day_id).await? else {
            warn!(%day_id, "Resync requested for an unknown day; nothing to do");
            return Ok(Reconciliation::Skipped(SkipReason::UnknownDay { day_id }));
        };
        let timesheet = self.resolve_timesheet(&day).await?;
        let outcome = self.rebuild(&timesheet).await?;
        self.publish(timesheet.id);
        Ok(outcome)
    }

    /// Discards and recomputes every ledger row of `timesheet` in one batch.
    ///
    /// Each instant is replayed once, however many of the user's days hold
    /// blocks at it. Only shares of days on this timesheet are booked here.
    pub(crate) async fn rebuild(&self, timesheet: &Timesheet) -> EngineResult<Reconciliation> {
        let mut batch = LedgerBatch::open(self.store.as_ref()).await?;
        let removed = batch.delete_all(timesheet.id).await?;

        let mut starts: Vec<DateTime<Utc>> = self
            .store
            .list_distinct_block_start_times(timesheet.id)
            .await?
            .into_iter()
            .map(|slot| slot.start_time)
            .collect();
        // a fixed replay order keeps the float sums reproducible
        starts.sort();
        starts.dedup();

        let mut days: HashMap<Uuid, Option<TrackedDay>> = HashMap::new();
        for start in &starts {
            let slot = resolve_slot(self.store.as_ref(), timesheet.user_id, *start).await?;
            let deltas = self.weights.distribution(&slot);
            for (day_id, codes) in &deltas {
                if !days.contains_key(day_id) {
                    let day = self.day_on_timesheet(*day_id, timesheet).await?;
                    days.insert(*day_id, day);
                }
                if let Some(day) = days.get(day_id).and_then(Option::as_ref) {
                    batch.apply(timesheet.id, day, codes).await?;
                }
            }
        }

        let charges_touched = batch.commit().await?;
        info!(
            timesheet_id = %timesheet.id,
            removed,
            slots = starts.len(),
            charges_touched,
            "Rebuilt timesheet ledger"
        );
        Ok(Reconciliation::Applied {
            timesheet_id: timesheet.id,
            charges_touched,
        })
    }

    /// The day, if its shares belong on `timesheet`. Unattached days are attached first.
    async fn day_on_timesheet(
        &self,
        day_id: Uuid,
        timesheet: &Timesheet,
    ) -> EngineResult<Option<TrackedDay>> {
        let Some(day) = self.store.find_tracked_day(day_id).await? else {
            warn!(%day_id, "Slot occupant belongs to a missing day; skipping");
            return Ok(None);
        };
        let timesheet_id = match day.timesheet_id {
            Some(id) => id,
            None => self.resolve_timesheet(&day).await?.id,
        };
        if timesheet_id != timesheet.id {
            debug!(%day_id, %timesheet_id, "Occupant's day is booked on another timesheet");
            return Ok(None);
        }
        Ok(Some(day))
    }
}
