//! crates/timecharge_core/src/incremental.rs
//!
//! Incremental reconciliation of a single block add or remove.
//! Callers hold the owning user's lock.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::domain::TimeBlock;
use crate::engine::Engine;
use crate::error::{EngineResult, Reconciliation, SkipReason};
use crate::ledger::LedgerBatch;
use crate::slot::{resolve_slot, Occupant};
use crate::weights::SlotChange;

impl Engine {
    pub(crate) async fn reconcile_block(
        &self,
        block: &TimeBlock,
        change: SlotChange,
    ) -> EngineResult<Reconciliation> {
        // --- Resolve ---
        let Some(task) = self.store.find_task(block.task_id).await? else {
            warn!(task_id = %block.task_id, "Block belongs to an unknown task; nothing to reconcile");
            return Ok(Reconciliation::Skipped(SkipReason::UnknownTask {
                task_id: block.task_id,
            }));
        };
        let Some(day) = self.store.find_tracked_day(task.day_id).await? else {
            warn!(day_id = %task.day_id, "Task belongs to an unknown day; nothing to reconcile");
            return Ok(Reconciliation::Skipped(SkipReason::UnknownDay { day_id: task.day_id }));
        };
        let timesheet = match day.timesheet_id {
            Some(id) => self.store.find_timesheet(id).await?,
            None => None,
        };
        let Some(timesheet) = timesheet else {
            warn!(day_id = %day.id, "No timesheet for tracked day; ledger left untouched");
            return Ok(Reconciliation::Skipped(SkipReason::NoTimesheet { day_id: day.id }));
        };

        let slot = resolve_slot(self.store.as_ref(), block.user_id, block.start_time).await?;

        // --- Compute ---
        let deltas = self.weights.deltas(&slot, &Occupant::from(&task), change);
        debug!(
            ?change,
            occupants = slot.occupants.len(),
            days = deltas.len(),
            "Computed slot deltas"
        );

        // --- Upsert ---
        let mut batch = LedgerBatch::open(self.store.as_ref()).await?;
        let mut updated = BTreeSet::from([timesheet.id]);
        for (day_id, codes) in &deltas {
            if *day_id == day.id {
                batch.apply(timesheet.id, &day, codes).await?;
                continue;
            }
            // another of the user's days holds a block at the same instant
            let Some(other) = self.store.find_tracked_day(*day_id).await? else {
                warn!(%day_id, "Slot occupant belongs to an unknown day; its share is not booked");
                continue;
            };
            let other_sheet = self.resolve_timesheet(&other).await?;
            batch.apply(other_sheet.id, &other, codes).await?;
            updated.insert(other_sheet.id);
        }
        let charges_touched = batch.commit().await?;

        // --- Notify ---
        for timesheet_id in updated {
            self.publish(timesheet_id);
        }
        Ok(Reconciliation::Applied {
            timesheet_id: timesheet.id,
            charges_touched,
        })
    }
}
