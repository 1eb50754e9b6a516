//! crates/timecharge_core/src/slot.rs
//!
//! Resolves a time slot: every task of a user holding a block at one exact instant.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use crate::domain::TrackedTask;
use crate::ports::{PortResult, RecordStore};

/// A task present in a slot, with the charge codes its share is split across.
///
/// Occupants of one slot may belong to different tracked days; each share
/// is booked on its own task's day.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub task_id: Uuid,
    pub day_id: Uuid,
    pub charge_code_ids: Vec<Uuid>,
}

impl From<&TrackedTask> for Occupant {
    fn from(task: &TrackedTask) -> Self {
        Self {
            task_id: task.id,
            day_id: task.day_id,
            charge_code_ids: task.distinct_charge_codes(),
        }
    }
}

/// All distinct tasks sharing one `start_time`, ordered by task id.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub occupants: Vec<Occupant>,
}

/// Reads the slot fresh from the store. Nothing is cached between calls.
pub async fn resolve_slot(
    store: &dyn RecordStore,
    user_id: Uuid,
    start_time: DateTime<Utc>,
) -> PortResult<TimeSlot> {
    let blocks = store.find_time_blocks_at(user_id, start_time).await?;

    let mut occupants = BTreeMap::new();
    for block in blocks {
        if occupants.contains_key(&block.task_id) {
            continue;
        }
        match store.find_task(block.task_id).await? {
            Some(task) => {
                occupants.insert(task.id, Occupant::from(&task));
            }
            None => warn!(
                block_id = %block.block_id,
                task_id = %block.task_id,
                "Time block refers to a missing task; leaving it out of the slot"
            ),
        }
    }

    Ok(TimeSlot {
        start_time,
        occupants: occupants.into_values().collect(),
    })
}
