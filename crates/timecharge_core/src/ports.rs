//! crates/timecharge_core/src/ports.rs
//!
//! Defines the record-store contract the reconciliation engine runs against.
//! The engine never persists anything itself; every read and write crosses
//! this boundary, so any database (or the in-memory store) can sit behind it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{TimeCharge, Timesheet, TrackedDay, TrackedTask};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the underlying store.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// One occupant of a time slot: a block and the task that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBlock {
    pub block_id: Uuid,
    pub task_id: Uuid,
}

/// A distinct `(day, start_time)` pair carrying at least one block on a timesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotStart {
    pub day_id: Uuid,
    pub start_time: DateTime<Utc>,
}

//=========================================================================================
// Store Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Days and Tasks ---
    async fn find_tracked_day(&self, day_id: Uuid) -> PortResult<Option<TrackedDay>>;

    /// The task together with its current charge code assignment.
    async fn find_task(&self, task_id: Uuid) -> PortResult<Option<TrackedTask>>;

    // --- Time Slots ---
    /// Every block of `user_id` starting exactly at `start_time`, across all tasks.
    async fn find_time_blocks_at(
        &self,
        user_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> PortResult<Vec<SlotBlock>>;

    async fn list_distinct_block_start_times(&self, timesheet_id: Uuid)
        -> PortResult<Vec<SlotStart>>;

    // --- Timesheets ---
    async fn find_timesheet(&self, timesheet_id: Uuid) -> PortResult<Option<Timesheet>>;

    async fn find_or_create_timesheet(
        &self,
        user_id: Uuid,
        week_ending_date: NaiveDate,
    ) -> PortResult<Timesheet>;

    async fn assign_timesheet(&self, day_id: Uuid, timesheet_id: Uuid) -> PortResult<()>;

    async fn list_timesheets(&self, user_id: Option<Uuid>) -> PortResult<Vec<Timesheet>>;

    // --- Ledger ---
    /// Read-only listing; callers do not need the mutation lock.
    async fn list_time_charges(&self, timesheet_id: Uuid) -> PortResult<Vec<TimeCharge>>;

    /// Opens an all-or-nothing batch for ledger writes.
    async fn begin(&self) -> PortResult<Box<dyn LedgerTransaction>>;
}

/// A batch of ledger writes. Dropping it without `commit` discards every write.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Finds the row for the key triple, or creates it with `value = 0` and `date = day.date`.
    async fn find_or_create_time_charge(
        &mut self,
        timesheet_id: Uuid,
        day: &TrackedDay,
        charge_code_id: Uuid,
    ) -> PortResult<TimeCharge>;

    async fn save_time_charge(&mut self, charge: &TimeCharge) -> PortResult<()>;

    /// Removes every ledger row of a timesheet, returning how many were removed.
    async fn delete_time_charges(&mut self, timesheet_id: Uuid) -> PortResult<u64>;

    async fn commit(self: Box<Self>) -> PortResult<()>;
}
