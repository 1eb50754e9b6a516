//! crates/timecharge_core/src/error.rs
//!
//! Errors and outcomes of a reconciliation run.

use uuid::Uuid;

use crate::ports::PortError;

/// A reconciliation that could not complete. The ledger is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A read or write against the record store failed.
    #[error("Record store error: {0}")]
    Port(#[from] PortError),

    /// A mutation scope was used for another user's data.
    #[error("Mutation scope for user {scope} cannot reconcile data owned by {owner}")]
    WrongScope { scope: Uuid, owner: Uuid },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Why a reconciliation had nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownTask { task_id: Uuid },
    UnknownDay { day_id: Uuid },
    UnknownTimesheet { timesheet_id: Uuid },
    /// The day has never been attached to a timesheet.
    NoTimesheet { day_id: Uuid },
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Applied {
        timesheet_id: Uuid,
        charges_touched: usize,
    },
    Skipped(SkipReason),
}

impl Reconciliation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Reconciliation::Applied { .. })
    }
}
