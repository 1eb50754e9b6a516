pub mod domain;
pub mod engine;
pub mod error;
mod incremental;
pub mod ledger;
pub mod memory;
pub mod ports;
mod resync;
pub mod serializer;
pub mod slot;
pub mod week;
pub mod weights;

pub use domain::{
    ChargeCode, ChargeKey, DayMode, TimeBlock, TimeCharge, Timesheet, TimesheetUpdated,
    TrackedDay, TrackedTask,
};
pub use engine::{Engine, EngineConfig, MutationScope};
pub use error::{EngineError, EngineResult, Reconciliation, SkipReason};
pub use ports::{LedgerTransaction, PortError, PortResult, RecordStore, SlotBlock, SlotStart};
pub use weights::{SlotChange, WeightCalculator, BLOCK_MINUTES};
