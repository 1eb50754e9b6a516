//! crates/timecharge_core/src/domain.rs
//!
//! Defines the pure, core data structures for time tracking and charging.
//! These structs are independent of any database or serialization format,
//! apart from the outgoing notification payload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How a tracked day is classified: a normal working day or one of the leave kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DayMode {
    #[default]
    Normal,
    PublicHoliday,
    PersonalLeave,
    RosteredDayOff,
    AnnualLeave,
}

impl DayMode {
    /// The stored representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            DayMode::Normal => "NORMAL",
            DayMode::PublicHoliday => "HOL_PUBLIC",
            DayMode::PersonalLeave => "HOL_PERSONAL",
            DayMode::RosteredDayOff => "HOL_RDO",
            DayMode::AnnualLeave => "HOL_ANNUAL",
        }
    }
}

impl fmt::Display for DayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown day mode: {0}")]
pub struct ParseDayModeError(String);

impl FromStr for DayMode {
    type Err = ParseDayModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(DayMode::Normal),
            "HOL_PUBLIC" => Ok(DayMode::PublicHoliday),
            "HOL_PERSONAL" => Ok(DayMode::PersonalLeave),
            "HOL_RDO" => Ok(DayMode::RosteredDayOff),
            "HOL_ANNUAL" => Ok(DayMode::AnnualLeave),
            other => Err(ParseDayModeError(other.to_string())),
        }
    }
}

/// One calendar date for one user. Unique per (user, date).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDay {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub mode: DayMode,
    /// Assigned lazily the first time the day's timesheet is resolved.
    pub timesheet_id: Option<Uuid>,
}

/// A unit of work on a day, charged to zero or more charge codes.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTask {
    pub id: Uuid,
    pub day_id: Uuid,
    pub user_id: Uuid,
    pub notes: Option<String>,
    pub overtime_enabled: bool,
    pub charge_code_ids: Vec<Uuid>,
}

impl TrackedTask {
    /// Charge codes with duplicates removed, in a stable order.
    pub fn distinct_charge_codes(&self) -> Vec<Uuid> {
        let mut codes = self.charge_code_ids.clone();
        codes.sort();
        codes.dedup();
        codes
    }
}

/// A fixed-length block of time claimed by a task.
///
/// Blocks of *different* tasks may share a `start_time`; together they form a time slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBlock {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub minutes: Option<i32>,
}

/// A named billing code, referenced by many tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeCode {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub expired: bool,
}

/// A user's week, closed on `week_ending_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct Timesheet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_ending_date: NaiveDate,
}

/// Derived ledger row: minutes charged to one code on one day of one timesheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeCharge {
    pub id: Uuid,
    pub timesheet_id: Uuid,
    pub day_id: Uuid,
    pub charge_code_id: Uuid,
    pub date: NaiveDate,
    pub value: f64,
}

/// Unique key of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChargeKey {
    pub timesheet_id: Uuid,
    pub day_id: Uuid,
    pub charge_code_id: Uuid,
}

impl TimeCharge {
    pub fn key(&self) -> ChargeKey {
        ChargeKey {
            timesheet_id: self.timesheet_id,
            day_id: self.day_id,
            charge_code_id: self.charge_code_id,
        }
    }
}

/// Emitted after every successful reconciliation, for the notification layer to fan out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimesheetUpdated {
    pub timesheet_id: Uuid,
}
