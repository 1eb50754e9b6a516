//! services/tracker/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RecordStore` port from the core crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use timecharge_core::domain::{DayMode, TimeCharge, Timesheet, TrackedDay, TrackedTask};
use timecharge_core::ports::{
    LedgerTransaction, PortError, PortResult, RecordStore, SlotBlock, SlotStart,
};
use uuid::Uuid;

/// Postgres error code for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RecordStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            PortError::Conflict(db.message().to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DayRecord {
    id: Uuid,
    user_id: Uuid,
    date: NaiveDate,
    mode: String,
    timesheet_id: Option<Uuid>,
}
impl DayRecord {
    fn to_domain(self) -> PortResult<TrackedDay> {
        let mode = self
            .mode
            .parse::<DayMode>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(TrackedDay {
            id: self.id,
            user_id: self.user_id,
            date: self.date,
            mode,
            timesheet_id: self.timesheet_id,
        })
    }
}

#[derive(FromRow)]
struct TaskRecord {
    id: Uuid,
    day_id: Uuid,
    user_id: Uuid,
    notes: Option<String>,
    overtime_enabled: bool,
}
impl TaskRecord {
    fn to_domain(self, charge_code_ids: Vec<Uuid>) -> TrackedTask {
        TrackedTask {
            id: self.id,
            day_id: self.day_id,
            user_id: self.user_id,
            notes: self.notes,
            overtime_enabled: self.overtime_enabled,
            charge_code_ids,
        }
    }
}

#[derive(FromRow)]
struct SlotBlockRecord {
    block_id: Uuid,
    task_id: Uuid,
}
impl SlotBlockRecord {
    fn to_domain(self) -> SlotBlock {
        SlotBlock {
            block_id: self.block_id,
            task_id: self.task_id,
        }
    }
}

#[derive(FromRow)]
struct SlotStartRecord {
    day_id: Uuid,
    start_time: DateTime<Utc>,
}
impl SlotStartRecord {
    fn to_domain(self) -> SlotStart {
        SlotStart {
            day_id: self.day_id,
            start_time: self.start_time,
        }
    }
}

#[derive(FromRow)]
struct TimesheetRecord {
    id: Uuid,
    user_id: Uuid,
    week_ending_date: NaiveDate,
}
impl TimesheetRecord {
    fn to_domain(self) -> Timesheet {
        Timesheet {
            id: self.id,
            user_id: self.user_id,
            week_ending_date: self.week_ending_date,
        }
    }
}

#[derive(FromRow)]
struct TimeChargeRecord {
    id: Uuid,
    timesheet_id: Uuid,
    day_id: Uuid,
    charge_code_id: Uuid,
    date: NaiveDate,
    value: f64,
}
impl TimeChargeRecord {
    fn to_domain(self) -> TimeCharge {
        TimeCharge {
            id: self.id,
            timesheet_id: self.timesheet_id,
            day_id: self.day_id,
            charge_code_id: self.charge_code_id,
            date: self.date,
            value: self.value,
        }
    }
}

const TIMESHEET_COLUMNS: &str = "id, user_id, week_ending_date";
const CHARGE_COLUMNS: &str = "id, timesheet_id, day_id, charge_code_id, date, value";

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for DbAdapter {
    async fn find_tracked_day(&self, day_id: Uuid) -> PortResult<Option<TrackedDay>> {
        let record = sqlx::query_as::<_, DayRecord>(
            "SELECT id, user_id, date, mode, timesheet_id FROM tracked_days WHERE id = $1",
        )
        .bind(day_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        record.map(DayRecord::to_domain).transpose()
    }

    async fn find_task(&self, task_id: Uuid) -> PortResult<Option<TrackedTask>> {
        let Some(record) = sqlx::query_as::<_, TaskRecord>(
            "SELECT id, day_id, user_id, notes, overtime_enabled FROM tracked_tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        else {
            return Ok(None);
        };

        let charge_code_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT charge_code_id FROM task_charge_codes WHERE task_id = $1 ORDER BY charge_code_id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(Some(record.to_domain(charge_code_ids)))
    }

    async fn find_time_blocks_at(
        &self,
        user_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> PortResult<Vec<SlotBlock>> {
        let records = sqlx::query_as::<_, SlotBlockRecord>(
            "SELECT id AS block_id, task_id FROM time_blocks WHERE user_id = $1 AND start_time = $2",
        )
        .bind(user_id)
        .bind(start_time)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_distinct_block_start_times(
        &self,
        timesheet_id: Uuid,
    ) -> PortResult<Vec<SlotStart>> {
        let records = sqlx::query_as::<_, SlotStartRecord>(
            "SELECT DISTINCT t.day_id, b.start_time \
             FROM time_blocks b \
             JOIN tracked_tasks t ON t.id = b.task_id \
             JOIN tracked_days d ON d.id = t.day_id \
             WHERE d.timesheet_id = $1 \
             ORDER BY t.day_id, b.start_time",
        )
        .bind(timesheet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn find_timesheet(&self, timesheet_id: Uuid) -> PortResult<Option<Timesheet>> {
        let record = sqlx::query_as::<_, TimesheetRecord>(&format!(
            "SELECT {} FROM timesheets WHERE id = $1",
            TIMESHEET_COLUMNS
        ))
        .bind(timesheet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn find_or_create_timesheet(
        &self,
        user_id: Uuid,
        week_ending_date: NaiveDate,
    ) -> PortResult<Timesheet> {
        sqlx::query(
            "INSERT INTO timesheets (id, user_id, week_ending_date) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, week_ending_date) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(week_ending_date)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        let record = sqlx::query_as::<_, TimesheetRecord>(&format!(
            "SELECT {} FROM timesheets WHERE user_id = $1 AND week_ending_date = $2",
            TIMESHEET_COLUMNS
        ))
        .bind(user_id)
        .bind(week_ending_date)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(record.to_domain())
    }

    async fn assign_timesheet(&self, day_id: Uuid, timesheet_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE tracked_days SET timesheet_id = $1 WHERE id = $2")
            .bind(timesheet_id)
            .bind(day_id)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Tracked day {} not found", day_id)));
        }
        Ok(())
    }

    async fn list_timesheets(&self, user_id: Option<Uuid>) -> PortResult<Vec<Timesheet>> {
        let records = sqlx::query_as::<_, TimesheetRecord>(&format!(
            "SELECT {} FROM timesheets WHERE ($1::uuid IS NULL OR user_id = $1) \
             ORDER BY week_ending_date, user_id",
            TIMESHEET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_time_charges(&self, timesheet_id: Uuid) -> PortResult<Vec<TimeCharge>> {
        let records = sqlx::query_as::<_, TimeChargeRecord>(&format!(
            "SELECT {} FROM time_charges WHERE timesheet_id = $1 ORDER BY date, charge_code_id",
            CHARGE_COLUMNS
        ))
        .bind(timesheet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn begin(&self) -> PortResult<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await.map_err(port_error)?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }
}

//=========================================================================================
// Ledger Transaction
//=========================================================================================

/// Ledger writes inside one Postgres transaction. Rolled back by sqlx if dropped.
struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn find_or_create_time_charge(
        &mut self,
        timesheet_id: Uuid,
        day: &TrackedDay,
        charge_code_id: Uuid,
    ) -> PortResult<TimeCharge> {
        sqlx::query(
            "INSERT INTO time_charges (id, timesheet_id, day_id, charge_code_id, date, value) \
             VALUES ($1, $2, $3, $4, $5, 0) \
             ON CONFLICT (timesheet_id, day_id, charge_code_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(timesheet_id)
        .bind(day.id)
        .bind(charge_code_id)
        .bind(day.date)
        .execute(&mut *self.tx)
        .await
        .map_err(port_error)?;

        let record = sqlx::query_as::<_, TimeChargeRecord>(&format!(
            "SELECT {} FROM time_charges \
             WHERE timesheet_id = $1 AND day_id = $2 AND charge_code_id = $3 FOR UPDATE",
            CHARGE_COLUMNS
        ))
        .bind(timesheet_id)
        .bind(day.id)
        .bind(charge_code_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(port_error)?;

        Ok(record.to_domain())
    }

    async fn save_time_charge(&mut self, charge: &TimeCharge) -> PortResult<()> {
        sqlx::query("UPDATE time_charges SET value = $1 WHERE id = $2")
            .bind(charge.value)
            .bind(charge.id)
            .execute(&mut *self.tx)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn delete_time_charges(&mut self, timesheet_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM time_charges WHERE timesheet_id = $1")
            .bind(timesheet_id)
            .execute(&mut *self.tx)
            .await
            .map_err(port_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(port_error)
    }
}
