//! crates/timecharge_core/src/ledger.rs
//!
//! Access to the `TimeCharge` ledger rows within one all-or-nothing batch.

use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ChargeKey, TimeCharge, TrackedDay};
use crate::ports::{LedgerTransaction, PortError, PortResult, RecordStore};
use crate::weights::ChargeDeltas;

/// Values closer to zero than this are stored as exactly zero.
const ZERO_SNAP: f64 = 1e-9;
/// Final values below this are reported before being clamped.
const NEGATIVE_REPORT: f64 = -1e-6;

/// One reconciliation's worth of ledger writes.
///
/// Intermediate values may go negative while deltas are applied; `commit`
/// settles every touched row before the batch becomes visible. Dropping the
/// batch without committing rolls everything back.
pub struct LedgerBatch {
    tx: Box<dyn LedgerTransaction>,
    rows: HashMap<ChargeKey, TimeCharge>,
}

impl LedgerBatch {
    pub async fn open(store: &dyn RecordStore) -> PortResult<Self> {
        Ok(Self {
            tx: store.begin().await?,
            rows: HashMap::new(),
        })
    }

    /// Finds or creates the row for `(timesheet, day, code)`. Idempotent within the batch.
    pub async fn ensure_charge(
        &mut self,
        timesheet_id: Uuid,
        day: &TrackedDay,
        charge_code_id: Uuid,
    ) -> PortResult<ChargeKey> {
        let key = ChargeKey {
            timesheet_id,
            day_id: day.id,
            charge_code_id,
        };
        if !self.rows.contains_key(&key) {
            let row = self
                .tx
                .find_or_create_time_charge(timesheet_id, day, charge_code_id)
                .await?;
            self.rows.insert(key, row);
        }
        Ok(key)
    }

    /// Adds `delta` to the row's value and writes it. No clamping here.
    pub async fn apply_delta(&mut self, key: ChargeKey, delta: f64) -> PortResult<()> {
        let Some(row) = self.rows.get_mut(&key) else {
            return Err(PortError::NotFound(format!(
                "Ledger row for charge code {} was not loaded",
                key.charge_code_id
            )));
        };
        row.value += delta;
        self.tx.save_time_charge(row).await
    }

    /// Applies a whole delta map to one day of a timesheet.
    pub async fn apply(
        &mut self,
        timesheet_id: Uuid,
        day: &TrackedDay,
        deltas: &ChargeDeltas,
    ) -> PortResult<()> {
        for (code, delta) in deltas {
            let key = self.ensure_charge(timesheet_id, day, *code).await?;
            debug!(charge_code_id = %code, delta, "Applying charge delta");
            self.apply_delta(key, *delta).await?;
        }
        Ok(())
    }

    /// Removes every row of the timesheet, including ones loaded earlier in this batch.
    pub async fn delete_all(&mut self, timesheet_id: Uuid) -> PortResult<u64> {
        self.rows.retain(|key, _| key.timesheet_id != timesheet_id);
        self.tx.delete_time_charges(timesheet_id).await
    }

    /// Settles every touched row and commits. Returns how many rows were touched.
    pub async fn commit(mut self) -> PortResult<usize> {
        let touched = self.rows.len();
        for row in self.rows.values_mut() {
            let settled = settle(row);
            if settled != row.value {
                row.value = settled;
                self.tx.save_time_charge(row).await?;
            }
        }
        self.tx.commit().await?;
        Ok(touched)
    }
}

/// The value a row is allowed to end a batch with.
fn settle(row: &TimeCharge) -> f64 {
    if row.value.abs() < ZERO_SNAP {
        return 0.0;
    }
    if row.value < 0.0 {
        if row.value < NEGATIVE_REPORT {
            warn!(
                charge_code_id = %row.charge_code_id,
                day_id = %row.day_id,
                value = row.value,
                "Ledger row ended a batch negative; clamping to zero"
            );
        }
        return 0.0;
    }
    row.value
}
