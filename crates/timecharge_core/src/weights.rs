//! crates/timecharge_core/src/weights.rs
//!
//! Turns the composition of a time slot into per-charge-code minute deltas.
//!
//! A slot of `N` tasks gives each task `D / N` minutes, split evenly over the
//! task's charge codes. When a block enters or leaves a slot, every task's
//! share moves from `D / N_before` to `D / N_after`; the delta for a task is
//! that difference, and the task whose block moved goes from (or to) zero.
//! Each task's delta is grouped under the tracked day that task belongs to.

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::slot::{Occupant, TimeSlot};

/// Minutes represented by one time block.
pub const BLOCK_MINUTES: f64 = 15.0;

/// Minute delta per charge code.
pub type ChargeDeltas = BTreeMap<Uuid, f64>;

/// Charge deltas grouped by tracked day.
pub type DayDeltas = BTreeMap<Uuid, ChargeDeltas>;

/// What happened to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    Added,
    Removed,
    /// Distribute the slot from zero, as during a full rebuild.
    Reset,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightCalculator {
    block_minutes: f64,
}

impl Default for WeightCalculator {
    fn default() -> Self {
        Self::new(BLOCK_MINUTES)
    }
}

impl WeightCalculator {
    pub fn new(block_minutes: f64) -> Self {
        Self { block_minutes }
    }

    /// Minutes each of `occupants` tasks receives. An empty slot shares nothing.
    pub fn share(&self, occupants: usize) -> f64 {
        if occupants == 0 {
            0.0
        } else {
            self.block_minutes / occupants as f64
        }
    }

    /// Deltas caused by `target`'s block being added to or removed from `slot`.
    ///
    /// `slot` may or may not already reflect the change; the target is
    /// excluded from it and counted according to `change`.
    pub fn deltas(&self, slot: &TimeSlot, target: &Occupant, change: SlotChange) -> DayDeltas {
        let others: Vec<&Occupant> = slot
            .occupants
            .iter()
            .filter(|o| o.task_id != target.task_id)
            .collect();
        let n_others = others.len();

        let (before, after, target_delta) = match change {
            SlotChange::Added => {
                let after = self.share(n_others + 1);
                (self.share(n_others), after, after)
            }
            SlotChange::Removed => {
                let before = self.share(n_others + 1);
                (before, self.share(n_others), -before)
            }
            SlotChange::Reset => return self.distribution(slot),
        };

        let mut deltas = DayDeltas::new();
        spread(&mut deltas, target, target_delta);
        if n_others > 0 {
            let diff = after - before;
            for other in others {
                spread(&mut deltas, other, diff);
            }
        }
        deltas
    }

    /// The full from-zero distribution of a slot: every occupant gets `D / N`.
    pub fn distribution(&self, slot: &TimeSlot) -> DayDeltas {
        let share = self.share(slot.occupants.len());
        let mut deltas = DayDeltas::new();
        for occupant in &slot.occupants {
            spread(&mut deltas, occupant, share);
        }
        deltas
    }
}

/// Splits `minutes` evenly over the occupant's charge codes. No codes, no charge.
fn spread(deltas: &mut DayDeltas, occupant: &Occupant, minutes: f64) {
    if occupant.charge_code_ids.is_empty() {
        return;
    }
    let per_code = minutes / occupant.charge_code_ids.len() as f64;
    let day = deltas.entry(occupant.day_id).or_default();
    for code in &occupant.charge_code_ids {
        *day.entry(*code).or_insert(0.0) += per_code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const EPS: f64 = 1e-9;
    const MONDAY: Uuid = Uuid::from_u128(1);
    const TUESDAY: Uuid = Uuid::from_u128(2);

    fn occupant(codes: &[Uuid]) -> Occupant {
        occupant_on(MONDAY, codes)
    }

    fn occupant_on(day_id: Uuid, codes: &[Uuid]) -> Occupant {
        Occupant {
            task_id: Uuid::new_v4(),
            day_id,
            charge_code_ids: codes.to_vec(),
        }
    }

    /// The deltas booked on `MONDAY`.
    fn monday(deltas: DayDeltas) -> ChargeDeltas {
        deltas.get(&MONDAY).cloned().unwrap_or_default()
    }

    fn slot(occupants: &[&Occupant]) -> TimeSlot {
        TimeSlot {
            start_time: Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
            occupants: occupants.iter().map(|o| (*o).clone()).collect(),
        }
    }

    #[test]
    fn lone_block_charges_full_duration_split_over_codes() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let task = occupant(&[a, b]);
        let deltas = monday(WeightCalculator::default().deltas(
            &slot(&[&task]),
            &task,
            SlotChange::Added,
        ));
        assert_eq!(deltas.len(), 2);
        assert!((deltas[&a] - 7.5).abs() < EPS);
        assert!((deltas[&b] - 7.5).abs() < EPS);
    }

    #[test]
    fn joining_a_slot_dilutes_the_existing_occupant() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = occupant(&[a]);
        let second = occupant(&[b]);
        let deltas = monday(WeightCalculator::default().deltas(
            &slot(&[&first, &second]),
            &second,
            SlotChange::Added,
        ));
        assert!((deltas[&a] + 7.5).abs() < EPS);
        assert!((deltas[&b] - 7.5).abs() < EPS);
    }

    #[test]
    fn slot_need_not_already_contain_the_target() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = occupant(&[a]);
        let second = occupant(&[b]);
        let calc = WeightCalculator::default();
        let with = calc.deltas(&slot(&[&first, &second]), &second, SlotChange::Added);
        let without = calc.deltas(&slot(&[&first]), &second, SlotChange::Added);
        assert_eq!(with, without);
    }

    #[test]
    fn leaving_a_slot_enriches_the_rest() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let t1 = occupant(&[a]);
        let t2 = occupant(&[b]);
        let t3 = occupant(&[c]);
        let deltas = monday(WeightCalculator::default().deltas(
            &slot(&[&t1, &t2, &t3]),
            &t3,
            SlotChange::Removed,
        ));
        assert!((deltas[&a] - 2.5).abs() < EPS);
        assert!((deltas[&b] - 2.5).abs() < EPS);
        assert!((deltas[&c] + 5.0).abs() < EPS);
        let total: f64 = deltas.values().sum();
        assert!(total.abs() < EPS);
    }

    #[test]
    fn removing_the_last_block_retracts_its_share() {
        let a = Uuid::new_v4();
        let task = occupant(&[a]);
        let deltas = monday(WeightCalculator::default().deltas(
            &slot(&[]),
            &task,
            SlotChange::Removed,
        ));
        assert!((deltas[&a] + 15.0).abs() < EPS);
    }

    #[test]
    fn tasks_without_codes_contribute_nothing() {
        let a = Uuid::new_v4();
        let coded = occupant(&[a]);
        let uncoded = occupant(&[]);
        let calc = WeightCalculator::default();

        let deltas = monday(calc.deltas(&slot(&[&coded, &uncoded]), &uncoded, SlotChange::Added));
        assert_eq!(deltas.len(), 1);
        assert!((deltas[&a] + 7.5).abs() < EPS);

        let empty = calc.deltas(&slot(&[]), &uncoded, SlotChange::Removed);
        assert!(empty.is_empty());
    }

    #[test]
    fn shared_code_accumulates_across_tasks() {
        let a = Uuid::new_v4();
        let t1 = occupant(&[a]);
        let t2 = occupant(&[a]);
        let deltas = monday(WeightCalculator::default().distribution(&slot(&[&t1, &t2])));
        assert_eq!(deltas.len(), 1);
        assert!((deltas[&a] - 15.0).abs() < EPS);
    }

    #[test]
    fn reset_assigns_full_current_shares() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let t1 = occupant(&[a]);
        let t2 = occupant(&[b, c]);
        let s = slot(&[&t1, &t2]);
        let calc = WeightCalculator::default();
        let deltas = calc.deltas(&s, &t1, SlotChange::Reset);
        assert_eq!(deltas, calc.distribution(&s));
        let deltas = monday(deltas);
        assert!((deltas[&a] - 7.5).abs() < EPS);
        assert!((deltas[&b] - 3.75).abs() < EPS);
        assert!((deltas[&c] - 3.75).abs() < EPS);
    }

    #[test]
    fn empty_slot_has_no_share() {
        let calc = WeightCalculator::default();
        assert_eq!(calc.share(0), 0.0);
        assert!(calc.distribution(&slot(&[])).is_empty());
    }

    #[test]
    fn occupants_of_other_days_are_booked_on_their_own_day() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = occupant_on(MONDAY, &[a]);
        let second = occupant_on(TUESDAY, &[b]);
        let calc = WeightCalculator::default();

        let deltas = calc.deltas(&slot(&[&first, &second]), &second, SlotChange::Added);
        assert_eq!(deltas.len(), 2);
        assert!((deltas[&MONDAY][&a] + 7.5).abs() < EPS);
        assert!((deltas[&TUESDAY][&b] - 7.5).abs() < EPS);

        let full = calc.distribution(&slot(&[&first, &second]));
        let total: f64 = full.values().flat_map(|codes| codes.values()).sum();
        assert!((total - 15.0).abs() < EPS);
        assert!((full[&MONDAY][&a] - 7.5).abs() < EPS);
        assert!((full[&TUESDAY][&b] - 7.5).abs() < EPS);
    }
}
