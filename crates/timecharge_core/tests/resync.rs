mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{assert_minutes, at, date, Fixture, EPS};
use std::collections::HashSet;
use timecharge_core::{DayMode, Reconciliation, RecordStore, SkipReason, TimeCharge};
use uuid::Uuid;

#[tokio::test]
async fn resync_twice_yields_identical_rows() {
    let fx = Fixture::new().await;
    let (a, b, c) = (fx.code("a"), fx.code("b"), fx.code("c"));
    let t1 = fx.task(&[a]);
    let t2 = fx.task(&[b, c]);
    let t3 = fx.task(&[a, c]);
    fx.add_block(&t1, at(9, 0)).await;
    fx.add_block(&t2, at(9, 0)).await;
    fx.add_block(&t3, at(9, 0)).await;
    fx.add_block(&t2, at(9, 15)).await;
    fx.add_block(&t3, at(9, 15)).await;

    let incremental = fx.values().await;

    fx.engine.resync_timesheet(fx.timesheet.id).await.unwrap();
    let first: Vec<_> = fx
        .charges()
        .await
        .into_iter()
        .map(|c| (c.key(), c.date, c.value.to_bits()))
        .collect();
    fx.engine.resync_timesheet(fx.timesheet.id).await.unwrap();
    let second: Vec<_> = fx
        .charges()
        .await
        .into_iter()
        .map(|c| (c.key(), c.date, c.value.to_bits()))
        .collect();

    assert_eq!(first, second);

    // the rebuild agrees with what the incremental path accumulated
    let rebuilt = fx.values().await;
    for (code, minutes) in incremental {
        assert_minutes(&rebuilt, code, minutes);
    }
}

#[tokio::test]
async fn charge_code_change_leaves_no_orphan_rows() {
    let fx = Fixture::new().await;
    let (a, b, c) = (fx.code("a"), fx.code("b"), fx.code("c"));
    let task_a = fx.task(&[a]);
    let task_b = fx.task(&[b]);
    fx.add_block(&task_a, at(9, 0)).await;
    fx.add_block(&task_a, at(9, 15)).await;
    fx.add_block(&task_b, at(9, 0)).await;

    let task_a = fx.store.set_task_charge_codes(task_a.id, &[c]).unwrap();
    let outcome = fx.engine.on_task_charge_codes_changed(&task_a).await.unwrap();
    assert!(outcome.is_applied());

    let values = fx.values().await;
    assert!(!values.contains_key(&a));
    assert_minutes(&values, b, 7.5);
    assert_minutes(&values, c, 22.5);

    let in_use: HashSet<Uuid> = [b, c].into();
    for charge in fx.charges().await {
        assert!(in_use.contains(&charge.charge_code_id));
    }
}

#[tokio::test]
async fn deleting_a_task_hands_its_share_back() {
    let fx = Fixture::new().await;
    let (a, b) = (fx.code("a"), fx.code("b"));
    let task_a = fx.task(&[a]);
    let task_b = fx.task(&[b]);
    fx.add_block(&task_a, at(9, 0)).await;
    fx.add_block(&task_b, at(9, 0)).await;
    fx.add_block(&task_a, at(9, 15)).await;

    let removed = fx.store.remove_task(task_a.id).unwrap();
    fx.engine.on_task_deleted_with_blocks(&removed).await.unwrap();

    let values = fx.values().await;
    assert!(!values.contains_key(&a));
    assert_minutes(&values, b, 15.0);
}

#[tokio::test]
async fn removing_every_code_clears_the_ledger() {
    let fx = Fixture::new().await;
    let a = fx.code("a");
    let task = fx.task(&[a]);
    fx.add_block(&task, at(9, 0)).await;

    let task = fx.store.set_task_charge_codes(task.id, &[]).unwrap();
    let outcome = fx.engine.on_task_charge_codes_changed(&task).await.unwrap();

    assert_eq!(
        outcome,
        Reconciliation::Applied {
            timesheet_id: fx.timesheet.id,
            charges_touched: 0,
        }
    );
    assert!(fx.charges().await.is_empty());
}

#[tokio::test]
async fn resync_creates_the_timesheet_on_first_touch() {
    let fx = Fixture::new().await;
    let a = fx.code("a");
    let user_id = Uuid::new_v4();
    let day = fx
        .store
        .add_day(user_id, date(2026, 12, 30), DayMode::Normal)
        .unwrap();
    let task = fx.store.add_task(day.id, &[a]).unwrap();
    let start = Utc.with_ymd_and_hms(2026, 12, 30, 9, 0, 0).unwrap();
    let block = fx.store.add_block(task.id, start).unwrap();

    // without a timesheet the incremental path has nowhere to write
    let skipped = fx.engine.on_time_block_created(&block).await.unwrap();
    assert_eq!(
        skipped,
        Reconciliation::Skipped(SkipReason::NoTimesheet { day_id: day.id })
    );

    let outcome = fx.engine.on_task_charge_codes_changed(&task).await.unwrap();
    let Reconciliation::Applied { timesheet_id, .. } = outcome else {
        panic!("expected a rebuild, got {:?}", outcome);
    };

    let timesheet = fx.store.find_timesheet(timesheet_id).await.unwrap().unwrap();
    assert_eq!(timesheet.user_id, user_id);
    assert_eq!(timesheet.week_ending_date, date(2026, 12, 31));

    let charges = fx.engine.time_charges(timesheet_id).await.unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].day_id, day.id);
    assert_eq!(charges[0].value, 15.0);
}

#[tokio::test]
async fn resync_covers_every_day_of_the_timesheet() {
    let fx = Fixture::new().await;
    let a = fx.code("a");
    let tuesday = fx
        .store
        .add_day(fx.user_id, date(2026, 10, 20), DayMode::Normal)
        .unwrap();
    fx.engine.timesheet_for_day(tuesday.id).await.unwrap();

    let monday_task = fx.task(&[a]);
    let tuesday_task = fx.store.add_task(tuesday.id, &[a]).unwrap();
    fx.add_block(&monday_task, at(9, 0)).await;
    let tuesday_start = Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap();
    fx.add_block(&tuesday_task, tuesday_start).await;
    fx.add_block(&tuesday_task, tuesday_start + Duration::minutes(15))
        .await;

    fx.engine.on_task_charge_codes_changed(&monday_task).await.unwrap();

    let charges = fx.charges().await;
    assert_eq!(charges.len(), 2);
    assert_eq!(charges[0].date, date(2026, 10, 19));
    assert_eq!(charges[0].value, 15.0);
    assert_eq!(charges[1].date, date(2026, 10, 20));
    assert_eq!(charges[1].value, 30.0);
}

#[tokio::test]
async fn unknown_targets_are_no_ops() {
    let fx = Fixture::new().await;
    let missing = Uuid::new_v4();

    let outcome = fx.engine.resync_timesheet(missing).await.unwrap();
    assert_eq!(
        outcome,
        Reconciliation::Skipped(SkipReason::UnknownTimesheet {
            timesheet_id: missing
        })
    );

    let mut orphan = fx.task(&[]);
    fx.store.remove_task(orphan.id).unwrap();
    orphan.day_id = missing;
    let outcome = fx.engine.on_task_deleted_with_blocks(&orphan).await.unwrap();
    assert_eq!(
        outcome,
        Reconciliation::Skipped(SkipReason::UnknownDay { day_id: missing })
    );
}

fn total(charges: &[TimeCharge]) -> f64 {
    charges.iter().map(|c| c.value).sum()
}

#[tokio::test]
async fn blocks_of_two_days_at_one_instant_share_a_single_slot() {
    let fx = Fixture::new().await;
    let (a, b) = (fx.code("a"), fx.code("b"));
    let tuesday = fx
        .store
        .add_day(fx.user_id, date(2026, 10, 20), DayMode::Normal)
        .unwrap();
    fx.engine.timesheet_for_day(tuesday.id).await.unwrap();
    let monday_task = fx.task(&[a]);
    let tuesday_task = fx.store.add_task(tuesday.id, &[b]).unwrap();

    fx.add_block(&monday_task, at(9, 0)).await;
    fx.add_block(&tuesday_task, at(9, 0)).await;
    let incremental = fx.charges().await;

    fx.engine.resync_timesheet(fx.timesheet.id).await.unwrap();
    let rebuilt = fx.charges().await;

    for charges in [&incremental, &rebuilt] {
        assert_eq!(charges.len(), 2);
        assert!((total(charges) - 15.0).abs() < EPS);
        for charge in charges.iter() {
            let own_day = if charge.charge_code_id == a {
                fx.day.id
            } else {
                tuesday.id
            };
            assert_eq!(charge.day_id, own_day);
            assert!((charge.value - 7.5).abs() < EPS);
        }
    }
}

#[tokio::test]
async fn shares_of_another_weeks_day_go_to_that_weeks_timesheet() {
    let fx = Fixture::new().await;
    let (a, b) = (fx.code("a"), fx.code("b"));
    let next_monday = fx
        .store
        .add_day(fx.user_id, date(2026, 10, 26), DayMode::Normal)
        .unwrap();
    let next_sheet = fx
        .engine
        .timesheet_for_day(next_monday.id)
        .await
        .unwrap()
        .unwrap();
    let this_task = fx.task(&[a]);
    let next_task = fx.store.add_task(next_monday.id, &[b]).unwrap();

    fx.add_block(&this_task, at(9, 0)).await;
    let mut events = fx.engine.subscribe();
    fx.add_block(&next_task, at(9, 0)).await;

    let mut updated = vec![
        events.try_recv().unwrap().timesheet_id,
        events.try_recv().unwrap().timesheet_id,
    ];
    updated.sort();
    let mut expected = vec![fx.timesheet.id, next_sheet.id];
    expected.sort();
    assert_eq!(updated, expected);
    assert!((total(&fx.store.all_time_charges()) - 15.0).abs() < EPS);

    fx.engine.resync_timesheet(fx.timesheet.id).await.unwrap();
    fx.engine.resync_timesheet(next_sheet.id).await.unwrap();

    assert!((total(&fx.store.all_time_charges()) - 15.0).abs() < EPS);
    assert_minutes(&fx.values().await, a, 7.5);
    let next_charges = fx.engine.time_charges(next_sheet.id).await.unwrap();
    assert_eq!(next_charges.len(), 1);
    assert_eq!(next_charges[0].day_id, next_monday.id);
    assert!((next_charges[0].value - 7.5).abs() < EPS);
}
