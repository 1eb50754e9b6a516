//! crates/timecharge_core/src/week.rs
//!
//! Week arithmetic for timesheets.

use chrono::{Datelike, Days, NaiveDate};

/// The date that closes the timesheet week containing `date`.
///
/// Weeks run Monday to Sunday. A week that straddles New Year is split: the
/// days that belong to the old year close on 31 December.
pub fn week_ending_date(date: NaiveDate) -> NaiveDate {
    let to_sunday = 6 - u64::from(date.weekday().num_days_from_monday());
    let sunday = date.checked_add_days(Days::new(to_sunday)).unwrap_or(date);
    if sunday.year() == date.year() {
        return sunday;
    }
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(sunday)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn mid_year_weeks_close_on_sunday() {
        assert_eq!(week_ending_date(ymd(2026, 10, 19)), ymd(2026, 10, 25));
        assert_eq!(week_ending_date(ymd(2026, 10, 22)), ymd(2026, 10, 25));
    }

    #[test]
    fn sunday_closes_its_own_week() {
        assert_eq!(week_ending_date(ymd(2026, 10, 25)), ymd(2026, 10, 25));
    }

    #[test]
    fn year_end_week_is_split() {
        assert_eq!(week_ending_date(ymd(2025, 12, 30)), ymd(2025, 12, 31));
        assert_eq!(week_ending_date(ymd(2026, 12, 28)), ymd(2026, 12, 31));
        // the new-year half of the same week closes on its Sunday
        assert_eq!(week_ending_date(ymd(2027, 1, 1)), ymd(2027, 1, 3));
    }
}
