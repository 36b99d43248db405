//! Quota reset schedule.
//!
//! With a known registration date the quota resets monthly on that
//! day-of-month, clamped to the month length. Without one, resets fall on the
//! first of next month shifted by `7 × (index mod 4)` days so credentials do not all
//! refresh together.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)))
}

fn add_months(year: i32, month: u32, n: u32) -> (i32, u32) {
    let zero_based = month - 1 + n;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

/// Next reset date strictly after `today`.
pub fn next_reset_date(today: NaiveDate, registered_on: Option<NaiveDate>, index: usize) -> NaiveDate {
    match registered_on {
        Some(reg) => {
            let anchor = reg.day();
            let this_month = clamped_date(today.year(), today.month(), anchor);
            match this_month {
                Some(d) if d > today => d,
                _ => {
                    let (y, m) = add_months(today.year(), today.month(), 1);
                    clamped_date(y, m, anchor).unwrap_or(today + Duration::days(30))
                }
            }
        }
        None => {
            let (y, m) = add_months(today.year(), today.month(), 1);
            let first = NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(today + Duration::days(30));
            first + Duration::days(7 * (index as i64 % 4))
        }
    }
}

/// Next reset instant (midnight in the reporting offset) strictly after `now`.
pub fn next_reset_at(
    now: DateTime<Utc>,
    registered_on: Option<NaiveDate>,
    index: usize,
    offset: FixedOffset,
) -> DateTime<Utc> {
    let today = now.with_timezone(&offset).date_naive();
    let date = next_reset_date(today, registered_on, index);
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map_or(now + Duration::days(30), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_registration_day_later_this_month() {
        assert_eq!(next_reset_date(d(2026, 4, 3), Some(d(2025, 1, 15)), 0), d(2026, 4, 15));
    }

    #[test]
    fn test_registration_day_passed_rolls_to_next_month() {
        assert_eq!(next_reset_date(d(2026, 4, 15), Some(d(2025, 1, 15)), 0), d(2026, 5, 15));
        assert_eq!(next_reset_date(d(2026, 12, 20), Some(d(2025, 1, 15)), 0), d(2027, 1, 15));
    }

    #[test]
    fn test_registration_day_clamped_to_month_length() {
        assert_eq!(next_reset_date(d(2026, 1, 31), Some(d(2025, 3, 31)), 0), d(2026, 2, 28));
        assert_eq!(next_reset_date(d(2026, 2, 10), Some(d(2025, 3, 31)), 0), d(2026, 2, 28));
    }

    #[test]
    fn test_unregistered_resets_are_staggered() {
        assert_eq!(next_reset_date(d(2026, 4, 3), None, 0), d(2026, 5, 1));
        assert_eq!(next_reset_date(d(2026, 4, 3), None, 1), d(2026, 5, 8));
        assert_eq!(next_reset_date(d(2026, 12, 3), None, 2), d(2027, 1, 15));
    }

    #[test]
    fn test_reset_instant_is_local_midnight() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 4, 30, 17, 0, 0).unwrap(); // May 1st 01:00 at +08
        let at = next_reset_at(now, None, 0, offset);
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 5, 31, 16, 0, 0).unwrap());
    }
}
