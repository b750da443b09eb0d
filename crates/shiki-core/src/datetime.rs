use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{StoreError, StoreResult};

/// Combines a calendar date with optional start/end times into the instants
/// stored on an event. No start time means an all-day event anchored at
/// midnight.
pub fn combine(
    date: NaiveDate,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
) -> (DateTime<Utc>, Option<DateTime<Utc>>, bool) {
    let all_day = start_time.is_none();
    let start = date
        .and_time(start_time.unwrap_or(NaiveTime::MIN))
        .and_utc();
    let end = end_time.map(|time| date.and_time(time).and_utc());
    (start, end, all_day)
}

pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn parse_date(input: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| StoreError::Validation(format!("expected date as YYYY-MM-DD, got: {input}")))
}

pub fn parse_time(input: &str) -> StoreResult<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| StoreError::Validation(format!("expected time as HH:MM, got: {input}")))
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn combine_without_start_time_is_all_day() {
        let date = parse_date("2025-03-01").expect("date");
        let (start, end, all_day) = combine(date, None, None);
        assert!(all_day);
        assert_eq!(start, day_start(date));
        assert_eq!(end, None);
    }

    #[test]
    fn combine_with_times_keeps_both_instants() {
        let date = parse_date("2025-03-01").expect("date");
        let start_time = parse_time("13:30").expect("time");
        let end_time = parse_time("15:00").expect("time");

        let (start, end, all_day) = combine(date, Some(start_time), Some(end_time));
        assert!(!all_day);
        assert_eq!(start.time().hour(), 13);
        assert_eq!(end.expect("end").time().hour(), 15);
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert!(parse_date("03/01/2025").is_err());
        assert!(parse_time("1pm").is_err());
    }
}
