// Business-day calendar - deadline arithmetic and local formatting

//! # Business Calendar
//!
//! Deadlines are counted in **business days**: Monday to Friday. Weekends never
//! count and there is no holiday calendar. Day boundaries are taken in the
//! calendar's fixed UTC offset (the office's local time), so a visit entered on
//! Friday evening local time is a Friday visit even if it is already Saturday
//! in UTC.
//!
//! ## Counting convention
//!
//! [`BusinessCalendar::business_days_between`] counts the weekdays after the
//! start date up to and including the end date. The span from a day to itself
//! is zero, so the remaining time at the deadline instant is `0` and one
//! business day past the deadline is `-1`.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

/// Longest deadline a department may carry, roughly fourteen years
pub const MAX_BUSINESS_DAYS: u32 = 3650;

impl Default for BusinessCalendar {
    fn default() -> Self {
        BusinessCalendar { offset: Utc.fix() }
    }
}

impl BusinessCalendar {
    /// Calendar in the given offset from UTC, e.g. `-180` for UTC-3.
    /// Offsets outside ±24h fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        BusinessCalendar { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn is_business_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Move forward `days` business days, keeping the local time of day.
    /// Weekend days are skipped entirely.
    ///
    /// `None` when `days` exceeds [`MAX_BUSINESS_DAYS`] or the result leaves
    /// the representable date range.
    pub fn add_business_days(&self, start: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
        if days > MAX_BUSINESS_DAYS {
            return None;
        }
        let mut current = start;
        let mut added = 0;
        while added < days {
            current = current.checked_add_signed(Duration::days(1))?;
            if Self::is_business_day(self.local_date(current)) {
                added += 1;
            }
        }
        Some(current)
    }

    /// Signed business-day span between two instants, by local date.
    ///
    /// Positive when `to` is later, negative when it is earlier.
    pub fn business_days_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        let from_date = self.local_date(from);
        let to_date = self.local_date(to);

        if to_date >= from_date {
            Self::count_weekdays_after(from_date, to_date)
        } else {
            -Self::count_weekdays_after(to_date, from_date)
        }
    }

    // Weekdays in (start, end]
    fn count_weekdays_after(start: NaiveDate, end: NaiveDate) -> i64 {
        let mut count = 0;
        let mut day = start;
        while day < end {
            day += Duration::days(1);
            if Self::is_business_day(day) {
                count += 1;
            }
        }
        count
    }

    /// UTC instants bounding a local calendar day: `[start, next_start)`
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_of_day(date);
        (start, start + Duration::days(1))
    }

    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let utc = local_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// `dd/mm/yyyy HH:MM` in local time
    pub fn format_datetime(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset)
            .format("%d/%m/%Y %H:%M")
            .to_string()
    }

    /// `dd/mm/yyyy` in local time
    pub fn format_date(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset).format("%d/%m/%Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_friday_plus_three_is_wednesday() {
        let cal = BusinessCalendar::default();
        // 2024-03-01 is a Friday
        let deadline = cal.add_business_days(at(2024, 3, 1, 10), 3).unwrap();
        assert_eq!(deadline, at(2024, 3, 6, 10));
        assert_eq!(deadline.weekday(), Weekday::Wed);
    }

    #[test]
    fn test_add_zero_days_is_identity() {
        let cal = BusinessCalendar::default();
        let start = at(2024, 3, 2, 8); // Saturday
        assert_eq!(cal.add_business_days(start, 0), Some(start));
    }

    #[test]
    fn test_weekend_start_lands_on_weekdays() {
        let cal = BusinessCalendar::default();
        // Saturday + 1 business day = Monday
        assert_eq!(
            cal.add_business_days(at(2024, 3, 2, 8), 1),
            Some(at(2024, 3, 4, 8))
        );
    }

    #[test]
    fn test_add_business_days_rejects_out_of_range() {
        let cal = BusinessCalendar::default();
        assert!(cal.add_business_days(at(2024, 3, 1, 10), u32::MAX).is_none());
        assert!(cal
            .add_business_days(at(2024, 3, 1, 10), MAX_BUSINESS_DAYS)
            .is_some());

        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(2);
        assert!(cal.add_business_days(near_end, 10).is_none());
    }

    #[test]
    fn test_business_days_between_is_signed() {
        let cal = BusinessCalendar::default();
        let wed = at(2024, 3, 6, 10);
        let thu = at(2024, 3, 7, 10);
        let fri = at(2024, 3, 1, 10);

        assert_eq!(cal.business_days_between(wed, wed), 0);
        assert_eq!(cal.business_days_between(thu, wed), -1);
        assert_eq!(cal.business_days_between(fri, wed), 3);
        assert_eq!(cal.business_days_between(wed, fri), -3);
    }

    #[test]
    fn test_weekend_does_not_count_in_span() {
        let cal = BusinessCalendar::default();
        let fri = at(2024, 3, 1, 10);
        let sun = at(2024, 3, 3, 10);
        assert_eq!(cal.business_days_between(fri, sun), 0);
    }

    #[test]
    fn test_local_offset_moves_day_boundary() {
        let cal = BusinessCalendar::with_offset_minutes(-180);
        // 01:00 UTC on Saturday is still Friday 22:00 at UTC-3
        let instant = at(2024, 3, 2, 1);
        assert_eq!(cal.local_date(instant), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(cal.format_datetime(instant), "01/03/2024 22:00");
        assert_eq!(cal.format_date(instant), "01/03/2024");
    }

    #[test]
    fn test_day_bounds_follow_offset() {
        let cal = BusinessCalendar::with_offset_minutes(-180);
        let (start, end) = cal.day_bounds(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(start, at(2024, 3, 1, 3));
        assert_eq!(end, at(2024, 3, 2, 3));
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let cal = BusinessCalendar::with_offset_minutes(100_000);
        assert_eq!(cal.offset().local_minus_utc(), 0);
    }
}
