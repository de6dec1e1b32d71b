//! Named query windows for uptime statistics.
//!
//! Fixed-day windows subtract an exact number of 24-hour days; the
//! calendar windows subtract months or years and therefore honor variable
//! month lengths and leap years.

use chrono::{DateTime, Days, Duration, Months, Utc};

/// A named time window ending at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UptimeWindow {
    SevenDays,
    ThirtyDays,
    SixtyDays,
    NinetyDays,
    OneHundredTwentyDays,
    LastMonth,
    Last90Days,
    LastYear,
}

impl UptimeWindow {
    /// Resolve the window to an inclusive `[from, to]` range ending at `now`.
    ///
    /// Calendar subtraction clamps to the nearest valid day, so last-month
    /// from Mar 31 starts on Feb 28 (or Feb 29 in a leap year).
    pub fn range(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = match self {
            UptimeWindow::SevenDays => now - Duration::days(7),
            UptimeWindow::ThirtyDays => now - Duration::days(30),
            UptimeWindow::SixtyDays => now - Duration::days(60),
            UptimeWindow::NinetyDays => now - Duration::days(90),
            UptimeWindow::OneHundredTwentyDays => now - Duration::days(120),
            UptimeWindow::LastMonth => now.checked_sub_months(Months::new(1)).unwrap_or(now),
            UptimeWindow::Last90Days => now.checked_sub_days(Days::new(90)).unwrap_or(now),
            UptimeWindow::LastYear => now.checked_sub_months(Months::new(12)).unwrap_or(now),
        };
        (from, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_day_windows() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap();

        let (from, to) = UptimeWindow::SevenDays.range(now);
        assert_eq!(from, now - Duration::days(7));
        assert_eq!(to, now);

        let (from, _) = UptimeWindow::OneHundredTwentyDays.range(now);
        assert_eq!(from, now - Duration::days(120));
    }

    #[test]
    fn test_last_month_honors_month_lengths() {
        // Jan 31 minus one month clamps to Dec 31, not a fixed 30-day offset
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 8, 0, 0).unwrap();
        let (from, _) = UptimeWindow::LastMonth.range(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2023, 12, 31, 8, 0, 0).unwrap());

        // Mar 31 minus one month clamps to Feb 29 in a leap year
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 8, 0, 0).unwrap();
        let (from, _) = UptimeWindow::LastMonth.range(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_last_year_handles_leap_day() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        let (from, _) = UptimeWindow::LastYear.range(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2023, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_last_90_days_spans_calendar_days() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let (from, _) = UptimeWindow::Last90Days.range(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 17, 0, 0, 0).unwrap());
    }
}
