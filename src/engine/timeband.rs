use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// A start/end pair on the 24-hour clock. When start >= end the band crosses
/// midnight (night shift) and membership is tested over the split ranges
/// [start, 24:00) and [00:00, end).
///
/// Shift windows, location-settings windows and the check-in gate all share
/// this one primitive.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TimeBand {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeBand {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn wraps(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.wraps() {
            t >= self.start || t < self.end
        } else {
            self.start <= t && t < self.end
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        let span = if self.wraps() {
            Duration::days(1) - (self.start - self.end)
        } else {
            self.end - self.start
        };
        span.num_seconds() as f64 / 60.0
    }

    /// Anchors the band to a calendar date. For a wrapping band the end
    /// lands on the following day.
    pub fn window_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start);
        let end = if self.wraps() {
            (date + Duration::days(1)).and_time(self.end)
        } else {
            date.and_time(self.end)
        };
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_band_membership() {
        let band = TimeBand::new(t(9, 0), t(17, 0));
        assert!(!band.wraps());
        assert!(band.contains(t(9, 0)));
        assert!(band.contains(t(12, 30)));
        assert!(!band.contains(t(17, 0)));
        assert!(!band.contains(t(8, 59)));
    }

    #[test]
    fn night_band_membership() {
        // 22:00 -> 06:00 crosses midnight
        let band = TimeBand::new(t(22, 0), t(6, 0));
        assert!(band.wraps());
        assert!(band.contains(t(23, 30)));
        assert!(band.contains(t(2, 0)));
        assert!(!band.contains(t(12, 0)));
        assert!(!band.contains(t(6, 0)));
    }

    #[test]
    fn durations() {
        assert_eq!(TimeBand::new(t(9, 0), t(17, 0)).duration_minutes(), 480.0);
        assert_eq!(TimeBand::new(t(22, 0), t(6, 0)).duration_minutes(), 480.0);
    }

    #[test]
    fn night_window_ends_next_day() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let (start, end) = TimeBand::new(t(22, 0), t(6, 0)).window_on(date);
        assert_eq!(start, date.and_time(t(22, 0)));
        assert_eq!(
            end,
            NaiveDate::from_ymd_opt(2026, 8, 4).unwrap().and_time(t(6, 0))
        );
    }

    #[test]
    fn day_window_same_day() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let (start, end) = TimeBand::new(t(9, 0), t(17, 0)).window_on(date);
        assert_eq!(start, date.and_time(t(9, 0)));
        assert_eq!(end, date.and_time(t(17, 0)));
    }
}
