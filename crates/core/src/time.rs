use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Source of "now" for services and tests.
///
/// Study sessions measure answer latency and the scheduler stamps
/// `last_attempt_at`, so everything time-dependent goes through a `Clock`
/// rather than calling `Utc::now()` directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Moves a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Half-open UTC bounds `[start, end)` of the calendar day containing `at`.
#[must_use]
pub fn utc_day_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at.date_naive().and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Adds whole days to a timestamp; schedule arithmetic is always in days.
#[must_use]
pub fn add_days(at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    at + Duration::days(i64::from(days))
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(3));
    }

    #[test]
    fn day_bounds_cover_the_day() {
        let (start, end) = utc_day_bounds(fixed_now());
        assert!(start <= fixed_now() && fixed_now() < end);
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(start.date_naive(), fixed_now().date_naive());
    }

    #[test]
    fn add_days_is_calendar_exact() {
        assert_eq!(add_days(fixed_now(), 0), fixed_now());
        assert_eq!(add_days(fixed_now(), 6) - fixed_now(), Duration::days(6));
    }
}
