use chrono::{Local, NaiveDate};

use crate::model::Ms;

/// Source of "today" for booking-window checks and of record timestamps.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now_ms(&self) -> Ms;
}

/// Local wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_ms(&self) -> Ms {
        Local::now().timestamp_millis()
    }
}

/// Pinned to one day. Timestamps are that day's midnight UTC.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }

    fn now_ms(&self) -> Ms {
        self.0
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_pinned() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let clock = FixedClock(d);
        assert_eq!(clock.today(), d);
        assert_eq!(clock.now_ms(), 1_767_225_600_000);
    }
}
