//! Wall-clock gate for the nightly conclave.
//!
//! Night kills are only accepted while local time of day falls inside the
//! configured window. The window may straddle midnight, so it is a predicate
//! over time-of-day rather than a countdown.

use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of the current local time of day.
pub trait Clock: Send + Sync {
    fn time_of_day(&self) -> NaiveTime;
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn time_of_day(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Always reports the same time. Used by tests and replay tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveTime);

impl FixedClock {
    pub fn at(hour: u32, minute: u32) -> Self {
        Self(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl Clock for FixedClock {
    fn time_of_day(&self) -> NaiveTime {
        self.0
    }
}

/// Half-open interval `[start, end)` of local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConclaveWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ConclaveWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            // wraps past midnight
            time >= self.start || time < self.end
        }
    }

    pub fn is_open(&self, clock: &dyn Clock) -> bool {
        self.contains(clock.time_of_day())
    }
}

impl Default for ConclaveWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(22, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl fmt::Display for ConclaveWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02} and {:02}:{:02}",
            self.start.hour(),
            self.start.minute(),
            self.end.hour(),
            self.end.minute()
        )
    }
}

/// Parses `HH:MM` for command line arguments.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| format!("expected HH:MM, got {:?}: {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_spans_midnight() {
        let window = ConclaveWindow::default();

        assert!(window.is_open(&FixedClock::at(22, 30)));
        assert!(window.is_open(&FixedClock::at(23, 59)));
        assert!(window.is_open(&FixedClock::at(0, 0)));
        assert!(window.is_open(&FixedClock::at(2, 59)));

        assert!(!window.is_open(&FixedClock::at(3, 0)));
        assert!(!window.is_open(&FixedClock::at(12, 0)));
        assert!(!window.is_open(&FixedClock::at(22, 29)));
    }

    #[test]
    fn test_same_day_window() {
        let window = ConclaveWindow::new(
            parse_time_of_day("09:00").unwrap(),
            parse_time_of_day("17:00").unwrap(),
        );

        assert!(window.is_open(&FixedClock::at(9, 0)));
        assert!(window.is_open(&FixedClock::at(16, 59)));
        assert!(!window.is_open(&FixedClock::at(17, 0)));
        assert!(!window.is_open(&FixedClock::at(8, 59)));
    }

    #[test]
    fn test_parse_time_of_day_rejects_garbage() {
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConclaveWindow::default().to_string(), "22:30 and 03:00");
    }
}
