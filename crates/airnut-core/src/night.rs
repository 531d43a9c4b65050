//! Night-time quiet window for the polling schedule.

use time::Time;
use time::macros::{format_description, time};
use tracing::warn;

/// Default quiet window start, also the fallback for malformed time strings.
pub const DEFAULT_NIGHT_START: Time = time!(23:00);

/// Default quiet window end.
pub const DEFAULT_NIGHT_END: Time = time!(06:00);

/// A daily time-of-day window during which data broadcasts are suppressed.
///
/// When `start <= end` the window is the closed interval `[start, end]`.
/// When `start > end` the window spans midnight, e.g. 23:00–06:00 covers
/// `[23:00, 24:00) ∪ [00:00, 06:00]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    start: Time,
    end: Time,
}

impl NightWindow {
    /// Create a window from explicit times.
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    /// Build a window from `HH:MM` strings.
    ///
    /// A string that does not parse falls back to [`DEFAULT_NIGHT_START`]
    /// and is logged as a warning, matching the device integration's
    /// long-standing behavior for both endpoints.
    pub fn parse(start: &str, end: &str) -> Self {
        Self {
            start: parse_time_or_default(start),
            end: parse_time_or_default(end),
        }
    }

    /// Whether the given time of day falls inside the window.
    pub fn contains(&self, now: Time) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }

    /// Window start.
    pub fn start(&self) -> Time {
        self.start
    }

    /// Window end.
    pub fn end(&self) -> Time {
        self.end
    }
}

impl Default for NightWindow {
    fn default() -> Self {
        Self::new(DEFAULT_NIGHT_START, DEFAULT_NIGHT_END)
    }
}

fn parse_time_or_default(value: &str) -> Time {
    let format = format_description!("[hour]:[minute]");
    match Time::parse(value, &format) {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("invalid time format {:?}, using default", value);
            DEFAULT_NIGHT_START
        }
    }
}
