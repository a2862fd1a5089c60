//! Modified Julian Day time handling (§3 Time) and the step cursor (§2, §6 timer).

use crate::error::EngineError;
use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;

/// 1858-11-17, the MJD epoch.
fn mjd_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).expect("epoch date is valid")
}

/// Convert a calendar date to its Modified Julian Day.
pub fn date_to_mjd(date: NaiveDate) -> f64 {
    (date - mjd_epoch()).num_days() as f64
}

/// Convert a Modified Julian Day back to a calendar date (fractional days are truncated).
pub fn mjd_to_date(mjd: f64) -> NaiveDate {
    mjd_epoch() + Duration::days(mjd.floor() as i64)
}

/// Units a time step can be expressed in (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl StepUnit {
    fn in_days(self) -> f64 {
        match self {
            StepUnit::Minute => 1.0 / (24.0 * 60.0),
            StepUnit::Hour => 1.0 / 24.0,
            StepUnit::Day => 1.0,
            StepUnit::Week => 7.0,
        }
    }
}

impl fmt::Display for StepUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepUnit::Minute => "minute",
            StepUnit::Hour => "hour",
            StepUnit::Day => "day",
            StepUnit::Week => "week",
        };
        write!(f, "{s}")
    }
}

/// The time step, stored in days internally (§3, §9 "global step size" — passed
/// explicitly through the call chain rather than living in a module-level global).
#[derive(Debug, Clone, Copy)]
pub struct TimeStep {
    pub amount: u32,
    pub unit: StepUnit,
}

impl TimeStep {
    pub fn new(amount: u32, unit: StepUnit) -> Self {
        Self { amount, unit }
    }

    /// The step size in days, used everywhere the spec calls `Δt`.
    pub fn in_days(&self) -> f64 {
        self.amount as f64 * self.unit.in_days()
    }
}

/// The time cursor driving the simulation loop (§2 control flow, §6 timer section).
#[derive(Debug, Clone)]
pub struct Timer {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub step: TimeStep,
    current: NaiveDate,
}

impl Timer {
    pub fn new(start: NaiveDate, end: NaiveDate, step: TimeStep) -> Result<Self, EngineError> {
        if end < start {
            return Err(EngineError::InvalidArgument(format!(
                "the end date {end} must not be before the start date {start}"
            )));
        }
        Ok(Self { start, end, step, current: start })
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current
    }

    pub fn is_over(&self) -> bool {
        self.current > self.end
    }

    /// Advance the cursor by one step. Only whole-day steps are supported for now;
    /// sub-daily steps are accepted for `TimeStep::in_days()` arithmetic but the
    /// calendar cursor itself advances in whole days (sub-daily forcing resampling
    /// is a forcings-source concern, out of scope per §1).
    pub fn advance(&mut self) -> Result<(), EngineError> {
        if self.is_over() {
            return Err(EngineError::InvalidArgument(
                "the simulation end date was reached and the timer cannot advance anymore".to_string(),
            ));
        }
        let days = self.step.in_days().round() as i64;
        self.current += Duration::days(days.max(1));
        Ok(())
    }

    /// Number of steps between `start` and `end`, inclusive of the first step.
    pub fn steps_count(&self) -> usize {
        let total_days = (self.end - self.start).num_days() as f64;
        let step_days = self.step.in_days().max(1.0 / (24.0 * 60.0));
        (total_days / step_days).floor() as usize + 1
    }
}

pub fn day_of_year(date: NaiveDate) -> u32 {
    date.ordinal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_maps_to_zero() {
        assert_eq!(date_to_mjd(mjd_epoch()), 0.0);
    }

    #[test]
    fn round_trips() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(mjd_to_date(date_to_mjd(d)), d);
    }

    #[test]
    fn timer_rejects_inverted_range() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(Timer::new(start, end, TimeStep::new(1, StepUnit::Day)).is_err());
    }

    #[test]
    fn timer_advances_and_detects_end() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut timer = Timer::new(start, end, TimeStep::new(1, StepUnit::Day)).unwrap();
        assert!(!timer.is_over());
        timer.advance().unwrap();
        assert_eq!(timer.current_date(), end);
        timer.advance().unwrap();
        assert!(timer.is_over());
        assert!(timer.advance().is_err());
    }
}
