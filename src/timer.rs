//! Session countdown anchored to wall-clock time.
//!
//! While running the timer stores only its deadline, so the remaining time can
//! always be recomputed from `ends_at - now`, also after a reload.

use crate::error::{AuctionError, AuctionResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_DURATION_SEC: u32 = 10;
pub const MAX_DURATION_SEC: u32 = 600;

pub fn validate_duration(duration_sec: u32) -> AuctionResult<u32> {
    if (MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&duration_sec) {
        Ok(duration_sec)
    } else {
        Err(AuctionError::DurationOutOfRange(duration_sec))
    }
}

/// Persisted timer state.
///
/// `running` implies `ends_at` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub running: bool,
    pub ends_at: Option<DateTime<Utc>>,
    pub left_ms: u64,
    pub total_ms: u64,
}

impl TimerState {
    /// A stopped, full timer
    pub fn stopped(total_ms: u64) -> Self {
        Self {
            running: false,
            ends_at: None,
            left_ms: total_ms,
            total_ms,
        }
    }
}

fn millis_until(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (ends_at - now).num_milliseconds().max(0) as u64
}

/// `HH:MM:SS`, rounding partial seconds up
pub fn format_hms(ms: u64) -> String {
    let total_seconds = (ms + 999) / 1000;
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    state: TimerState,
}

impl CountdownTimer {
    /// Stopped timer for `duration_sec` seconds
    pub fn new(duration_sec: u32) -> AuctionResult<Self> {
        let duration_sec = validate_duration(duration_sec)?;
        Ok(Self::from_millis(u64::from(duration_sec) * 1000))
    }

    fn from_millis(total_ms: u64) -> Self {
        Self {
            state: TimerState::stopped(total_ms),
        }
    }

    /// Change the duration. The timer is stopped and refilled.
    pub fn set_duration(&mut self, duration_sec: u32) -> AuctionResult<()> {
        let duration_sec = validate_duration(duration_sec)?;
        self.state = TimerState::stopped(u64::from(duration_sec) * 1000);
        Ok(())
    }

    /// Start counting down from `left_ms`.
    ///
    /// Returns `false` without changes when already running or nothing is left.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.running || self.state.left_ms == 0 {
            return false;
        }
        let left = i64::try_from(self.state.left_ms).unwrap_or(i64::MAX);
        self.state.ends_at = Some(now + Duration::milliseconds(left));
        self.state.running = true;
        true
    }

    /// Freeze the remaining time. Returns `false` when the timer was not running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if !self.state.running {
            return false;
        }
        if let Some(ends_at) = self.state.ends_at {
            self.state.left_ms = millis_until(ends_at, now);
        }
        self.state.running = false;
        self.state.ends_at = None;
        true
    }

    pub fn reset(&mut self) {
        self.state = TimerState::stopped(self.state.total_ms);
    }

    /// Recompute `left_ms` from the deadline.
    ///
    /// The timer stops exactly when the remaining time reaches zero.
    pub fn tick(&mut self, now: DateTime<Utc>) -> u64 {
        if self.state.running {
            match self.state.ends_at {
                Some(ends_at) => {
                    self.state.left_ms = millis_until(ends_at, now);
                    if self.state.left_ms == 0 {
                        self.state.running = false;
                        self.state.ends_at = None;
                    }
                }
                None => self.state.running = false,
            }
        }
        self.state.left_ms
    }

    /// Rebuild a timer from persisted state.
    ///
    /// A running timer without deadline is treated as paused and `left_ms` is
    /// capped at `total_ms`.
    pub fn restore(state: TimerState, now: DateTime<Utc>) -> Self {
        let mut state = state;
        if state.running && state.ends_at.is_none() {
            state.running = false;
        }
        if !state.running {
            state.ends_at = None;
        }
        state.left_ms = state.left_ms.min(state.total_ms);

        let mut timer = Self { state };
        timer.tick(now);
        timer
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_expired(&self) -> bool {
        self.state.left_ms == 0
    }

    pub fn left_ms(&self) -> u64 {
        self.state.left_ms
    }

    pub fn format_hms(&self) -> String {
        format_hms(self.state.left_ms)
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn into_state(self) -> TimerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_duration_bounds() {
        assert!(CountdownTimer::new(10).is_ok());
        assert!(CountdownTimer::new(600).is_ok());
        assert_eq!(CountdownTimer::new(9), Err(AuctionError::DurationOutOfRange(9)));
        assert_eq!(CountdownTimer::new(601), Err(AuctionError::DurationOutOfRange(601)));
    }

    #[test]
    fn test_tick_counts_down_from_deadline() {
        let mut timer = CountdownTimer::new(10).unwrap();
        assert!(timer.start(at(0)));
        assert_eq!(timer.state().ends_at, Some(at(10_000)));

        assert_eq!(timer.tick(at(4_000)), 6_000);
        assert!(timer.is_running());

        assert_eq!(timer.tick(at(12_000)), 0);
        assert!(!timer.is_running());
        assert!(timer.is_expired());
        assert!(timer.state().ends_at.is_none());
    }

    #[test]
    fn test_pause_freezes_and_resume_continues() {
        let mut timer = CountdownTimer::new(30).unwrap();
        timer.start(at(0));
        assert!(timer.pause(at(5_000)));
        assert_eq!(timer.left_ms(), 25_000);
        assert!(timer.state().ends_at.is_none());

        // time passing while paused changes nothing
        assert_eq!(timer.tick(at(60_000)), 25_000);

        assert!(timer.start(at(60_000)));
        assert_eq!(timer.tick(at(70_000)), 15_000);
    }

    #[test]
    fn test_start_is_noop_when_running_or_empty() {
        let mut timer = CountdownTimer::new(10).unwrap();
        timer.start(at(0));
        assert!(!timer.start(at(3_000)));
        assert_eq!(timer.state().ends_at, Some(at(10_000)));

        timer.tick(at(10_000));
        assert!(!timer.start(at(11_000)));
        assert!(!timer.is_running());
        assert!(!timer.pause(at(11_000)));
    }

    #[test]
    fn test_reset_and_set_duration() {
        let mut timer = CountdownTimer::new(20).unwrap();
        timer.start(at(0));
        timer.tick(at(5_000));
        timer.reset();
        assert_eq!(timer.state(), &TimerState::stopped(20_000));

        timer.start(at(0));
        timer.set_duration(45).unwrap();
        assert_eq!(timer.state(), &TimerState::stopped(45_000));
        assert!(timer.set_duration(5).is_err());
        assert_eq!(timer.left_ms(), 45_000);
    }

    #[test]
    fn test_restore_after_reload() {
        let mut timer = CountdownTimer::new(60).unwrap();
        timer.start(at(0));
        let saved = timer.state().clone();

        let restored = CountdownTimer::restore(saved.clone(), at(20_000));
        assert!(restored.is_running());
        assert_eq!(restored.left_ms(), 40_000);

        let expired = CountdownTimer::restore(saved, at(90_000));
        assert!(!expired.is_running());
        assert!(expired.is_expired());

        let broken = TimerState {
            running: true,
            ends_at: None,
            left_ms: 99_000,
            total_ms: 60_000,
        };
        let repaired = CountdownTimer::restore(broken, at(0));
        assert!(!repaired.is_running());
        assert_eq!(repaired.left_ms(), 60_000);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(1), "00:00:01");
        assert_eq!(format_hms(59_001), "00:01:00");
        assert_eq!(format_hms(600_000), "00:10:00");
        assert_eq!(format_hms(3_723_000), "01:02:03");
    }
}
