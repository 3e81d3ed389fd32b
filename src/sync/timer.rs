//! Local rendering of the shared room timer.
//!
//! The relay only ships timer state when it changes; between frames the local
//! display extrapolates from the last synced value.

use std::time::{Duration, Instant};

use crate::dto::ws::TimerState;

/// How often the UI is expected to re-render the extrapolated value.
pub const DISPLAY_TICK: Duration = Duration::from_millis(100);

/// Extrapolating view over the last synced timer state.
#[derive(Debug, Clone)]
pub struct TimerDisplay {
    is_running: bool,
    base_seconds: u64,
    synced_at: Instant,
}

impl TimerDisplay {
    /// Stopped timer at zero.
    pub fn new() -> Self {
        Self {
            is_running: false,
            base_seconds: 0,
            synced_at: Instant::now(),
        }
    }

    /// Adopt a freshly relayed timer state.
    pub fn sync(&mut self, state: &TimerState) {
        self.sync_at(state, Instant::now());
    }

    fn sync_at(&mut self, state: &TimerState, now: Instant) {
        self.is_running = state.is_running;
        self.base_seconds = state.seconds;
        self.synced_at = now;
    }

    /// Whether the timer was running at the last sync.
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Seconds to show right now.
    pub fn displayed_seconds(&self) -> u64 {
        self.displayed_seconds_at(Instant::now())
    }

    fn displayed_seconds_at(&self, now: Instant) -> u64 {
        if self.is_running {
            self.base_seconds + now.duration_since(self.synced_at).as_secs()
        } else {
            self.base_seconds
        }
    }
}

impl Default for TimerDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_running_timer_extrapolates_between_frames() {
        let mut display = TimerDisplay::new();
        let start = Instant::now();
        display.sync_at(
            &TimerState {
                is_running: true,
                seconds: 90,
            },
            start,
        );

        assert_eq!(display.displayed_seconds_at(start), 90);
        assert_eq!(
            display.displayed_seconds_at(start + Duration::from_secs(7)),
            97
        );
    }

    #[test]
    fn a_stopped_timer_holds_its_value() {
        let mut display = TimerDisplay::new();
        let start = Instant::now();
        display.sync_at(
            &TimerState {
                is_running: false,
                seconds: 42,
            },
            start,
        );

        assert_eq!(
            display.displayed_seconds_at(start + Duration::from_secs(60)),
            42
        );
    }

    #[test]
    fn a_new_frame_rebases_the_extrapolation() {
        let mut display = TimerDisplay::new();
        let start = Instant::now();
        display.sync_at(
            &TimerState {
                is_running: true,
                seconds: 10,
            },
            start,
        );

        let later = start + Duration::from_secs(30);
        display.sync_at(
            &TimerState {
                is_running: true,
                seconds: 12,
            },
            later,
        );

        // The stale local extrapolation is discarded in favor of the frame.
        assert_eq!(display.displayed_seconds_at(later), 12);
    }
}
