//! Host-driven countdown timers.
//!
//! Timers never observe wall-clock time themselves: the host advances them
//! through `tick`, which keeps playback deterministic under test.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Armed,
    Fired,
    Cancelled,
}

/// A cancellable countdown, either one-shot or repeating.
#[derive(Debug, Clone)]
pub struct Timer {
    period: Duration,
    elapsed: Duration,
    repeating: bool,
    state: TimerState,
}

impl Timer {
    /// Fires once after `delay`.
    pub fn once(delay: Duration) -> Self {
        Self {
            period: delay,
            elapsed: Duration::ZERO,
            repeating: false,
            state: TimerState::Armed,
        }
    }

    /// Fires every `period` until cancelled.
    pub fn repeating(period: Duration) -> Self {
        Self {
            repeating: true,
            ..Self::once(period)
        }
    }

    /// Advance the timer by `delta`, returning how many times it fired.
    ///
    /// A zero period fires exactly once per tick.
    pub fn tick(&mut self, delta: Duration) -> u32 {
        if self.state != TimerState::Armed {
            return 0;
        }

        if self.period.is_zero() {
            if !self.repeating {
                self.state = TimerState::Fired;
            }
            return 1;
        }

        self.elapsed += delta;
        if self.elapsed < self.period {
            return 0;
        }

        if !self.repeating {
            self.state = TimerState::Fired;
            self.elapsed = self.period;
            return 1;
        }

        let period = self.period.as_nanos();
        let elapsed = self.elapsed.as_nanos();
        let fires = elapsed / period;
        self.elapsed = Duration::from_nanos((elapsed % period) as u64);
        u32::try_from(fires).unwrap_or(u32::MAX)
    }

    pub fn cancel(&mut self) {
        self.state = TimerState::Cancelled;
    }
}
