//! Session countdown state machine
//!
//! The timer is purely local: it never waits for the lamp to acknowledge
//! anything. Each transition returns the command the caller has to write.

use crate::domain::session::{SessionCommand, SessionConfig};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub remaining_secs: u32,
    pub total_secs: u32,
    pub progress: f64,
    pub display: String,
}

/// Outcome of a single one-second tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Timer is not running; nothing changed
    Idle,
    /// Counted down one second
    Counting(u32),
    /// Reached zero; the timer is back to idle and the stop command must be sent
    Expired(SessionCommand),
}

#[derive(Debug, Clone)]
pub struct SessionTimer {
    state: TimerState,
    total_secs: u32,
    remaining_secs: u32,
}

impl SessionTimer {
    pub fn new(nap_minutes: u32) -> Self {
        let total_secs = nap_minutes.saturating_mul(60);
        Self {
            state: TimerState::Idle,
            total_secs,
            remaining_secs: total_secs,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn total_secs(&self) -> u32 {
        self.total_secs
    }

    /// Picks up a new nap duration. While idle the countdown display follows
    /// immediately; while running only the reset value changes.
    pub fn reconfigure(&mut self, nap_minutes: u32) {
        self.total_secs = nap_minutes.saturating_mul(60);
        if self.state == TimerState::Idle {
            self.remaining_secs = self.total_secs;
        }
    }

    /// `Idle -> Running`. Returns `None` if a session is already running.
    pub fn start(&mut self, config: &SessionConfig) -> Option<SessionCommand> {
        if self.is_running() {
            return None;
        }
        self.total_secs = config.total_seconds();
        self.remaining_secs = self.total_secs;
        self.state = TimerState::Running;
        Some(SessionCommand::Start(*config))
    }

    pub fn tick(&mut self) -> Tick {
        if !self.is_running() {
            return Tick::Idle;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.reset();
            return Tick::Expired(SessionCommand::Stop);
        }
        Tick::Counting(self.remaining_secs)
    }

    /// Stops a running session. Returns `None` when idle.
    pub fn stop(&mut self) -> Option<SessionCommand> {
        if !self.is_running() {
            return None;
        }
        self.reset();
        Some(SessionCommand::Stop)
    }

    /// Resets the countdown and always asks for a stop write, running or not.
    pub fn cancel(&mut self) -> SessionCommand {
        self.reset();
        SessionCommand::Stop
    }

    /// Fraction of the nap still to go, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        (self.remaining_secs as f64 / self.total_secs as f64).clamp(0.0, 1.0)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            state: self.state,
            remaining_secs: self.remaining_secs,
            total_secs: self.total_secs,
            progress: self.progress(),
            display: format_remaining(self.remaining_secs),
        }
    }

    fn reset(&mut self) {
        self.state = TimerState::Idle;
        self.remaining_secs = self.total_secs;
    }
}

/// `MM:SS`, zero padded. Minutes are not wrapped into hours.
pub fn format_remaining(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
