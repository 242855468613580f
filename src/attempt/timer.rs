/// Remaining-seconds tracker for a timed attempt.
///
/// The timer owns no clock of its own: the session's scheduler delivers one
/// tick per interval and the timer decides whether that tick still counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    limit: u32,
    remaining: u32,
    started: bool,
    running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick arrived while the timer was not running.
    Ignored,
    Running(u32),
    /// Reached zero. The timer has already stopped itself.
    Expired,
}

impl CountdownTimer {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            started: false,
            running: false,
        }
    }

    /// Starts the countdown from `remaining` (clamped to the limit).
    /// Returns `false` when the timer was already started once or the duration is not positive.
    pub fn start(&mut self, remaining: u32) -> bool {
        if self.started || remaining == 0 {
            return false;
        }
        self.started = true;
        self.running = true;
        self.remaining = remaining.min(self.limit);
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Ignored;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining)
        }
    }

    /// Returns whether the timer was running.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
