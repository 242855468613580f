/// Identifies one scheduled debounce. Fires carrying an older token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebounceToken(u64);

/// Trailing debounce bookkeeping.
///
/// Every `schedule` supersedes the previous one, so a burst of triggers
/// collapses into the last. The caller arms a timer for the returned token
/// and hands the token back through [`Debouncer::fire`] when it elapses.
#[derive(Debug, Default)]
pub struct Debouncer {
    generation: u64,
    pending: Option<DebounceToken>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self) -> DebounceToken {
        self.generation += 1;
        let token = DebounceToken(self.generation);
        self.pending = Some(token);
        token
    }

    /// Drops the pending schedule. Returns whether one existed.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Consumes `token` if it is the live schedule.
    pub fn fire(&mut self, token: DebounceToken) -> bool {
        if self.pending == Some(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_latest_schedule_fires() {
        let mut debouncer = Debouncer::new();
        let first = debouncer.schedule();
        let second = debouncer.schedule();
        let third = debouncer.schedule();

        assert!(!debouncer.fire(first));
        assert!(!debouncer.fire(second));
        assert!(debouncer.fire(third));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn token_fires_once() {
        let mut debouncer = Debouncer::new();
        let token = debouncer.schedule();
        assert!(debouncer.fire(token));
        assert!(!debouncer.fire(token));
    }

    #[test]
    fn cancel_invalidates_pending_token() {
        let mut debouncer = Debouncer::new();
        let token = debouncer.schedule();
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        assert!(!debouncer.fire(token));
    }

    #[test]
    fn rescheduling_after_cancel_issues_fresh_token() {
        let mut debouncer = Debouncer::new();
        let old = debouncer.schedule();
        debouncer.cancel();
        let fresh = debouncer.schedule();
        assert_ne!(old, fresh);
        assert!(debouncer.fire(fresh));
    }
}
