use crate::attempt::event::{Event, TimerKind};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Timers owned by one session. At most one timer per [`TimerKind`] is live;
/// arming a kind again replaces the previous one.
pub trait Scheduler: Send {
    fn every(&mut self, kind: TimerKind, period: Duration, event: Event);
    fn after(&mut self, kind: TimerKind, delay: Duration, event: Event);
    fn cancel(&mut self, kind: TimerKind);
    fn cancel_all(&mut self);
}

/// Delivers timer events into the session's event channel from tokio tasks.
pub struct TokioScheduler {
    events: UnboundedSender<Event>,
    timers: HashMap<TimerKind, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events,
            timers: HashMap::new(),
        }
    }

    fn arm(&mut self, kind: TimerKind, handle: JoinHandle<()>) {
        if let Some(previous) = self.timers.insert(kind, handle) {
            previous.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn every(&mut self, kind: TimerKind, period: Duration, event: Event) {
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(event.clone()).is_err() {
                    break;
                }
            }
        });
        self.arm(kind, handle);
    }

    fn after(&mut self, kind: TimerKind, delay: Duration, event: Event) {
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
        self.arm(kind, handle);
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.timers.remove(&kind) {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
