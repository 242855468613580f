use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn from_rfc3339(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Wall-clock source. Swapped for [`ManualClock`] in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Seconds left on a timed attempt, clamped to `[0, limit]`.
/// Elapsed time is floored to whole seconds.
pub fn remaining_seconds(limit: u32, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let elapsed_ms = (now - started_at).num_milliseconds().max(0);
    let elapsed = elapsed_ms / 1000;
    (i64::from(limit) - elapsed).clamp(0, i64::from(limit)) as u32
}

/// `MM:SS` below an hour, `H:MM:SS` above.
pub fn format_remaining(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        from_rfc3339(s).unwrap()
    }

    #[test]
    fn remaining_counts_down_from_start() {
        let start = at("2026-03-01T09:00:00Z");
        assert_eq!(remaining_seconds(600, start, start), 600);
        assert_eq!(remaining_seconds(600, start, start + Duration::milliseconds(1999)), 599);
        assert_eq!(remaining_seconds(600, start, start + Duration::seconds(120)), 480);
    }

    #[test]
    fn remaining_is_clamped_to_limit_range() {
        let start = at("2026-03-01T09:00:00Z");
        assert_eq!(remaining_seconds(600, start, start + Duration::seconds(650)), 0);
        assert_eq!(remaining_seconds(600, start, start - Duration::seconds(30)), 600);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(at("2026-03-01T09:00:00Z"));
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now().to_rfc3339(), "2026-03-01T09:01:30+00:00");
        clock.set(at("2026-03-02T00:00:00Z"));
        assert_eq!(clock.now(), at("2026-03-02T00:00:00Z"));
    }

    #[test]
    fn formats_remaining_time() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(65), "01:05");
        assert_eq!(format_remaining(3599), "59:59");
        assert_eq!(format_remaining(3661), "1:01:01");
    }
}
