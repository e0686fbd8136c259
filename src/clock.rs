use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Time source for rotation windows and file timestamps.
pub trait Clock: Send + Sync {
    /// Monotonic reading used for elapsed-time decisions.
    fn now(&self) -> Instant;

    /// Wall-clock reading written into file metadata.
    fn timestamp(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to. Clones share the same reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    origin: OffsetDateTime,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new(origin: OffsetDateTime) -> Self {
        Self {
            base: Instant::now(),
            origin,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Jump to an absolute offset from the origin. Never moves backwards.
    pub fn set(&self, at: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset = (*offset).max(at);
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn timestamp(&self) -> OffsetDateTime {
        self.origin + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_and_monotonic() {
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
        let other = clock.clone();
        let t0 = clock.now();
        other.advance(Duration::from_millis(1500));
        assert_eq!(clock.now() - t0, Duration::from_millis(1500));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
        assert_eq!(
            clock.timestamp(),
            OffsetDateTime::UNIX_EPOCH + Duration::from_millis(1500)
        );
    }
}
