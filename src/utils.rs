use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

const MIB: f64 = 1024.0 * 1024.0;

/// Bytes written per chunk, summarised as a run mean and a recent rate.
#[derive(Debug, Clone)]
pub struct RateMeter {
    pub bytes_total: usize,
    pub chunks_total: usize,
    /// Start of the current run.
    pub since: Instant,
    span: Duration,
    recent: VecDeque<(Instant, usize)>,
    recent_bytes: usize,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::with_span(Duration::from_secs(1))
    }
}

impl RateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recent rate is taken over the last `span`.
    pub fn with_span(span: Duration) -> Self {
        Self {
            bytes_total: 0,
            chunks_total: 0,
            since: Instant::now(),
            span,
            recent: VecDeque::new(),
            recent_bytes: 0,
        }
    }

    /// MiB/s since the run began.
    pub fn mean_rate(&self) -> f64 {
        self.mean_rate_at(Instant::now())
    }

    /// MiB/s over the recent span.
    pub fn recent_rate(&self) -> f64 {
        self.recent_bytes as f64 / self.span.as_secs_f64().max(1e-6) / MIB
    }

    pub fn record(&mut self, bytes: usize) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn restart(&mut self) {
        *self = Self::with_span(self.span);
    }

    fn mean_rate_at(&self, now: Instant) -> f64 {
        let secs = now.saturating_duration_since(self.since).as_secs_f64();
        self.bytes_total as f64 / secs.max(1e-6) / MIB
    }

    fn record_at(&mut self, now: Instant, bytes: usize) {
        self.bytes_total += bytes;
        self.chunks_total += 1;
        self.recent.push_back((now, bytes));
        self.recent_bytes += bytes;

        while let Some(&(at, old)) = self.recent.front() {
            if now.saturating_duration_since(at) <= self.span {
                break;
            }
            self.recent.pop_front();
            self.recent_bytes -= old;
        }
    }
}
