//! Monotonic stopwatch for per-iteration timing.

use std::time::{Duration, Instant};

/// Start/stop stopwatch. `elapsed` is zero until both ends were recorded.
#[derive(Clone, Copy, Debug, Default)]
pub struct Chrono {
    start: Option<Instant>,
    stop: Option<Instant>,
}

impl Chrono {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.stop = None;
    }

    pub fn stop(&mut self) {
        self.stop = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }
}

/// Seconds as `f64`.
#[inline]
pub fn as_s_f64(d: Duration) -> f64 {
    d.as_secs() as f64 + f64::from(d.subsec_nanos()) * 1.0e-9
}

/// Nanoseconds as `f64`.
#[inline]
pub fn as_ns_f64(d: Duration) -> f64 {
    d.as_secs() as f64 * 1.0e9 + f64::from(d.subsec_nanos())
}
