//! Round-trip latency of REST calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency collector handed to whichever component issues REST calls.
///
/// Shared through an `Arc`; every field is updated atomically so concurrent
/// callers never block each other.
#[derive(Debug, Default)]
pub struct LatencyMetrics {
    last_ms: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
    samples: AtomicU64,
}

impl LatencyMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_ms: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.last_ms.store(ms, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency of the most recent call, `None` before the first one.
    #[must_use]
    pub fn last(&self) -> Option<Duration> {
        (self.samples() > 0).then(|| Duration::from_millis(self.last_ms.load(Ordering::Relaxed)))
    }

    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        let samples = self.samples();
        (samples > 0)
            .then(|| Duration::from_millis(self.total_ms.load(Ordering::Relaxed) / samples))
    }

    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.samples() > 0).then(|| Duration::from_millis(self.max_ms.load(Ordering::Relaxed)))
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}
