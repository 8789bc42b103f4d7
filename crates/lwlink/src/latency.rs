//! Round-trip latency statistics, per command template.
//!
//! Every successful [`LinkClient::execute`](crate::client::LinkClient::execute)
//! records how long the Link took to answer, keyed by the command's template
//! text (`"@?{}"` rather than `"@?R3"`), so parametrised commands share one
//! set of figures.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;

/// Count, total, min and max of sampled durations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyStats {
    name: String,
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl LatencyStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Record one round trip.
    pub fn sample(&mut self, t: Duration) {
        if self.count == 0 || t < self.min {
            self.min = t;
        }
        if t > self.max {
            self.max = t;
        }
        self.count += 1;
        self.total += t;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Mean duration; zero when nothing has been sampled.
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "  Samples: {}", self.count)?;
        writeln!(f, "      Max: {:?}", self.max)?;
        writeln!(f, "     Mean: {:?}", self.mean())?;
        writeln!(f, "      Min: {:?}", self.min)
    }
}

/// Thread-safe collection of [`LatencyStats`], one per template.
///
/// The lock is only held to update or copy figures, never across I/O.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    stats: Mutex<BTreeMap<String, LatencyStats>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&self, template: &str, t: Duration) {
        let mut stats = self.stats.lock();
        stats
            .entry(template.to_string())
            .or_insert_with(|| LatencyStats::new(template))
            .sample(t);
    }

    /// Copy of the figures for one template.
    pub fn get(&self, template: &str) -> Option<LatencyStats> {
        self.stats.lock().get(template).cloned()
    }

    /// Human-readable report of every template seen, in template order.
    /// Empty when nothing has been sampled.
    pub fn report(&self) -> String {
        let snapshot: Vec<LatencyStats> = self.stats.lock().values().cloned().collect();
        snapshot
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
