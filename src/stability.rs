use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// What the stability counter concluded about the latest poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityDecision {
    /// Output changed; the counter is back at zero.
    Changed,
    /// Output unchanged, still within the threshold (includes the new count).
    Unchanged { count: u64 },
    /// Output unchanged for more polls than the threshold allows.
    Stable { count: u64 },
}

/// Counts consecutive polls whose output matched the baseline.
///
/// The monitor is done once the count goes strictly above the threshold,
/// so a threshold of `n` allows `n` quiet polls and stops on the next one.
/// With no threshold the counter still counts but never reports `Stable`.
pub struct StabilityCounter {
    threshold: Option<u64>,
    unchanged: u64,
}

impl StabilityCounter {
    pub fn new(threshold: Option<u64>) -> Self {
        Self {
            threshold,
            unchanged: 0,
        }
    }

    /// Record the outcome of one comparison.
    pub fn record(&mut self, changed: bool) -> StabilityDecision {
        if changed {
            self.unchanged = 0;
            return StabilityDecision::Changed;
        }

        self.unchanged = self.unchanged.saturating_add(1);
        match self.threshold {
            Some(threshold) if self.unchanged > threshold => {
                debug!(
                    count = self.unchanged,
                    threshold, "stability threshold exceeded"
                );
                StabilityDecision::Stable {
                    count: self.unchanged,
                }
            }
            _ => StabilityDecision::Unchanged {
                count: self.unchanged,
            },
        }
    }
}

/// Absolute point in time after which the monitor stops.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now, or `None` when there is no timeout.
    ///
    /// A timeout too large to represent as an instant never expires, so it
    /// also yields `None`.
    pub fn starting_now(timeout: Option<Duration>) -> Option<Self> {
        let timeout = timeout?;
        let at = Instant::now().checked_add(timeout);
        if at.is_none() {
            debug!(timeout_secs = timeout.as_secs(), "timeout out of range, not enforced");
        }
        at.map(Self::at)
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() > self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_resets_count() {
        let mut counter = StabilityCounter::new(Some(5));
        counter.record(false);
        counter.record(false);
        assert_eq!(counter.unchanged, 2);
        assert_eq!(counter.record(true), StabilityDecision::Changed);
        assert_eq!(counter.unchanged, 0);
    }

    #[test]
    fn test_unchanged_increments_by_one() {
        let mut counter = StabilityCounter::new(Some(5));
        assert_eq!(counter.record(false), StabilityDecision::Unchanged { count: 1 });
        assert_eq!(counter.record(false), StabilityDecision::Unchanged { count: 2 });
    }

    #[test]
    fn test_stable_only_when_count_exceeds_threshold() {
        let mut counter = StabilityCounter::new(Some(2));
        assert_eq!(counter.record(false), StabilityDecision::Unchanged { count: 1 });
        // Reaching the threshold is not enough
        assert_eq!(counter.record(false), StabilityDecision::Unchanged { count: 2 });
        assert_eq!(counter.record(false), StabilityDecision::Stable { count: 3 });
    }

    #[test]
    fn test_no_threshold_never_stable() {
        let mut counter = StabilityCounter::new(None);
        for expected in 1..=10_000 {
            assert_eq!(
                counter.record(false),
                StabilityDecision::Unchanged { count: expected }
            );
        }
    }

    #[test]
    fn test_count_saturates() {
        let mut counter = StabilityCounter::new(None);
        counter.unchanged = u64::MAX;
        assert_eq!(
            counter.record(false),
            StabilityDecision::Unchanged { count: u64::MAX }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_passes_after_timeout() {
        let deadline = Deadline::starting_now(Some(Duration::from_secs(10))).unwrap();
        assert!(!deadline.has_passed());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!deadline.has_passed());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(deadline.has_passed());
    }

    #[test]
    fn test_unrepresentable_timeout_has_no_deadline() {
        assert!(Deadline::starting_now(Some(Duration::from_secs(u64::MAX))).is_none());
        assert!(Deadline::starting_now(Some(Duration::MAX)).is_none());
    }

    #[test]
    fn test_large_threshold_accepted() {
        let mut counter = StabilityCounter::new(Some(u64::from(u32::MAX) + 1));
        counter.unchanged = u64::from(u32::MAX);
        assert_eq!(
            counter.record(false),
            StabilityDecision::Unchanged {
                count: u64::from(u32::MAX) + 1
            }
        );
        assert_eq!(
            counter.record(false),
            StabilityDecision::Stable {
                count: u64::from(u32::MAX) + 2
            }
        );
    }

    #[test]
    fn test_no_timeout_no_deadline() {
        assert!(Deadline::starting_now(None).is_none());
    }
}
