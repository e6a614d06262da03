//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_SHIFT: u32 = 30;

/// Exponential backoff with additive jitter.
///
/// `delay = base_delay * 2^min(attempt, max_shift) + uniform[0, jitter_max]`
///
/// Example with the defaults (200ms base, 100ms jitter):
/// - attempt 0: 200..=300ms
/// - attempt 1: 400..=500ms
/// - attempt 2: 800..=900ms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry. Zero falls back to the default.
    pub base_delay: Duration,

    /// Upper bound of the random component.
    pub jitter_max: Duration,

    /// Cap on the exponent so large attempt counts cannot overflow.
    pub max_shift: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            jitter_max: DEFAULT_JITTER_MAX,
            max_shift: DEFAULT_MAX_SHIFT,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, jitter_max: Duration) -> Self {
        Self {
            base_delay,
            jitter_max,
            ..Self::default()
        }
    }

    /// Exponential component only (no jitter). Non-decreasing in `attempt`.
    pub fn floor(&self, attempt: u32) -> Duration {
        let base = if self.base_delay.is_zero() {
            DEFAULT_BASE_DELAY
        } else {
            self.base_delay
        };
        let shift = attempt.min(self.max_shift).min(31);
        base.checked_mul(1u32 << shift).unwrap_or(Duration::MAX)
    }

    /// Delay to wait before re-queueing after attempt `attempt` failed.
    ///
    /// The jitter is drawn from the caller's generator so workers that fail
    /// at the same moment spread out instead of retrying in lockstep.
    pub fn next_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.floor(attempt).saturating_add(jitter(self.jitter_max, rng))
    }
}

/// Free-standing form of [`RetryPolicy::next_delay`] for signed attempt
/// counts coming from outside the engine. Negative attempts count as 0.
pub fn backoff_delay<R: Rng + ?Sized>(
    base: Duration,
    attempt: i64,
    jitter_max: Duration,
    rng: &mut R,
) -> Duration {
    let attempt = u32::try_from(attempt.max(0)).unwrap_or(u32::MAX);
    RetryPolicy::new(base, jitter_max).next_delay(attempt, rng)
}

fn jitter<R: Rng + ?Sized>(jitter_max: Duration, rng: &mut R) -> Duration {
    if jitter_max.is_zero() {
        return Duration::ZERO;
    }
    let max_nanos = u64::try_from(jitter_max.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rng.gen_range(0..=max_nanos))
}
