//! Exponential backoff with full jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the capped exponential delay is randomised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// Uniform draw from `[0, capped]`.
    #[default]
    Full,
    /// The capped delay itself.
    None,
}

/// Maps an attempt number and an optional server hint to a wait.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max_delay: Duration,
    jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(10))
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter: Jitter::Full,
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before the attempt that follows `attempt` (1-based).
    ///
    /// A server hint is returned verbatim and bypasses both the cap and jitter.
    pub fn next_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        self.next_delay_with(attempt, hint, &mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        hint: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }

        let capped = self.capped_delay(attempt);
        match self.jitter {
            Jitter::None => capped,
            Jitter::Full => {
                let cap_ms = capped.as_millis().min(u64::MAX as u128) as u64;
                Duration::from_millis(rng.gen_range(0..=cap_ms))
            }
        }
    }

    /// `base * 2^(attempt-1)`, clamped to `max_delay`.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
