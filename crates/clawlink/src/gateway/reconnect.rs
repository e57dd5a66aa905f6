//! Reconnection pacing.

use std::time::Duration;

use crate::config::EngineSettings;

/// How often the engine may attempt to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Minimum spacing between attempts.
    pub retry_interval: Duration,
    /// Ceiling for the streak-extended spacing.
    pub max_retry_interval: Duration,
    /// Streak value past which the spacing stops doubling.
    pub streak_cap: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

impl RetryPolicy {
    /// Policy from engine settings.
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            retry_interval: settings.retry_interval,
            max_retry_interval: settings.max_retry_interval,
            streak_cap: settings.tls_streak_cap,
        }
    }

    /// Spacing required after `tls_fail_streak` consecutive TLS failures.
    #[must_use]
    pub fn delay_for_streak(&self, tls_fail_streak: u32) -> Duration {
        calculate_backoff(
            tls_fail_streak,
            self.retry_interval,
            self.max_retry_interval,
            self.streak_cap,
        )
    }

    /// Whether an attempt is allowed at `now_ms`, given the previous attempt.
    #[must_use]
    pub fn may_attempt(&self, last_attempt_ms: Option<u64>, now_ms: u64, tls_fail_streak: u32) -> bool {
        match last_attempt_ms {
            None => true,
            Some(last) => {
                let elapsed = Duration::from_millis(now_ms.saturating_sub(last));
                elapsed >= self.delay_for_streak(tls_fail_streak)
            }
        }
    }
}

/// `base * 2^min(streak, cap)`, capped at `max` but never below `base`.
#[must_use]
pub fn calculate_backoff(streak: u32, base: Duration, max: Duration, cap: u32) -> Duration {
    let exponent = streak.min(cap).min(31);
    let delay = base.saturating_mul(1u32 << exponent);
    delay.min(max).max(base)
}
