//! Recovery policy
//!
//! Cooldown, auto-recovery delay and retry backoff are pure functions of
//! the policy, the fault classification, the attempt count and the time
//! of the last attempt.

use std::time::Duration;

use tokio::time::Instant;

use errguard_core::config::RecoveryConfig;
use errguard_core::domain::{Classification, FaultCategory, Severity};

/// Recovery tuning derived from [`RecoveryConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_retries: u32,
    pub cooldown: Duration,
    pub auto_recovery: bool,
    pub network_delay: Duration,
    pub user_delay: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

impl From<&RecoveryConfig> for RecoveryPolicy {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            cooldown: config.cooldown(),
            auto_recovery: config.auto_recovery,
            network_delay: Duration::from_millis(config.network_delay_ms),
            user_delay: Duration::from_millis(config.user_delay_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

/// Time left before another recovery attempt is allowed, if any
pub fn cooldown_remaining(
    last_attempt: Option<Instant>,
    now: Instant,
    cooldown: Duration,
) -> Option<Duration> {
    let elapsed = now.saturating_duration_since(last_attempt?);
    (elapsed < cooldown).then(|| cooldown - elapsed)
}

/// Delay before an automatic recovery attempt, or `None` when the fault
/// is not transient
///
/// Network faults wait `network_delay`; user-input faults (which include
/// expired state) and other low-severity faults wait `user_delay`.
pub fn auto_recovery_delay(
    classification: &Classification,
    policy: &RecoveryPolicy,
) -> Option<Duration> {
    if !policy.auto_recovery {
        return None;
    }
    match classification.category {
        FaultCategory::Network => Some(policy.network_delay),
        FaultCategory::User => Some(policy.user_delay),
        _ if classification.severity == Severity::Low => Some(policy.user_delay),
        _ => None,
    }
}

/// Exponential backoff for the `attempt`-th retry (1-based), capped
pub fn retry_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_remaining() {
        let start = Instant::now();
        let cooldown = Duration::from_secs(30);

        assert_eq!(cooldown_remaining(None, start, cooldown), None);
        assert_eq!(
            cooldown_remaining(Some(start), start + Duration::from_secs(10), cooldown),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            cooldown_remaining(Some(start), start + Duration::from_secs(30), cooldown),
            None
        );
    }

    #[test]
    fn test_auto_recovery_delays() {
        let policy = RecoveryPolicy::default();
        let network = Classification::new(FaultCategory::Network, Severity::High);
        let user = Classification::new(FaultCategory::User, Severity::Low);
        let runtime = Classification::new(FaultCategory::Runtime, Severity::Medium);
        let system = Classification::new(FaultCategory::System, Severity::Critical);

        assert_eq!(auto_recovery_delay(&network, &policy), Some(Duration::from_secs(3)));
        assert_eq!(auto_recovery_delay(&user, &policy), Some(Duration::from_secs(1)));
        assert_eq!(auto_recovery_delay(&runtime, &policy), None);
        assert_eq!(auto_recovery_delay(&system, &policy), None);

        let disabled = RecoveryPolicy {
            auto_recovery: false,
            ..RecoveryPolicy::default()
        };
        assert_eq!(auto_recovery_delay(&network, &disabled), None);
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        assert_eq!(retry_backoff(0, base, max), Duration::ZERO);
        assert_eq!(retry_backoff(1, base, max), Duration::from_secs(1));
        assert_eq!(retry_backoff(3, base, max), Duration::from_secs(4));
        assert_eq!(retry_backoff(6, base, max), Duration::from_secs(30));
        assert_eq!(retry_backoff(64, base, max), max);
    }
}
