//! Exponential cooldown algebra shared by the LLM provider router
//! (skip a misbehaving provider for a while) and the supervisor
//! (back off before respawning a crash-looping child process).

use chrono::{DateTime, Duration, Utc};

const MAX_COOLDOWN_MINUTES: i64 = 24 * 60;

/// `2^(failures - 1)` minutes, capped at 24h. `0` failures means no cooldown.
pub fn cooldown_minutes(consecutive_failures: u32) -> i64 {
    if consecutive_failures == 0 {
        return 0;
    }
    let exp = (consecutive_failures - 1).min(20);
    let minutes = 1i64.checked_shl(exp).unwrap_or(MAX_COOLDOWN_MINUTES);
    minutes.min(MAX_COOLDOWN_MINUTES)
}

/// Tracks consecutive failures for one key (a provider id, a process name)
/// and exposes whether that key is currently in cooldown.
#[derive(Debug, Clone, Default)]
pub struct CooldownState {
    pub consecutive_failures: u32,
    pub cooling_until: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> Duration {
        self.consecutive_failures += 1;
        let minutes = cooldown_minutes(self.consecutive_failures);
        let duration = Duration::minutes(minutes);
        self.cooling_until = Some(now + duration);
        duration
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.cooling_until = None;
    }

    pub fn is_cooling(&self, now: DateTime<Utc>) -> bool {
        self.cooling_until.map(|until| now < until).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_failures_has_no_cooldown() {
        assert_eq!(cooldown_minutes(0), 0);
    }

    #[test]
    fn cooldown_doubles_each_failure() {
        assert_eq!(cooldown_minutes(1), 1);
        assert_eq!(cooldown_minutes(2), 2);
        assert_eq!(cooldown_minutes(3), 4);
        assert_eq!(cooldown_minutes(4), 8);
    }

    #[test]
    fn cooldown_caps_at_24_hours() {
        assert_eq!(cooldown_minutes(20), MAX_COOLDOWN_MINUTES);
        assert_eq!(cooldown_minutes(40), MAX_COOLDOWN_MINUTES);
    }

    #[test]
    fn state_transitions_through_failure_and_success() {
        let mut s = CooldownState::default();
        let t0 = Utc::now();
        assert!(!s.is_cooling(t0));

        s.record_failure(t0);
        assert_eq!(s.consecutive_failures, 1);
        assert!(s.is_cooling(t0));
        assert!(!s.is_cooling(t0 + Duration::minutes(2)));

        s.record_success();
        assert_eq!(s.consecutive_failures, 0);
        assert!(!s.is_cooling(t0));
    }
}
