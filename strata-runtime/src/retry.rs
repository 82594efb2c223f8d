//! Backoff policies for re-delivered jobs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Re-deliver immediately
    None,

    /// Fixed delay between attempts
    Fixed,

    /// Delay doubles after every failed attempt
    Exponential,
}

impl BackoffKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackoffKind::None => "none",
            BackoffKind::Fixed => "fixed",
            BackoffKind::Exponential => "exponential",
        }
    }
}

impl TryFrom<&str> for BackoffKind {
    type Error = crate::Error;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "none" => Ok(BackoffKind::None),
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            _ => Err(crate::Error::InvalidState(format!(
                "Unknown backoff kind: {}",
                s
            ))),
        }
    }
}

/// Backoff policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,

    /// Delay before the second attempt
    pub delay: Duration,

    /// Upper bound for exponential growth
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub const fn none() -> Self {
        Self {
            kind: BackoffKind::None,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub const fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay,
            max_delay: delay,
        }
    }

    pub const fn exponential(initial: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay: initial,
            max_delay: Duration::from_secs(3600),
        }
    }

    /// Delay before the next attempt, given how many attempts have run (1-based)
    pub fn calculate_delay(&self, attempts_made: u32) -> Duration {
        match self.kind {
            BackoffKind::None => Duration::ZERO,
            BackoffKind::Fixed => self.delay,
            BackoffKind::Exponential => {
                let exponent = attempts_made.saturating_sub(1).min(31) as i32;
                let delay = self.delay.as_secs_f64() * 2f64.powi(exponent);
                Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_from_ten_seconds() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(10));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(10));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(20));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(40));
    }

    #[test]
    fn test_exponential_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(10));
        assert_eq!(policy.calculate_delay(30), Duration::from_secs(3600));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(4), Duration::from_secs(5));
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [BackoffKind::None, BackoffKind::Fixed, BackoffKind::Exponential] {
            assert_eq!(BackoffKind::try_from(kind.as_str()).unwrap(), kind);
        }
        assert!(BackoffKind::try_from("linear").is_err());
    }
}
