//! Reconnect policies for the broker connector

use std::time::Duration;

/// Policy deciding how long to wait before the next reconnect attempt
pub trait ReconnectPolicy: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Fixed-delay reconnect: retry forever at a constant interval
///
/// No backoff and no retry cap. That is adequate for a small fixed set of
/// services sharing one broker, and the trait seam exists so a stricter
/// policy can be swapped in without touching call sites.
#[derive(Clone, Debug)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = FixedDelay {
            delay: Duration::from_millis(250),
        };
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_delay_is_five_seconds() {
        assert_eq!(FixedDelay::default().next_delay(), Duration::from_secs(5));
    }
}
