use std::time::Duration;

use crate::config::ReconnectConfig;

/// Attempt counter for the bounded reconnect policy.
///
/// Delays follow `base * multiplier^(attempt - 1)` with no jitter and no cap.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Claim the next attempt and return its delay, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.config.delay_for_attempt(self.attempts))
    }

    /// Forget previous failures after a successful open
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts claimed since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
