//! Retry pacing for upstream GETs

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("gave up after {attempts} retries")]
pub struct RetriesExhausted {
    pub attempts: u32,
}

/// Doubling wait between attempts, capped at `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (zero based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            retries: 0,
        }
    }
}

/// Retry state for one logical request
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    retries: u32,
}

impl Backoff {
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sleep before the next attempt, or fail once the budget is spent
    pub async fn wait(&mut self, what: &str) -> Result<(), RetriesExhausted> {
        if self.retries >= self.policy.max_retries {
            return Err(RetriesExhausted {
                attempts: self.retries,
            });
        }

        let delay = self.policy.delay(self.retries);
        self.retries += 1;
        log::warn!(
            "⏳ {} failed, retry {}/{} in {:?}",
            what,
            self.retries,
            self.policy.max_retries,
            delay
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}
