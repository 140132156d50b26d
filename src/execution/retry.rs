//! Retry Policy
//!
//! Re-runs a failing operation according to a count, a base interval and a
//! backoff curve. Attempts are numbered from 1; the delay before attempt
//! `n + 1` is computed from `n`:
//!
//! - `none`: `interval`
//! - `linear`: `interval * n`
//! - `exponential`: `interval * 2^(n - 1)`
//!
//! Every delay is capped by the policy's ceiling.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Backoff curve between attempts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    None,
    Linear,
    Exponential,
}

/// Declared retry settings of a step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub count: u32,
    /// Base delay between attempts
    pub interval_ms: u64,
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn new(count: u32, interval_ms: u64, backoff: Backoff) -> Self {
        Self {
            count,
            interval_ms,
            backoff,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }
}

/// An operation that can be attempted more than once.
#[async_trait]
pub trait RetryOperation: Send {
    type Output: Send;

    /// Runs one attempt. `attempt` starts at 1.
    async fn attempt(&mut self, attempt: u32) -> Result<Self::Output, FlowError>;

    /// Called after a failed attempt when another one will follow.
    async fn on_retry(&mut self, _attempt: u32, _error: &FlowError, _delay: Duration) {}
}

/// A retry configuration bound to a delay ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, max_delay: Duration) -> Self {
        Self { config, max_delay }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay after the failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let interval = self.config.interval_ms;
        let factor: u64 = match self.config.backoff {
            Backoff::None => 1,
            Backoff::Linear => u64::from(attempt.max(1)),
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(63);
                1u64.checked_shl(exponent).unwrap_or(u64::MAX)
            }
        };

        let millis = interval.saturating_mul(factor);
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Runs `op` until it succeeds or the retry budget is spent.
    ///
    /// Returns the last error once every attempt has failed.
    pub async fn run<O: RetryOperation>(&self, op: &mut O) -> Result<O::Output, FlowError> {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 1;

        loop {
            match op.attempt(attempt).await {
                Ok(output) => return Ok(output),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );
                    op.on_retry(attempt, &e, delay).await;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
