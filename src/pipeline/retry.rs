//! Bounded retry with exponential backoff
//!
//! - Every attempt is bounded by the stage timeout
//! - Only transient errors and timeouts are retried
//! - Delay before retry n (1-based) is `base * 2^(n-1)`, capped at `max`

use std::future::Future;
use std::time::Duration;

use serde_json::json;

use super::errors::PipelineError;
use super::run::Stage;
use crate::observability::{Event, Level, RunLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retry_limit: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub stage_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_millis(5_000),
            stage_timeout: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Runs `op` until it succeeds, fails permanently or retries run out.
    ///
    /// `attempts` is incremented once per attempt so the caller can record
    /// it even when the final outcome is an error.
    pub async fn run<T, E, F, Fut>(
        &self,
        stage: Stage,
        logger: &RunLogger,
        attempts: &mut u32,
        mut op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<PipelineError>,
    {
        let mut retries = 0u32;
        loop {
            *attempts += 1;
            let error = match tokio::time::timeout(self.stage_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e.into(),
                Err(_) => PipelineError::Timeout {
                    stage,
                    timeout_ms: self.stage_timeout.as_millis() as u64,
                },
            };

            if !error.is_transient() || retries >= self.retry_limit {
                return Err(error);
            }

            retries += 1;
            let delay = self.backoff(retries);
            logger.log(
                Level::Warn,
                Event::RetryScheduled,
                Some(stage.as_str()),
                json!({
                    "retry": retries,
                    "retry_limit": self.retry_limit,
                    "delay_ms": delay.as_millis() as u64,
                    "code": error.code(),
                    "reason": error.to_string(),
                }),
            );
            tokio::time::sleep(delay).await;
        }
    }
}
