use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::config::RetrySection;

use super::error::HarvestResult;
use super::error_handler::{report_failure, RemediationAction};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    schedule: Vec<Duration>,
    jitter_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl RetryPolicy {
    pub fn new(config: RetrySection) -> Self {
        let mut schedule = config
            .schedule_ms
            .into_iter()
            .map(Duration::from_millis)
            .collect::<Vec<_>>();
        if schedule.is_empty() {
            schedule.push(Duration::from_secs(1));
            schedule.push(Duration::from_secs(2));
            schedule.push(Duration::from_secs(4));
        }
        let max_attempts = config.max_attempts.max(1);
        Self {
            max_attempts,
            schedule,
            jitter_ms: config.jitter_ms,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.schedule
            .get(attempt - 1)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ms == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
        delay + Duration::from_millis(jitter)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error, or
    /// `max_attempts` attempts have been made. The last error is returned as-is.
    pub async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> HarvestResult<RetryOutcome<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = HarvestResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    attempt += 1;
                    if !error.is_transient() || attempt >= self.max_attempts {
                        report_failure(operation_name, &error, attempt, &RemediationAction::Abort);
                        return Err(error);
                    }
                    let delay = self.jittered(self.delay_for_attempt(attempt));
                    let action = RemediationAction::RetryScheduled {
                        delay_ms: delay.as_millis() as u64,
                    };
                    report_failure(operation_name, &error, attempt, &action);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}
