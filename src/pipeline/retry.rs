use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;
use crate::config::RetryConfig;
use crate::error::FailureCause;
use super::collaborators::CollaboratorError;

/// Exponential backoff bounded by a number of tries rather than elapsed time.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_tries: u32,
    initial_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_tries: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_tries: max_tries.max(1),
            initial_delay,
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of tries.
    /// The resulting cause carries the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FailureCause>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let attempts = AtomicU32::new(0);
        let max_tries = self.max_tries;

        let retried = || {
            let fut = op();
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                fut.await.map_err(|e| {
                    if e.is_transient() && attempt < max_tries {
                        warn!("{} attempt {}/{} failed: {}; retrying", label, attempt, max_tries, e);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        };

        let backoff = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(3600))
            .with_max_elapsed_time(None)
            .build();

        let result = backoff::future::retry(backoff, retried).await;
        result.map_err(|e| e.into_cause(attempts.load(Ordering::SeqCst)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_tries,
            Duration::from_millis(config.initial_delay_ms),
            config.multiplier,
        )
    }
}
