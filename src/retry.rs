//! Retries one remote call under a provider-specific error classification.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// How a provider-specific classifier judges a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider throttled us; wait and try again.
    RateLimited,
    /// Timeout or connection trouble; wait and try again.
    Transient,
    /// Provider says "no data for this query" — a successful empty result.
    RecoverableEmpty,
    /// Not worth retrying.
    Fatal,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            delay,
        }
    }

    /// Block-explorer APIs (btc.com) throttle hard; give up quickly.
    pub const fn block_explorer() -> Self {
        RetryPolicy::new(5, Duration::from_secs(1))
    }

    /// Chain-explorer APIs (Etherscan, BscScan) throttle per second and
    /// recover reliably; keep trying for a long time.
    pub const fn chain_explorer() -> Self {
        RetryPolicy::new(999, Duration::from_secs(1))
    }

    /// Runs `op` until it succeeds, fails fatally, or the policy is
    /// exhausted. `Ok(None)` means the provider signalled a recoverable
    /// empty result.
    pub async fn attempt<T, F, Fut, C>(
        &self,
        provider: &'static str,
        mut op: F,
        classify: C,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> ErrorClass,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op().await {
                Ok(value) => return Ok(Some(value)),
                Err(err) => err,
            };

            match classify(&err) {
                ErrorClass::RecoverableEmpty => {
                    debug!(provider, error = %err, "treating reply as empty result");
                    return Ok(None);
                }
                ErrorClass::Fatal => return Err(err),
                class @ (ErrorClass::RateLimited | ErrorClass::Transient) => {
                    if attempts >= self.max_attempts {
                        return Err(Error::RetryExhausted { provider, attempts });
                    }
                    debug!(
                        provider,
                        attempts,
                        ?class,
                        delay_ms = self.delay.as_millis() as u64,
                        "retrying after delay"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
