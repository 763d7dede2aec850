//! Bounded retries, submission and confirmation polling.
//!
//! Idempotent reads are retried with exponential backoff. Submissions
//! are retried only while no transaction reference has come back; once a
//! reference exists the caller waits for confirmation or timeout and
//! never submits again.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::ledger::{LedgerGateway, TransactionRequest, TxDetails, TxFailure, TxStatus};
use crate::config::BurnerConfig;
use crate::domain::{SignerRef, TxRef};
use crate::error::PipelineError;

/// Exponential backoff for idempotent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Read retry policy from configuration.
    #[must_use]
    pub fn from_config(config: &BurnerConfig) -> Self {
        Self {
            max_attempts: config.read_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_ms),
            max_delay: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        op = what,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Submission and confirmation settings shared by the executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPolicy {
    /// Backoff used for reads and between submission attempts.
    pub retry: RetryPolicy,
    /// Submission attempts while no reference has been returned.
    pub submit_max_attempts: u32,
    /// How long to wait for confirmation.
    pub confirm_timeout: Duration,
    /// Interval between confirmation lookups.
    pub confirm_poll: Duration,
}

impl TxPolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn from_config(config: &BurnerConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            submit_max_attempts: config.submit_max_attempts.max(1),
            confirm_timeout: config.confirm_timeout(),
            confirm_poll: Duration::from_millis(config.confirm_poll_ms.max(1)),
        }
    }

    /// Submits `tx`, retrying only failures that returned no reference.
    ///
    /// # Errors
    ///
    /// Returns the last submission error once attempts are exhausted or
    /// the error is not retryable.
    pub async fn submit(
        &self,
        gateway: &dyn LedgerGateway,
        tx: &TransactionRequest,
        signer: &SignerRef,
    ) -> Result<TxRef, PipelineError> {
        let attempts = self.submit_max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match gateway.submit_transaction(tx, signer).await {
                Ok(tx_ref) => {
                    tracing::info!(kind = %tx.kind(), %tx_ref, "transaction submitted");
                    return Ok(tx_ref);
                }
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    tracing::warn!(kind = %tx.kind(), attempt = attempt + 1, error = %e, "submission failed");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Polls until `tx_ref` confirms, fails, or the timeout elapses.
    ///
    /// Lookup errors while polling are treated as "unknown yet": the
    /// transaction may already have landed.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::SlippageExceeded`] or
    ///   [`PipelineError::TransactionFailed`] when the ledger reports failure.
    /// - [`PipelineError::ConfirmationTimeout`] when no verdict arrives in time.
    pub async fn await_confirmation(
        &self,
        gateway: &dyn LedgerGateway,
        tx_ref: &TxRef,
    ) -> Result<TxDetails, PipelineError> {
        let started = Instant::now();
        loop {
            match gateway.confirm(tx_ref).await {
                Ok(TxStatus::Confirmed(details)) => return Ok(details),
                Ok(TxStatus::Failed(TxFailure::SlippageExceeded)) => {
                    return Err(PipelineError::SlippageExceeded(format!(
                        "transaction {tx_ref} rejected by the ledger"
                    )));
                }
                Ok(TxStatus::Failed(failure)) => {
                    return Err(PipelineError::TransactionFailed {
                        tx_ref: tx_ref.clone(),
                        reason: failure.to_string(),
                    });
                }
                Ok(TxStatus::NotFound | TxStatus::Processing) => {}
                Err(e) => {
                    tracing::debug!(%tx_ref, error = %e, "confirmation lookup failed");
                }
            }

            if started.elapsed() >= self.confirm_timeout {
                return Err(PipelineError::ConfirmationTimeout {
                    tx_ref: tx_ref.clone(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.confirm_poll).await;
        }
    }

    /// Single idempotent status lookup with read retries.
    ///
    /// # Errors
    ///
    /// Returns the gateway error once read attempts are exhausted.
    pub async fn lookup(
        &self,
        gateway: &dyn LedgerGateway,
        tx_ref: &TxRef,
    ) -> Result<TxStatus, PipelineError> {
        self.retry.run("confirm", || gateway.confirm(tx_ref)).await
    }
}
