//! Cancellation-aware reconnect-and-retry.
//!
//! Every façade operation of both store managers runs through [`with_reconnect`]:
//!
//! 1. stop signal set → `Cancelled`, the operation is never dispatched
//! 2. run the operation
//! 3. transient failure → check the stop signal again, optionally wait the reconnect
//!    delay (still watching the stop signal), rebuild the connection once
//! 4. run the operation once more and return whatever it yields
//!
//! At most two attempts and one rebuild per call. Cancellation is polled at those
//! decision points only; an attempt already in flight is never interrupted.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::config::RECONNECT_DELAY;
use crate::error_handling::{StoreError, StoreKind};

/// Pacing for the single reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between the failed attempt and the rebuild.
    pub reconnect_delay: Duration,
}

impl RetryPolicy {
    /// Rebuild right away, without waiting.
    pub fn immediate() -> Self {
        Self {
            reconnect_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Identifies one logical operation for cancellation checks and logs.
#[derive(Debug, Clone, Copy)]
pub struct RetryGuard<'a> {
    pub stop: &'a CancellationToken,
    pub store: StoreKind,
    pub operation: &'static str,
    pub policy: RetryPolicy,
}

impl RetryGuard<'_> {
    fn check_stop(&self) -> Result<(), StoreError> {
        if self.stop.is_cancelled() {
            debug!(
                "{} {}: stop signal set, aborting",
                self.store, self.operation
            );
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&self) -> StoreError {
        StoreError::Cancelled {
            store: self.store,
            operation: self.operation,
        }
    }
}

/// Runs `op`, rebuilding the connection and retrying once on a transient failure.
///
/// `is_transient` is the store-specific classification. `reconnect` is called at
/// most once; if it fails the error is wrapped in `StoreError::ReconnectFailed` and
/// the operation is not retried.
///
/// # Errors
///
/// - `StoreError::Cancelled` if the stop signal is set before the first attempt,
///   after a transient failure, or during the reconnect delay
/// - `StoreError::ReconnectFailed` if the rebuild itself fails
/// - the operation's own error: immediately for non-transient failures, and the
///   second attempt's error (unchanged) otherwise
pub async fn with_reconnect<T, Op, Fut, Rc, RcFut>(
    guard: RetryGuard<'_>,
    is_transient: fn(&StoreError) -> bool,
    mut op: Op,
    reconnect: Rc,
) -> Result<T, StoreError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
    Rc: FnOnce() -> RcFut,
    RcFut: Future<Output = Result<(), StoreError>>,
{
    guard.check_stop()?;

    let first = match op().await {
        Ok(value) => return Ok(value),
        Err(err) if is_transient(&err) => err,
        Err(err) => return Err(err),
    };

    guard.check_stop()?;
    warn!(
        "{} {} failed with a transient error, reconnecting: {}",
        guard.store, guard.operation, first
    );

    if !guard.policy.reconnect_delay.is_zero() {
        tokio::select! {
            _ = guard.stop.cancelled() => return Err(guard.cancelled()),
            _ = tokio::time::sleep(guard.policy.reconnect_delay) => {}
        }
    }

    reconnect()
        .await
        .map_err(|source| StoreError::ReconnectFailed {
            store: guard.store,
            source: Box::new(source),
        })?;

    let result = op().await;
    if let Err(ref err) = result {
        warn!(
            "{} {} failed again after reconnect: {}",
            guard.store, guard.operation, err
        );
    }
    result
}
