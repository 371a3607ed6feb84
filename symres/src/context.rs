//! # Cancellation Contexts
//!
//! Every partition acquisition and every potentially slow resolution step
//! runs under a caller-supplied [`Context`]. A context answers two questions:
//!
//! - [`Context::done`]: a future that completes once the context is canceled,
//!   raced against pending work with `tokio::select!`
//! - [`Context::err`]: a cheap, non-blocking poll returning the cancellation
//!   error, if any
//!
//! ## Implementations
//!
//! | Type                 | Cancels when                            | Error              |
//! |----------------------|-----------------------------------------|--------------------|
//! | [`Background`]       | never                                   | -                  |
//! | `CancellationToken`  | the token (or a parent token) is canceled | `Canceled`       |
//! | [`Deadline`]         | the parent cancels or the instant passes | `DeadlineExceeded` |
//! | [`CancelAfter`]      | `done` has been observed more than N times | `Canceled`     |
//!
//! [`CancelAfter`] is a decorator meant for tests: by sweeping N upward it
//! flips to canceled at every observation point of a pipeline in turn.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::SymbolsError;

/// A cancellation signal shared by all work done on behalf of one caller
#[async_trait]
pub trait Context: Send + Sync {
    /// Completes once the context is canceled. Never completes otherwise.
    async fn done(&self);

    /// Returns the cancellation error if the context has been canceled.
    fn err(&self) -> Option<SymbolsError>;
}

/// Convenience constructor for a context that is never canceled
#[must_use]
pub fn background() -> Arc<dyn Context> {
    Arc::new(Background)
}

/// A context that is never canceled
#[derive(Debug, Clone, Copy, Default)]
pub struct Background;

#[async_trait]
impl Context for Background {
    async fn done(&self) {
        futures::future::pending::<()>().await;
    }

    fn err(&self) -> Option<SymbolsError> {
        None
    }
}

#[async_trait]
impl Context for CancellationToken {
    async fn done(&self) {
        self.cancelled().await;
    }

    fn err(&self) -> Option<SymbolsError> {
        self.is_cancelled().then_some(SymbolsError::Canceled)
    }
}

/// A context that expires at a fixed instant
///
/// Cancellation of the parent wins over expiry: if the parent reports an
/// error, that error is returned unchanged.
pub struct Deadline {
    parent: Arc<dyn Context>,
    deadline: Instant,
}

impl Deadline {
    pub fn new(parent: Arc<dyn Context>, deadline: Instant) -> Self {
        Self { parent, deadline }
    }

    pub fn after(parent: Arc<dyn Context>, timeout: std::time::Duration) -> Self {
        Self::new(parent, Instant::now() + timeout)
    }
}

#[async_trait]
impl Context for Deadline {
    async fn done(&self) {
        tokio::select! {
            () = self.parent.done() => {}
            () = tokio::time::sleep_until(self.deadline) => {}
        }
    }

    fn err(&self) -> Option<SymbolsError> {
        self.parent
            .err()
            .or_else(|| (Instant::now() >= self.deadline).then_some(SymbolsError::DeadlineExceeded))
    }
}

/// A context that cancels itself after `done` has been observed `threshold` times
///
/// Each call to [`Context::done`] counts as one observation. Once the count
/// exceeds the threshold the context stays canceled; `err` reports
/// [`SymbolsError::Canceled`] from then on. Until then it behaves exactly like
/// its parent.
pub struct CancelAfter {
    parent: Arc<dyn Context>,
    threshold: u64,
    observed: AtomicU64,
    token: CancellationToken,
}

impl CancelAfter {
    pub fn new(parent: Arc<dyn Context>, threshold: u64) -> Self {
        Self { parent, threshold, observed: AtomicU64::new(0), token: CancellationToken::new() }
    }

    /// Number of `done` observations so far
    #[must_use]
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Context for CancelAfter {
    async fn done(&self) {
        if self.observed.fetch_add(1, Ordering::AcqRel) + 1 > self.threshold {
            self.token.cancel();
        }
        tokio::select! {
            () = self.parent.done() => {}
            () = self.token.cancelled() => {}
        }
    }

    fn err(&self) -> Option<SymbolsError> {
        if self.observed.load(Ordering::Acquire) > self.threshold {
            return Some(SymbolsError::Canceled);
        }
        self.parent.err()
    }
}
