//! Structured error types for symres
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Both enums are `Clone` so a resolver can hand the same failure to every
//! caller that asks for its outcome.

use std::sync::Arc;

use symres_common::{PartitionId, StackTraceId};
use thiserror::Error;

/// Errors raised by a symbols source or one of its partition readers
#[derive(Error, Debug, Clone)]
pub enum SymbolsError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("{0} not found")]
    PartitionNotFound(PartitionId),

    #[error("unknown {stack_trace_id} in {partition}")]
    UnknownStackTrace { partition: PartitionId, stack_trace_id: StackTraceId },

    #[error("corrupt stack table in {partition}: {reason}")]
    CorruptStackTable { partition: PartitionId, reason: String },

    #[error("reader for {0} already released")]
    AlreadyReleased(PartitionId),

    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SymbolsError {
    /// True for errors caused by the caller's context rather than the source
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SymbolsError::Canceled | SymbolsError::DeadlineExceeded)
    }
}

impl From<std::io::Error> for SymbolsError {
    fn from(err: std::io::Error) -> Self {
        SymbolsError::Io(Arc::new(err))
    }
}

/// Errors returned by [`Resolver`](crate::resolver::Resolver) operations
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// The symbols source or a partition reader failed; carried unmodified
    #[error(transparent)]
    Symbols(#[from] SymbolsError),

    #[error("samples cannot be added once resolution has started")]
    Sealed,

    #[error("resolver has been released")]
    Released,

    #[error("resolution worker panicked: {0}")]
    WorkerPanicked(String),
}

impl ResolveError {
    /// The underlying source error, if this failure came from the source
    #[must_use]
    pub fn symbols(&self) -> Option<&SymbolsError> {
        match self {
            ResolveError::Symbols(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.symbols().is_some_and(SymbolsError::is_cancellation)
    }
}
