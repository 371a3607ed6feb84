//! Domain model for symres
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use symres_common::{PartitionId, Sample, StackTraceId};
pub use types::{Frame, ResolvedSample, StackSignature};

pub use errors::{ResolveError, SymbolsError};
