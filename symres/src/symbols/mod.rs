//! # Symbol Sources and Partition Readers
//!
//! Samples reference their call stacks through opaque [`StackTraceId`]s. To
//! show a stack to a human the ID has to be joined against the symbol tables
//! of the partition the sample was written to:
//!
//! ```text
//! StackTraceId(17)                      (partition-relative)
//!     │
//!     ▼  stack table
//! [loc 4] → [loc 9] → [loc 2]           (leaf first, parent pointers)
//!     │
//!     ▼  locations + functions + strings
//! parse_header  (http/parse.rs:88)
//! handle_conn   (http/server.rs:140)
//! main          (main.rs:12)
//! ```
//!
//! This crate never touches the storage format itself. It consumes two
//! capabilities:
//!
//! - [`SymbolsSource`]: hands out a reader for one partition. Acquisition may
//!   perform I/O and must honour the caller's [`Context`].
//! - [`PartitionReader`]: resolves stack IDs of its partition into frames and
//!   must be released exactly once when the caller is done with it.
//!
//! ## Module Structure
//!
//! - **`memory`**: [`MemorySymbols`], an in-memory reference source with
//!   interned string/function/location tables and a prefix-sharing stack
//!   table. Used by the CLI and by tests as a deterministic stand-in.
//! - **`dataset`**: JSON datasets of raw, already symbolized samples that can
//!   be indexed into a [`MemorySymbols`].

pub mod dataset;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::domain::{Frame, PartitionId, StackTraceId, SymbolsError};

pub use dataset::{Dataset, DatasetPartition, RawSample};
pub use memory::{MemorySymbols, PartitionWriter};

/// Source of per-partition symbol readers
///
/// Implementations are shared between many resolvers and must accept
/// concurrent calls. `partition` must be cancel-safe: dropping the returned
/// future before it completes must not leak a reader.
#[async_trait]
pub trait SymbolsSource: Send + Sync {
    /// Acquire a reader for `partition`
    ///
    /// # Errors
    /// Returns the context's error if it is canceled before the reader is
    /// ready, or a storage error if the partition cannot be opened.
    async fn partition(
        &self,
        ctx: &dyn Context,
        partition: PartitionId,
    ) -> Result<Arc<dyn PartitionReader>, SymbolsError>;

    /// Eagerly load every partition's tables
    ///
    /// # Errors
    /// Returns the context's error on cancellation or a storage error.
    async fn load(&self, ctx: &dyn Context) -> Result<(), SymbolsError>;
}

/// Reader over one partition's symbol tables
pub trait PartitionReader: Send + Sync {
    fn partition_id(&self) -> PartitionId;

    /// Resolve `stack_trace_id` into `frames`, leaf first
    ///
    /// `frames` is cleared before use so callers can reuse one buffer.
    ///
    /// Resolution is synchronous and takes no context. The resolver only
    /// checks for cancellation between samples, every
    /// [`CANCEL_CHECK_INTERVAL`](crate::resolver::CANCEL_CHECK_INTERVAL)
    /// of them, so a reader that performs I/O here delays cancellation by up
    /// to that many calls. Readers backed by slow storage should load their
    /// tables during [`SymbolsSource::partition`], which does race the context.
    ///
    /// # Errors
    /// Fails for unknown IDs and corrupt tables; never returns a partial stack.
    fn resolve_stack(
        &self,
        stack_trace_id: StackTraceId,
        frames: &mut Vec<Frame>,
    ) -> Result<(), SymbolsError>;

    /// Give the reader back to its source
    ///
    /// # Errors
    /// Implementations may fail (e.g. a second release); callers log and move on.
    fn release(&self) -> Result<(), SymbolsError>;
}
