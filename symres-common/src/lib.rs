//! # Shared Sample Records (Ingestion ↔ Resolver)
//!
//! Defines the storage-level records shared between the side that writes
//! profiling samples into partitions and the resolver that turns them back
//! into readable call stacks. Nothing here knows about symbols: a sample only
//! names its stack through an opaque [`StackTraceId`] that is meaningful
//! relative to one partition.
//!
//! ## Key Types
//!
//! - [`PartitionId`] - Scopes a batch of samples to one symbol-table snapshot
//! - [`StackTraceId`] - Opaque key into a partition's stack table
//! - [`Sample`] - A stack reference plus its measurement values

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Partition ID
///
/// A unit of symbol storage (e.g. a time-bounded shard). Samples queued under
/// one partition can only be resolved against that partition's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PartitionId(pub u64);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition#{}", self.0)
    }
}

impl From<u64> for PartitionId {
    fn from(id: u64) -> Self {
        PartitionId(id)
    }
}

/// Stack trace ID
///
/// Index into a partition's stack table. Two partitions may use the same ID
/// for entirely different stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StackTraceId(pub u32);

impl StackTraceId {
    /// Table index for this ID
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StackTraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack#{}", self.0)
    }
}

// ============================================================================
// Sample
// ============================================================================

/// A single profiling sample as stored in a partition
///
/// `values` holds one entry per measurement dimension (for example a sample
/// count followed by a cumulative duration). All samples of one profile share
/// the same dimension order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    pub stack_trace_id: StackTraceId,
    pub values: Vec<i64>,
}

impl Sample {
    #[must_use]
    pub fn new(stack_trace_id: StackTraceId, values: Vec<i64>) -> Self {
        Self { stack_trace_id, values }
    }
}
