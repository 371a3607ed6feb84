//! # symres - Partitioned Stack Trace Resolution
//!
//! symres turns storage-level profiling samples (a stack trace ID plus a
//! vector of values, grouped by partition) into human-readable output: a
//! flat pprof-style [`Profile`](merge::Profile) or a call
//! [`Tree`](merge::Tree). Each partition owns its own symbol tables, so every
//! partition is acquired from a [`SymbolsSource`](symbols::SymbolsSource),
//! resolved independently, and merged at the end.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Caller                                 │
//! │         add_samples(partition, [(stack_id, values)..])          │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ profile() / tree()
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Resolver                                 │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Workers    │──▶│   Readers    │──▶│    Merge     │         │
//! │  │ (1/partition)│   │ (owned until │   │ Profile/Tree │         │
//! │  └──────────────┘   │   release)   │   └──────────────┘         │
//! │         │           └──────────────┘          │                 │
//! │         │ Context: cancel / deadline          ▼                 │
//! │         │                             ┌──────────────┐          │
//! │         ▼                             │    Export    │          │
//! │  ┌──────────────┐                     │ JSON, folded │          │
//! │  │SymbolsSource │                     └──────────────┘          │
//! │  │ (partitions) │                                               │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`resolver`]: queues samples, runs one worker per partition with bounded
//!   concurrency, owns acquired readers and releases them exactly once
//! - [`symbols`]: the capability traits plus an in-memory symbol store and
//!   the JSON dataset format used by the CLI
//! - [`merge`]: profile and tree builders, fingerprints, folded stacks
//! - [`context`]: cancellation signals (tokens, deadlines, test contexts)
//! - [`export`]: writes results as JSON or collapsed stacks
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: core types and error enums
//!
//! ## Typical Usage
//!
//! ```bash
//! # Flat profile of a dataset
//! symres --input dataset.json
//!
//! # Flamegraph input, second value dimension, 2s budget
//! symres --input dataset.json --format folded --value 1 --timeout-ms 2000
//! ```
//!
//! ## Key Concepts
//!
//! - **Partition**: an independently stored shard of profile data with its
//!   own symbol tables; stack trace IDs are only meaningful within it
//! - **Stack signature**: the resolved frames of one stack, leaf first
//! - **Release**: returning every acquired partition reader to its source

pub mod cli;
pub mod context;
pub mod domain;
pub mod export;
pub mod merge;
pub mod resolver;
pub mod symbols;

pub use resolver::{Resolver, ResolverConfig};
