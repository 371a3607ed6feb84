//! Output writers
//!
//! Resolved profiles and trees can be written as JSON or as collapsed
//! ("folded") stacks, one `outer;inner;leaf value` line per path, which
//! flamegraph tooling consumes directly.

pub mod report;

pub use report::{OutputFormat, Report};
