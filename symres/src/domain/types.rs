//! Domain types providing compile-time safety and self-documentation
//!
//! Storage-level identifiers live in `symres-common`; the types here only
//! exist once a stack has been resolved against a partition's symbols.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// A resolved stack frame
///
/// Function name, source file and line form the display identity of a frame:
/// two frames are the same frame iff all three are equal, regardless of which
/// partition they were resolved from. Strings are shared so that frames can
/// be cloned into many signatures cheaply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Frame {
    pub function: Arc<str>,
    pub file: Arc<str>,
    pub line: u32,
}

impl Frame {
    pub fn new(function: impl Into<Arc<str>>, file: impl Into<Arc<str>>, line: u32) -> Self {
        Self { function: function.into(), file: file.into(), line }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}", self.function)
        } else {
            write!(f, "{} ({}:{})", self.function, self.file, self.line)
        }
    }
}

/// A fully resolved call stack, innermost (leaf) frame first
///
/// Equal signatures identify the same logical stack and are merged.
pub type StackSignature = Vec<Frame>;

/// A resolved signature paired with the values of the sample it came from
pub type ResolvedSample = (StackSignature, Vec<i64>);
