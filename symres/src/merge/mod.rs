//! Merge logic for resolved stacks
//!
//! Resolution workers hand back `(StackSignature, values)` pairs per
//! partition. This module folds them into one of two output shapes:
//!
//! - [`Profile`] via [`ProfileBuilder`]: flat, one entry per distinct
//!   signature, values summed elementwise, pprof-style interned tables.
//! - [`Tree`] via [`TreeBuilder`]: call tree keyed by frame, `total` summed
//!   along every path, `self_value` at the innermost frame.
//!
//! Both merges are plain summation, so the output does not depend on the
//! order in which partitions or samples arrive. Sums wrap on overflow, as
//! two's-complement `int64` arithmetic does in the storage format; wrapping
//! addition is associative and commutative, so order independence holds.

pub mod profile;
pub mod tree;

use std::collections::BTreeMap;

pub use profile::{Function, Location, Profile, ProfileBuilder, ProfileSample};
pub use tree::{Tree, TreeBuilder, TreeNode};

/// Canonical, order-independent summary of a profile or tree
///
/// Each entry is a root-first call path (frames rendered with file and line,
/// joined by `;`) and the value attributed to exactly that path. Zero values
/// are omitted.
pub type Fingerprint = Vec<(String, i64)>;

/// Add `values` into `acc` elementwise, zero-extending the shorter side
pub(crate) fn add_values(acc: &mut Vec<i64>, values: &[i64]) {
    if acc.len() < values.len() {
        acc.resize(values.len(), 0);
    }
    for (slot, value) in acc.iter_mut().zip(values) {
        *slot = slot.wrapping_add(*value);
    }
}

/// Accumulates `(path, value)` pairs, merging equal paths and dropping zeros
#[derive(Debug, Default)]
pub(crate) struct PathTotals(BTreeMap<String, i64>);

impl PathTotals {
    pub(crate) fn add(&mut self, path: String, value: i64) {
        if value != 0 {
            let total = self.0.entry(path).or_insert(0);
            *total = total.wrapping_add(value);
        }
    }

    pub(crate) fn into_vec(self) -> Vec<(String, i64)> {
        self.0.into_iter().filter(|(_, v)| *v != 0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_values_extends() {
        let mut acc = vec![1, 2];
        add_values(&mut acc, &[10, 20, 30]);
        assert_eq!(acc, vec![11, 22, 30]);

        add_values(&mut acc, &[1]);
        assert_eq!(acc, vec![12, 22, 30]);
    }

    #[test]
    fn test_add_values_wraps_on_overflow() {
        let mut acc = vec![i64::MAX, 5];
        add_values(&mut acc, &[1, -5]);
        assert_eq!(acc, vec![i64::MIN, 0]);
    }

    #[test]
    fn test_path_totals_merge_and_drop_zero() {
        let mut totals = PathTotals::default();
        totals.add("a;b".to_string(), 2);
        totals.add("a;b".to_string(), 3);
        totals.add("a".to_string(), 0);
        totals.add("c".to_string(), 1);
        totals.add("c".to_string(), -1);
        assert_eq!(totals.into_vec(), vec![("a;b".to_string(), 5)]);
    }
}
