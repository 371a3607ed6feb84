//! Flat profile output
//!
//! The layout follows the pprof sampled-profile model: samples reference
//! locations by ID, locations reference functions, functions reference the
//! string table. IDs are 1-based and `string_table[0]` is always `""`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::{add_values, Fingerprint, PathTotals};
use crate::domain::{Frame, StackSignature};

/// A deduplicated stack with its summed values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSample {
    /// Location IDs, leaf first
    pub location_ids: Vec<u64>,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: u64,
    pub function_id: u64,
    pub line: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Function {
    pub id: u64,
    /// Index into the string table
    pub name: i64,
    /// Index into the string table
    pub filename: i64,
}

/// A flat sampled profile
///
/// No two samples share a stack signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub samples: Vec<ProfileSample>,
    pub locations: Vec<Location>,
    pub functions: Vec<Function>,
    pub string_table: Vec<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            locations: Vec::new(),
            functions: Vec::new(),
            string_table: vec![String::new()],
        }
    }
}

impl Profile {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn location(&self, id: u64) -> Option<&Location> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.locations.get(idx)
    }

    #[must_use]
    pub fn function(&self, id: u64) -> Option<&Function> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.functions.get(idx)
    }

    #[must_use]
    pub fn string(&self, idx: i64) -> &str {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.string_table.get(i))
            .map_or("", String::as_str)
    }

    /// Rebuild the frames of `sample`, leaf first
    ///
    /// Dangling IDs yield no frame; a profile built by [`ProfileBuilder`]
    /// never contains them.
    #[must_use]
    pub fn frames(&self, sample: &ProfileSample) -> Vec<Frame> {
        sample
            .location_ids
            .iter()
            .filter_map(|&id| {
                let loc = self.location(id)?;
                let func = self.function(loc.function_id)?;
                Some(Frame::new(
                    self.string(func.name),
                    self.string(func.filename),
                    u32::try_from(loc.line).unwrap_or_default(),
                ))
            })
            .collect()
    }

    /// Canonical summary of dimension `value_index`
    #[must_use]
    pub fn fingerprint(&self, value_index: usize) -> Fingerprint {
        let mut totals = PathTotals::default();
        for sample in &self.samples {
            let path = self.frames(sample).iter().rev().map(ToString::to_string).collect::<Vec<_>>();
            totals.add(path.join(";"), sample.values.get(value_index).copied().unwrap_or(0));
        }
        totals.into_vec()
    }

    /// Collapsed stacks (`main;handle;parse 42`) of dimension `value_index`
    ///
    /// Only function names are kept, so stacks that differ by file or line
    /// collapse into one line.
    #[must_use]
    pub fn to_folded(&self, value_index: usize) -> Vec<(String, i64)> {
        let mut totals = PathTotals::default();
        for sample in &self.samples {
            let path = sample
                .location_ids
                .iter()
                .rev()
                .filter_map(|&id| self.location(id))
                .filter_map(|loc| self.function(loc.function_id))
                .map(|func| self.string(func.name))
                .collect::<Vec<_>>();
            totals.add(path.join(";"), sample.values.get(value_index).copied().unwrap_or(0));
        }
        totals.into_vec()
    }
}

/// Groups resolved stacks by signature and sums their values
#[derive(Debug, Default)]
pub struct ProfileBuilder {
    stacks: HashMap<StackSignature, Vec<i64>>,
}

impl ProfileBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, signature: StackSignature, values: &[i64]) {
        add_values(self.stacks.entry(signature).or_default(), values);
    }

    /// Number of distinct signatures so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Intern every frame and emit samples ordered by signature
    #[must_use]
    pub fn build(self) -> Profile {
        let mut stacks: Vec<(StackSignature, Vec<i64>)> = self.stacks.into_iter().collect();
        stacks.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut tables = Interner::default();
        let samples = stacks
            .into_iter()
            .map(|(signature, values)| ProfileSample {
                location_ids: signature.iter().map(|frame| tables.location(frame)).collect(),
                values,
            })
            .collect();

        Profile {
            samples,
            locations: tables.locations,
            functions: tables.functions,
            string_table: tables.strings,
        }
    }
}

impl Extend<(StackSignature, Vec<i64>)> for ProfileBuilder {
    fn extend<I: IntoIterator<Item = (StackSignature, Vec<i64>)>>(&mut self, iter: I) {
        for (signature, values) in iter {
            self.add(signature, &values);
        }
    }
}

struct Interner {
    strings: Vec<String>,
    string_ids: HashMap<Arc<str>, i64>,
    functions: Vec<Function>,
    function_ids: HashMap<(i64, i64), u64>,
    locations: Vec<Location>,
    location_ids: HashMap<(u64, u32), u64>,
}

impl Default for Interner {
    fn default() -> Self {
        let mut string_ids = HashMap::new();
        string_ids.insert(Arc::from(""), 0);
        Self {
            strings: vec![String::new()],
            string_ids,
            functions: Vec::new(),
            function_ids: HashMap::new(),
            locations: Vec::new(),
            location_ids: HashMap::new(),
        }
    }
}

// Table lengths are bounded by memory; they always fit in i64/u64.
#[allow(clippy::cast_possible_wrap)]
impl Interner {
    fn string(&mut self, s: &Arc<str>) -> i64 {
        if let Some(&id) = self.string_ids.get(s) {
            return id;
        }
        let id = self.strings.len() as i64;
        self.strings.push(s.to_string());
        self.string_ids.insert(Arc::clone(s), id);
        id
    }

    fn function(&mut self, frame: &Frame) -> u64 {
        let key = (self.string(&frame.function), self.string(&frame.file));
        if let Some(&id) = self.function_ids.get(&key) {
            return id;
        }
        let id = self.functions.len() as u64 + 1;
        self.functions.push(Function { id, name: key.0, filename: key.1 });
        self.function_ids.insert(key, id);
        id
    }

    fn location(&mut self, frame: &Frame) -> u64 {
        let key = (self.function(frame), frame.line);
        if let Some(&id) = self.location_ids.get(&key) {
            return id;
        }
        let id = self.locations.len() as u64 + 1;
        self.locations.push(Location { id, function_id: key.0, line: i64::from(frame.line) });
        self.location_ids.insert(key, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(names: &[&str]) -> StackSignature {
        names.iter().map(|n| Frame::new(*n, "app.rs", 7)).collect()
    }

    #[test]
    fn test_identical_signatures_are_summed() {
        let mut builder = ProfileBuilder::new();
        builder.add(stack(&["leaf", "main"]), &[1, 100]);
        builder.add(stack(&["leaf", "main"]), &[2, 50]);
        builder.add(stack(&["other", "main"]), &[1, 10]);
        assert_eq!(builder.len(), 2);

        let profile = builder.build();
        assert_eq!(profile.samples.len(), 2);
        let leaf = profile
            .samples
            .iter()
            .find(|s| profile.frames(s) == stack(&["leaf", "main"]))
            .unwrap();
        assert_eq!(leaf.values, vec![3, 150]);
    }

    #[test]
    fn test_tables_are_interned() {
        let mut builder = ProfileBuilder::new();
        builder.add(stack(&["a", "main"]), &[1]);
        builder.add(stack(&["b", "main"]), &[1]);
        builder.add(stack(&["main"]), &[1]);
        let profile = builder.build();

        // "", "a", "app.rs", "main", "b" in some order
        assert_eq!(profile.string_table.len(), 5);
        assert_eq!(profile.string_table[0], "");
        assert_eq!(profile.functions.len(), 3);
        assert_eq!(profile.locations.len(), 3);
        for (i, loc) in profile.locations.iter().enumerate() {
            assert_eq!(loc.id, i as u64 + 1);
        }
    }

    #[test]
    fn test_same_function_different_lines() {
        let mut builder = ProfileBuilder::new();
        builder.add(vec![Frame::new("f", "f.rs", 1)], &[1]);
        builder.add(vec![Frame::new("f", "f.rs", 2)], &[1]);
        let profile = builder.build();
        assert_eq!(profile.functions.len(), 1);
        assert_eq!(profile.locations.len(), 2);
        assert_eq!(profile.to_folded(0), vec![("f".to_string(), 2)]);
        assert_eq!(profile.fingerprint(0).len(), 2);
    }

    #[test]
    fn test_build_is_order_independent() {
        let inputs = vec![
            (stack(&["x", "main"]), vec![1, 2]),
            (stack(&["y", "main"]), vec![3, 4]),
            (stack(&["x", "main"]), vec![5, 6]),
        ];
        let mut forward = ProfileBuilder::new();
        forward.extend(inputs.clone());
        let mut backward = ProfileBuilder::new();
        backward.extend(inputs.into_iter().rev());
        assert_eq!(forward.build(), backward.build());
    }

    #[test]
    fn test_fingerprint_and_folded() {
        let mut builder = ProfileBuilder::new();
        builder.add(stack(&["leaf", "main"]), &[2, 0]);
        let profile = builder.build();
        assert_eq!(
            profile.fingerprint(0),
            vec![("main (app.rs:7);leaf (app.rs:7)".to_string(), 2)]
        );
        assert!(profile.fingerprint(1).is_empty());
        assert_eq!(profile.to_folded(0), vec![("main;leaf".to_string(), 2)]);
    }

    #[test]
    fn test_empty_profile() {
        let profile = ProfileBuilder::new().build();
        assert!(profile.is_empty());
        assert_eq!(profile, Profile::default());
        assert!(profile.fingerprint(0).is_empty());
    }
}
