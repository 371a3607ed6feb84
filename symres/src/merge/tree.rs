//! Call tree output
//!
//! ```text
//! (root)                 total 10
//! └── main               total 10
//!     ├── handle         total 7, self 2
//!     │   └── parse      total 5, self 5
//!     └── flush          total 3, self 3
//! ```
//!
//! Every node satisfies `total == self_value + Σ child.total`. Children are
//! kept in a `BTreeMap` keyed by frame, so the tree built from a set of stacks
//! is the same whatever order they were inserted in.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use super::{Fingerprint, PathTotals};
use crate::domain::Frame;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    pub self_value: i64,
    pub total: i64,
    pub children: BTreeMap<Frame, TreeNode>,
}

impl TreeNode {
    /// Check `total == self_value + Σ child.total` for this subtree
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let children = self.children.values().fold(0i64, |acc, c| acc.wrapping_add(c.total));
        self.total == self.self_value.wrapping_add(children)
            && self.children.values().all(TreeNode::is_consistent)
    }

    fn visit<'a>(
        &'a self,
        path: &mut Vec<&'a Frame>,
        f: &mut impl FnMut(&[&'a Frame], &'a TreeNode),
    ) {
        f(path, self);
        for (frame, child) in &self.children {
            path.push(frame);
            child.visit(path, f);
            path.pop();
        }
    }
}

/// A call tree rooted at a frameless node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    root: TreeNode,
}

impl Tree {
    #[must_use]
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Sum of every inserted value
    #[must_use]
    pub fn total(&self) -> i64 {
        self.root.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && self.root.total == 0
    }

    /// Follow `path` (outermost first) from the root
    #[must_use]
    pub fn node(&self, path: &[Frame]) -> Option<&TreeNode> {
        path.iter().try_fold(&self.root, |node, frame| node.children.get(frame))
    }

    /// Canonical summary: every path with a non-zero self value
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut totals = PathTotals::default();
        self.root.visit(&mut Vec::new(), &mut |path, node| {
            if !path.is_empty() {
                let path = path.iter().map(ToString::to_string).collect::<Vec<_>>();
                totals.add(path.join(";"), node.self_value);
            }
        });
        totals.into_vec()
    }

    /// Collapsed stacks by function name
    #[must_use]
    pub fn to_folded(&self) -> Vec<(String, i64)> {
        let mut totals = PathTotals::default();
        self.root.visit(&mut Vec::new(), &mut |path, node| {
            if !path.is_empty() {
                let path = path.iter().map(|f| &*f.function).collect::<Vec<_>>();
                totals.add(path.join(";"), node.self_value);
            }
        });
        totals.into_vec()
    }
}

/// Inserts resolved stacks into a [`Tree`]
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: Tree,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a stack given leaf first
    ///
    /// `value` is added to the total of the root and of every frame on the
    /// path, and to the self value of the innermost frame. An empty stack
    /// attributes its value to the root itself. Sums wrap on overflow.
    pub fn insert(&mut self, signature: &[Frame], value: i64) {
        let mut node = &mut self.tree.root;
        node.total = node.total.wrapping_add(value);
        for frame in signature.iter().rev() {
            node = node.children.entry(frame.clone()).or_default();
            node.total = node.total.wrapping_add(value);
        }
        node.self_value = node.self_value.wrapping_add(value);
    }

    #[must_use]
    pub fn build(self) -> Tree {
        self.tree
    }
}

#[derive(Serialize)]
struct NodeView<'a> {
    #[serde(flatten)]
    frame: Option<&'a Frame>,
    #[serde(rename = "self")]
    self_value: i64,
    total: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeView<'a>>,
}

impl<'a> NodeView<'a> {
    fn new(frame: Option<&'a Frame>, node: &'a TreeNode) -> Self {
        Self {
            frame,
            self_value: node.self_value,
            total: node.total,
            children: node.children.iter().map(|(f, n)| NodeView::new(Some(f), n)).collect(),
        }
    }
}

// Frames cannot be JSON object keys, so children serialize as a list.
impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeView::new(None, &self.root).serialize(serializer)
    }
}
