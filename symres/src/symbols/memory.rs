//! In-memory symbol store
//!
//! Each partition keeps pprof-style interned tables:
//!
//! ```text
//! strings   ["", "main", "main.rs", "handle", ...]
//! functions [{name: 1, file: 2}, {name: 3, file: 2}, ...]
//! locations [{function: 0, line: 12}, ...]
//! stacks    [root, {parent: 0, location: 0}, {parent: 1, location: 1}, ...]
//! ```
//!
//! The stack table is a prefix tree stored as parent pointers: stacks that
//! share callers share nodes, and a stack trace ID is simply the index of its
//! leaf node. Node 0 is the root and stands for the empty stack.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::{PartitionReader, SymbolsSource};
use crate::context::Context;
use crate::domain::{Frame, PartitionId, StackTraceId, SymbolsError};

const ROOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FunctionRecord {
    name: u32,
    file: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LocationRecord {
    function: u32,
    line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StackNode {
    parent: u32,
    location: u32,
}

/// Symbol tables of one partition
#[derive(Debug)]
struct PartitionTables {
    strings: Vec<Arc<str>>,
    functions: Vec<FunctionRecord>,
    locations: Vec<LocationRecord>,
    stacks: Vec<StackNode>,
}

impl PartitionTables {
    fn frame(&self, partition: PartitionId, location: u32) -> Result<Frame, SymbolsError> {
        let corrupt = |reason: String| SymbolsError::CorruptStackTable { partition, reason };

        let loc = self
            .locations
            .get(location as usize)
            .ok_or_else(|| corrupt(format!("location {location} out of range")))?;
        let func = self
            .functions
            .get(loc.function as usize)
            .ok_or_else(|| corrupt(format!("function {} out of range", loc.function)))?;
        let string = |idx: u32| {
            self.strings
                .get(idx as usize)
                .cloned()
                .ok_or_else(|| corrupt(format!("string {idx} out of range")))
        };

        Ok(Frame { function: string(func.name)?, file: string(func.file)?, line: loc.line })
    }

    fn resolve(
        &self,
        partition: PartitionId,
        stack_trace_id: StackTraceId,
        frames: &mut Vec<Frame>,
    ) -> Result<(), SymbolsError> {
        frames.clear();
        if stack_trace_id.index() >= self.stacks.len() {
            return Err(SymbolsError::UnknownStackTrace { partition, stack_trace_id });
        }

        // An acyclic chain visits each non-root node at most once.
        let mut id = stack_trace_id.0;
        while id != ROOT {
            if frames.len() >= self.stacks.len() {
                frames.clear();
                return Err(SymbolsError::CorruptStackTable {
                    partition,
                    reason: format!("{stack_trace_id} loops back on itself"),
                });
            }
            let Some(node) = self.stacks.get(id as usize) else {
                frames.clear();
                return Err(SymbolsError::CorruptStackTable {
                    partition,
                    reason: format!("parent {id} out of range"),
                });
            };
            match self.frame(partition, node.location) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    frames.clear();
                    return Err(err);
                }
            }
            id = node.parent;
        }
        Ok(())
    }

    fn validate(&self, partition: PartitionId) -> Result<(), SymbolsError> {
        let corrupt = |reason: String| SymbolsError::CorruptStackTable { partition, reason };
        for (idx, node) in self.stacks.iter().enumerate().skip(1) {
            if node.parent as usize >= idx {
                return Err(corrupt(format!("node {idx} points forward to {}", node.parent)));
            }
            if node.location as usize >= self.locations.len() {
                return Err(corrupt(format!("node {idx} references location {}", node.location)));
            }
        }
        Ok(())
    }
}

/// Builds the symbol tables of one partition
///
/// Strings, functions and locations are interned; stacks sharing callers
/// share stack-table nodes.
#[derive(Debug)]
pub struct PartitionWriter {
    partition: PartitionId,
    tables: PartitionTables,
    string_index: HashMap<Arc<str>, u32>,
    function_index: HashMap<FunctionRecord, u32>,
    location_index: HashMap<LocationRecord, u32>,
    stack_index: HashMap<StackNode, u32>,
}

impl PartitionWriter {
    #[must_use]
    pub fn new(partition: PartitionId) -> Self {
        let empty: Arc<str> = Arc::from("");
        let mut string_index = HashMap::new();
        string_index.insert(Arc::clone(&empty), 0);
        Self {
            partition,
            tables: PartitionTables {
                strings: vec![empty],
                functions: Vec::new(),
                locations: Vec::new(),
                stacks: vec![StackNode { parent: ROOT, location: 0 }],
            },
            string_index,
            function_index: HashMap::new(),
            location_index: HashMap::new(),
            stack_index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn partition_id(&self) -> PartitionId {
        self.partition
    }

    /// Append a stack (leaf first) and return its ID
    ///
    /// Appending an identical stack twice returns the same ID.
    ///
    /// # Panics
    /// Panics if a table grows beyond `u32::MAX` entries.
    pub fn append_stack(&mut self, frames: &[Frame]) -> StackTraceId {
        let mut parent = ROOT;
        for frame in frames.iter().rev() {
            let location = self.location(frame);
            let node = StackNode { parent, location };
            parent = match self.stack_index.get(&node) {
                Some(&id) => id,
                None => {
                    let id = Self::next_id(self.tables.stacks.len());
                    self.tables.stacks.push(node);
                    self.stack_index.insert(node, id);
                    id
                }
            };
        }
        StackTraceId(parent)
    }

    /// Number of stack-table nodes, including the root
    #[must_use]
    pub fn stack_nodes(&self) -> usize {
        self.tables.stacks.len()
    }

    fn location(&mut self, frame: &Frame) -> u32 {
        let function =
            FunctionRecord { name: self.string(&frame.function), file: self.string(&frame.file) };
        let function = match self.function_index.get(&function) {
            Some(&id) => id,
            None => {
                let id = Self::next_id(self.tables.functions.len());
                self.tables.functions.push(function);
                self.function_index.insert(function, id);
                id
            }
        };

        let location = LocationRecord { function, line: frame.line };
        if let Some(&id) = self.location_index.get(&location) {
            return id;
        }
        let id = Self::next_id(self.tables.locations.len());
        self.tables.locations.push(location);
        self.location_index.insert(location, id);
        id
    }

    fn string(&mut self, s: &Arc<str>) -> u32 {
        if let Some(&id) = self.string_index.get(s) {
            return id;
        }
        let id = Self::next_id(self.tables.strings.len());
        self.tables.strings.push(Arc::clone(s));
        self.string_index.insert(Arc::clone(s), id);
        id
    }

    // Tables are indexed by u32; a partition holding more than u32::MAX
    // entries in any table is outside what the stack IDs can address.
    #[allow(clippy::cast_possible_truncation)]
    fn next_id(len: usize) -> u32 {
        assert!(u32::try_from(len).is_ok(), "symbol table overflow");
        len as u32
    }
}

/// In-memory [`SymbolsSource`]
///
/// Readers are reference counted so tests can verify that every acquired
/// reader was released.
#[derive(Default)]
pub struct MemorySymbols {
    partitions: RwLock<HashMap<PartitionId, Arc<PartitionTables>>>,
    acquire_delay: Duration,
    partition_delays: HashMap<PartitionId, Duration>,
    open_readers: Arc<AtomicUsize>,
    acquisitions: AtomicUsize,
}

impl MemorySymbols {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every acquisition by `delay`, racing it against the caller's context
    #[must_use]
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Delay acquisitions of `partition` by `delay`, overriding the default delay
    #[must_use]
    pub fn with_partition_delay(mut self, partition: PartitionId, delay: Duration) -> Self {
        self.partition_delays.insert(partition, delay);
        self
    }

    /// Publish a partition's tables, replacing any previous version
    pub fn insert(&self, writer: PartitionWriter) {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        debug!(
            "Publishing {} ({} stack nodes, {} locations)",
            writer.partition,
            writer.tables.stacks.len(),
            writer.tables.locations.len()
        );
        partitions.insert(writer.partition, Arc::new(writer.tables));
    }

    /// Readers acquired and not yet released
    #[must_use]
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::Acquire)
    }

    /// Total number of successful acquisitions
    #[must_use]
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Acquire)
    }

    fn tables(&self, partition: PartitionId) -> Option<Arc<PartitionTables>> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        partitions.get(&partition).cloned()
    }
}

#[async_trait]
impl SymbolsSource for MemorySymbols {
    async fn partition(
        &self,
        ctx: &dyn Context,
        partition: PartitionId,
    ) -> Result<Arc<dyn PartitionReader>, SymbolsError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let delay = self.partition_delays.get(&partition).copied().unwrap_or(self.acquire_delay);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                () = ctx.done() => return Err(ctx.err().unwrap_or(SymbolsError::Canceled)),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let tables = self.tables(partition).ok_or(SymbolsError::PartitionNotFound(partition))?;

        // No await past this point: a reader is only counted once it is returned.
        self.open_readers.fetch_add(1, Ordering::AcqRel);
        self.acquisitions.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MemoryPartitionReader {
            partition,
            tables,
            open_readers: Arc::clone(&self.open_readers),
            released: AtomicBool::new(false),
        }))
    }

    async fn load(&self, ctx: &dyn Context) -> Result<(), SymbolsError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        for (id, tables) in partitions.iter() {
            tables.validate(*id)?;
        }
        debug!("Validated {} partitions", partitions.len());
        Ok(())
    }
}

struct MemoryPartitionReader {
    partition: PartitionId,
    tables: Arc<PartitionTables>,
    open_readers: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl PartitionReader for MemoryPartitionReader {
    fn partition_id(&self) -> PartitionId {
        self.partition
    }

    fn resolve_stack(
        &self,
        stack_trace_id: StackTraceId,
        frames: &mut Vec<Frame>,
    ) -> Result<(), SymbolsError> {
        if self.released.load(Ordering::Acquire) {
            return Err(SymbolsError::AlreadyReleased(self.partition));
        }
        self.tables.resolve(self.partition, stack_trace_id, frames)
    }

    fn release(&self) -> Result<(), SymbolsError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(SymbolsError::AlreadyReleased(self.partition));
        }
        self.open_readers.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }
}
