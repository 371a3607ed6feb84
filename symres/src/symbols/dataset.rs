//! JSON datasets of raw profiling samples
//!
//! A dataset carries already symbolized samples grouped by partition. It is
//! the input format of the `symres` CLI and of the integration tests: indexing
//! a dataset writes its stacks into a [`MemorySymbols`] and yields the
//! storage-level [`Sample`]s a resolver would normally receive from the
//! ingestion pipeline.
//!
//! ```json
//! {
//!   "partitions": [
//!     {
//!       "id": 0,
//!       "samples": [
//!         {
//!           "stack": [
//!             { "function": "parse", "file": "parse.rs", "line": 10 },
//!             { "function": "main", "file": "main.rs", "line": 3 }
//!           ],
//!           "values": [1, 250]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::memory::{MemorySymbols, PartitionWriter};
use crate::domain::{Frame, PartitionId, ResolvedSample, Sample};

/// A frame as written in a dataset file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    pub function: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
}

impl From<&RawFrame> for Frame {
    fn from(raw: &RawFrame) -> Self {
        Frame::new(raw.function.as_str(), raw.file.as_str(), raw.line)
    }
}

/// A symbolized sample: frames leaf first plus its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub stack: Vec<RawFrame>,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPartition {
    pub id: PartitionId,
    pub samples: Vec<RawSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub partitions: Vec<DatasetPartition>,
}

impl Dataset {
    /// Parse a dataset file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid dataset
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid dataset {}", path.display()))
    }

    /// # Errors
    /// Returns an error if `json` is not a valid dataset
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write every partition's stacks into `symbols`
    ///
    /// Returns the storage-level samples for each partition, in dataset order.
    /// Partitions listed more than once are merged into one set of tables.
    pub fn index(&self, symbols: &MemorySymbols) -> Vec<(PartitionId, Vec<Sample>)> {
        let mut writers: Vec<PartitionWriter> = Vec::new();
        let mut queued: Vec<(PartitionId, Vec<Sample>)> = Vec::new();

        for partition in &self.partitions {
            let slot = match writers.iter().position(|w| w.partition_id() == partition.id) {
                Some(slot) => slot,
                None => {
                    writers.push(PartitionWriter::new(partition.id));
                    writers.len() - 1
                }
            };
            let writer = &mut writers[slot];

            let mut samples = Vec::with_capacity(partition.samples.len());
            let mut frames = Vec::new();
            for raw in &partition.samples {
                frames.clear();
                frames.extend(raw.stack.iter().map(Frame::from));
                samples.push(Sample::new(writer.append_stack(&frames), raw.values.clone()));
            }
            queued.push((partition.id, samples));
        }

        for writer in writers {
            symbols.insert(writer);
        }
        queued
    }

    /// Every sample of the dataset as a resolved signature, bypassing storage
    pub fn resolved_samples(&self) -> impl Iterator<Item = ResolvedSample> + '_ {
        self.partitions.iter().flat_map(|p| {
            p.samples.iter().map(|s| (s.stack.iter().map(Frame::from).collect(), s.values.clone()))
        })
    }

    /// Total number of samples across partitions
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.partitions.iter().map(|p| p.samples.len()).sum()
    }
}
