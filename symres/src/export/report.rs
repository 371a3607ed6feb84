use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::merge::{Profile, Tree};

/// What the CLI resolves and how it is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Flat profile with interned tables, as JSON
    #[default]
    Profile,
    /// Call tree with self and total values, as JSON
    Tree,
    /// Collapsed stacks of the call tree
    Folded,
}

/// A resolved result ready to be written
#[derive(Debug)]
pub enum Report {
    Profile(Profile),
    Tree(Tree),
    Folded(Vec<(String, i64)>),
}

impl Report {
    /// Write the report to `writer`
    ///
    /// JSON is pretty-printed; folded output has one line per path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::fs::File;
    /// use std::io::BufWriter;
    /// use symres::export::Report;
    /// use symres::merge::TreeBuilder;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let report = Report::Tree(TreeBuilder::new().build());
    /// let writer = BufWriter::new(File::create("tree.json")?);
    /// report.export(writer)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn export<W: Write>(&self, mut writer: W) -> Result<()> {
        match self {
            Report::Profile(profile) => {
                serde_json::to_writer_pretty(&mut writer, profile)
                    .context("Failed to serialize profile")?;
                writeln!(writer)?;
            }
            Report::Tree(tree) => {
                serde_json::to_writer_pretty(&mut writer, tree)
                    .context("Failed to serialize tree")?;
                writeln!(writer)?;
            }
            Report::Folded(lines) => {
                for (path, value) in lines {
                    writeln!(writer, "{path} {value}")?;
                }
            }
        }
        writer.flush().context("Failed to flush output")?;
        Ok(())
    }

    /// Number of samples, nodes or lines written
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match self {
            Report::Profile(profile) => profile.samples.len(),
            Report::Tree(tree) => tree.fingerprint().len(),
            Report::Folded(lines) => lines.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Frame;
    use crate::merge::{ProfileBuilder, TreeBuilder};

    fn stack() -> Vec<Frame> {
        vec![Frame::new("leaf", "a.rs", 3), Frame::new("main", "a.rs", 1)]
    }

    #[test]
    fn test_folded_lines() {
        let mut builder = TreeBuilder::new();
        builder.insert(&stack(), 7);
        let report = Report::Folded(builder.build().to_folded());

        let mut out = Vec::new();
        report.export(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "main;leaf 7\n");
        assert_eq!(report.entry_count(), 1);
    }

    #[test]
    fn test_profile_json() {
        let mut builder = ProfileBuilder::new();
        builder.add(stack(), &[2, 20]);
        let report = Report::Profile(builder.build());

        let mut out = Vec::new();
        report.export(&mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["samples"][0]["values"], serde_json::json!([2, 20]));
        assert_eq!(json["string_table"][0], "");
    }
}
