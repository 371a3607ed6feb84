//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::export::OutputFormat;
use crate::resolver::ResolverConfig;

#[derive(Parser, Debug)]
#[command(
    name = "symres",
    about = "Resolve partitioned stack samples into a profile or call tree",
    after_help = "\
EXAMPLES:
    symres --input dataset.json                       Flat profile as JSON
    symres --input dataset.json --format folded       Collapsed stacks for flamegraphs
    symres --input dataset.json --format tree --value 1 --output tree.json"
)]
pub struct Args {
    /// Dataset of partitions and samples (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Profile)]
    pub format: OutputFormat,

    /// Value dimension aggregated by tree and folded output
    #[arg(long, default_value = "0")]
    pub value: usize,

    /// Partitions resolved concurrently
    #[arg(long, default_value = "8", value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Abort resolution after N milliseconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub timeout_ms: u64,

    /// Write output to file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl Args {
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_concurrency: usize::from(self.concurrency),
            tree_value_index: self.value,
        }
    }
}
