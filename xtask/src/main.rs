use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use symres::domain::PartitionId;
use symres::symbols::dataset::{DatasetPartition, RawFrame};
use symres::symbols::{Dataset, RawSample};

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Write a synthetic dataset for benchmarking and manual runs
    GenDataset {
        #[arg(long, default_value = "dataset.json")]
        output: PathBuf,
        #[arg(long, default_value = "4")]
        partitions: u64,
        #[arg(long, default_value = "1000")]
        samples: usize,
        /// Maximum stack depth below `main`
        #[arg(long, default_value = "12")]
        depth: usize,
        /// Distinct functions per partition
        #[arg(long, default_value = "64")]
        functions: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::GenDataset { output, partitions, samples, depth, functions } => {
            let dataset = generate(partitions, samples, depth.max(1), functions.max(1));
            let file = File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            serde_json::to_writer(BufWriter::new(file), &dataset)
                .context("Failed to write dataset")?;

            println!("✓ Dataset written");
            println!("  Output: {}", output.display());
            println!("  Partitions: {partitions}");
            println!("  Samples: {}", dataset.sample_count());
        }
    }

    Ok(())
}

// Stacks are derived from the sample index alone so repeated runs produce
// identical files.
fn generate(partitions: u64, samples: usize, depth: usize, functions: usize) -> Dataset {
    let partitions = (0..partitions)
        .map(|p| {
            let samples = (0..samples)
                .map(|i| {
                    let seed = i.wrapping_mul(2_654_435_761) ^ usize::try_from(p).unwrap_or(0);
                    let len = 1 + seed % depth;
                    let mut stack: Vec<RawFrame> = (0..len)
                        .map(|d| {
                            let f = (seed >> (d % 16)).wrapping_add(d * 7) % functions;
                            RawFrame {
                                function: format!("fn_{f}"),
                                file: format!("src/mod_{}.rs", f % 8),
                                line: u32::try_from(10 + f).unwrap_or(u32::MAX),
                            }
                        })
                        .collect();
                    stack.push(RawFrame {
                        function: "main".to_string(),
                        file: "src/main.rs".to_string(),
                        line: 1,
                    });
                    RawSample { stack, values: vec![1, i64::try_from(seed % 1000).unwrap_or(0)] }
                })
                .collect();
            DatasetPartition { id: PartitionId(p), samples }
        })
        .collect();
    Dataset { partitions }
}
