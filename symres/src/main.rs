//! # symres - Main Entry Point
//!
//! Loads a JSON dataset, writes its stacks into an in-memory symbol store,
//! queues every partition's samples into a [`Resolver`] and writes the
//! resolved profile, tree or folded stacks to stdout or `--output`.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use symres::cli::Args;
use symres::context::{self, Deadline};
use symres::domain::ResolveError;
use symres::export::{OutputFormat, Report};
use symres::symbols::{Dataset, MemorySymbols, SymbolsSource};
use symres::Resolver;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_TIMEOUT: i32 = 124;

fn main() {
    env_logger::init();
    let args = Args::parse();
    std::process::exit(match run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ResolveError>() {
        Some(e) if e.is_cancellation() => EXIT_TIMEOUT,
        Some(ResolveError::Sealed) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    let dataset = Dataset::from_file(&args.input)?;
    info!(
        "Loaded {} samples in {} partitions from {}",
        dataset.sample_count(),
        dataset.partitions.len(),
        args.input.display()
    );

    let symbols = Arc::new(MemorySymbols::new());
    let queued = dataset.index(&symbols);
    symbols
        .load(context::background().as_ref())
        .await
        .context("Dataset symbol tables are corrupt")?;

    let ctx: Arc<dyn context::Context> = if args.timeout_ms > 0 {
        Arc::new(Deadline::after(context::background(), Duration::from_millis(args.timeout_ms)))
    } else {
        context::background()
    };

    let mut resolver = Resolver::with_config(ctx, symbols, args.resolver_config());
    for (partition, samples) in queued {
        resolver.add_samples(partition, samples)?;
    }

    let report = match args.format {
        OutputFormat::Profile => Report::Profile(resolver.profile().await?),
        OutputFormat::Tree => Report::Tree(resolver.tree().await?),
        OutputFormat::Folded => Report::Folded(resolver.tree().await?.to_folded()),
    };
    resolver.release();

    let count = report.entry_count();
    match args.output {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            report.export(BufWriter::new(file))?;
            info!("Wrote {count} entries to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            report.export(&mut lock)?;
            lock.flush()?;
        }
    }

    Ok(())
}
