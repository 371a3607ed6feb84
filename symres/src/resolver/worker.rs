//! Per-partition resolution worker
//!
//! One worker runs per partition with queued samples:
//!
//! 1. wait for a concurrency permit
//! 2. acquire the partition reader
//! 3. hand the reader to the resolver's [`Lifecycle`] before anything else
//! 4. resolve every sample, in queue order
//!
//! Steps 1 and 2 race the caller's context and the group stop signal, which
//! is raised as soon as any sibling fails. Step 4 polls both every
//! [`CANCEL_CHECK_INTERVAL`] samples.

use std::sync::Arc;

use log::debug;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::lifecycle::Lifecycle;
use crate::context::Context;
use crate::domain::{PartitionId, ResolveError, ResolvedSample, Sample, SymbolsError};
use crate::symbols::SymbolsSource;

/// Samples resolved between two cancellation checks
pub const CANCEL_CHECK_INTERVAL: usize = 1024;

pub(crate) struct PartitionJob {
    pub partition: PartitionId,
    pub samples: Vec<Sample>,
    pub ctx: Arc<dyn Context>,
    pub symbols: Arc<dyn SymbolsSource>,
    pub lifecycle: Lifecycle,
    pub permits: Arc<Semaphore>,
    pub stop: CancellationToken,
}

fn canceled(ctx: &dyn Context) -> ResolveError {
    ctx.err().unwrap_or(SymbolsError::Canceled).into()
}

pub(crate) async fn resolve_partition(
    job: PartitionJob,
) -> Result<Vec<ResolvedSample>, ResolveError> {
    let PartitionJob { partition, samples, ctx, symbols, lifecycle, permits, stop } = job;

    if let Some(err) = ctx.err() {
        return Err(err.into());
    }

    let _permit = tokio::select! {
        biased;
        () = ctx.done() => return Err(canceled(ctx.as_ref())),
        () = stop.cancelled() => return Err(SymbolsError::Canceled.into()),
        permit = permits.acquire_owned() => {
            permit.map_err(|_| ResolveError::from(SymbolsError::Canceled))?
        }
    };

    let reader = tokio::select! {
        biased;
        () = ctx.done() => return Err(canceled(ctx.as_ref())),
        () = stop.cancelled() => return Err(SymbolsError::Canceled.into()),
        reader = symbols.partition(ctx.as_ref(), partition) => reader?,
    };
    // Nothing may await between acquisition and registration.
    lifecycle.register(Arc::clone(&reader))?;
    debug!("Acquired {partition}, resolving {} samples", samples.len());

    let mut resolved = Vec::with_capacity(samples.len());
    for (i, sample) in samples.into_iter().enumerate() {
        if i > 0 && i % CANCEL_CHECK_INTERVAL == 0 {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            if stop.is_cancelled() {
                return Err(SymbolsError::Canceled.into());
            }
            tokio::task::yield_now().await;
        }
        let mut frames = Vec::new();
        reader.resolve_stack(sample.stack_trace_id, &mut frames)?;
        resolved.push((frames, sample.values));
    }

    Ok(resolved)
}
