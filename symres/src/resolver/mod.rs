//! # Stack Trace Resolution
//!
//! A [`Resolver`] turns queued, storage-level samples into a [`Profile`] or a
//! [`Tree`]:
//!
//! ```text
//!  add_samples(p0, ..)   add_samples(p1, ..)   add_samples(p2, ..)
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//!   ┌────────────┐        ┌────────────┐        ┌────────────┐
//!   │ worker p0  │        │ worker p1  │        │ worker p2  │   JoinSet, at most
//!   │ acquire    │        │ acquire    │        │ acquire    │   `max_concurrency`
//!   │ resolve    │        │ resolve    │        │ resolve    │   at once
//!   └─────┬──────┘        └─────┬──────┘        └─────┬──────┘
//!         └──────────────┬──────┴─────────────────────┘
//!                        ▼
//!            (StackSignature, values) pairs
//!                        │
//!              ┌─────────┴─────────┐
//!              ▼                   ▼
//!        ProfileBuilder       TreeBuilder
//! ```
//!
//! ## Lifecycle
//!
//! Every reader a worker acquires is owned by the resolver until
//! [`Resolver::release`], which may be called at any time (before, during or
//! after resolution, any number of times). Dropping the resolver releases too.
//!
//! ## Outcome caching
//!
//! The first call to [`Resolver::profile`] or [`Resolver::tree`] resolves;
//! its outcome is kept. Later calls build their output from the kept stacks
//! without acquiring partitions again, or return a clone of the kept error.
//! After release both return [`ResolveError::Released`].

mod lifecycle;
mod worker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use log::{debug, info};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::domain::{PartitionId, ResolveError, ResolvedSample, Sample, SymbolsError};
use crate::merge::{Profile, ProfileBuilder, Tree, TreeBuilder};
use crate::symbols::SymbolsSource;

pub use lifecycle::ResolverState;
pub use worker::CANCEL_CHECK_INTERVAL;

use lifecycle::Lifecycle;
use worker::{resolve_partition, PartitionJob};

/// Default number of partitions resolved at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Resolver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound on partitions acquired and resolved concurrently
    pub max_concurrency: usize,
    /// Which value dimension [`Resolver::tree`] aggregates
    pub tree_value_index: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_concurrency: DEFAULT_MAX_CONCURRENCY, tree_value_index: 0 }
    }
}

type Outcome = Result<Arc<Vec<ResolvedSample>>, ResolveError>;

/// Resolves queued samples of many partitions into one profile or tree
pub struct Resolver {
    ctx: Arc<dyn Context>,
    symbols: Arc<dyn SymbolsSource>,
    config: ResolverConfig,
    queue: Mutex<HashMap<PartitionId, Vec<Sample>>>,
    lifecycle: Lifecycle,
    outcome: tokio::sync::Mutex<Option<Outcome>>,
}

impl Resolver {
    /// Bind a context and a symbols source. Performs no I/O.
    pub fn new(ctx: Arc<dyn Context>, symbols: Arc<dyn SymbolsSource>) -> Self {
        Self::with_config(ctx, symbols, ResolverConfig::default())
    }

    pub fn with_config(
        ctx: Arc<dyn Context>,
        symbols: Arc<dyn SymbolsSource>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            ctx,
            symbols,
            config,
            queue: Mutex::new(HashMap::new()),
            lifecycle: Lifecycle::default(),
            outcome: tokio::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ResolverState {
        self.lifecycle.state()
    }

    /// Readers currently owned and awaiting release
    #[must_use]
    pub fn owned_readers(&self) -> usize {
        self.lifecycle.owned_readers()
    }

    /// Queue `samples` for `partition`, after any samples already queued for it
    ///
    /// # Errors
    /// Returns [`ResolveError::Sealed`] once resolution has started and
    /// [`ResolveError::Released`] after release; nothing is queued then.
    pub fn add_samples(
        &mut self,
        partition: PartitionId,
        samples: impl IntoIterator<Item = Sample>,
    ) -> Result<(), ResolveError> {
        match self.lifecycle.state() {
            ResolverState::Unresolved => {}
            ResolverState::Released => return Err(ResolveError::Released),
            _ => return Err(ResolveError::Sealed),
        }
        let queue = self.queue.get_mut().unwrap_or_else(PoisonError::into_inner);
        queue.entry(partition).or_default().extend(samples);
        Ok(())
    }

    /// Resolve every queued partition into a flat profile
    ///
    /// # Errors
    /// Returns the first acquisition or resolution error unmodified, including
    /// the context's cancellation error. No partial profile is produced.
    pub async fn profile(&self) -> Result<Profile, ResolveError> {
        let resolved = self.resolve().await?;
        let mut builder = ProfileBuilder::new();
        for (signature, values) in resolved.iter() {
            builder.add(signature.clone(), values);
        }
        Ok(builder.build())
    }

    /// Resolve every queued partition into a call tree
    ///
    /// # Errors
    /// Same as [`Resolver::profile`].
    pub async fn tree(&self) -> Result<Tree, ResolveError> {
        let resolved = self.resolve().await?;
        let index = self.config.tree_value_index;
        let mut builder = TreeBuilder::new();
        for (signature, values) in resolved.iter() {
            builder.insert(signature, values.get(index).copied().unwrap_or(0));
        }
        Ok(builder.build())
    }

    /// Release every partition reader acquired so far
    ///
    /// Idempotent and infallible; release failures are logged.
    pub fn release(&self) {
        if self.lifecycle.release() {
            debug!("Resolver released");
        }
    }

    async fn resolve(&self) -> Outcome {
        let mut outcome = self.outcome.lock().await;

        match self.lifecycle.state() {
            ResolverState::Released => return Err(ResolveError::Released),
            ResolverState::Resolved | ResolverState::Failed => {
                if let Some(kept) = outcome.as_ref() {
                    return kept.clone();
                }
            }
            // A previous call was dropped before it settled.
            ResolverState::Resolving => return Err(SymbolsError::Canceled.into()),
            ResolverState::Unresolved => {}
        }

        if let Err(state) = self.lifecycle.begin() {
            return Err(if state == ResolverState::Released {
                ResolveError::Released
            } else {
                ResolveError::Sealed
            });
        }

        let queue = std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner));
        let result = self.run(queue).await.map(Arc::new);

        self.lifecycle.finish(result.is_ok());
        *outcome = Some(result.clone());
        result
    }

    async fn run(
        &self,
        queue: HashMap<PartitionId, Vec<Sample>>,
    ) -> Result<Vec<ResolvedSample>, ResolveError> {
        let started = Instant::now();
        let stop = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut tasks = JoinSet::new();
        let mut samples = 0;
        // Partitions added with an empty batch are still acquired, so a
        // failing source surfaces even when there is nothing to resolve.
        for (partition, batch) in queue {
            samples += batch.len();
            tasks.spawn(resolve_partition(PartitionJob {
                partition,
                samples: batch,
                ctx: Arc::clone(&self.ctx),
                symbols: Arc::clone(&self.symbols),
                lifecycle: self.lifecycle.clone(),
                permits: Arc::clone(&permits),
                stop: stop.clone(),
            }));
        }
        let partitions = tasks.len();
        debug!("Resolving {samples} samples across {partitions} partitions");

        let mut resolved = Vec::with_capacity(samples);
        let mut first_err: Option<ResolveError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|err| Err(ResolveError::WorkerPanicked(err.to_string())));
            match result {
                Ok(stacks) if first_err.is_none() => resolved.extend(stacks),
                Ok(_) => {}
                Err(err) => {
                    if first_err.is_none() {
                        debug!("Stopping resolution: {err}");
                        stop.cancel();
                        first_err = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }
        info!(
            "Resolved {} samples from {partitions} partitions in {:.2?}",
            resolved.len(),
            started.elapsed()
        );
        Ok(resolved)
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{background, CancelAfter};
    use crate::domain::{Frame, StackTraceId};
    use crate::symbols::{MemorySymbols, PartitionWriter};

    fn symbols_with(partitions: &[u64]) -> (Arc<MemorySymbols>, StackTraceId) {
        let symbols = MemorySymbols::new();
        let mut id = StackTraceId(0);
        for &p in partitions {
            let mut writer = PartitionWriter::new(PartitionId(p));
            id = writer.append_stack(&[Frame::new("leaf", "a.rs", 1), Frame::new("main", "a.rs", 9)]);
            symbols.insert(writer);
        }
        (Arc::new(symbols), id)
    }

    #[tokio::test]
    async fn test_empty_resolver_yields_empty_outputs() {
        let (symbols, _) = symbols_with(&[]);
        let resolver = Resolver::new(background(), symbols.clone());
        assert!(resolver.profile().await.unwrap().is_empty());
        assert!(resolver.tree().await.unwrap().is_empty());
        assert_eq!(symbols.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_still_acquired() {
        let (symbols, _) = symbols_with(&[0]);
        let mut resolver = Resolver::new(background(), symbols.clone());
        resolver.add_samples(PartitionId(0), Vec::new()).unwrap();
        assert!(resolver.profile().await.unwrap().is_empty());
        assert_eq!(symbols.acquisitions(), 1);
        assert_eq!(resolver.owned_readers(), 1);

        resolver.release();
        assert_eq!(symbols.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_for_missing_partition_fails() {
        let (symbols, _) = symbols_with(&[]);
        let mut resolver = Resolver::new(background(), symbols);
        resolver.add_samples(PartitionId(3), Vec::new()).unwrap();
        let err = resolver.tree().await.unwrap_err();
        assert!(matches!(err, ResolveError::Symbols(SymbolsError::PartitionNotFound(PartitionId(3)))));
    }

    #[tokio::test]
    async fn test_add_samples_appends() {
        let (symbols, id) = symbols_with(&[0]);
        let mut resolver = Resolver::new(background(), symbols);
        resolver.add_samples(PartitionId(0), vec![Sample::new(id, vec![1])]).unwrap();
        resolver.add_samples(PartitionId(0), vec![Sample::new(id, vec![2])]).unwrap();
        let tree = resolver.tree().await.unwrap();
        assert_eq!(tree.total(), 3);
    }

    #[tokio::test]
    async fn test_tree_value_index() {
        let (symbols, id) = symbols_with(&[0]);
        let config = ResolverConfig { tree_value_index: 1, ..ResolverConfig::default() };
        let mut resolver = Resolver::with_config(background(), symbols, config);
        resolver.add_samples(PartitionId(0), vec![Sample::new(id, vec![1, 250])]).unwrap();
        assert_eq!(resolver.tree().await.unwrap().total(), 250);
    }

    #[tokio::test]
    async fn test_state_follows_outcome() {
        let (symbols, id) = symbols_with(&[0]);
        let mut resolver = Resolver::new(background(), symbols.clone());
        resolver.add_samples(PartitionId(0), vec![Sample::new(id, vec![1])]).unwrap();
        assert_eq!(resolver.state(), ResolverState::Unresolved);

        resolver.profile().await.unwrap();
        assert_eq!(resolver.state(), ResolverState::Resolved);
        assert_eq!(resolver.owned_readers(), 1);

        resolver.release();
        assert_eq!(resolver.state(), ResolverState::Released);
        assert_eq!(symbols.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_canceled_context_fails() {
        let (symbols, id) = symbols_with(&[0]);
        let ctx: Arc<dyn Context> = Arc::new(CancelAfter::new(background(), 0));
        let mut resolver = Resolver::new(ctx, symbols.clone());
        resolver.add_samples(PartitionId(0), vec![Sample::new(id, vec![1])]).unwrap();

        let err = resolver.tree().await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(resolver.state(), ResolverState::Failed);
        resolver.release();
        assert_eq!(symbols.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let (symbols, id) = symbols_with(&[0, 1]);
        {
            let mut resolver = Resolver::new(background(), symbols.clone());
            resolver.add_samples(PartitionId(0), vec![Sample::new(id, vec![1])]).unwrap();
            resolver.add_samples(PartitionId(1), vec![Sample::new(id, vec![1])]).unwrap();
            resolver.profile().await.unwrap();
            assert_eq!(symbols.open_readers(), 2);
        }
        assert_eq!(symbols.open_readers(), 0);
    }

    /// Cancels its token on the first resolution and counts every call
    struct CancelingReader {
        token: CancellationToken,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl crate::symbols::PartitionReader for CancelingReader {
        fn partition_id(&self) -> PartitionId {
            PartitionId(0)
        }

        fn resolve_stack(&self, _: StackTraceId, _: &mut Vec<Frame>) -> Result<(), SymbolsError> {
            self.token.cancel();
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) -> Result<(), SymbolsError> {
            Ok(())
        }
    }

    struct CancelingSymbols {
        reader: Arc<CancelingReader>,
    }

    #[async_trait::async_trait]
    impl SymbolsSource for CancelingSymbols {
        async fn partition(
            &self,
            _: &dyn Context,
            _: PartitionId,
        ) -> Result<Arc<dyn crate::symbols::PartitionReader>, SymbolsError> {
            Ok(self.reader.clone())
        }

        async fn load(&self, _: &dyn Context) -> Result<(), SymbolsError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_checked_between_sample_chunks() {
        let token = CancellationToken::new();
        let reader = Arc::new(CancelingReader {
            token: token.clone(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let symbols = Arc::new(CancelingSymbols { reader: Arc::clone(&reader) });
        let mut resolver = Resolver::new(Arc::new(token), symbols);
        let samples = (0..CANCEL_CHECK_INTERVAL * 3).map(|_| Sample::new(StackTraceId(1), vec![1]));
        resolver.add_samples(PartitionId(0), samples).unwrap();

        let err = resolver.profile().await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(reader.calls.load(std::sync::atomic::Ordering::SeqCst), CANCEL_CHECK_INTERVAL);
    }
}
