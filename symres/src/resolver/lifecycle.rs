//! Resolver state and owned reader handles
//!
//! Workers add readers as soon as they are acquired; `release` drains them.
//! Both go through one mutex, so a release racing in-flight resolution either
//! sees a reader in the set or the worker sees the `Released` state and gives
//! the reader back itself. Either way every reader is released exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::domain::ResolveError;
use crate::symbols::PartitionReader;

/// Outcome of a resolver
///
/// ```text
/// Unresolved ──► Resolving ──► Resolved
///     │              │    └──► Failed
///     │              │            │
///     └──────────────┴────────────┴──► Released (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverState {
    #[default]
    Unresolved,
    Resolving,
    Resolved,
    Failed,
    Released,
}

#[derive(Default)]
struct Inner {
    state: ResolverState,
    readers: Vec<Arc<dyn PartitionReader>>,
}

/// Shared between a resolver and its workers
#[derive(Clone, Default)]
pub(crate) struct Lifecycle {
    inner: Arc<Mutex<Inner>>,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ResolverState {
        self.lock().state
    }

    /// Move to `Resolving`, returning the state found if that is not allowed
    pub(crate) fn begin(&self) -> Result<(), ResolverState> {
        let mut inner = self.lock();
        match inner.state {
            ResolverState::Unresolved => {
                inner.state = ResolverState::Resolving;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Settle a resolution; a release that happened meanwhile stays in effect
    pub(crate) fn finish(&self, ok: bool) {
        let mut inner = self.lock();
        if inner.state == ResolverState::Resolving {
            inner.state = if ok { ResolverState::Resolved } else { ResolverState::Failed };
        }
    }

    /// Take ownership of a freshly acquired reader
    ///
    /// # Errors
    /// Returns [`ResolveError::Released`] if the resolver was released while
    /// the reader was being acquired; the reader is released before returning.
    pub(crate) fn register(&self, reader: Arc<dyn PartitionReader>) -> Result<(), ResolveError> {
        let mut inner = self.lock();
        if inner.state == ResolverState::Released {
            drop(inner);
            release_reader(reader.as_ref());
            return Err(ResolveError::Released);
        }
        inner.readers.push(reader);
        Ok(())
    }

    /// Release every owned reader. Returns false if already released.
    pub(crate) fn release(&self) -> bool {
        let readers = {
            let mut inner = self.lock();
            if inner.state == ResolverState::Released {
                return false;
            }
            inner.state = ResolverState::Released;
            std::mem::take(&mut inner.readers)
        };

        debug!("Releasing {} partition readers", readers.len());
        for reader in readers {
            release_reader(reader.as_ref());
        }
        true
    }

    pub(crate) fn owned_readers(&self) -> usize {
        self.lock().readers.len()
    }
}

fn release_reader(reader: &dyn PartitionReader) {
    if let Err(err) = reader.release() {
        warn!("Failed to release reader for {}: {err}", reader.partition_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Frame, PartitionId, StackTraceId, SymbolsError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingReader {
        releases: AtomicUsize,
    }

    impl PartitionReader for CountingReader {
        fn partition_id(&self) -> PartitionId {
            PartitionId(0)
        }

        fn resolve_stack(&self, _: StackTraceId, _: &mut Vec<Frame>) -> Result<(), SymbolsError> {
            Ok(())
        }

        fn release(&self) -> Result<(), SymbolsError> {
            if self.releases.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(SymbolsError::AlreadyReleased(PartitionId(0)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_state_transitions() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), ResolverState::Unresolved);
        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.begin(), Err(ResolverState::Resolving));
        lifecycle.finish(false);
        assert_eq!(lifecycle.state(), ResolverState::Failed);
        assert!(lifecycle.release());
        assert!(!lifecycle.release());
        assert_eq!(lifecycle.state(), ResolverState::Released);
    }

    #[test]
    fn test_finish_after_release_stays_released() {
        let lifecycle = Lifecycle::default();
        lifecycle.begin().unwrap();
        lifecycle.release();
        lifecycle.finish(true);
        assert_eq!(lifecycle.state(), ResolverState::Released);
    }

    #[test]
    fn test_readers_released_once() {
        let lifecycle = Lifecycle::default();
        let reader = Arc::new(CountingReader::default());
        lifecycle.register(reader.clone()).unwrap();
        assert_eq!(lifecycle.owned_readers(), 1);

        lifecycle.release();
        lifecycle.release();
        assert_eq!(reader.releases.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.owned_readers(), 0);
    }

    #[test]
    fn test_register_after_release_gives_reader_back() {
        let lifecycle = Lifecycle::default();
        lifecycle.release();

        let reader = Arc::new(CountingReader::default());
        let err = lifecycle.register(reader.clone()).unwrap_err();
        assert!(matches!(err, ResolveError::Released));
        assert_eq!(reader.releases.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.owned_readers(), 0);
    }
}
