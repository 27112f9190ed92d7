use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A swappable shared reference to a repository.
///
/// Readers take a cheap `Arc` snapshot with [`current`](Self::current) and
/// keep using it for the duration of one operation, so a concurrent
/// [`replace`](Self::replace) never tears an operation in half.
pub struct RepositoryCell<R: ?Sized> {
    current: RwLock<Arc<R>>,
}

impl<R: ?Sized> RepositoryCell<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            current: RwLock::new(repository),
        }
    }

    /// Snapshot of the installed repository.
    pub fn current(&self) -> Arc<R> {
        // The guarded value is a plain `Arc`; a panic elsewhere cannot leave
        // it half-written.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `repository` and return the one it replaced.
    pub fn replace(&self, repository: Arc<R>) -> Arc<R> {
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, repository)
    }
}

impl<R: ?Sized> fmt::Debug for RepositoryCell<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryCell")
            .field("strong_count", &Arc::strong_count(&self.current()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySingleRepository;
    use crate::traits::SingleRepository;

    #[test]
    fn replace_swaps_and_returns_previous() {
        let first: Arc<dyn SingleRepository<i64>> = Arc::new(InMemorySingleRepository::new());
        let second: Arc<dyn SingleRepository<i64>> = Arc::new(InMemorySingleRepository::new());
        first.save(&1).unwrap();
        second.save(&2).unwrap();

        let cell = RepositoryCell::new(first);
        let snapshot = cell.current();
        assert_eq!(snapshot.get().unwrap(), Some(1));

        let old = cell.replace(second);
        assert_eq!(old.get().unwrap(), Some(1));
        assert_eq!(cell.current().get().unwrap(), Some(2));
        // Snapshots taken before the swap keep the old repository.
        assert_eq!(snapshot.get().unwrap(), Some(1));
    }
}
