//! Fail-fast detection of stale views.
//!
//! A [`RevisionGuard`] remembers the store revision a view last saw. Reads
//! compare it against the store and fail with [`StaleViewError`] on mismatch;
//! only a successful mutation through the view (or one of its descendants)
//! moves the remembered revision forward, for the view and all its ancestors.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StaleViewError;

/// Cached store revision of one view, linked to its parent's.
#[derive(Debug)]
pub struct RevisionGuard {
    expected: AtomicU64,
    parent: Option<Arc<RevisionGuard>>,
}

impl RevisionGuard {
    /// A guard for a root collection.
    pub fn root(revision: u64) -> Arc<Self> {
        Arc::new(Self {
            expected: AtomicU64::new(revision),
            parent: None,
        })
    }

    /// A guard for a view derived from the view owning `parent`.
    pub fn child(parent: &Arc<RevisionGuard>, revision: u64) -> Arc<Self> {
        Arc::new(Self {
            expected: AtomicU64::new(revision),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// The revision this view expects.
    pub fn expected(&self) -> u64 {
        self.expected.load(Ordering::Acquire)
    }

    /// Returns true if `actual` is the expected revision.
    pub fn is_fresh(&self, actual: u64) -> bool {
        self.expected() == actual
    }

    /// Fail unless `actual` is the expected revision.
    pub fn check_fresh(&self, actual: u64) -> Result<(), StaleViewError> {
        let expected = self.expected();
        if expected != actual {
            tracing::debug!(
                target: crate::logging::targets::CORE,
                expected,
                actual,
                "stale view access"
            );
            return Err(StaleViewError { expected, actual });
        }
        Ok(())
    }

    /// Accept `revision` for this view and every ancestor.
    pub fn sync(&self, revision: u64) {
        let mut guard = Some(self);
        while let Some(current) = guard {
            current.expected.store(revision, Ordering::Release);
            guard = current.parent.as_deref();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_fresh() {
        let guard = RevisionGuard::root(3);
        assert!(guard.check_fresh(3).is_ok());
        assert_eq!(
            guard.check_fresh(4),
            Err(StaleViewError {
                expected: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn test_sync_cascades_to_ancestors_only() {
        let root = RevisionGuard::root(0);
        let mid = RevisionGuard::child(&root, 0);
        let leaf = RevisionGuard::child(&mid, 0);

        mid.sync(1);

        assert!(root.is_fresh(1));
        assert!(mid.is_fresh(1));
        assert!(!leaf.is_fresh(1));
        assert!(leaf.check_fresh(1).is_err());
    }
}
