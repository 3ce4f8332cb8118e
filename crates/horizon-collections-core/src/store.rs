//! The store adapter contract.
//!
//! A store owns the elements; every view of a collection shares one store
//! through an [`Arc<StoreCell<S>>`](StoreCell). The engine talks to a store
//! only through the traits in this module.
//!
//! # Mutating a store
//!
//! Mutations are split in two calls so the engine can notify listeners
//! without holding the store lock:
//!
//! 1. [`SequenceStore::plan`] / [`KeyedStore::plan`] runs under a read lock.
//!    It validates the operation, reports every element it is going to touch
//!    through the [`MutationHandler`], reports evicted positions through
//!    [`MutationHandler::set_conflicting_positions`], and returns an opaque
//!    plan.
//! 2. The engine runs the pre phase, then calls `apply` under the write lock.
//!    `apply` bumps the revision on every structural change and reports a
//!    refusal through [`MutationHandler::set_late_failure`] before returning it.
//!
//! Passing `None` as the handler mutates silently.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{CollectionError, Result, StoreError};

/// Behavior common to every store.
pub trait Store: Send + Sync + 'static {
    /// Monotonic counter bumped on every structural change.
    fn revision(&self) -> u64;

    /// Number of elements or entries.
    fn len(&self) -> usize;

    /// Returns true if the store holds nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Engine-side callbacks a store invokes while planning and applying.
///
/// `C` is the store's coordinate: an absolute position for sequences, the
/// key for keyed stores. Detached positions are counted before the mutation,
/// attached positions after it.
pub trait MutationHandler<C, V> {
    /// Something is about to be added at `at`.
    fn create_attach_argument(&mut self, at: C, value: &V);

    /// Something is about to be removed from `at`.
    fn create_detach_argument(&mut self, at: C, value: &V);

    /// `old` at `detached_at` is about to be replaced by `new` at `attached_at`.
    fn create_replace_argument(&mut self, detached_at: C, old: &V, attached_at: C, new: &V);

    /// Absolute positions the mutation evicts as a side effect.
    fn set_conflicting_positions(&mut self, _positions: &BTreeSet<usize>) {}

    /// The store refused the mutation while applying it.
    fn set_late_failure(&mut self, _failure: &StoreError) {}
}

/// A positional mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOp<T> {
    /// Insert `items` so that the first lands at absolute position `at`.
    Insert { at: usize, items: Vec<T> },
    /// Remove the elements at the given absolute positions.
    ///
    /// Positions are strictly ascending.
    Remove { positions: Vec<usize> },
    /// Replace the element at absolute position `at`.
    Set { at: usize, item: T },
}

/// A keyed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyedOp<K, V> {
    /// Insert or overwrite an entry.
    Put { key: K, value: V },
    /// Remove the entries with the given keys. Absent keys are ignored.
    Remove { keys: Vec<K> },
    /// Move the value stored under `from` to `to`.
    Rekey { from: K, to: K },
    /// Record an access, reordering access-ordered stores.
    Touch { key: K },
}

/// A store addressed by position.
pub trait SequenceStore: Store {
    /// Element type.
    type Item: Clone + Send + Sync + 'static;
    /// Validated mutation ready to apply.
    type Plan: Send;

    /// Element at an absolute position.
    fn get(&self, index: usize) -> Option<&Self::Item>;

    /// Elements in `[start, end)`.
    fn iter_range(&self, start: usize, end: usize) -> impl DoubleEndedIterator<Item = &Self::Item>;

    /// Validate `op` and report what it will touch.
    fn plan(
        &self,
        op: SequenceOp<Self::Item>,
        handler: Option<&mut dyn MutationHandler<usize, Self::Item>>,
    ) -> std::result::Result<Self::Plan, StoreError>;

    /// Execute a plan produced by [`plan`](Self::plan).
    fn apply(
        &mut self,
        plan: Self::Plan,
        handler: Option<&mut dyn MutationHandler<usize, Self::Item>>,
    ) -> std::result::Result<(), StoreError>;
}

/// A store addressed by key.
pub trait KeyedStore: Store {
    /// Key type.
    type Key: Clone + Eq + Send + Sync + 'static;
    /// Value type.
    type Value: Clone + Send + Sync + 'static;
    /// Validated mutation ready to apply.
    type Plan: Send;

    /// Value stored under `key`.
    fn get(&self, key: &Self::Key) -> Option<&Self::Value>;

    /// Returns true if `key` is present.
    fn contains_key(&self, key: &Self::Key) -> bool {
        self.get(key).is_some()
    }

    /// Entries in store order.
    fn entries(&self) -> impl DoubleEndedIterator<Item = (&Self::Key, &Self::Value)>;

    /// Whether reads reorder the store (access-ordered linked stores).
    fn promotes_on_access(&self) -> bool {
        false
    }

    /// Validate `op` and report what it will touch.
    fn plan(
        &self,
        op: KeyedOp<Self::Key, Self::Value>,
        handler: Option<&mut dyn MutationHandler<Self::Key, Self::Value>>,
    ) -> std::result::Result<Self::Plan, StoreError>;

    /// Execute a plan produced by [`plan`](Self::plan).
    fn apply(
        &mut self,
        plan: Self::Plan,
        handler: Option<&mut dyn MutationHandler<Self::Key, Self::Value>>,
    ) -> std::result::Result<(), StoreError>;
}

/// A keyed store ordered by key.
///
/// The provided methods derive the navigation operations from
/// [`range`](Self::range).
pub trait NavigableStore: KeyedStore
where
    Self::Key: Ord,
{
    /// Entries with keys inside the bounds, in ascending key order.
    fn range(
        &self,
        lower: Bound<&Self::Key>,
        upper: Bound<&Self::Key>,
    ) -> impl DoubleEndedIterator<Item = (&Self::Key, &Self::Value)>;

    /// Greatest entry with a key `<= key`.
    fn floor(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)> {
        self.range(Bound::Unbounded, Bound::Included(key)).next_back()
    }

    /// Least entry with a key `>= key`.
    fn ceiling(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)> {
        self.range(Bound::Included(key), Bound::Unbounded).next()
    }

    /// Greatest entry with a key `< key`.
    fn lower(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)> {
        self.range(Bound::Unbounded, Bound::Excluded(key)).next_back()
    }

    /// Least entry with a key `> key`.
    fn higher(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)> {
        self.range(Bound::Excluded(key), Bound::Unbounded).next()
    }
}

/// Shared, lockable home of a store.
///
/// No lock is held while hooks or listeners run, so they may read any view of
/// the store. While a mutation is notifying, the cell is frozen and every
/// other mutation attempt fails with [`CollectionError::Frozen`].
pub struct StoreCell<S> {
    store: RwLock<S>,
    frozen: AtomicUsize,
}

impl<S: Store> StoreCell<S> {
    /// Wrap a store for sharing.
    pub fn new(store: S) -> Arc<Self> {
        Arc::new(Self {
            store: RwLock::new(store),
            frozen: AtomicUsize::new(0),
        })
    }

    /// Lock the store for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, S> {
        self.store.read()
    }

    /// Lock the store for writing.
    ///
    /// Only the pipeline should call this, between the pre and post phases.
    pub fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.store.write()
    }

    /// Current store revision.
    pub fn revision(&self) -> u64 {
        self.store.read().revision()
    }

    /// Returns true while listeners of a mutation are running.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire) > 0
    }

    /// Fail if a mutation is currently notifying.
    pub fn ensure_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(CollectionError::Frozen);
        }
        Ok(())
    }

    /// Freeze the cell until the guard drops.
    pub fn freeze(&self) -> FreezeGuard<'_> {
        self.frozen.fetch_add(1, Ordering::AcqRel);
        FreezeGuard {
            frozen: &self.frozen,
        }
    }
}

/// Keeps a [`StoreCell`] frozen while alive.
#[must_use = "the cell unfreezes as soon as the guard is dropped"]
pub struct FreezeGuard<'a> {
    frozen: &'a AtomicUsize,
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        self.frozen.fetch_sub(1, Ordering::AcqRel);
    }
}
