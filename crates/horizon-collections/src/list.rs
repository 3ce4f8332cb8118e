//! Observable lists and sub-lists.
//!
//! An [`ObservableList`] is a window over a shared [`SequenceStore`]. The
//! root list hides nothing; [`ObservableList::sub_list`] derives a child
//! window that keeps denoting the same elements when a mutation made through
//! it evicts or inserts elements outside of it.
//!
//! Every list is fail-fast: once the store changed through another path
//! (a sibling sub-list, the parent after the child was created), reads and
//! writes return [`CollectionError::Stale`].
//!
//! # Example
//!
//! ```
//! use horizon_collections::prelude::*;
//!
//! let list = ObservableList::new(VecStore::from(vec!['a', 'b', 'c', 'd', 'e']));
//! let middle = list.sub_list(1, 4).unwrap();
//! middle.remove(0).unwrap();
//!
//! assert_eq!(middle.to_vec().unwrap(), vec!['c', 'd']);
//! assert_eq!(list.to_vec().unwrap(), vec!['a', 'c', 'd', 'e']);
//! ```

use std::sync::Arc;

use horizon_collections_core::{
    ChangeKind, CollectionError, HiddenRange, Level, ListEvent, Modification, ModificationEvent,
    ModificationKind, Notifier, Phase, Position, Result, RevisionGuard, SequenceOp,
    SequenceStore, StoreCell, StoreError, SubRange, ViewInfo, Window, run_mutation,
};
use parking_lot::RwLockReadGuard;

use crate::collector::{Change, ChangeCollector};
use crate::cursor::ListCursor;

/// Store, window and staleness guard of one positional view.
///
/// Shared by lists and cursors; each owns its own guard.
pub(crate) struct ListCore<S> {
    pub(crate) cell: Arc<StoreCell<S>>,
    pub(crate) window: Arc<Window>,
    pub(crate) guard: Arc<RevisionGuard>,
}

impl<S: SequenceStore> ListCore<S> {
    /// Lock the store for reading after checking the view is fresh.
    pub(crate) fn read(&self) -> Result<(RwLockReadGuard<'_, S>, HiddenRange)> {
        let store = self.cell.read();
        self.guard.check_fresh(store.revision())?;
        let range = self.window.range();
        Ok((store, range))
    }

    /// Number of elements visible through the window.
    pub(crate) fn len(&self) -> Result<usize> {
        let (store, range) = self.read()?;
        Ok(range.size(store.len()))
    }

    /// Element at a view index.
    pub(crate) fn get(&self, index: usize) -> Result<Option<S::Item>> {
        let (store, range) = self.read()?;
        if index >= range.size(store.len()) {
            return Ok(None);
        }
        Ok(store.get(range.translate(index)).cloned())
    }

    /// A guard for a view derived from this one.
    pub(crate) fn child_guard(&self, revision: u64) -> Arc<RevisionGuard> {
        RevisionGuard::child(&self.guard, revision)
    }

    /// Plan, notify and apply one mutation through `level`.
    ///
    /// `build` sees the store and the current window under the read lock and
    /// returns the descriptor and store operation, or `None` when there is
    /// nothing to do. Returns the events of the attempt.
    pub(crate) fn mutate(
        &self,
        level: &dyn Level<Position, S::Item>,
        build: impl FnOnce(
            &S,
            HiddenRange,
        ) -> Result<Option<(Arc<Modification>, SequenceOp<S::Item>)>>,
    ) -> Result<Vec<Arc<ListEvent<S::Item>>>> {
        self.cell.ensure_mutable()?;

        let (modification, plan, collector, old_len, range) = {
            let (store, range) = self.read()?;
            let Some((modification, op)) = build(&*store, range)? else {
                return Ok(Vec::new());
            };
            let mut collector = ChangeCollector::default();
            let plan = store.plan(op, Some(&mut collector))?;
            (modification, plan, collector, store.len(), range)
        };

        if !collector.conflicts().is_empty() {
            horizon_collections_core::collections_debug!(
                view = %level.view_info(),
                evicted = collector.conflicts().len(),
                "mutation evicts conflicting elements"
            );
        }
        let pending = self
            .window
            .resolving(old_len, &collector.structural_shift());
        let post_head = pending
            .as_ref()
            .map_or(range.head, |pending| pending.range().head);

        let view = level.view_info();
        let events: Vec<_> = collector
            .into_changes()
            .into_iter()
            .map(|change| {
                let modification = Arc::clone(&modification);
                let event = match change {
                    Change::Attach { at, value } => ModificationEvent::attach(
                        view.clone(),
                        modification,
                        Position::new(at, post_head),
                        value,
                    ),
                    Change::Detach { at, value } => ModificationEvent::detach(
                        view.clone(),
                        modification,
                        Position::new(at, range.head),
                        value,
                    ),
                    Change::Replace {
                        detached_at,
                        old,
                        attached_at,
                        new,
                    } => ModificationEvent::replace(
                        view.clone(),
                        modification,
                        (Position::new(detached_at, range.head), old),
                        (Position::new(attached_at, post_head), new),
                    ),
                };
                Arc::new(event.with_range_shift(pending.clone()))
            })
            .collect();
        if events.is_empty() {
            return Ok(events);
        }

        let _frozen = self.cell.freeze();
        run_mutation(
            level,
            &events,
            |sink| {
                let mut store = self.cell.write();
                store.apply(plan, Some(sink))
            },
            || {
                if let Some(pending) = &pending {
                    pending.commit();
                }
                self.guard.sync(self.cell.revision());
            },
        )?;
        Ok(events)
    }
}

impl<S> Clone for ListCore<S> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            window: Arc::clone(&self.window),
            guard: Arc::clone(&self.guard),
        }
    }
}

/// The element removed by a single-element removal.
pub(crate) fn detached_value<T: Clone>(events: &[Arc<ListEvent<T>>]) -> Result<T> {
    events
        .iter()
        .find(|event| event.change() == ChangeKind::Detach)
        .and_then(|event| event.element(Phase::Pre).cloned())
        .ok_or_else(|| StoreError::rejected("store reported no removed element").into())
}

/// The old value of the in-place replacement among `events`.
pub(crate) fn replaced_value<T: Clone>(events: &[Arc<ListEvent<T>>]) -> Result<T> {
    events
        .iter()
        .find(|event| event.change() == ChangeKind::Replace)
        .and_then(|event| event.element(Phase::Pre).cloned())
        .ok_or_else(|| StoreError::rejected("store reported no replaced element").into())
}

/// An observable list, or a window over one.
///
/// Cloning yields another handle to the same view: same window, same
/// listeners, same staleness guard.
pub struct ObservableList<S: SequenceStore> {
    core: ListCore<S>,
    level: Arc<Notifier<Position, S::Item, SubRange>>,
}

impl<S: SequenceStore> ObservableList<S> {
    /// Create a root list owning `store`.
    pub fn new(store: S) -> Self {
        let cell = StoreCell::new(store);
        let revision = cell.revision();
        Self {
            core: ListCore {
                cell,
                window: Window::root(),
                guard: RevisionGuard::root(revision),
            },
            level: Arc::new(Notifier::new(ViewInfo::Root, SubRange::root(), None)),
        }
    }

    /// Description of this view.
    pub fn info(&self) -> &ViewInfo {
        self.level.info()
    }

    /// Returns true if the store has not changed through another path since
    /// this view last synchronized.
    pub fn is_fresh(&self) -> bool {
        self.core.guard.is_fresh(self.core.cell.revision())
    }

    /// Returns true while listeners of a mutation on the shared store run.
    pub fn is_frozen(&self) -> bool {
        self.core.cell.is_frozen()
    }

    /// Number of elements in the view.
    pub fn len(&self) -> Result<usize> {
        self.core.len()
    }

    /// Returns true if the view shows no elements.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Result<Option<S::Item>> {
        self.core.get(index)
    }

    /// First element.
    pub fn first(&self) -> Result<Option<S::Item>> {
        self.core.get(0)
    }

    /// Last element.
    pub fn last(&self) -> Result<Option<S::Item>> {
        let (store, range) = self.core.read()?;
        let len = range.size(store.len());
        match len {
            0 => Ok(None),
            len => Ok(store.get(range.translate(len - 1)).cloned()),
        }
    }

    /// Copy of the visible elements.
    pub fn to_vec(&self) -> Result<Vec<S::Item>> {
        let (store, range) = self.core.read()?;
        Ok(store
            .iter_range(range.head, range.end(store.len()))
            .cloned()
            .collect())
    }

    /// Append `item` at the end of the view.
    pub fn push(&self, item: S::Item) -> Result<()> {
        self.core.mutate(&*self.level, |store, range| {
            let index = range.size(store.len());
            Ok(Some((
                Modification::new(ModificationKind::Insert { index }),
                SequenceOp::Insert {
                    at: range.translate(index),
                    items: vec![item],
                },
            )))
        })?;
        Ok(())
    }

    /// Insert `item` so that it lands at `index`.
    pub fn insert(&self, index: usize, item: S::Item) -> Result<()> {
        self.core.mutate(&*self.level, |store, range| {
            let len = range.size(store.len());
            if index > len {
                return Err(CollectionError::index_out_of_bounds(index, len));
            }
            Ok(Some((
                Modification::new(ModificationKind::Insert { index }),
                SequenceOp::Insert {
                    at: range.translate(index),
                    items: vec![item],
                },
            )))
        })?;
        Ok(())
    }

    /// Insert every item of `items`, in order, starting at `index`.
    pub fn insert_all(&self, index: usize, items: impl IntoIterator<Item = S::Item>) -> Result<()> {
        let items: Vec<_> = items.into_iter().collect();
        self.core.mutate(&*self.level, |store, range| {
            let len = range.size(store.len());
            if index > len {
                return Err(CollectionError::index_out_of_bounds(index, len));
            }
            if items.is_empty() {
                return Ok(None);
            }
            let count = items.len();
            Ok(Some((
                Modification::new(ModificationKind::InsertAll { index, count }),
                SequenceOp::Insert {
                    at: range.translate(index),
                    items,
                },
            )))
        })?;
        Ok(())
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&self, index: usize, item: S::Item) -> Result<S::Item> {
        let events = self.core.mutate(&*self.level, |store, range| {
            let len = range.size(store.len());
            if index >= len {
                return Err(CollectionError::index_out_of_bounds(index, len));
            }
            Ok(Some((
                Modification::new(ModificationKind::Set { index }),
                SequenceOp::Set {
                    at: range.translate(index),
                    item,
                },
            )))
        })?;
        replaced_value(&events)
    }

    /// Remove the element at `index`, returning it.
    pub fn remove(&self, index: usize) -> Result<S::Item> {
        let events = self.core.mutate(&*self.level, |store, range| {
            let len = range.size(store.len());
            if index >= len {
                return Err(CollectionError::index_out_of_bounds(index, len));
            }
            Ok(Some((
                Modification::new(ModificationKind::Remove { index }),
                SequenceOp::Remove {
                    positions: vec![range.translate(index)],
                },
            )))
        })?;
        detached_value(&events)
    }

    /// Remove the elements in `[from, to)`.
    pub fn remove_range(&self, from: usize, to: usize) -> Result<()> {
        self.core.mutate(&*self.level, |store, range| {
            let len = range.size(store.len());
            if from > to || to > len {
                return Err(CollectionError::invalid_range(format!(
                    "[{from}, {to}) does not fit a view of length {len}"
                )));
            }
            if from == to {
                return Ok(None);
            }
            Ok(Some((
                Modification::new(ModificationKind::RemoveRange { from, to }),
                SequenceOp::Remove {
                    positions: (range.translate(from)..range.translate(to)).collect(),
                },
            )))
        })?;
        Ok(())
    }

    /// Remove every element, leaving the view empty.
    pub fn clear(&self) -> Result<()> {
        self.core.mutate(&*self.level, |store, range| {
            let end = range.end(store.len());
            if range.head >= end {
                return Ok(None);
            }
            Ok(Some((
                Modification::new(ModificationKind::Clear),
                SequenceOp::Remove {
                    positions: (range.head..end).collect(),
                },
            )))
        })?;
        Ok(())
    }

    /// Keep only the elements `keep` accepts. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&S::Item) -> bool) -> Result<usize> {
        let events = self.core.mutate(&*self.level, |store, range| {
            let positions: Vec<usize> = (range.head..range.end(store.len()))
                .filter(|&position| store.get(position).is_some_and(|item| !keep(item)))
                .collect();
            if positions.is_empty() {
                return Ok(None);
            }
            Ok(Some((
                Modification::new(ModificationKind::Retain),
                SequenceOp::Remove { positions },
            )))
        })?;
        Ok(events.len())
    }

    /// A view of `[from, to)` of this view.
    ///
    /// The sub-list bubbles its events to this list and becomes stale as
    /// soon as the store changes through anything but itself or its own
    /// descendants.
    pub fn sub_list(&self, from: usize, to: usize) -> Result<Self> {
        let (store, range) = self.core.read()?;
        let len = range.size(store.len());
        if from > to || to > len {
            return Err(CollectionError::invalid_range(format!(
                "[{from}, {to}) does not fit a view of length {len}"
            )));
        }
        horizon_collections_core::collections_trace!(
            parent = %self.info(),
            from,
            to,
            "sub-list created"
        );
        let parent: Arc<dyn Level<Position, S::Item>> = self.level.clone();
        Ok(Self {
            core: ListCore {
                cell: Arc::clone(&self.core.cell),
                window: Window::child(&self.core.window, from, to, store.len()),
                guard: self.core.child_guard(store.revision()),
            },
            level: Arc::new(Notifier::new(
                ViewInfo::SubList { from, to },
                SubRange::new(Arc::clone(&self.core.window)),
                Some(parent),
            )),
        })
    }

    /// A cursor positioned before the element at `index`.
    pub fn cursor(&self, index: usize) -> Result<ListCursor<S>> {
        let (store, range) = self.core.read()?;
        let len = range.size(store.len());
        if index > len {
            return Err(CollectionError::index_out_of_bounds(index, len));
        }
        let core = ListCore {
            cell: Arc::clone(&self.core.cell),
            window: Arc::clone(&self.core.window),
            guard: self.core.child_guard(store.revision()),
        };
        let parent: Arc<dyn Level<Position, S::Item>> = self.level.clone();
        Ok(ListCursor::new(core, parent, index))
    }

    crate::listener_methods!(level, Position, S::Item, S::Item);
}

impl<S> ObservableList<S>
where
    S: SequenceStore,
    S::Item: PartialEq,
{
    /// View index of the first element equal to `item`.
    pub fn index_of(&self, item: &S::Item) -> Result<Option<usize>> {
        let (store, range) = self.core.read()?;
        Ok(store
            .iter_range(range.head, range.end(store.len()))
            .position(|candidate| candidate == item))
    }

    /// Returns true if the view holds an element equal to `item`.
    pub fn contains(&self, item: &S::Item) -> Result<bool> {
        Ok(self.index_of(item)?.is_some())
    }

    /// Remove the first element equal to `item`. Returns true if one was
    /// removed.
    pub fn remove_item(&self, item: &S::Item) -> Result<bool> {
        let events = self.core.mutate(&*self.level, |store, range| {
            let found = store
                .iter_range(range.head, range.end(store.len()))
                .position(|candidate| candidate == item);
            Ok(found.map(|index| {
                (
                    Modification::new(ModificationKind::RemoveItem),
                    SequenceOp::Remove {
                        positions: vec![range.translate(index)],
                    },
                )
            }))
        })?;
        Ok(!events.is_empty())
    }
}

impl<S: SequenceStore> Clone for ObservableList<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            level: Arc::clone(&self.level),
        }
    }
}

impl<S: SequenceStore> std::fmt::Debug for ObservableList<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableList")
            .field("view", self.info())
            .field("range", &self.core.window.range())
            .field("fresh", &self.is_fresh())
            .finish()
    }
}

// Ensure lists can be handed to other threads
static_assertions::assert_impl_all!(ObservableList<crate::store::VecStore<String>>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecStore;
    use horizon_collections_core::{DuplicatePolicy, FnListener, StoreConfig};
    use parking_lot::Mutex;

    fn letters() -> ObservableList<VecStore<char>> {
        ObservableList::new(VecStore::from(vec!['a', 'b', 'c', 'd', 'e']))
    }

    #[test]
    fn test_reads() {
        let list = letters();
        assert_eq!(list.len().unwrap(), 5);
        assert_eq!(list.get(1).unwrap(), Some('b'));
        assert_eq!(list.get(9).unwrap(), None);
        assert_eq!(list.first().unwrap(), Some('a'));
        assert_eq!(list.last().unwrap(), Some('e'));
        assert_eq!(list.index_of(&'d').unwrap(), Some(3));
        assert!(!list.contains(&'z').unwrap());
    }

    #[test]
    fn test_mutations_return_old_values() {
        let list = letters();
        assert_eq!(list.set(0, 'A').unwrap(), 'a');
        assert_eq!(list.remove(4).unwrap(), 'e');
        list.push('f').unwrap();
        list.insert_all(1, ['x', 'y']).unwrap();
        assert_eq!(list.to_vec().unwrap(), vec!['A', 'x', 'y', 'b', 'c', 'd', 'f']);
        assert_eq!(list.retain(|c| c.is_ascii_lowercase()).unwrap(), 1);
        assert!(list.remove_item(&'x').unwrap());
        assert!(!list.remove_item(&'x').unwrap());
        list.remove_range(0, 2).unwrap();
        assert_eq!(list.to_vec().unwrap(), vec!['c', 'd', 'f']);
        list.clear().unwrap();
        assert!(list.is_empty().unwrap());
    }

    #[test]
    fn test_bounds_are_checked() {
        let list = letters();
        assert!(matches!(
            list.insert(6, 'z'),
            Err(CollectionError::IndexOutOfBounds { index: 6, len: 5 })
        ));
        assert!(matches!(list.remove(5), Err(CollectionError::IndexOutOfBounds { .. })));
        assert!(matches!(list.sub_list(3, 2), Err(CollectionError::InvalidRange { .. })));
        assert!(matches!(list.remove_range(2, 6), Err(CollectionError::InvalidRange { .. })));
    }

    #[test]
    fn test_sub_list_tracks_its_elements() {
        let list = letters();
        let middle = list.sub_list(1, 4).unwrap();
        middle.insert(0, 'x').unwrap();
        middle.push('y').unwrap();
        assert_eq!(middle.to_vec().unwrap(), vec!['x', 'b', 'c', 'd', 'y']);
        assert_eq!(list.to_vec().unwrap(), vec!['a', 'x', 'b', 'c', 'd', 'y', 'e']);
        assert!(list.is_fresh());
    }

    #[test]
    fn test_sibling_mutation_makes_view_stale() {
        let list = letters();
        let left = list.sub_list(0, 2).unwrap();
        let right = list.sub_list(2, 5).unwrap();
        right.remove(0).unwrap();
        assert!(!left.is_fresh());
        assert!(matches!(left.len(), Err(CollectionError::Stale(_))));
        assert!(matches!(left.push('z'), Err(CollectionError::Stale(_))));
        assert!(right.is_fresh());
    }

    #[test]
    fn test_set_is_not_structural() {
        let list = letters();
        let left = list.sub_list(0, 2).unwrap();
        list.set(4, 'E').unwrap();
        assert!(left.is_fresh());
    }

    #[test]
    fn test_eviction_outside_sub_list_moves_window() {
        let store = VecStore::from_vec(vec![1, 2, 3, 4, 5], StoreConfig::unique());
        assert_eq!(store.config().duplicates, DuplicatePolicy::Evict);
        let list = ObservableList::new(store);
        let tail = list.sub_list(2, 4).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        tail.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
            recorder
                .lock()
                .push((event.change(), event.index(Phase::Pre), event.index(Phase::Post)));
            Ok(())
        })));

        // Inserting 1 at tail index 0 evicts the 1 at absolute 0.
        tail.insert(0, 1).unwrap();
        assert_eq!(tail.to_vec().unwrap(), vec![1, 3, 4]);
        assert_eq!(list.to_vec().unwrap(), vec![2, 1, 3, 4, 5]);
        // The evicted element sits before the window and has no view index.
        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                (ChangeKind::Detach, None, None),
                (ChangeKind::Attach, None, Some(0)),
            ]
        );
    }

    #[test]
    fn test_no_op_mutations_emit_nothing() {
        let list = letters();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        list.add_listener(Arc::new(FnListener::new().on_modifying(move |_| {
            *counter.lock() += 1;
            Ok(())
        })));
        list.remove_range(2, 2).unwrap();
        list.insert_all(0, Vec::new()).unwrap();
        assert_eq!(list.retain(|_| true).unwrap(), 0);
        assert_eq!(*calls.lock(), 0);
    }
}
