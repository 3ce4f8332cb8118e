//! Bidirectional cursors over observable lists.

use std::sync::Arc;

use horizon_collections_core::{
    ByValue, ChangeKind, CollectionError, Intent, Level, ListEvent, Modification,
    ModificationKind, Notifier, Phase, Position, Result, SequenceOp, SequenceStore, ViewInfo,
};

use crate::list::{ListCore, detached_value, replaced_value};

/// A cursor over an [`ObservableList`](crate::ObservableList).
///
/// The cursor sits between two elements. [`next`](Iterator::next) and
/// [`previous`](Self::previous) move it and remember the element they
/// passed, which [`remove`](Self::remove) and [`set`](Self::set) then act
/// on.
///
/// A cursor is its own view level: its listeners see only mutations made
/// through it, and those events bubble to the list it was created from.
/// Removals carry [`Intent::IteratorRemove`]. Mutating the list through any
/// other path makes the cursor stale.
pub struct ListCursor<S: SequenceStore> {
    core: ListCore<S>,
    level: Arc<Notifier<Position, S::Item, ByValue>>,
    next: usize,
    last: Option<usize>,
}

impl<S: SequenceStore> ListCursor<S> {
    pub(crate) fn new(
        core: ListCore<S>,
        parent: Arc<dyn Level<Position, S::Item>>,
        start: usize,
    ) -> Self {
        Self {
            core,
            level: Arc::new(Notifier::new(
                ViewInfo::Cursor { start },
                ByValue::new(),
                Some(parent),
            )),
            next: start,
            last: None,
        }
    }

    /// Description of this cursor's level.
    pub fn info(&self) -> &ViewInfo {
        self.level.info()
    }

    /// Returns true if the list has not changed through another path.
    pub fn is_fresh(&self) -> bool {
        self.core.guard.is_fresh(self.core.cell.revision())
    }

    /// Index of the element `next` would return.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Returns true if `next` would return an element.
    pub fn has_next(&self) -> Result<bool> {
        Ok(self.next < self.core.len()?)
    }

    /// Returns true if `previous` would return an element.
    pub fn has_previous(&self) -> bool {
        self.next > 0
    }

    /// Move backwards and return the element passed.
    pub fn previous(&mut self) -> Option<Result<S::Item>> {
        if self.next == 0 {
            return None;
        }
        match self.core.get(self.next - 1) {
            Ok(Some(item)) => {
                self.next -= 1;
                self.last = Some(self.next);
                Some(Ok(item))
            }
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }

    /// Remove the element last returned by `next` or `previous`.
    pub fn remove(&mut self) -> Result<S::Item> {
        let index = self.last.ok_or(CollectionError::NoCurrentElement)?;
        let events = self.core.mutate(&*self.level, |store, range| {
            let len = range.size(store.len());
            if index >= len {
                return Err(CollectionError::index_out_of_bounds(index, len));
            }
            Ok(Some((
                Modification::with_intent(
                    ModificationKind::Remove { index },
                    Intent::IteratorRemove,
                ),
                SequenceOp::Remove {
                    positions: vec![range.translate(index)],
                },
            )))
        })?;
        if index < self.next {
            self.next -= 1;
        }
        self.last = None;
        detached_value(&events)
    }

    /// Replace the element last returned by `next` or `previous`.
    pub fn set(&mut self, item: S::Item) -> Result<S::Item> {
        let index = self.last.ok_or(CollectionError::NoCurrentElement)?;
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
        // An eviction may have moved the replaced element.
        let forward = index < self.next;
        if let Some(moved) = post_index(&events, ChangeKind::Replace) {
            self.last = Some(moved);
            self.next = if forward { moved + 1 } else { moved };
        }
        replaced_value(&events)
    }

    /// Insert `item` before the element `next` would return.
    ///
    /// A following `next` is unaffected; `previous` returns the new element.
    pub fn insert(&mut self, item: S::Item) -> Result<()> {
        let index = self.next;
        let events = self.core.mutate(&*self.level, |store, range| {
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
        self.next = post_index(&events, ChangeKind::Attach).map_or(index, |at| at) + 1;
        self.last = None;
        Ok(())
    }

    crate::listener_methods!(level, Position, S::Item, S::Item);
}

impl<S: SequenceStore> Iterator for ListCursor<S> {
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.core.get(self.next) {
            Ok(Some(item)) => {
                self.last = Some(self.next);
                self.next += 1;
                Some(Ok(item))
            }
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

/// View index, after the mutation, of the first change of `change`.
fn post_index<T>(events: &[Arc<ListEvent<T>>], change: ChangeKind) -> Option<usize> {
    events
        .iter()
        .find(|event| event.change() == change)
        .and_then(|event| event.index(Phase::Post))
}
