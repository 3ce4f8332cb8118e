//! Observable sets.
//!
//! A set is a map from its elements to `()`. Element listeners receive the
//! elements themselves; modification listeners see keyed events whose value
//! is always `()`.

use std::fmt;
use std::ops::RangeBounds;

use horizon_collections_core::{
    ByKey, KeyedStore, ModificationKind, NavigableStore, Result, ViewInfo, ViewOperations,
};

use crate::map::{ObservableMap, Scan, detached_entry};
use crate::map_cursor::SetCursor;

/// An observable set over a [`KeyedStore`] with unit values.
///
/// Over a [`LinkedStore`](crate::store::LinkedStore) the set keeps insertion
/// order; over a [`SortedStore`](crate::store::SortedStore) it is sorted and
/// offers navigation and range views.
///
/// # Example
///
/// ```
/// use horizon_collections::prelude::*;
///
/// let set = ObservableSet::new(SortedStore::new());
/// for word in ["pear", "apple", "plum"] {
///     set.insert(word).unwrap();
/// }
/// assert!(!set.insert("pear").unwrap());
/// assert_eq!(set.to_vec(), vec!["apple", "pear", "plum"]);
/// assert_eq!(set.higher(&"b"), Some("pear"));
/// ```
pub struct ObservableSet<S: KeyedStore<Value = ()>> {
    map: ObservableMap<S, ByKey>,
}

impl<S: KeyedStore<Value = ()>> ObservableSet<S> {
    /// Create a root set owning `store`.
    pub fn new(store: S) -> Self {
        Self {
            map: ObservableMap::with_projection(store, ByKey::with_operations(ViewOperations::ALL)),
        }
    }

    /// Description of this level.
    pub fn info(&self) -> &ViewInfo {
        self.map.info()
    }

    /// Number of elements in the set.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the set holds no elements.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns true if `element` is present and inside this view.
    pub fn contains(&self, element: &S::Key) -> bool {
        self.map.contains_key(element)
    }

    /// Copy of the elements, in view order.
    pub fn to_vec(&self) -> Vec<S::Key> {
        self.map.keys()
    }

    /// First element in view order.
    pub fn first(&self) -> Option<S::Key> {
        self.map.first().map(|(element, _)| element)
    }

    /// Last element in view order.
    pub fn last(&self) -> Option<S::Key> {
        self.map.last().map(|(element, _)| element)
    }

    /// A fail-fast cursor over the elements, in view order.
    ///
    /// Removals through the cursor carry
    /// [`Intent::IteratorRemove`](horizon_collections_core::Intent::IteratorRemove).
    pub fn cursor(&self) -> SetCursor<S> {
        self.map
            .cursor_view(ByKey::with_operations(self.map.operations()), |element, _| element)
    }

    /// Add `element`. Returns false, without notifying anyone, if it was
    /// already present.
    pub fn insert(&self, element: S::Key) -> Result<bool> {
        if self.map.contains_key(&element) {
            return Ok(false);
        }
        self.map.put(element, ())?;
        Ok(true)
    }

    /// Remove `element`. Returns true if it was present.
    pub fn remove(&self, element: &S::Key) -> Result<bool> {
        Ok(self.map.remove(element)?.is_some())
    }

    /// Keep only the elements `keep` accepts. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&S::Key) -> bool) -> Result<usize> {
        self.map.retain(|element, _| keep(element))
    }

    /// Remove every element of this view.
    pub fn clear(&self) -> Result<()> {
        self.map.clear()
    }

    /// Remove and return the first element in view order.
    pub fn poll_first(&self) -> Result<Option<S::Key>> {
        self.poll(ModificationKind::PollFirst, Scan::First)
    }

    /// Remove and return the last element in view order.
    pub fn poll_last(&self) -> Result<Option<S::Key>> {
        self.poll(ModificationKind::PollLast, Scan::Last)
    }

    fn poll(&self, kind: ModificationKind, scan: Scan) -> Result<Option<S::Key>> {
        let events = self.map.remove_matching(kind, scan, |_, _| true)?;
        Ok(detached_entry(&events).map(|(element, _)| element))
    }

    crate::listener_methods!(map.level, S::Key, (), S::Key);
}

impl<S> ObservableSet<S>
where
    S: NavigableStore<Value = ()>,
    S::Key: Ord,
{
    fn wrap(map: ObservableMap<S, ByKey>) -> Self {
        Self { map }
    }

    /// Greatest element at or before `element`, in view order.
    pub fn floor(&self, element: &S::Key) -> Option<S::Key> {
        self.map.floor(element).map(|(found, _)| found)
    }

    /// Least element at or after `element`, in view order.
    pub fn ceiling(&self, element: &S::Key) -> Option<S::Key> {
        self.map.ceiling(element).map(|(found, _)| found)
    }

    /// Greatest element strictly before `element`, in view order.
    pub fn lower(&self, element: &S::Key) -> Option<S::Key> {
        self.map.lower(element).map(|(found, _)| found)
    }

    /// Least element strictly after `element`, in view order.
    pub fn higher(&self, element: &S::Key) -> Option<S::Key> {
        self.map.higher(element).map(|(found, _)| found)
    }

    /// The same elements in the opposite order.
    pub fn descending_set(&self) -> Self {
        Self::wrap(
            self.map
                .descending_view(ByKey::with_operations(ViewOperations::ALL)),
        )
    }

    /// Elements inside `range`, given in view order.
    pub fn sub_set(&self, range: impl RangeBounds<S::Key>) -> Result<Self>
    where
        S::Key: fmt::Debug,
    {
        self.map
            .sub_view(
                range.start_bound().cloned(),
                range.end_bound().cloned(),
                ByKey::with_operations(ViewOperations::ALL),
            )
            .map(Self::wrap)
    }

    /// Elements before `to` in view order.
    pub fn head_set(&self, to: S::Key, inclusive: bool) -> Result<Self>
    where
        S::Key: fmt::Debug,
    {
        self.map
            .head_view(to, inclusive, ByKey::with_operations(ViewOperations::ALL))
            .map(Self::wrap)
    }

    /// Elements from `from` on, in view order.
    pub fn tail_set(&self, from: S::Key, inclusive: bool) -> Result<Self>
    where
        S::Key: fmt::Debug,
    {
        self.map
            .tail_view(from, inclusive, ByKey::with_operations(ViewOperations::ALL))
            .map(Self::wrap)
    }
}

impl<S: KeyedStore<Value = ()>> FromIterator<S::Key> for ObservableSet<S>
where
    S: FromIterator<(S::Key, ())>,
{
    fn from_iter<I: IntoIterator<Item = S::Key>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|element| (element, ())).collect())
    }
}

impl<S: KeyedStore<Value = ()>> Clone for ObservableSet<S> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<S: KeyedStore<Value = ()>> fmt::Debug for ObservableSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSet").field("map", &self.map).finish()
    }
}

static_assertions::assert_impl_all!(
    ObservableSet<crate::store::SortedStore<String, ()>>: Send, Sync
);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{LinkedStore, SortedStore};
    use horizon_collections_core::{ElementEvent, FnElementListener, Phase};
    use parking_lot::Mutex;

    fn odds() -> ObservableSet<SortedStore<i32, ()>> {
        [1, 3, 5, 7, 9].into_iter().collect()
    }

    #[test]
    fn test_insert_existing_is_silent() {
        let set = odds();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        set.add_element_listener(Arc::new(FnElementListener::new().on_modified(
            move |event: &dyn ElementEvent<i32>| {
                recorder.lock().push(event.element(Phase::Post).copied());
                Ok(())
            },
        )));

        assert!(!set.insert(3).unwrap());
        assert!(set.insert(4).unwrap());
        assert_eq!(*seen.lock(), vec![Some(4)]);
        assert!(set.contains(&4));
    }

    #[test]
    fn test_navigation_and_ranges() {
        let set = odds();
        assert_eq!(set.floor(&4), Some(3));
        assert_eq!(set.ceiling(&4), Some(5));
        let middle = set.sub_set(3..=7).unwrap();
        assert_eq!(middle.to_vec(), vec![3, 5, 7]);
        assert!(middle.insert(8).is_err());
        assert!(middle.insert(4).unwrap());
        assert_eq!(set.to_vec(), vec![1, 3, 4, 5, 7, 9]);

        let descending = middle.descending_set();
        assert_eq!(descending.to_vec(), vec![7, 5, 4, 3]);
        assert_eq!(descending.head_set(5, false).unwrap().to_vec(), vec![7]);
        assert_eq!(descending.poll_last().unwrap(), Some(3));
        assert_eq!(set.tail_set(5, true).unwrap().to_vec(), vec![5, 7, 9]);
    }

    #[test]
    fn test_insertion_ordered_set() {
        let set = ObservableSet::new(LinkedStore::new());
        for word in ["b", "a", "c", "a"] {
            set.insert(word).unwrap();
        }
        assert_eq!(set.to_vec(), vec!["b", "a", "c"]);
        assert_eq!(set.poll_first().unwrap(), Some("b"));
        assert_eq!(set.retain(|word| *word != "c").unwrap(), 1);
        assert_eq!(set.to_vec(), vec!["a"]);
    }
}
