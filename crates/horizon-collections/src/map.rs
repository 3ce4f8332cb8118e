//! Observable maps, sub-maps and descending maps.
//!
//! An [`ObservableMap`] is one level of a view tree over a shared
//! [`KeyedStore`]. The same type serves the root map, key-bounded sub-maps
//! ([`sub_map`](ObservableMap::sub_map), [`head_map`](ObservableMap::head_map),
//! [`tail_map`](ObservableMap::tail_map)) and reversed views
//! ([`descending_map`](ObservableMap::descending_map)). Derived maps add no
//! propagation logic of their own: they filter keys, flip the navigation
//! direction, and bubble their events unchanged to the parent level.
//!
//! Key-bounded views re-derive their membership on every access, so they
//! never become stale. Cursors ([`ObservableMap::cursor`]) hold a position
//! and are fail-fast.
//!
//! # Example
//!
//! ```
//! use horizon_collections::prelude::*;
//!
//! let map = ObservableMap::new(SortedStore::new());
//! for (key, value) in [(1, "one"), (3, "three"), (5, "five")] {
//!     map.put(key, value).unwrap();
//! }
//!
//! let low = map.head_map(4, false).unwrap();
//! assert_eq!(low.keys(), vec![1, 3]);
//! assert!(low.put(7, "seven").is_err());
//!
//! let reversed = map.descending_map();
//! assert_eq!(reversed.first(), Some((5, "five")));
//! assert_eq!(reversed.floor(&4), Some((5, "five")));
//! ```

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use horizon_collections_core::{
    ByEntry, ByKey, ByValue, ChangeKind, CollectionError, Intent, KeyedOp, KeyedStore, Level,
    MapEvent, Modification, ModificationEvent, ModificationKind, NavigableStore, Notifier, Phase,
    Projection, Result, RevisionGuard, StoreCell, ViewInfo, ViewOperation, ViewOperations,
    run_mutation,
};

use crate::collector::{Change, ChangeCollector};
use crate::map_cursor::MapCursor;
use crate::views::{EntryView, KeyView, ValueView};

/// Decides which keys a map view shows.
pub trait KeyFilter<K>: Send + Sync {
    /// Returns true if `key` belongs to the view.
    fn contains(&self, key: &K) -> bool;

    /// Lower and upper bounds, in ascending key order.
    fn bounds(&self) -> (Bound<&K>, Bound<&K>);
}

/// A contiguous range of keys.
///
/// Bounds are kept in ascending key order, whatever the direction of the
/// view the range was requested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange<K> {
    lower: Bound<K>,
    upper: Bound<K>,
}

impl<K: Ord> KeyRange<K> {
    /// A range between two bounds.
    ///
    /// Fails if `lower` lies above `upper`. Equal excluded bounds make an
    /// empty range.
    pub fn new(lower: Bound<K>, upper: Bound<K>) -> Result<Self> {
        let inverted = match (&lower, &upper) {
            (
                Bound::Included(low) | Bound::Excluded(low),
                Bound::Included(high) | Bound::Excluded(high),
            ) => low > high,
            _ => false,
        };
        if inverted {
            return Err(CollectionError::invalid_range("lower bound lies above upper bound"));
        }
        Ok(Self { lower, upper })
    }

    /// Every key.
    pub fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Lower bound.
    pub fn lower(&self) -> Bound<&K> {
        self.lower.as_ref()
    }

    /// Upper bound.
    pub fn upper(&self) -> Bound<&K> {
        self.upper.as_ref()
    }

    /// Returns true if `key` lies inside the range.
    pub fn contains(&self, key: &K) -> bool {
        bounds_contain(self.lower(), self.upper(), key)
    }

    /// Returns true if every key of `other` lies inside this range.
    pub fn encloses(&self, other: &Self) -> bool {
        lower_encloses(self.lower(), other.lower()) && upper_encloses(self.upper(), other.upper())
    }
}

impl<K: fmt::Debug> fmt::Display for KeyRange<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(key) => write!(f, "[{key:?}, ")?,
            Bound::Excluded(key) => write!(f, "({key:?}, ")?,
            Bound::Unbounded => f.write_str("(.., ")?,
        }
        match &self.upper {
            Bound::Included(key) => write!(f, "{key:?}]"),
            Bound::Excluded(key) => write!(f, "{key:?})"),
            Bound::Unbounded => f.write_str("..)"),
        }
    }
}

impl<K: Ord + Send + Sync> KeyFilter<K> for KeyRange<K> {
    fn contains(&self, key: &K) -> bool {
        KeyRange::contains(self, key)
    }

    fn bounds(&self) -> (Bound<&K>, Bound<&K>) {
        (self.lower(), self.upper())
    }
}

fn bounds_contain<K: Ord>(lower: Bound<&K>, upper: Bound<&K>, key: &K) -> bool {
    let above = match lower {
        Bound::Included(low) => key >= low,
        Bound::Excluded(low) => key > low,
        Bound::Unbounded => true,
    };
    let below = match upper {
        Bound::Included(high) => key <= high,
        Bound::Excluded(high) => key < high,
        Bound::Unbounded => true,
    };
    above && below
}

/// Returns true if the lower bound `inner` is at least as tight as `outer`.
fn lower_encloses<K: Ord>(outer: Bound<&K>, inner: Bound<&K>) -> bool {
    match (outer, inner) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        (Bound::Included(o), Bound::Included(i) | Bound::Excluded(i)) => i >= o,
        (Bound::Excluded(o), Bound::Included(i)) => i > o,
        (Bound::Excluded(o), Bound::Excluded(i)) => i >= o,
    }
}

/// Returns true if the upper bound `inner` is at least as tight as `outer`.
fn upper_encloses<K: Ord>(outer: Bound<&K>, inner: Bound<&K>) -> bool {
    match (outer, inner) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        (Bound::Included(o), Bound::Included(i) | Bound::Excluded(i)) => i <= o,
        (Bound::Excluded(o), Bound::Included(i)) => i < o,
        (Bound::Excluded(o), Bound::Excluded(i)) => i <= o,
    }
}

fn tighter_lower<'a, K: Ord>(a: Bound<&'a K>, b: Bound<&'a K>) -> Bound<&'a K> {
    if lower_encloses(a, b) { b } else { a }
}

fn tighter_upper<'a, K: Ord>(a: Bound<&'a K>, b: Bound<&'a K>) -> Bound<&'a K> {
    if upper_encloses(a, b) { b } else { a }
}

/// Which matching entries a removal takes, in view order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan {
    All,
    First,
    Last,
}

/// An observable map, or a view over one.
///
/// `P` decides what element listeners of this level receive; plain maps use
/// [`ByValue`]. Cloning yields another handle to the same level.
pub struct ObservableMap<S, P = ByValue>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    cell: Arc<StoreCell<S>>,
    filter: Option<Arc<dyn KeyFilter<S::Key>>>,
    descending: bool,
    pub(crate) level: Arc<Notifier<S::Key, S::Value, P>>,
}

impl<S: KeyedStore> ObservableMap<S> {
    /// Create a root map owning `store`.
    pub fn new(store: S) -> Self {
        Self::with_projection(store, ByValue::new())
    }
}

impl<S, P> ObservableMap<S, P>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    /// A root map whose level uses `projection`.
    pub(crate) fn with_projection(store: S, projection: P) -> Self {
        Self {
            cell: StoreCell::new(store),
            filter: None,
            descending: false,
            level: Arc::new(Notifier::new(ViewInfo::Root, projection, None)),
        }
    }

    /// A child level sharing this map's store.
    pub(crate) fn derive<Q: Projection<S::Key, S::Value>>(
        &self,
        info: ViewInfo,
        projection: Q,
        filter: Option<Arc<dyn KeyFilter<S::Key>>>,
        descending: bool,
    ) -> ObservableMap<S, Q> {
        let parent: Arc<dyn Level<S::Key, S::Value>> = self.level.clone();
        ObservableMap {
            cell: Arc::clone(&self.cell),
            filter,
            descending,
            level: Arc::new(Notifier::new(info, projection, Some(parent))),
        }
    }

    /// Description of this level.
    pub fn info(&self) -> &ViewInfo {
        self.level.info()
    }

    /// Structural operations this level permits.
    pub fn operations(&self) -> ViewOperations {
        self.level.operations()
    }

    /// Returns true if the view iterates in descending store order.
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    /// Returns true while listeners of a mutation on the shared store run.
    pub fn is_frozen(&self) -> bool {
        self.cell.is_frozen()
    }

    fn in_range(&self, key: &S::Key) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter.contains(key))
    }

    fn ensure_in_range(&self, key: &S::Key) -> Result<()> {
        if self.in_range(key) {
            return Ok(());
        }
        Err(CollectionError::KeyOutOfRange {
            view: self.info().clone(),
        })
    }

    /// Fail unless this level permits `operation`.
    pub(crate) fn check_operation(&self, operation: ViewOperation) -> Result<()> {
        Ok(self.operations().check(self.info(), operation)?)
    }

    /// Number of entries in the view.
    pub fn len(&self) -> usize {
        let store = self.cell.read();
        match &self.filter {
            None => store.len(),
            Some(filter) => store.entries().filter(|&(key, _)| filter.contains(key)).count(),
        }
    }

    /// Returns true if the view shows no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` is present and inside the view.
    pub fn contains_key(&self, key: &S::Key) -> bool {
        self.in_range(key) && self.cell.read().contains_key(key)
    }

    /// Value under `key`, without recording an access.
    pub fn peek(&self, key: &S::Key) -> Option<S::Value> {
        if !self.in_range(key) {
            return None;
        }
        self.cell.read().get(key).cloned()
    }

    /// Value under `key`.
    ///
    /// On stores in access order this is a mutation: the entry moves to the
    /// end and listeners see a replacement with
    /// [`Intent::AccessPromotion`]. Reads made while listeners run skip the
    /// promotion.
    pub fn get(&self, key: &S::Key) -> Result<Option<S::Value>> {
        let (value, promotes) = {
            let store = self.cell.read();
            if !self.in_range(key) {
                return Ok(None);
            }
            (store.get(key).cloned(), store.promotes_on_access())
        };
        if value.is_some() && promotes && !self.cell.is_frozen() {
            let modification =
                Modification::with_intent(ModificationKind::Access, Intent::AccessPromotion);
            self.mutate(
                |_| Ok(Some(KeyedOp::Touch { key: key.clone() })),
                |_| Arc::clone(&modification),
            )?;
        }
        Ok(value)
    }

    /// Copy of the entries, in view order.
    pub fn entries(&self) -> Vec<(S::Key, S::Value)> {
        let store = self.cell.read();
        let entries = store
            .entries()
            .filter(|&(key, _)| self.in_range(key))
            .map(|(key, value)| (key.clone(), value.clone()));
        if self.descending {
            entries.rev().collect()
        } else {
            entries.collect()
        }
    }

    /// Copy of the keys, in view order.
    pub fn keys(&self) -> Vec<S::Key> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Copy of the values, in view order.
    pub fn values(&self) -> Vec<S::Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// First entry in view order.
    pub fn first(&self) -> Option<(S::Key, S::Value)> {
        self.edge(Scan::First)
    }

    /// Last entry in view order.
    pub fn last(&self) -> Option<(S::Key, S::Value)> {
        self.edge(Scan::Last)
    }

    fn edge(&self, scan: Scan) -> Option<(S::Key, S::Value)> {
        let store = self.cell.read();
        let mut entries = store.entries().filter(|&(key, _)| self.in_range(key));
        let from_front = (scan == Scan::First) != self.descending;
        let found = if from_front {
            entries.next()
        } else {
            entries.next_back()
        };
        found.map(|(key, value)| (key.clone(), value.clone()))
    }

    /// Insert or overwrite the value under `key`. Returns the old value.
    pub fn put(&self, key: S::Key, value: S::Value) -> Result<Option<S::Value>> {
        self.ensure_in_range(&key)?;
        let modification = Modification::new(ModificationKind::Put);
        let events = self.mutate(
            |store| {
                let operation = if store.contains_key(&key) {
                    ViewOperation::Replace
                } else {
                    ViewOperation::Insert
                };
                self.check_operation(operation)?;
                Ok(Some(KeyedOp::Put { key, value }))
            },
            |_| Arc::clone(&modification),
        )?;
        Ok(replaced_value(&events))
    }

    /// Replace the value under `key` with one computed from it.
    ///
    /// Returns the old value, or `None` without notifying anyone when the key
    /// is absent.
    pub fn update(
        &self,
        key: &S::Key,
        update: impl FnOnce(&S::Value) -> S::Value,
    ) -> Result<Option<S::Value>> {
        if !self.in_range(key) {
            return Ok(None);
        }
        self.check_operation(ViewOperation::Replace)?;
        let modification = Modification::new(ModificationKind::Put);
        let events = self.mutate(
            |store| {
                Ok(store.get(key).map(|old| KeyedOp::Put {
                    key: key.clone(),
                    value: update(old),
                }))
            },
            |_| Arc::clone(&modification),
        )?;
        Ok(replaced_value(&events))
    }

    /// Remove the entry under `key`. Returns its value.
    pub fn remove(&self, key: &S::Key) -> Result<Option<S::Value>> {
        if !self.in_range(key) {
            return Ok(None);
        }
        self.check_operation(ViewOperation::Remove)?;
        let modification = Modification::new(ModificationKind::RemoveKey);
        let events = self.mutate(
            |store| {
                Ok(store.contains_key(key).then(|| KeyedOp::Remove {
                    keys: vec![key.clone()],
                }))
            },
            |_| Arc::clone(&modification),
        )?;
        Ok(detached_entry(&events).map(|(_, value)| value))
    }

    /// Remove every entry of the view.
    pub fn clear(&self) -> Result<()> {
        self.remove_matching(ModificationKind::Clear, Scan::All, |_, _| true)?;
        Ok(())
    }

    /// Keep only the entries `keep` accepts. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&S::Key, &S::Value) -> bool) -> Result<usize> {
        let events =
            self.remove_matching(ModificationKind::Retain, Scan::All, |key, value| !keep(key, value))?;
        Ok(events.len())
    }

    /// Remove and return the first entry in view order.
    pub fn poll_first(&self) -> Result<Option<(S::Key, S::Value)>> {
        let events = self.remove_matching(ModificationKind::PollFirst, Scan::First, |_, _| true)?;
        Ok(detached_entry(&events))
    }

    /// Remove and return the last entry in view order.
    pub fn poll_last(&self) -> Result<Option<(S::Key, S::Value)>> {
        let events = self.remove_matching(ModificationKind::PollLast, Scan::Last, |_, _| true)?;
        Ok(detached_entry(&events))
    }

    /// Move the value under `from` to `to` in one attempt.
    ///
    /// Listeners see the entry leave `from` with [`Intent::Suspend`] and
    /// arrive at `to` with [`Intent::Resume`]. An entry already under `to`
    /// is detached as an explicit [`ModificationKind::Rekey`], or the store
    /// refuses if it rejects duplicates.
    pub fn rekey(&self, from: &S::Key, to: S::Key) -> Result<()> {
        self.ensure_in_range(from)?;
        self.ensure_in_range(&to)?;
        self.check_operation(ViewOperation::Replace)?;
        let suspend = Modification::with_intent(ModificationKind::Rekey, Intent::Suspend);
        let resume = Modification::with_intent(ModificationKind::Rekey, Intent::Resume);
        let displaced = Modification::new(ModificationKind::Rekey);
        self.mutate(
            |_| {
                Ok(Some(KeyedOp::Rekey {
                    from: from.clone(),
                    to,
                }))
            },
            |change| match change {
                Change::Detach { at, .. } if at == from => Arc::clone(&suspend),
                Change::Attach { .. } => Arc::clone(&resume),
                _ => Arc::clone(&displaced),
            },
        )?;
        Ok(())
    }

    /// Remove the entries `select` picks, scanning in view order.
    pub(crate) fn remove_matching(
        &self,
        kind: ModificationKind,
        scan: Scan,
        select: impl FnMut(&S::Key, &S::Value) -> bool,
    ) -> Result<Vec<Arc<MapEvent<S::Key, S::Value>>>> {
        self.remove_where(Modification::new(kind), scan, select, || {})
    }

    /// Like [`remove_matching`](Self::remove_matching), with an explicit
    /// descriptor. `on_applied` runs once the store has applied the removal.
    pub(crate) fn remove_where(
        &self,
        modification: Arc<Modification>,
        scan: Scan,
        mut select: impl FnMut(&S::Key, &S::Value) -> bool,
        on_applied: impl FnOnce(),
    ) -> Result<Vec<Arc<MapEvent<S::Key, S::Value>>>> {
        self.check_operation(ViewOperation::Remove)?;
        self.mutate_then(
            |store| {
                let mut matching = store
                    .entries()
                    .filter(|&(key, value)| self.in_range(key) && select(key, value))
                    .map(|(key, _)| key);
                let from_front = (scan != Scan::Last) != self.descending;
                let keys: Vec<S::Key> = match scan {
                    Scan::All => matching.cloned().collect(),
                    Scan::First | Scan::Last => {
                        let found = if from_front {
                            matching.next()
                        } else {
                            matching.next_back()
                        };
                        found.cloned().into_iter().collect()
                    }
                };
                Ok((!keys.is_empty()).then_some(KeyedOp::Remove { keys }))
            },
            |_| Arc::clone(&modification),
            on_applied,
        )
    }

    /// Plan, notify and apply one mutation through this level.
    ///
    /// `describe` picks the descriptor of each reported change.
    fn mutate(
        &self,
        build: impl FnOnce(&S) -> Result<Option<KeyedOp<S::Key, S::Value>>>,
        describe: impl Fn(&Change<S::Key, S::Value>) -> Arc<Modification>,
    ) -> Result<Vec<Arc<MapEvent<S::Key, S::Value>>>> {
        self.mutate_then(build, describe, || {})
    }

    fn mutate_then(
        &self,
        build: impl FnOnce(&S) -> Result<Option<KeyedOp<S::Key, S::Value>>>,
        describe: impl Fn(&Change<S::Key, S::Value>) -> Arc<Modification>,
        on_applied: impl FnOnce(),
    ) -> Result<Vec<Arc<MapEvent<S::Key, S::Value>>>> {
        self.cell.ensure_mutable()?;

        let (plan, collector) = {
            let store = self.cell.read();
            let Some(op) = build(&*store)? else {
                return Ok(Vec::new());
            };
            let mut collector = ChangeCollector::default();
            let plan = store.plan(op, Some(&mut collector))?;
            (plan, collector)
        };

        let view = self.info().clone();
        let events: Vec<_> = collector
            .into_changes()
            .into_iter()
            .map(|change| {
                let modification = describe(&change);
                let event = match change {
                    Change::Attach { at, value } => {
                        ModificationEvent::attach(view.clone(), modification, at, value)
                    }
                    Change::Detach { at, value } => {
                        ModificationEvent::detach(view.clone(), modification, at, value)
                    }
                    Change::Replace {
                        detached_at,
                        old,
                        attached_at,
                        new,
                    } => ModificationEvent::replace(
                        view.clone(),
                        modification,
                        (detached_at, old),
                        (attached_at, new),
                    ),
                };
                Arc::new(event)
            })
            .collect();
        if events.is_empty() {
            return Ok(events);
        }

        let _frozen = self.cell.freeze();
        run_mutation(
            &*self.level,
            &events,
            |sink| {
                let mut store = self.cell.write();
                store.apply(plan, Some(sink))
            },
            on_applied,
        )?;
        Ok(events)
    }

    /// Current revision of the shared store.
    pub(crate) fn revision(&self) -> u64 {
        self.cell.revision()
    }

    /// Entry at `index` in view order, provided `guard` is still fresh.
    pub(crate) fn entry_at(
        &self,
        guard: &RevisionGuard,
        index: usize,
    ) -> Result<Option<(S::Key, S::Value)>> {
        let store = self.cell.read();
        guard.check_fresh(store.revision())?;
        let mut entries = store.entries().filter(|&(key, _)| self.in_range(key));
        let found = if self.descending {
            entries.rev().nth(index)
        } else {
            entries.nth(index)
        };
        Ok(found.map(|(key, value)| (key.clone(), value.clone())))
    }

    /// A cursor level below this one, yielding `pick(key, value)`.
    pub(crate) fn cursor_view<T, Q: Projection<S::Key, S::Value>>(
        &self,
        projection: Q,
        pick: fn(S::Key, S::Value) -> T,
    ) -> MapCursor<S, T, Q> {
        let map = self.derive(
            ViewInfo::Cursor { start: 0 },
            projection,
            self.filter.clone(),
            self.descending,
        );
        MapCursor::new(map, pick)
    }

    /// A fail-fast cursor over the entries, in view order.
    ///
    /// Removals through the cursor carry [`Intent::IteratorRemove`]; any
    /// other structural change to the store makes it stale.
    pub fn cursor(&self) -> MapCursor<S, (S::Key, S::Value)> {
        self.cursor_view(ByValue::restricted(self.operations()), |key, value| (key, value))
    }

    /// A view of the keys.
    pub fn key_view(&self) -> KeyView<S> {
        KeyView::new(self.derive(
            ViewInfo::KeyView,
            ByKey::new(),
            self.filter.clone(),
            self.descending,
        ))
    }

    /// A view of the values.
    pub fn value_view(&self) -> ValueView<S> {
        ValueView::new(self.derive(
            ViewInfo::ValueView,
            ByValue::restricted(ViewOperations::REMOVE_AND_REPLACE),
            self.filter.clone(),
            self.descending,
        ))
    }

    /// A view of the `(key, value)` entries.
    pub fn entry_view(&self) -> EntryView<S> {
        EntryView::new(self.derive(
            ViewInfo::EntryView,
            ByEntry::new(),
            self.filter.clone(),
            self.descending,
        ))
    }

    crate::listener_methods!(level, S::Key, S::Value, P::Element);
}

impl<S, P> ObservableMap<S, P>
where
    S: NavigableStore,
    S::Key: Ord,
    P: Projection<S::Key, S::Value>,
{
    fn bounds(&self) -> (Bound<&S::Key>, Bound<&S::Key>) {
        self.filter
            .as_ref()
            .map_or((Bound::Unbounded, Bound::Unbounded), |filter| filter.bounds())
    }

    /// Closest entry to `key`, looking towards smaller keys when `below`.
    fn nearest(&self, key: &S::Key, below: bool, inclusive: bool) -> Option<(S::Key, S::Value)> {
        let store = self.cell.read();
        let (lower, upper) = self.bounds();
        let pivot = if inclusive {
            Bound::Included(key)
        } else {
            Bound::Excluded(key)
        };
        let found = if below {
            store.range(lower, tighter_upper(upper, pivot)).next_back()
        } else {
            store.range(tighter_lower(lower, pivot), upper).next()
        };
        found.map(|(key, value)| (key.clone(), value.clone()))
    }

    /// Greatest entry at or before `key`, in view order.
    pub fn floor(&self, key: &S::Key) -> Option<(S::Key, S::Value)> {
        self.nearest(key, !self.descending, true)
    }

    /// Least entry at or after `key`, in view order.
    pub fn ceiling(&self, key: &S::Key) -> Option<(S::Key, S::Value)> {
        self.nearest(key, self.descending, true)
    }

    /// Greatest entry strictly before `key`, in view order.
    pub fn lower(&self, key: &S::Key) -> Option<(S::Key, S::Value)> {
        self.nearest(key, !self.descending, false)
    }

    /// Least entry strictly after `key`, in view order.
    pub fn higher(&self, key: &S::Key) -> Option<(S::Key, S::Value)> {
        self.nearest(key, self.descending, false)
    }

    /// The same keys, iterated and navigated in the opposite direction.
    pub fn descending_map(&self) -> ObservableMap<S> {
        self.descending_view(ByValue::new())
    }

    /// Keys inside `range`, given in view order.
    ///
    /// The range must lie within this view's own range.
    pub fn sub_map(&self, range: impl RangeBounds<S::Key>) -> Result<ObservableMap<S>>
    where
        S::Key: fmt::Debug,
    {
        self.sub_view(
            range.start_bound().cloned(),
            range.end_bound().cloned(),
            ByValue::new(),
        )
    }

    /// Keys before `to` in view order.
    pub fn head_map(&self, to: S::Key, inclusive: bool) -> Result<ObservableMap<S>>
    where
        S::Key: fmt::Debug,
    {
        self.head_view(to, inclusive, ByValue::new())
    }

    /// Keys from `from` on, in view order.
    pub fn tail_map(&self, from: S::Key, inclusive: bool) -> Result<ObservableMap<S>>
    where
        S::Key: fmt::Debug,
    {
        self.tail_view(from, inclusive, ByValue::new())
    }

    pub(crate) fn descending_view<Q: Projection<S::Key, S::Value>>(
        &self,
        projection: Q,
    ) -> ObservableMap<S, Q> {
        self.derive(
            ViewInfo::Descending,
            projection,
            self.filter.clone(),
            !self.descending,
        )
    }

    /// `start` and `end` are in view order.
    pub(crate) fn sub_view<Q: Projection<S::Key, S::Value>>(
        &self,
        start: Bound<S::Key>,
        end: Bound<S::Key>,
        projection: Q,
    ) -> Result<ObservableMap<S, Q>>
    where
        S::Key: fmt::Debug,
    {
        let (lower, upper) = if self.descending {
            (end, start)
        } else {
            (start, end)
        };
        let range = KeyRange::new(lower, upper)?;
        let (outer_lower, outer_upper) = self.bounds();
        if !lower_encloses(outer_lower, range.lower()) || !upper_encloses(outer_upper, range.upper())
        {
            return Err(CollectionError::invalid_range(format!(
                "{range} escapes {}",
                self.info()
            )));
        }
        horizon_collections_core::collections_trace!(
            parent = %self.info(),
            range = %range,
            "sub-map created"
        );
        let info = ViewInfo::SubMap {
            range: range.to_string(),
        };
        let filter: Arc<dyn KeyFilter<S::Key>> = Arc::new(range);
        Ok(self.derive(info, projection, Some(filter), self.descending))
    }

    pub(crate) fn head_view<Q: Projection<S::Key, S::Value>>(
        &self,
        to: S::Key,
        inclusive: bool,
        projection: Q,
    ) -> Result<ObservableMap<S, Q>>
    where
        S::Key: fmt::Debug,
    {
        let end = if inclusive {
            Bound::Included(to)
        } else {
            Bound::Excluded(to)
        };
        let start = self.view_start();
        self.sub_view(start, end, projection)
    }

    pub(crate) fn tail_view<Q: Projection<S::Key, S::Value>>(
        &self,
        from: S::Key,
        inclusive: bool,
        projection: Q,
    ) -> Result<ObservableMap<S, Q>>
    where
        S::Key: fmt::Debug,
    {
        let start = if inclusive {
            Bound::Included(from)
        } else {
            Bound::Excluded(from)
        };
        let end = self.view_end();
        self.sub_view(start, end, projection)
    }

    /// This view's own bound at the start of its iteration order.
    fn view_start(&self) -> Bound<S::Key> {
        let (lower, upper) = self.bounds();
        let start = if self.descending { upper } else { lower };
        start.cloned()
    }

    /// This view's own bound at the end of its iteration order.
    fn view_end(&self) -> Bound<S::Key> {
        let (lower, upper) = self.bounds();
        let end = if self.descending { lower } else { upper };
        end.cloned()
    }
}

impl<S, P> Clone for ObservableMap<S, P>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            filter: self.filter.clone(),
            descending: self.descending,
            level: Arc::clone(&self.level),
        }
    }
}

impl<S, P> fmt::Debug for ObservableMap<S, P>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap")
            .field("view", self.info())
            .field("descending", &self.descending)
            .field("len", &self.len())
            .finish()
    }
}

/// The pre entry of the first detach among `events`.
pub(crate) fn detached_entry<K: Clone, V: Clone>(events: &[Arc<MapEvent<K, V>>]) -> Option<(K, V)> {
    events
        .iter()
        .find(|event| event.change() == ChangeKind::Detach)
        .and_then(|event| event.entry(Phase::Pre).cloned())
}

/// The old value of the first replacement among `events`.
fn replaced_value<K, V: Clone>(events: &[Arc<MapEvent<K, V>>]) -> Option<V> {
    events
        .iter()
        .find(|event| event.change() == ChangeKind::Replace)
        .and_then(|event| event.value(Phase::Pre).cloned())
}

// Ensure maps and their views can be handed to other threads
static_assertions::assert_impl_all!(
    ObservableMap<crate::store::SortedStore<String, i32>>: Send, Sync
);
