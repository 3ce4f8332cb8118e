//! Fail-fast cursors over maps, sets and their views.

use std::fmt;
use std::sync::Arc;

use horizon_collections_core::{
    ByKey, ByValue, CollectionError, Intent, KeyedStore, Modification, ModificationKind,
    Projection, Result, RevisionGuard, ViewInfo,
};

use crate::map::{ObservableMap, Scan, detached_entry};

/// A forward cursor over an [`ObservableMap`] or one of its views.
///
/// The cursor yields `T`, picked from each entry: whole entries for maps and
/// entry views, keys for key views and sets, values for value views. It
/// walks the entries in the order of the view it was created from.
///
/// Like [`ListCursor`](crate::ListCursor), a cursor is its own view level.
/// [`remove`](Self::remove) fires the same descriptor as removing the key
/// directly, with [`Intent::IteratorRemove`], and the event bubbles to the
/// view the cursor came from. Any structural change made through another
/// path makes the cursor stale.
pub struct MapCursor<S, T, P = ByValue>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    map: ObservableMap<S, P>,
    guard: Arc<RevisionGuard>,
    pick: fn(S::Key, S::Value) -> T,
    next: usize,
    last: Option<S::Key>,
}

/// A cursor over the elements of an [`ObservableSet`](crate::ObservableSet)
/// or the keys of a [`KeyView`](crate::KeyView).
pub type SetCursor<S> = MapCursor<S, <S as KeyedStore>::Key, ByKey>;

impl<S, T, P> MapCursor<S, T, P>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    pub(crate) fn new(map: ObservableMap<S, P>, pick: fn(S::Key, S::Value) -> T) -> Self {
        let guard = RevisionGuard::root(map.revision());
        Self {
            map,
            guard,
            pick,
            next: 0,
            last: None,
        }
    }

    /// Description of this cursor's level.
    pub fn info(&self) -> &ViewInfo {
        self.map.info()
    }

    /// Returns true if the store has not changed through another path.
    pub fn is_fresh(&self) -> bool {
        self.guard.is_fresh(self.map.revision())
    }

    /// Remove the entry last returned by `next`.
    pub fn remove(&mut self) -> Result<T> {
        let key = self.last.clone().ok_or(CollectionError::NoCurrentElement)?;
        self.guard.check_fresh(self.map.revision())?;
        let modification =
            Modification::with_intent(ModificationKind::RemoveKey, Intent::IteratorRemove);
        let guard = Arc::clone(&self.guard);
        let map = &self.map;
        let events = map.remove_where(
            modification,
            Scan::First,
            |candidate, _| candidate == &key,
            || guard.sync(map.revision()),
        )?;
        let (key, value) = detached_entry(&events).ok_or(CollectionError::NoCurrentElement)?;
        self.next -= 1;
        self.last = None;
        Ok((self.pick)(key, value))
    }

    crate::listener_methods!(map.level, S::Key, S::Value, P::Element);
}

impl<S, T, P> Iterator for MapCursor<S, T, P>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.map.entry_at(&self.guard, self.next) {
            Ok(Some((key, value))) => {
                self.next += 1;
                self.last = Some(key.clone());
                Some(Ok((self.pick)(key, value)))
            }
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

impl<S, T, P> fmt::Debug for MapCursor<S, T, P>
where
    S: KeyedStore,
    P: Projection<S::Key, S::Value>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapCursor")
            .field("view", self.info())
            .field("next", &self.next)
            .field("fresh", &self.is_fresh())
            .finish()
    }
}

static_assertions::assert_impl_all!(
    MapCursor<crate::store::SortedStore<String, i32>, (String, i32)>: Send, Sync
);
