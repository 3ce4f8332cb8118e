//! Key, value and entry views of an observable map.
//!
//! Each view is its own level in the map's view tree. Element listeners of a
//! [`KeyView`] receive keys, those of a [`ValueView`] values and those of an
//! [`EntryView`] `(key, value)` pairs; modification listeners see the same
//! keyed events as the map. None of the views can add entries.

use std::fmt;

use horizon_collections_core::{
    ByEntry, ByKey, ByValue, KeyedStore, ModificationKind, Result, ViewInfo, ViewOperation,
};

use crate::map::{ObservableMap, Scan, detached_entry};
use crate::map_cursor::{MapCursor, SetCursor};

/// The keys of an [`ObservableMap`].
pub struct KeyView<S: KeyedStore> {
    map: ObservableMap<S, ByKey>,
}

impl<S: KeyedStore> KeyView<S> {
    pub(crate) fn new(map: ObservableMap<S, ByKey>) -> Self {
        Self { map }
    }

    /// Description of this level.
    pub fn info(&self) -> &ViewInfo {
        self.map.info()
    }

    /// Number of keys in the view.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the view shows no keys.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns true if `key` is present and inside the view.
    pub fn contains(&self, key: &S::Key) -> bool {
        self.map.contains_key(key)
    }

    /// Copy of the keys, in view order.
    pub fn to_vec(&self) -> Vec<S::Key> {
        self.map.keys()
    }

    /// First key in view order.
    pub fn first(&self) -> Option<S::Key> {
        self.map.first().map(|(key, _)| key)
    }

    /// Last key in view order.
    pub fn last(&self) -> Option<S::Key> {
        self.map.last().map(|(key, _)| key)
    }

    /// A fail-fast cursor over the keys.
    pub fn cursor(&self) -> SetCursor<S> {
        self.map
            .cursor_view(ByKey::with_operations(self.map.operations()), |key, _| key)
    }

    /// Key views cannot add entries: this fails with
    /// [`CollectionError::Unsupported`](crate::CollectionError::Unsupported).
    pub fn insert(&self, _key: S::Key) -> Result<()> {
        self.map.check_operation(ViewOperation::Insert)
    }

    /// Remove the entry under `key`. Returns true if there was one.
    pub fn remove(&self, key: &S::Key) -> Result<bool> {
        Ok(self.map.remove(key)?.is_some())
    }

    /// Keep only the entries whose key `keep` accepts.
    pub fn retain(&self, mut keep: impl FnMut(&S::Key) -> bool) -> Result<usize> {
        self.map.retain(|key, _| keep(key))
    }

    /// Remove every entry of the view.
    pub fn clear(&self) -> Result<()> {
        self.map.clear()
    }

    crate::listener_methods!(map.level, S::Key, S::Value, S::Key);
}

impl<S: KeyedStore> Clone for KeyView<S> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<S: KeyedStore> fmt::Debug for KeyView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyView").field("map", &self.map).finish()
    }
}

/// The values of an [`ObservableMap`].
///
/// Values can be removed or replaced in place.
pub struct ValueView<S: KeyedStore> {
    map: ObservableMap<S, ByValue>,
}

impl<S: KeyedStore> ValueView<S> {
    pub(crate) fn new(map: ObservableMap<S, ByValue>) -> Self {
        Self { map }
    }

    /// Description of this level.
    pub fn info(&self) -> &ViewInfo {
        self.map.info()
    }

    /// Number of values in the view.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the view shows no values.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy of the values, in view order.
    pub fn to_vec(&self) -> Vec<S::Value> {
        self.map.values()
    }

    /// A fail-fast cursor over the values.
    pub fn cursor(&self) -> MapCursor<S, S::Value> {
        self.map
            .cursor_view(ByValue::restricted(self.map.operations()), |_, value| value)
    }

    /// Value views cannot add entries: this fails with
    /// [`CollectionError::Unsupported`](crate::CollectionError::Unsupported).
    pub fn insert(&self, _value: S::Value) -> Result<()> {
        self.map.check_operation(ViewOperation::Insert)
    }

    /// Keep only the entries whose value `keep` accepts.
    pub fn retain(&self, mut keep: impl FnMut(&S::Value) -> bool) -> Result<usize> {
        self.map.retain(|_, value| keep(value))
    }

    /// Remove every entry of the view.
    pub fn clear(&self) -> Result<()> {
        self.map.clear()
    }

    crate::listener_methods!(map.level, S::Key, S::Value, S::Value);
}

impl<S> ValueView<S>
where
    S: KeyedStore,
    S::Value: PartialEq,
{
    /// Returns true if some entry of the view holds `value`.
    pub fn contains(&self, value: &S::Value) -> bool {
        self.map.entries().iter().any(|(_, candidate)| candidate == value)
    }

    /// Remove the first entry, in view order, holding `value`.
    pub fn remove_value(&self, value: &S::Value) -> Result<bool> {
        let events =
            self.map
                .remove_matching(ModificationKind::RemoveItem, Scan::First, |_, candidate| {
                    candidate == value
                })?;
        Ok(detached_entry(&events).is_some())
    }

    /// Replace the value of the first entry, in view order, holding `old`.
    ///
    /// The entry keeps its key. Returns false if no entry holds `old`.
    pub fn replace_value(&self, old: &S::Value, new: S::Value) -> Result<bool> {
        let Some((key, _)) = self
            .map
            .entries()
            .into_iter()
            .find(|(_, candidate)| candidate == old)
        else {
            return Ok(false);
        };
        self.map.put(key, new)?;
        Ok(true)
    }
}

impl<S: KeyedStore> Clone for ValueView<S> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<S: KeyedStore> fmt::Debug for ValueView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueView").field("map", &self.map).finish()
    }
}

/// The `(key, value)` entries of an [`ObservableMap`].
pub struct EntryView<S: KeyedStore> {
    map: ObservableMap<S, ByEntry>,
}

impl<S: KeyedStore> EntryView<S> {
    pub(crate) fn new(map: ObservableMap<S, ByEntry>) -> Self {
        Self { map }
    }

    /// Description of this level.
    pub fn info(&self) -> &ViewInfo {
        self.map.info()
    }

    /// Number of entries in the view.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the view shows no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy of the entries, in view order.
    pub fn to_vec(&self) -> Vec<(S::Key, S::Value)> {
        self.map.entries()
    }

    /// A fail-fast cursor over the entries.
    pub fn cursor(&self) -> MapCursor<S, (S::Key, S::Value), ByEntry> {
        self.map
            .cursor_view(ByEntry::new(), |key, value| (key, value))
    }

    /// Entry views cannot add entries: this fails with
    /// [`CollectionError::Unsupported`](crate::CollectionError::Unsupported).
    pub fn insert(&self, _entry: (S::Key, S::Value)) -> Result<()> {
        self.map.check_operation(ViewOperation::Insert)
    }

    /// Replace the value of an existing entry. Returns the old value.
    ///
    /// Fails as unsupported if `key` has no entry, since that would add one.
    pub fn set_value(&self, key: S::Key, value: S::Value) -> Result<Option<S::Value>> {
        self.map.put(key, value)
    }

    /// Remove the entry under `key`. Returns its value.
    pub fn remove(&self, key: &S::Key) -> Result<Option<S::Value>> {
        self.map.remove(key)
    }

    /// Keep only the entries `keep` accepts.
    pub fn retain(&self, keep: impl FnMut(&S::Key, &S::Value) -> bool) -> Result<usize> {
        self.map.retain(keep)
    }

    /// Remove every entry of the view.
    pub fn clear(&self) -> Result<()> {
        self.map.clear()
    }

    crate::listener_methods!(map.level, S::Key, S::Value, (S::Key, S::Value));
}

impl<S> EntryView<S>
where
    S: KeyedStore,
    S::Value: PartialEq,
{
    /// Returns true if `key` maps to `value`.
    pub fn contains(&self, key: &S::Key, value: &S::Value) -> bool {
        self.map.peek(key).is_some_and(|candidate| &candidate == value)
    }
}

impl<S: KeyedStore> Clone for EntryView<S> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<S: KeyedStore> fmt::Debug for EntryView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryView").field("map", &self.map).finish()
    }
}

static_assertions::assert_impl_all!(KeyView<crate::store::SortedStore<String, i32>>: Send, Sync);
static_assertions::assert_impl_all!(EntryView<crate::store::LinkedStore<String, i32>>: Send, Sync);
