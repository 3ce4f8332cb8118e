//! Key-ordered store over a `BTreeMap`.

use std::collections::BTreeMap;
use std::ops::Bound;

use horizon_collections_core::{
    DuplicatePolicy, KeyedOp, KeyedStore, MutationHandler, NavigableStore, Store, StoreConfig,
    StoreError,
};
use horizon_collections_core::logging::targets;

/// A [`NavigableStore`] iterating in ascending key order.
///
/// # Example
///
/// ```
/// use horizon_collections::store::SortedStore;
/// use horizon_collections_core::NavigableStore;
///
/// let store: SortedStore<i32, &str> = [(1, "one"), (5, "five")].into_iter().collect();
/// assert_eq!(store.floor(&4), Some((&1, &"one")));
/// assert_eq!(store.ceiling(&4), Some((&5, &"five")));
/// ```
#[derive(Debug, Clone)]
pub struct SortedStore<K, V> {
    entries: BTreeMap<K, V>,
    revision: u64,
    config: StoreConfig,
}

/// A validated [`SortedStore`] mutation.
#[derive(Debug)]
pub struct SortedPlan<K, V> {
    revision: u64,
    failure: Option<StoreError>,
    action: SortedAction<K, V>,
}

#[derive(Debug)]
enum SortedAction<K, V> {
    Nothing,
    Put { key: K, value: V, fresh: bool },
    Remove { keys: Vec<K> },
    Rekey { from: K, to: K },
}

impl<K, V> SortedStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// An empty store.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// An empty store with an explicit configuration.
    ///
    /// The capacity hint is ignored.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            entries: BTreeMap::new(),
            revision: 0,
            config,
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn planned(&self, failure: Option<StoreError>, action: SortedAction<K, V>) -> SortedPlan<K, V> {
        SortedPlan {
            revision: self.revision,
            failure,
            action,
        }
    }

    fn conflict(&self) -> Option<StoreError> {
        (self.config.duplicates == DuplicatePolicy::Reject).then_some(StoreError::ConflictingKey)
    }
}

impl<K, V> Default for SortedStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for SortedStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            revision: 0,
            config: StoreConfig::default(),
        }
    }
}

impl<K, V> Store for SortedStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn revision(&self) -> u64 {
        self.revision
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K, V> KeyedStore for SortedStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;
    type Plan = SortedPlan<K, V>;

    fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    fn entries(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    fn plan(
        &self,
        op: KeyedOp<K, V>,
        mut handler: Option<&mut dyn MutationHandler<K, V>>,
    ) -> Result<SortedPlan<K, V>, StoreError> {
        match op {
            KeyedOp::Put { key, value } => {
                let old = self.entries.get(&key);
                if let Some(handler) = handler {
                    match old {
                        Some(old) => {
                            handler.create_replace_argument(key.clone(), old, key.clone(), &value)
                        }
                        None => handler.create_attach_argument(key.clone(), &value),
                    }
                }
                let failure = old.and_then(|_| self.conflict());
                let fresh = old.is_none();
                Ok(self.planned(failure, SortedAction::Put { key, value, fresh }))
            }
            KeyedOp::Remove { mut keys } => {
                keys.sort();
                keys.dedup();
                keys.retain(|key| self.entries.contains_key(key));
                if let Some(handler) = handler.as_deref_mut() {
                    for key in &keys {
                        handler.create_detach_argument(key.clone(), &self.entries[key]);
                    }
                }
                Ok(self.planned(None, SortedAction::Remove { keys }))
            }
            KeyedOp::Rekey { from, to } => {
                let Some(value) = self.entries.get(&from) else {
                    return Err(StoreError::rejected("no entry under the key being moved"));
                };
                if from == to {
                    return Ok(self.planned(None, SortedAction::Nothing));
                }
                let existing = self.entries.get(&to);
                if let Some(handler) = handler.as_deref_mut() {
                    handler.create_detach_argument(from.clone(), value);
                    if let Some(existing) = existing {
                        handler.create_detach_argument(to.clone(), existing);
                    }
                    handler.create_attach_argument(to.clone(), value);
                }
                let failure = existing.and_then(|_| self.conflict());
                Ok(self.planned(failure, SortedAction::Rekey { from, to }))
            }
            // Key order never depends on access.
            KeyedOp::Touch { .. } => Ok(self.planned(None, SortedAction::Nothing)),
        }
    }

    fn apply(
        &mut self,
        plan: SortedPlan<K, V>,
        handler: Option<&mut dyn MutationHandler<K, V>>,
    ) -> Result<(), StoreError> {
        let failure = if plan.revision != self.revision {
            Some(StoreError::Revision {
                planned: plan.revision,
                actual: self.revision,
            })
        } else {
            plan.failure
        };
        if let Some(failure) = failure {
            if let Some(handler) = handler {
                handler.set_late_failure(&failure);
            }
            return Err(failure);
        }

        let structural = match plan.action {
            SortedAction::Nothing => false,
            SortedAction::Put { key, value, fresh } => {
                self.entries.insert(key, value);
                fresh
            }
            SortedAction::Remove { keys } => {
                for key in &keys {
                    self.entries.remove(key);
                }
                !keys.is_empty()
            }
            SortedAction::Rekey { from, to } => {
                let value = self.entries.remove(&from).ok_or_else(|| {
                    StoreError::rejected("entry under the key being moved disappeared")
                })?;
                self.entries.insert(to, value);
                true
            }
        };
        if structural {
            self.revision += 1;
        }
        tracing::trace!(
            target: targets::STORE,
            revision = self.revision,
            len = self.entries.len(),
            "sorted store applied"
        );
        Ok(())
    }
}

impl<K, V> NavigableStore for SortedStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn range(
        &self,
        lower: Bound<&K>,
        upper: Bound<&K>,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        let range = is_valid_range(lower, upper).then(|| self.entries.range::<K, _>((lower, upper)));
        range.into_iter().flatten()
    }
}

/// Returns false for bounds `BTreeMap::range` would panic on.
fn is_valid_range<K: Ord>(lower: Bound<&K>, upper: Bound<&K>) -> bool {
    match (lower, upper) {
        (Bound::Included(low) | Bound::Excluded(low), Bound::Included(high) | Bound::Excluded(high)) => {
            match low.cmp(high) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => {
                    !matches!((lower, upper), (Bound::Excluded(_), Bound::Excluded(_)))
                }
                std::cmp::Ordering::Greater => false,
            }
        }
        _ => true,
    }
}
