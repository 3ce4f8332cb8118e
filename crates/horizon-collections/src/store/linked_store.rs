//! Hash-indexed linked store with insertion or access order.
//!
//! Entries live in a [`SlotMap`] arena and are threaded into a doubly linked
//! list; a `HashMap` maps keys to their slots. In
//! [`OrderMode::Access`] every recorded access moves the entry to the back,
//! which is a structural change (the revision moves).

use std::collections::HashMap;
use std::hash::Hash;

use horizon_collections_core::{
    DuplicatePolicy, KeyedOp, KeyedStore, MutationHandler, OrderMode, Store, StoreConfig,
    StoreError,
};
use horizon_collections_core::logging::targets;
use slotmap::{DefaultKey, SlotMap};

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

/// A [`KeyedStore`] iterating in insertion or access order.
#[derive(Debug, Clone)]
pub struct LinkedStore<K, V> {
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    index: HashMap<K, DefaultKey>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
    revision: u64,
    config: StoreConfig,
}

/// A validated [`LinkedStore`] mutation.
#[derive(Debug)]
pub struct LinkedPlan<K, V> {
    revision: u64,
    failure: Option<StoreError>,
    action: LinkedAction<K, V>,
}

#[derive(Debug)]
enum LinkedAction<K, V> {
    Nothing,
    Insert { key: K, value: V },
    Overwrite { key: K, value: V, promote: bool },
    Remove { keys: Vec<K> },
    Rekey { from: K, to: K, evict: bool },
    Promote { key: K },
}

impl<K, V> LinkedStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// An empty store in insertion order.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// An empty store.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            nodes: SlotMap::with_capacity(config.capacity),
            index: HashMap::with_capacity(config.capacity),
            head: None,
            tail: None,
            revision: 0,
            config,
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The oldest (or least recently accessed) entry.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.head.map(|slot| {
            let node = &self.nodes[slot];
            (&node.key, &node.value)
        })
    }

    /// The newest (or most recently accessed) entry.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.tail.map(|slot| {
            let node = &self.nodes[slot];
            (&node.key, &node.value)
        })
    }

    fn is_last(&self, key: &K) -> bool {
        self.index.get(key).is_some_and(|&slot| Some(slot) == self.tail)
    }

    fn unlink(&mut self, slot: DefaultKey) {
        let (prev, next) = {
            let node = &self.nodes[slot];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
    }

    fn link_back(&mut self, slot: DefaultKey) {
        let tail = self.tail;
        {
            let node = &mut self.nodes[slot];
            node.prev = tail;
            node.next = None;
        }
        match tail {
            Some(tail) => self.nodes[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    fn push_back(&mut self, key: K, value: V) {
        let slot = self.nodes.insert(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.link_back(slot);
        self.index.insert(key, slot);
    }

    fn remove_key(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        self.nodes.remove(slot).map(|node| node.value)
    }

    fn move_to_back(&mut self, slot: DefaultKey) {
        if Some(slot) != self.tail {
            self.unlink(slot);
            self.link_back(slot);
        }
    }

    fn plan_put(
        &self,
        key: K,
        value: V,
        handler: Option<&mut dyn MutationHandler<K, V>>,
    ) -> LinkedPlan<K, V> {
        let Some(old) = self.get(&key) else {
            if let Some(handler) = handler {
                handler.create_attach_argument(key.clone(), &value);
            }
            return self.planned(None, LinkedAction::Insert { key, value });
        };
        if let Some(handler) = handler {
            handler.create_replace_argument(key.clone(), old, key.clone(), &value);
        }
        let failure = (self.config.duplicates == DuplicatePolicy::Reject)
            .then_some(StoreError::ConflictingKey);
        let promote = self.config.order == OrderMode::Access;
        self.planned(
            failure,
            LinkedAction::Overwrite {
                key,
                value,
                promote,
            },
        )
    }

    fn plan_rekey(
        &self,
        from: K,
        to: K,
        mut handler: Option<&mut dyn MutationHandler<K, V>>,
    ) -> Result<LinkedPlan<K, V>, StoreError> {
        let Some(value) = self.get(&from) else {
            return Err(StoreError::rejected("no entry under the key being moved"));
        };
        if from == to {
            return Ok(self.planned(None, LinkedAction::Nothing));
        }
        let existing = self.get(&to);
        if let Some(handler) = handler.as_deref_mut() {
            handler.create_detach_argument(from.clone(), value);
            if let Some(existing) = existing {
                handler.create_detach_argument(to.clone(), existing);
            }
            handler.create_attach_argument(to.clone(), value);
        }
        let failure = (existing.is_some() && self.config.duplicates == DuplicatePolicy::Reject)
            .then_some(StoreError::ConflictingKey);
        Ok(self.planned(
            failure,
            LinkedAction::Rekey {
                from,
                to,
                evict: existing.is_some(),
            },
        ))
    }

    fn planned(
        &self,
        failure: Option<StoreError>,
        action: LinkedAction<K, V>,
    ) -> LinkedPlan<K, V> {
        LinkedPlan {
            revision: self.revision,
            failure,
            action,
        }
    }
}

impl<K, V> Default for LinkedStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for LinkedStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Later duplicates overwrite the value and keep the first position.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (key, value) in iter {
            match store.index.get(&key) {
                Some(&slot) => store.nodes[slot].value = value,
                None => store.push_back(key, value),
            }
        }
        store
    }
}

impl<K, V> Store for LinkedStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn revision(&self) -> u64 {
        self.revision
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

impl<K, V> KeyedStore for LinkedStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;
    type Plan = LinkedPlan<K, V>;

    fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.nodes[slot].value)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn entries(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        Entries {
            nodes: &self.nodes,
            front: self.head,
            back: self.tail,
            remaining: self.index.len(),
        }
    }

    fn promotes_on_access(&self) -> bool {
        self.config.order == OrderMode::Access
    }

    fn plan(
        &self,
        op: KeyedOp<K, V>,
        mut handler: Option<&mut dyn MutationHandler<K, V>>,
    ) -> Result<LinkedPlan<K, V>, StoreError> {
        match op {
            KeyedOp::Put { key, value } => Ok(self.plan_put(key, value, handler)),
            KeyedOp::Remove { keys } => {
                let mut present: Vec<K> = Vec::with_capacity(keys.len());
                for key in keys {
                    if present.contains(&key) {
                        continue;
                    }
                    if let Some(value) = self.get(&key) {
                        if let Some(handler) = handler.as_deref_mut() {
                            handler.create_detach_argument(key.clone(), value);
                        }
                        present.push(key);
                    }
                }
                Ok(self.planned(None, LinkedAction::Remove { keys: present }))
            }
            KeyedOp::Rekey { from, to } => self.plan_rekey(from, to, handler),
            KeyedOp::Touch { key } => {
                let promotable = self.promotes_on_access() && !self.is_last(&key);
                match self.get(&key) {
                    Some(value) if promotable => {
                        if let Some(handler) = handler {
                            handler.create_replace_argument(key.clone(), value, key.clone(), value);
                        }
                        Ok(self.planned(None, LinkedAction::Promote { key }))
                    }
                    _ => Ok(self.planned(None, LinkedAction::Nothing)),
                }
            }
        }
    }

    fn apply(
        &mut self,
        plan: LinkedPlan<K, V>,
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
            LinkedAction::Nothing => false,
            LinkedAction::Insert { key, value } => {
                self.push_back(key, value);
                true
            }
            LinkedAction::Overwrite {
                key,
                value,
                promote,
            } => {
                let slot = self.index[&key];
                self.nodes[slot].value = value;
                if promote && Some(slot) != self.tail {
                    self.move_to_back(slot);
                    true
                } else {
                    false
                }
            }
            LinkedAction::Remove { keys } => {
                for key in &keys {
                    self.remove_key(key);
                }
                !keys.is_empty()
            }
            LinkedAction::Rekey { from, to, evict } => {
                if evict {
                    self.remove_key(&to);
                }
                let slot = self.index.remove(&from).ok_or(StoreError::rejected(
                    "entry under the key being moved disappeared",
                ))?;
                self.nodes[slot].key = to.clone();
                self.index.insert(to, slot);
                true
            }
            LinkedAction::Promote { key } => {
                let slot = self.index[&key];
                self.move_to_back(slot);
                true
            }
        };
        if structural {
            self.revision += 1;
        }
        tracing::trace!(
            target: targets::STORE,
            revision = self.revision,
            len = self.index.len(),
            "linked store applied"
        );
        Ok(())
    }
}

struct Entries<'a, K, V> {
    nodes: &'a SlotMap<DefaultKey, Node<K, V>>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Entries<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.front?];
        self.front = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Entries<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.back?];
        self.back = node.prev;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(store: &LinkedStore<&'static str, i32>) -> Vec<&'static str> {
        store.entries().map(|(key, _)| *key).collect()
    }

    fn run(store: &mut LinkedStore<&'static str, i32>, op: KeyedOp<&'static str, i32>) {
        let plan = store.plan(op, None).unwrap();
        store.apply(plan, None).unwrap();
    }

    #[test]
    fn test_insertion_order() {
        let mut store = LinkedStore::new();
        run(&mut store, KeyedOp::Put { key: "b", value: 2 });
        run(&mut store, KeyedOp::Put { key: "a", value: 1 });
        run(&mut store, KeyedOp::Put { key: "b", value: 3 });

        assert_eq!(keys(&store), ["b", "a"]);
        assert_eq!(store.get(&"b"), Some(&3));
        assert_eq!(store.revision(), 2);
        assert_eq!(store.entries().rev().map(|(key, _)| *key).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_access_order_promotes_on_touch() {
        let mut store = LinkedStore::with_config(StoreConfig::access_ordered());
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            run(&mut store, KeyedOp::Put { key, value });
        }
        let before = store.revision();
        run(&mut store, KeyedOp::Touch { key: "a" });

        assert_eq!(keys(&store), ["b", "c", "a"]);
        assert_eq!(store.revision(), before + 1);
        assert_eq!(store.first(), Some((&"b", &2)));
        assert_eq!(store.last(), Some((&"a", &1)));

        // Touching the newest entry changes nothing.
        run(&mut store, KeyedOp::Touch { key: "a" });
        assert_eq!(store.revision(), before + 1);
    }

    #[test]
    fn test_touch_is_noop_in_insertion_order() {
        let mut store = LinkedStore::new();
        run(&mut store, KeyedOp::Put { key: "a", value: 1 });
        run(&mut store, KeyedOp::Put { key: "b", value: 2 });
        run(&mut store, KeyedOp::Touch { key: "a" });
        assert_eq!(keys(&store), ["a", "b"]);
        assert!(!store.promotes_on_access());
    }

    #[test]
    fn test_remove_and_rekey() {
        let mut store = LinkedStore::new();
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            run(&mut store, KeyedOp::Put { key, value });
        }
        run(&mut store, KeyedOp::Remove { keys: vec!["b", "z"] });
        assert_eq!(keys(&store), ["a", "c"]);

        run(&mut store, KeyedOp::Rekey { from: "a", to: "x" });
        assert_eq!(keys(&store), ["x", "c"]);
        assert_eq!(store.get(&"x"), Some(&1));
        assert!(!store.contains_key(&"a"));
    }

    #[test]
    fn test_reject_policy_fails_late() {
        let config = StoreConfig {
            duplicates: DuplicatePolicy::Reject,
            ..Default::default()
        };
        let mut store = LinkedStore::with_config(config);
        run(&mut store, KeyedOp::Put { key: "a", value: 1 });
        let plan = store.plan(KeyedOp::Put { key: "a", value: 2 }, None).unwrap();
        assert_eq!(store.apply(plan, None), Err(StoreError::ConflictingKey));
        assert_eq!(store.get(&"a"), Some(&1));
    }

    #[test]
    fn test_collect_keeps_first_position() {
        let store: LinkedStore<&'static str, i32> =
            [("a", 1), ("b", 2), ("a", 3)].into_iter().collect();
        assert_eq!(keys(&store), ["a", "b"]);
        assert_eq!(store.get(&"a"), Some(&3));
        assert_eq!(store.first(), Some((&"a", &3)));
    }
}
