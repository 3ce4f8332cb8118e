//! Vector-backed sequence store.

use std::collections::BTreeSet;

use horizon_collections_core::{
    DuplicatePolicy, MutationHandler, SequenceOp, SequenceStore, Store, StoreConfig, StoreError,
};
use horizon_collections_core::logging::targets;

/// A [`SequenceStore`] over a `Vec<T>`.
///
/// With [`DuplicatePolicy::Evict`] adding an element equal to an existing
/// one removes the existing one, wherever it is; with
/// [`DuplicatePolicy::Reject`] the mutation fails when applied.
///
/// # Example
///
/// ```
/// use horizon_collections::store::VecStore;
/// use horizon_collections_core::{SequenceStore, Store, StoreConfig};
///
/// let store = VecStore::from_vec(vec!["a", "b"], StoreConfig::default());
/// assert_eq!(store.len(), 2);
/// assert_eq!(store.get(1), Some(&"b"));
/// ```
#[derive(Debug, Clone)]
pub struct VecStore<T> {
    items: Vec<T>,
    revision: u64,
    config: StoreConfig,
}

/// A validated [`VecStore`] mutation.
#[derive(Debug)]
pub struct VecPlan<T> {
    revision: u64,
    evicted: BTreeSet<usize>,
    rejected: Option<usize>,
    action: Action<T>,
}

#[derive(Debug)]
enum Action<T> {
    Insert { at: usize, items: Vec<T> },
    Remove { positions: Vec<usize> },
    Set { at: usize, item: T },
}

impl<T> VecStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// An empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// An empty store.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            items: Vec::with_capacity(config.capacity),
            revision: 0,
            config,
        }
    }

    /// A store holding `items`.
    ///
    /// Under [`DuplicatePolicy::Evict`] and [`DuplicatePolicy::Reject`] only
    /// the first of several equal items is kept.
    pub fn from_vec(items: Vec<T>, config: StoreConfig) -> Self {
        let items = match config.duplicates {
            DuplicatePolicy::Allow => items,
            DuplicatePolicy::Evict | DuplicatePolicy::Reject => dedup_first(items),
        };
        Self {
            items,
            revision: 0,
            config,
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// All elements.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    fn position_of(&self, item: &T, skip: Option<usize>) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .find(|&(position, existing)| Some(position) != skip && existing == item)
            .map(|(position, _)| position)
    }

    fn check(&self, index: usize, len: usize) -> Result<(), StoreError> {
        if index >= len {
            return Err(StoreError::OutOfBounds { index, len });
        }
        Ok(())
    }

    fn plan_insert(
        &self,
        at: usize,
        items: Vec<T>,
        mut handler: Option<&mut dyn MutationHandler<usize, T>>,
    ) -> Result<VecPlan<T>, StoreError> {
        if at > self.items.len() {
            return Err(StoreError::OutOfBounds {
                index: at,
                len: self.items.len(),
            });
        }
        let mut evicted = BTreeSet::new();
        let mut rejected = None;
        let items = match self.config.duplicates {
            DuplicatePolicy::Allow => items,
            DuplicatePolicy::Evict => {
                let items = dedup_first(items);
                evicted.extend(items.iter().filter_map(|item| self.position_of(item, None)));
                items
            }
            DuplicatePolicy::Reject => {
                rejected = items.iter().find_map(|item| self.position_of(item, None));
                items
            }
        };

        let target = at - evicted.range(..at).count();
        if let Some(handler) = handler.as_deref_mut() {
            if !evicted.is_empty() {
                handler.set_conflicting_positions(&evicted);
            }
            for &position in &evicted {
                handler.create_detach_argument(position, &self.items[position]);
            }
            for (offset, item) in items.iter().enumerate() {
                handler.create_attach_argument(target + offset, item);
            }
        }
        Ok(VecPlan {
            revision: self.revision,
            evicted,
            rejected,
            action: Action::Insert { at: target, items },
        })
    }

    fn plan_set(
        &self,
        at: usize,
        item: T,
        mut handler: Option<&mut dyn MutationHandler<usize, T>>,
    ) -> Result<VecPlan<T>, StoreError> {
        self.check(at, self.items.len())?;
        let mut evicted = BTreeSet::new();
        let mut rejected = None;
        match self.config.duplicates {
            DuplicatePolicy::Allow => {}
            DuplicatePolicy::Evict => evicted.extend(self.position_of(&item, Some(at))),
            DuplicatePolicy::Reject => rejected = self.position_of(&item, Some(at)),
        }

        let target = at - evicted.range(..at).count();
        if let Some(handler) = handler.as_deref_mut() {
            if !evicted.is_empty() {
                handler.set_conflicting_positions(&evicted);
            }
            for &position in &evicted {
                handler.create_detach_argument(position, &self.items[position]);
            }
            handler.create_replace_argument(at, &self.items[at], target, &item);
        }
        Ok(VecPlan {
            revision: self.revision,
            evicted,
            rejected,
            action: Action::Set { at, item },
        })
    }
}

impl<T> Default for VecStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for VecStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items, StoreConfig::default())
    }
}

impl<T> Store for VecStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn revision(&self) -> u64 {
        self.revision
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> SequenceStore for VecStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Item = T;
    type Plan = VecPlan<T>;

    fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    fn iter_range(&self, start: usize, end: usize) -> impl DoubleEndedIterator<Item = &T> {
        let end = end.min(self.items.len());
        self.items[start.min(end)..end].iter()
    }

    fn plan(
        &self,
        op: SequenceOp<T>,
        mut handler: Option<&mut dyn MutationHandler<usize, T>>,
    ) -> Result<VecPlan<T>, StoreError> {
        match op {
            SequenceOp::Insert { at, items } => self.plan_insert(at, items, handler),
            SequenceOp::Set { at, item } => self.plan_set(at, item, handler),
            SequenceOp::Remove { positions } => {
                let len = self.items.len();
                for pair in positions.windows(2) {
                    if pair[0] >= pair[1] {
                        return Err(StoreError::rejected("removal positions must ascend"));
                    }
                }
                for &position in &positions {
                    self.check(position, len)?;
                    if let Some(handler) = handler.as_deref_mut() {
                        handler.create_detach_argument(position, &self.items[position]);
                    }
                }
                Ok(VecPlan {
                    revision: self.revision,
                    evicted: BTreeSet::new(),
                    rejected: None,
                    action: Action::Remove { positions },
                })
            }
        }
    }

    fn apply(
        &mut self,
        plan: VecPlan<T>,
        handler: Option<&mut dyn MutationHandler<usize, T>>,
    ) -> Result<(), StoreError> {
        let failure = if plan.revision != self.revision {
            Some(StoreError::Revision {
                planned: plan.revision,
                actual: self.revision,
            })
        } else {
            plan.rejected
                .map(|position| StoreError::Duplicate { position })
        };
        if let Some(failure) = failure {
            if let Some(handler) = handler {
                handler.set_late_failure(&failure);
            }
            return Err(failure);
        }

        for &position in plan.evicted.iter().rev() {
            self.items.remove(position);
        }
        let structural = match plan.action {
            Action::Insert { at, items } => {
                let inserted = !items.is_empty();
                let tail = self.items.split_off(at);
                self.items.extend(items);
                self.items.extend(tail);
                inserted
            }
            Action::Remove { positions } => {
                for &position in positions.iter().rev() {
                    self.items.remove(position);
                }
                !positions.is_empty()
            }
            Action::Set { at, item } => {
                let target = at - plan.evicted.range(..at).count();
                self.items[target] = item;
                false
            }
        };
        if structural || !plan.evicted.is_empty() {
            self.revision += 1;
        }
        tracing::trace!(
            target: targets::STORE,
            revision = self.revision,
            len = self.items.len(),
            "vec store applied"
        );
        Ok(())
    }
}

fn dedup_first<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        attached: Vec<(usize, char)>,
        detached: Vec<(usize, char)>,
        replaced: Vec<(usize, char, usize, char)>,
        conflicts: Vec<usize>,
        failure: Option<StoreError>,
    }

    impl MutationHandler<usize, char> for Recorder {
        fn create_attach_argument(&mut self, at: usize, value: &char) {
            self.attached.push((at, *value));
        }

        fn create_detach_argument(&mut self, at: usize, value: &char) {
            self.detached.push((at, *value));
        }

        fn create_replace_argument(&mut self, from: usize, old: &char, to: usize, new: &char) {
            self.replaced.push((from, *old, to, *new));
        }

        fn set_conflicting_positions(&mut self, positions: &BTreeSet<usize>) {
            self.conflicts.extend(positions.iter().copied());
        }

        fn set_late_failure(&mut self, failure: &StoreError) {
            self.failure = Some(failure.clone());
        }
    }

    fn store(items: &str, duplicates: DuplicatePolicy) -> VecStore<char> {
        let config = StoreConfig {
            duplicates,
            ..Default::default()
        };
        VecStore::from_vec(items.chars().collect(), config)
    }

    fn contents(store: &VecStore<char>) -> String {
        store.as_slice().iter().collect()
    }

    #[test]
    fn test_insert_bumps_revision() {
        let mut store = store("ac", DuplicatePolicy::Allow);
        let mut recorder = Recorder::default();
        let plan = store
            .plan(
                SequenceOp::Insert {
                    at: 1,
                    items: vec!['b'],
                },
                Some(&mut recorder),
            )
            .unwrap();
        assert_eq!(store.revision(), 0);
        store.apply(plan, None).unwrap();

        assert_eq!(contents(&store), "abc");
        assert_eq!(store.revision(), 1);
        assert_eq!(recorder.attached, [(1, 'b')]);
    }

    #[test]
    fn test_evict_reports_conflicts_and_shifts_target() {
        let mut store = store("abcde", DuplicatePolicy::Evict);
        let mut recorder = Recorder::default();
        let plan = store
            .plan(
                SequenceOp::Insert {
                    at: 3,
                    items: vec!['a'],
                },
                Some(&mut recorder),
            )
            .unwrap();
        store.apply(plan, None).unwrap();

        assert_eq!(recorder.conflicts, [0]);
        assert_eq!(recorder.detached, [(0, 'a')]);
        assert_eq!(recorder.attached, [(2, 'a')]);
        assert_eq!(contents(&store), "bcade");
    }

    #[test]
    fn test_set_with_eviction() {
        let mut store = store("abcde", DuplicatePolicy::Evict);
        let mut recorder = Recorder::default();
        let plan = store
            .plan(SequenceOp::Set { at: 2, item: 'a' }, Some(&mut recorder))
            .unwrap();
        store.apply(plan, None).unwrap();

        assert_eq!(recorder.replaced, [(2, 'c', 1, 'a')]);
        assert_eq!(contents(&store), "bade");
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_plain_set_keeps_revision() {
        let mut store = store("abc", DuplicatePolicy::Allow);
        let plan = store.plan(SequenceOp::Set { at: 0, item: 'z' }, None).unwrap();
        store.apply(plan, None).unwrap();
        assert_eq!(contents(&store), "zbc");
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_reject_fails_late() {
        let mut store = store("abc", DuplicatePolicy::Reject);
        let plan = store
            .plan(
                SequenceOp::Insert {
                    at: 0,
                    items: vec!['c'],
                },
                None,
            )
            .unwrap();
        let mut recorder = Recorder::default();
        let error = store.apply(plan, Some(&mut recorder)).unwrap_err();

        assert_eq!(error, StoreError::Duplicate { position: 2 });
        assert_eq!(recorder.failure, Some(error));
        assert_eq!(contents(&store), "abc");
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_stale_plan_is_refused() {
        let mut store = store("abc", DuplicatePolicy::Allow);
        let stale = store
            .plan(SequenceOp::Remove { positions: vec![0] }, None)
            .unwrap();
        let fresh = store
            .plan(SequenceOp::Remove { positions: vec![1] }, None)
            .unwrap();
        store.apply(fresh, None).unwrap();
        assert_eq!(
            store.apply(stale, None),
            Err(StoreError::Revision {
                planned: 0,
                actual: 1
            })
        );
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let store = store("ab", DuplicatePolicy::Allow);
        assert_eq!(
            store
                .plan(SequenceOp::Remove { positions: vec![2] }, None)
                .unwrap_err(),
            StoreError::OutOfBounds { index: 2, len: 2 }
        );
    }
}
