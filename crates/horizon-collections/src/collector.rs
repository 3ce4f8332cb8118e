//! Records what a store reports while planning a mutation.

use std::collections::BTreeSet;

use horizon_collections_core::{MutationHandler, StructuralShift};

/// One change reported by a store, in store coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Change<C, V> {
    Attach {
        at: C,
        value: V,
    },
    Detach {
        at: C,
        value: V,
    },
    Replace {
        detached_at: C,
        old: V,
        attached_at: C,
        new: V,
    },
}

/// Mutation handler handed to `plan`.
#[derive(Debug)]
pub(crate) struct ChangeCollector<C, V> {
    changes: Vec<Change<C, V>>,
    conflicts: BTreeSet<usize>,
}

impl<C, V> Default for ChangeCollector<C, V> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            conflicts: BTreeSet::new(),
        }
    }
}

impl<C, V> ChangeCollector<C, V> {
    /// Positions the store evicts as a side effect.
    pub(crate) fn conflicts(&self) -> &BTreeSet<usize> {
        &self.conflicts
    }

    pub(crate) fn into_changes(self) -> Vec<Change<C, V>> {
        self.changes
    }
}

impl<V> ChangeCollector<usize, V> {
    /// Every store position the mutation removes or inserts.
    ///
    /// Replacements keep their slot and are not part of the shift.
    pub(crate) fn structural_shift(&self) -> StructuralShift {
        let removed = self.changes.iter().filter_map(|change| match change {
            Change::Detach { at, .. } => Some(*at),
            _ => None,
        });
        let inserted = self.changes.iter().filter_map(|change| match change {
            Change::Attach { at, .. } => Some(*at),
            _ => None,
        });
        StructuralShift::new(removed, inserted)
    }
}

impl<C, V: Clone> MutationHandler<C, V> for ChangeCollector<C, V> {
    fn create_attach_argument(&mut self, at: C, value: &V) {
        self.changes.push(Change::Attach {
            at,
            value: value.clone(),
        });
    }

    fn create_detach_argument(&mut self, at: C, value: &V) {
        self.changes.push(Change::Detach {
            at,
            value: value.clone(),
        });
    }

    fn create_replace_argument(&mut self, detached_at: C, old: &V, attached_at: C, new: &V) {
        self.changes.push(Change::Replace {
            detached_at,
            old: old.clone(),
            attached_at,
            new: new.clone(),
        });
    }

    fn set_conflicting_positions(&mut self, positions: &BTreeSet<usize>) {
        self.conflicts.extend(positions.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_ignores_replacements() {
        let mut collector = ChangeCollector::default();
        collector.create_detach_argument(0, &'a');
        collector.create_replace_argument(3, &'d', 2, &'x');
        collector.create_attach_argument(4, &'y');
        collector.set_conflicting_positions(&BTreeSet::from([0]));

        let shift = collector.structural_shift();
        assert_eq!(shift, StructuralShift::new([0], [4]));
        assert_eq!(collector.conflicts(), &BTreeSet::from([0]));
        assert_eq!(collector.into_changes().len(), 3);
    }
}
