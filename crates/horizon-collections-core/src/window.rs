//! Hidden-range windows for sequence views.
//!
//! A sub-list does not copy anything: it hides `head` elements at the front
//! and `tail` elements at the back of the shared store. Its index `i` is the
//! store index `i + head` and its length is `store.len() - head - tail`.
//!
//! When a mutation made through a sub-list also evicts or inserts elements
//! elsewhere in the store, the windows of that sub-list and its ancestors
//! must move so each keeps denoting the same elements. That happens in two
//! steps:
//!
//! 1. [`Window::resolving`] computes the new bounds for the window and its
//!    ancestors without touching them, as a chain of [`PendingRange`]s.
//! 2. [`PendingRange::commit`] writes them once the store applied the
//!    mutation.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::{span_names, targets};

/// Hidden prefix and suffix lengths of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HiddenRange {
    /// Elements hidden before the window.
    pub head: usize,
    /// Elements hidden after the window.
    pub tail: usize,
}

impl HiddenRange {
    /// A range hiding `head` leading and `tail` trailing elements.
    pub fn new(head: usize, tail: usize) -> Self {
        Self { head, tail }
    }

    /// Store index of the view index.
    pub fn translate(&self, index: usize) -> usize {
        index + self.head
    }

    /// Length of the window over a store of `store_len` elements.
    pub fn size(&self, store_len: usize) -> usize {
        store_len.saturating_sub(self.head + self.tail)
    }

    /// Exclusive store index of the window end.
    pub fn end(&self, store_len: usize) -> usize {
        store_len.saturating_sub(self.tail)
    }

    /// Bounds after `shift` was applied to a store of `old_len` elements.
    ///
    /// Removed positions are counted before the mutation, inserted ones
    /// after it. Only windows on the path of the mutation are shifted, so an
    /// insertion at either edge of the window lands inside it.
    pub fn shifted(self, old_len: usize, shift: &StructuralShift) -> Self {
        let old_end = self.end(old_len);
        let mut head = self.head - shift.removed.range(..self.head).count();
        let mut end = old_end - shift.removed.range(..old_end).count();
        for &position in &shift.inserted {
            if position < head {
                head += 1;
                end += 1;
            } else if position <= end {
                end += 1;
            }
        }
        let new_len = old_len - shift.removed.len() + shift.inserted.len();
        Self {
            head,
            tail: new_len - end,
        }
    }
}

/// Positions a mutation added or removed outside the view it went through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralShift {
    removed: BTreeSet<usize>,
    inserted: BTreeSet<usize>,
}

impl StructuralShift {
    /// A shift removing the given store positions.
    pub fn removed(positions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            removed: positions.into_iter().collect(),
            inserted: BTreeSet::new(),
        }
    }

    /// A shift inserting at the given store positions.
    pub fn inserted(positions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            removed: BTreeSet::new(),
            inserted: positions.into_iter().collect(),
        }
    }

    /// A shift removing `removed` (pre-mutation positions) and inserting at
    /// `inserted` (post-mutation positions).
    pub fn new(
        removed: impl IntoIterator<Item = usize>,
        inserted: impl IntoIterator<Item = usize>,
    ) -> Self {
        Self {
            removed: removed.into_iter().collect(),
            inserted: inserted.into_iter().collect(),
        }
    }

    /// Returns true if nothing moves.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }

    /// Removed positions, before the mutation.
    pub fn removed_positions(&self) -> &BTreeSet<usize> {
        &self.removed
    }
}

/// New bounds for one window, computed but not yet committed.
#[derive(Debug)]
pub struct PendingRange {
    window: Arc<Window>,
    range: HiddenRange,
    parent: Option<Arc<PendingRange>>,
}

impl PendingRange {
    /// The bounds the window will have.
    pub fn range(&self) -> HiddenRange {
        self.range
    }

    /// Pending bounds of the parent window; `None` means unchanged.
    pub fn parent(&self) -> Option<&Arc<PendingRange>> {
        self.parent.as_ref()
    }

    /// Write the bounds of this window and every pending ancestor.
    pub fn commit(&self) {
        let mut pending = Some(self);
        while let Some(update) = pending {
            *update.window.range.lock() = update.range;
            pending = update.parent.as_deref();
        }
    }
}

/// The hidden range of one view, linked to its parent's.
#[derive(Debug)]
pub struct Window {
    range: Mutex<HiddenRange>,
    parent: Option<Arc<Window>>,
}

impl Window {
    /// The window of a root collection, hiding nothing.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            range: Mutex::new(HiddenRange::default()),
            parent: None,
        })
    }

    /// A window showing `[from, to)` of `parent`.
    ///
    /// `store_len` is the current length of the shared store; the caller has
    /// checked `from <= to <= parent size`.
    pub fn child(parent: &Arc<Window>, from: usize, to: usize, store_len: usize) -> Arc<Self> {
        let parent_head = parent.range().head;
        Arc::new(Self {
            range: Mutex::new(HiddenRange::new(
                parent_head + from,
                store_len - parent_head - to,
            )),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Current bounds.
    pub fn range(&self) -> HiddenRange {
        *self.range.lock()
    }

    /// Current hidden prefix.
    pub fn head(&self) -> usize {
        self.range.lock().head
    }

    /// The parent window.
    pub fn parent(&self) -> Option<&Arc<Window>> {
        self.parent.as_ref()
    }

    /// Store index of a view index.
    pub fn translate(&self, index: usize) -> usize {
        self.range().translate(index)
    }

    /// Length of the window over a store of `store_len` elements.
    pub fn size(&self, store_len: usize) -> usize {
        self.range().size(store_len)
    }

    /// Compute the bounds this window and its ancestors will have after
    /// `shift`, without changing anything.
    ///
    /// Returns `None` when this window does not move; its ancestors then do
    /// not move either, since they contain it.
    pub fn resolving(
        self: &Arc<Self>,
        old_len: usize,
        shift: &StructuralShift,
    ) -> Option<Arc<PendingRange>> {
        // The root window hides nothing, whatever happens to the store.
        if shift.is_empty() || self.parent.is_none() {
            return None;
        }
        let span = tracing::trace_span!(target: targets::WINDOW, span_names::RESOLVE, old_len);
        let _entered = span.enter();
        self.resolve_chain(old_len, shift)
    }

    fn resolve_chain(
        self: &Arc<Self>,
        old_len: usize,
        shift: &StructuralShift,
    ) -> Option<Arc<PendingRange>> {
        if self.parent.is_none() {
            return None;
        }
        let current = self.range();
        let next = current.shifted(old_len, shift);
        if next == current {
            return None;
        }
        tracing::trace!(
            target: targets::WINDOW,
            head = current.head,
            tail = current.tail,
            new_head = next.head,
            new_tail = next.tail,
            "resolving hidden range"
        );
        let parent = self
            .parent
            .as_ref()
            .and_then(|parent| parent.resolve_chain(old_len, shift));
        Some(Arc::new(PendingRange {
            window: Arc::clone(self),
            range: next,
            parent,
        }))
    }
}

// Ensure windows can be shared with their views
static_assertions::assert_impl_all!(Window: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_window_bounds() {
        let root = Window::root();
        let v1 = Window::child(&root, 1, 4, 5);
        assert_eq!(v1.range(), HiddenRange::new(1, 1));
        assert_eq!(v1.size(5), 3);
        assert_eq!(v1.translate(0), 1);

        let v2 = Window::child(&v1, 0, 2, 5);
        assert_eq!(v2.range(), HiddenRange::new(1, 2));
        assert_eq!(v2.size(5), 2);
    }

    #[test]
    fn test_removal_before_windows_shifts_chain() {
        // [A, B, C, D, E], V1 = [1, 4) = B C D, V2 = V1[0, 2) = B C.
        let root = Window::root();
        let v1 = Window::child(&root, 1, 4, 5);
        let v2 = Window::child(&v1, 0, 2, 5);

        let pending = v2
            .resolving(5, &StructuralShift::removed([0]))
            .expect("v2 moves");
        assert_eq!(pending.range(), HiddenRange::new(0, 2));
        let parent = pending.parent().expect("v1 moves");
        assert_eq!(parent.range(), HiddenRange::new(0, 1));
        assert!(parent.parent().is_none());

        // Nothing is written before commit.
        assert_eq!(v1.range(), HiddenRange::new(1, 1));
        pending.commit();
        assert_eq!(v1.range(), HiddenRange::new(0, 1));
        assert_eq!(v2.range(), HiddenRange::new(0, 2));

        // Store is now [B, C, D, E]: V1 = B C D, V2 = B C.
        assert_eq!(v1.size(4), 3);
        assert_eq!(v2.size(4), 2);
    }

    #[test]
    fn test_insert_before_window_grows_head_transitively() {
        let root = Window::root();
        let mut windows = vec![Window::child(&root, 2, 18, 20)];
        for _ in 0..4 {
            let parent = windows.last().cloned().unwrap();
            let len = parent.size(20);
            windows.push(Window::child(&parent, 1, len - 1, 20));
        }
        let before: Vec<_> = windows.iter().map(|w| w.range()).collect();

        let leaf = windows.last().unwrap();
        let pending = leaf
            .resolving(20, &StructuralShift::inserted([0]))
            .unwrap();
        pending.commit();

        for (window, old) in windows.iter().zip(before) {
            assert_eq!(window.range().head, old.head + 1);
            assert_eq!(window.range().tail, old.tail);
            assert_eq!(window.size(21), old.size(20));
        }
    }

    #[test]
    fn test_insert_at_window_edges_lands_inside() {
        let range = HiddenRange::new(2, 1);
        assert_eq!(
            range.shifted(6, &StructuralShift::inserted([2])),
            HiddenRange::new(2, 1)
        );
        assert_eq!(
            range.shifted(6, &StructuralShift::inserted([5])),
            HiddenRange::new(2, 1)
        );
    }

    #[test]
    fn test_insert_after_window_grows_tail() {
        let range = HiddenRange::new(1, 1);
        let next = range.shifted(5, &StructuralShift::inserted([5]));
        assert_eq!(next, HiddenRange::new(1, 2));
    }

    #[test]
    fn test_eviction_with_insert_inside() {
        // [A, B, C, D, E], window [2, 4) = C D. Evict A, insert at post 2.
        let range = HiddenRange::new(2, 1);
        let shift = StructuralShift::new([0], [2]);
        assert_eq!(range.shifted(5, &shift), HiddenRange::new(1, 1));
    }

    #[test]
    fn test_removal_inside_window_keeps_bounds() {
        let root = Window::root();
        let v1 = Window::child(&root, 1, 4, 5);
        assert!(v1.resolving(5, &StructuralShift::removed([2])).is_none());
        assert!(v1.resolving(5, &StructuralShift::default()).is_none());
    }

    #[test]
    fn test_removal_after_window_shrinks_tail() {
        let range = HiddenRange::new(1, 2);
        assert_eq!(
            range.shifted(6, &StructuralShift::removed([4, 5])),
            HiddenRange::new(1, 0)
        );
    }
}
