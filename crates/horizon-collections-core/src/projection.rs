//! How a view level sees events.
//!
//! Every level of a view tree is the same [`Notifier`](crate::pipeline::Notifier)
//! parameterized by a [`Projection`]. The projection decides three things:
//!
//! - which part of an event element listeners receive ([`Projection::element`]);
//! - how a coordinate is re-expressed for the parent level when an event
//!   bubbles ([`Projection::to_parent`]);
//! - which structural operations the view permits ([`ViewOperations`]).
//!
//! # Provided projections
//!
//! | Projection  | Element  | Bubbling                      | Used by                  |
//! |-------------|----------|-------------------------------|--------------------------|
//! | [`ByValue`] | value    | coordinate unchanged          | maps, cursors, sub-maps  |
//! | [`ByKey`]   | key      | key unchanged                 | key views, sets          |
//! | [`ByEntry`] | `(k, v)` | key unchanged                 | entry views              |
//! | [`SubRange`]| value    | position rebased onto parent  | lists, sub-lists         |

use std::fmt;
use std::sync::Arc;

use crate::error::{ModificationError, UnsupportedViewOperationError};
use crate::event::{
    AttributeScope, Attributes, ChangeKind, ElementEvent, Modification, ModificationEvent, Phase,
    Position, ViewInfo,
};
use crate::window::{PendingRange, Window};

/// A structural operation a view may refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewOperation {
    /// Adding elements.
    Insert,
    /// Removing elements.
    Remove,
    /// Replacing an element in place.
    Replace,
}

impl ViewOperation {
    /// Name used in errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Remove => "remove",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for ViewOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The structural operations a view permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewOperations {
    /// Adding elements is allowed.
    pub insert: bool,
    /// Removing elements is allowed.
    pub remove: bool,
    /// Replacing elements in place is allowed.
    pub replace: bool,
}

impl ViewOperations {
    /// Everything is allowed.
    pub const ALL: Self = Self {
        insert: true,
        remove: true,
        replace: true,
    };

    /// Only removal; key views.
    pub const REMOVE_ONLY: Self = Self {
        insert: false,
        remove: true,
        replace: false,
    };

    /// Removal and pass-through replacement; value and entry views.
    pub const REMOVE_AND_REPLACE: Self = Self {
        insert: false,
        remove: true,
        replace: true,
    };

    /// Returns true if `operation` is allowed.
    pub fn allows(&self, operation: ViewOperation) -> bool {
        match operation {
            ViewOperation::Insert => self.insert,
            ViewOperation::Remove => self.remove,
            ViewOperation::Replace => self.replace,
        }
    }

    /// Fail unless `operation` is allowed on `view`.
    pub fn check(
        &self,
        view: &ViewInfo,
        operation: ViewOperation,
    ) -> Result<(), UnsupportedViewOperationError> {
        if self.allows(operation) {
            return Ok(());
        }
        Err(UnsupportedViewOperationError {
            view: view.clone(),
            operation: operation.name(),
        })
    }
}

impl Default for ViewOperations {
    fn default() -> Self {
        Self::ALL
    }
}

/// Element projection, bubble translation and operation mask of a level.
pub trait Projection<C, V>: Send + Sync + 'static {
    /// What element listeners of the level receive.
    type Element: 'static;

    /// The element of `event` for `phase`.
    fn element<'e>(
        &self,
        event: &'e ModificationEvent<C, V>,
        phase: Phase,
    ) -> Option<&'e Self::Element>;

    /// Re-express a coordinate of `event` for the parent level.
    fn to_parent(&self, coordinate: &C, phase: Phase, event: &ModificationEvent<C, V>) -> C;

    /// Pending hidden-range updates of the parent level.
    fn parent_shift(&self, event: &ModificationEvent<C, V>) -> Option<Arc<PendingRange>> {
        event.range_shift().cloned()
    }

    /// Operations the level permits.
    fn operations(&self) -> ViewOperations {
        ViewOperations::ALL
    }
}

/// Elements are the values; coordinates bubble unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByValue {
    operations: ViewOperations,
}

impl ByValue {
    /// A value projection permitting everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A value projection with a restricted operation set.
    pub fn restricted(operations: ViewOperations) -> Self {
        Self { operations }
    }
}

impl<C: Clone + 'static, V: 'static> Projection<C, V> for ByValue {
    type Element = V;

    fn element<'e>(&self, event: &'e ModificationEvent<C, V>, phase: Phase) -> Option<&'e V> {
        event.value(phase)
    }

    fn to_parent(&self, coordinate: &C, _phase: Phase, _event: &ModificationEvent<C, V>) -> C {
        coordinate.clone()
    }

    fn operations(&self) -> ViewOperations {
        self.operations
    }
}

/// Elements are the keys; keys bubble unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByKey {
    operations: ViewOperations,
}

impl ByKey {
    /// A key projection permitting only removal.
    pub fn new() -> Self {
        Self {
            operations: ViewOperations::REMOVE_ONLY,
        }
    }

    /// A key projection with an explicit operation set.
    pub fn with_operations(operations: ViewOperations) -> Self {
        Self { operations }
    }
}

impl Default for ByKey {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + 'static, V: 'static> Projection<K, V> for ByKey {
    type Element = K;

    fn element<'e>(&self, event: &'e ModificationEvent<K, V>, phase: Phase) -> Option<&'e K> {
        event.key(phase)
    }

    fn to_parent(&self, key: &K, _phase: Phase, _event: &ModificationEvent<K, V>) -> K {
        key.clone()
    }

    fn operations(&self) -> ViewOperations {
        self.operations
    }
}

/// Elements are `(key, value)` pairs; keys bubble unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByEntry {
    operations: ViewOperations,
}

impl ByEntry {
    /// An entry projection permitting removal and replacement.
    pub fn new() -> Self {
        Self {
            operations: ViewOperations::REMOVE_AND_REPLACE,
        }
    }
}

impl Default for ByEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + 'static, V: 'static> Projection<K, V> for ByEntry {
    type Element = (K, V);

    fn element<'e>(&self, event: &'e ModificationEvent<K, V>, phase: Phase) -> Option<&'e (K, V)> {
        event.entry(phase)
    }

    fn to_parent(&self, key: &K, _phase: Phase, _event: &ModificationEvent<K, V>) -> K {
        key.clone()
    }

    fn operations(&self) -> ViewOperations {
        self.operations
    }
}

/// A positional window over its parent.
///
/// Positions are rebased from this window's head onto the parent's: the
/// current head for the pre side, the head the parent will have once the
/// mutation is committed for the post side. A root list has no parent window
/// and never bubbles.
#[derive(Debug, Clone)]
pub struct SubRange {
    parent: Option<Arc<Window>>,
}

impl SubRange {
    /// The projection of a root list.
    pub fn root() -> Self {
        Self { parent: None }
    }

    /// A sub-range whose parent level uses `parent`.
    pub fn new(parent: Arc<Window>) -> Self {
        Self {
            parent: Some(parent),
        }
    }
}

impl<T: 'static> Projection<Position, T> for SubRange {
    type Element = T;

    fn element<'e>(
        &self,
        event: &'e ModificationEvent<Position, T>,
        phase: Phase,
    ) -> Option<&'e T> {
        event.value(phase)
    }

    fn to_parent(
        &self,
        position: &Position,
        phase: Phase,
        event: &ModificationEvent<Position, T>,
    ) -> Position {
        let Some(parent) = &self.parent else {
            return *position;
        };
        let head = match phase {
            Phase::Pre => parent.head(),
            Phase::Post => event
                .range_shift()
                .and_then(|own| own.parent())
                .map_or_else(|| parent.head(), |pending| pending.range().head),
        };
        position.rebase(head)
    }

    fn parent_shift(&self, event: &ModificationEvent<Position, T>) -> Option<Arc<PendingRange>> {
        event.range_shift().and_then(|own| own.parent().cloned())
    }
}

/// An event seen through a projection, as handed to element listeners.
pub struct Projected<'a, C, V, P> {
    event: &'a ModificationEvent<C, V>,
    projection: &'a P,
}

impl<'a, C, V, P> Projected<'a, C, V, P> {
    /// Wrap `event` for the level using `projection`.
    pub fn new(event: &'a ModificationEvent<C, V>, projection: &'a P) -> Self {
        Self { event, projection }
    }
}

impl<C, V, P: Projection<C, V>> ElementEvent<P::Element> for Projected<'_, C, V, P> {
    fn element(&self, phase: Phase) -> Option<&P::Element> {
        self.projection.element(self.event, phase)
    }

    fn change(&self) -> ChangeKind {
        self.event.change()
    }

    fn view(&self) -> &ViewInfo {
        self.event.view()
    }

    fn final_modification(&self) -> &Modification {
        self.event.final_modification()
    }

    fn is_bubbled(&self) -> bool {
        self.event.is_bubbled()
    }

    fn cause_depth(&self) -> usize {
        self.event.cause_depth()
    }

    fn attributes(&self, scope: AttributeScope) -> &Attributes {
        self.event.attributes(scope)
    }

    fn pre_failure(&self) -> Option<&ModificationError> {
        self.event.pre_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ModificationKind;
    use crate::window::StructuralShift;

    #[test]
    fn test_operation_check() {
        let ops = ViewOperations::REMOVE_ONLY;
        assert!(ops.check(&ViewInfo::KeyView, ViewOperation::Remove).is_ok());
        let error = ops
            .check(&ViewInfo::KeyView, ViewOperation::Insert)
            .unwrap_err();
        assert_eq!(error.to_string(), "insert is not supported by key-view");
        assert!(ViewOperations::REMOVE_AND_REPLACE.allows(ViewOperation::Replace));
    }

    #[test]
    fn test_key_and_entry_elements() {
        let event = ModificationEvent::replace(
            ViewInfo::Root,
            Modification::new(ModificationKind::Put),
            ("k", 1),
            ("k", 2),
        );
        assert_eq!(ByKey::new().element(&event, Phase::Pre), Some(&"k"));
        assert_eq!(ByEntry::new().element(&event, Phase::Post), Some(&("k", 2)));
        assert_eq!(ByValue::new().element(&event, Phase::Post), Some(&2));
    }

    #[test]
    fn test_sub_range_rebases_onto_pending_parent_head() {
        // [A, B, C, D, E], V1 = [1, 4), V2 = V1[1, 3) = C D.
        let root = Window::root();
        let v1 = Window::child(&root, 1, 4, 5);
        let v2 = Window::child(&v1, 1, 3, 5);

        // Evicting absolute 0 moves both heads down by one.
        let shift = v2.resolving(5, &StructuralShift::removed([0]));
        let event = ModificationEvent::replace(
            ViewInfo::SubList { from: 1, to: 3 },
            Modification::new(ModificationKind::Set { index: 0 }),
            (Position::new(2, 2), 'C'),
            (Position::new(1, 1), 'X'),
        )
        .with_range_shift(shift);

        let projection = SubRange::new(Arc::clone(&v1));
        let pre = projection.to_parent(&Position::new(2, 2), Phase::Pre, &event);
        assert_eq!(pre.index(), Some(1));
        let post = projection.to_parent(&Position::new(1, 1), Phase::Post, &event);
        assert_eq!(post.index(), Some(1));
        assert!(Projection::<Position, char>::parent_shift(&projection, &event).is_some());
    }
}
