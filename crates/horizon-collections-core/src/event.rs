//! Change events and modification descriptors.
//!
//! Every attempted mutation produces one [`ModificationEvent`] per affected
//! element, created before the store is touched. Each event records what the
//! element looked like before ([`Phase::Pre`]) and after ([`Phase::Post`]) the
//! mutation, shares a [`Modification`] descriptor with its siblings, and, when
//! it was bubbled from a child view, links back to that child's event through
//! a [`Cause`].
//!
//! # Key Types
//!
//! - [`ModificationEvent`]: one change seen by one view level
//! - [`Modification`]: why the mutation happens, plus the outcome side-channel
//! - [`Cause`]: the child event a bubbled event was derived from
//! - [`Attributes`]: scoped key/value storage listeners can share
//! - [`ElementEvent`]: the projected, element-only face of an event
//!
//! # Related
//!
//! - [`crate::pipeline`]: creates, bubbles and dispatches events
//! - [`crate::listener`]: the listener traits that receive them

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::error::{ModificationError, StoreError};
use crate::window::PendingRange;

/// Which side of a mutation a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the store is mutated.
    Pre,
    /// After the store is mutated.
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// Shape of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Only a post value exists.
    Attach,
    /// Only a pre value exists.
    Detach,
    /// Both exist, possibly at different coordinates.
    Replace,
}

/// Why a mutation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// A direct call on a collection or view.
    Explicit,
    /// Removal through a cursor.
    IteratorRemove,
    /// A read reordered an access-ordered collection.
    AccessPromotion,
    /// An entry is taken out of its ordered position.
    Suspend,
    /// A suspended entry is put back at its new position.
    Resume,
}

/// The operation a mutation performs, with its view-relative parameters.
///
/// Keyed operations carry no key: the key is on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationKind {
    Insert { index: usize },
    InsertAll { index: usize, count: usize },
    Remove { index: usize },
    RemoveItem,
    RemoveRange { from: usize, to: usize },
    Retain,
    Set { index: usize },
    Clear,
    Put,
    RemoveKey,
    Access,
    PollFirst,
    PollLast,
    Rekey,
}

/// What finally happened to a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The store applied the mutation.
    Applied,
    /// A pre-phase failure stopped the mutation before the store saw it.
    Aborted,
    /// The store refused while applying.
    Rejected(StoreError),
}

/// Immutable description of one mutation attempt.
///
/// The descriptor is shared by every event of the attempt, in both phases.
/// Its only moving part is the outcome side-channel, written once between the
/// phases.
pub struct Modification {
    kind: ModificationKind,
    intent: Intent,
    outcome: OnceLock<Outcome>,
    attributes: Attributes,
}

impl Modification {
    /// Describe an explicit call.
    pub fn new(kind: ModificationKind) -> Arc<Self> {
        Self::with_intent(kind, Intent::Explicit)
    }

    /// Describe a mutation with a specific intent.
    pub fn with_intent(kind: ModificationKind, intent: Intent) -> Arc<Self> {
        Arc::new(Self {
            kind,
            intent,
            outcome: OnceLock::new(),
            attributes: Attributes::default(),
        })
    }

    /// The operation.
    pub fn kind(&self) -> ModificationKind {
        self.kind
    }

    /// Why it happens.
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// The outcome, once the store has been given the mutation.
    ///
    /// `None` during the pre phase.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    /// The late failure reported by the store, if any.
    pub fn failure(&self) -> Option<&StoreError> {
        match self.outcome.get() {
            Some(Outcome::Rejected(error)) => Some(error),
            _ => None,
        }
    }

    /// Returns true once the store has applied the mutation.
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome.get(), Some(Outcome::Applied))
    }

    /// Attributes shared by every event of this attempt.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub(crate) fn settle(&self, outcome: Outcome) {
        // First writer wins; a descriptor shared by several events settles once.
        let _ = self.outcome.set(outcome);
    }
}

impl fmt::Debug for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modification")
            .field("kind", &self.kind)
            .field("intent", &self.intent)
            .field("outcome", &self.outcome.get())
            .finish()
    }
}

/// Describes a view level, for causes, errors and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewInfo {
    /// The collection itself.
    Root,
    /// A positional window, relative to its parent.
    SubList { from: usize, to: usize },
    /// A cursor, with the index it started at.
    Cursor { start: usize },
    /// The keys of a map.
    KeyView,
    /// The values of a map.
    ValueView,
    /// The entries of a map.
    EntryView,
    /// A key-bounded view, with its rendered range.
    SubMap { range: String },
    /// A reversed view.
    Descending,
}

impl fmt::Display for ViewInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::SubList { from, to } => write!(f, "sub-list[{from}, {to})"),
            Self::Cursor { start } => write!(f, "cursor@{start}"),
            Self::KeyView => f.write_str("key-view"),
            Self::ValueView => f.write_str("value-view"),
            Self::EntryView => f.write_str("entry-view"),
            Self::SubMap { range } => write!(f, "sub-map{range}"),
            Self::Descending => f.write_str("descending"),
        }
    }
}

/// Scope of an attribute map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeScope {
    /// This event only.
    Local,
    /// This event and every event bubbled from or to it.
    Chain,
    /// Every event of the same modification.
    Global,
}

/// Named values attached to events.
///
/// Listeners use attributes to hand data from the pre phase to the post
/// phase, or from one level to another.
#[derive(Default)]
pub struct Attributes {
    values: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Attributes {
    /// Store a value, replacing any previous one.
    pub fn set<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.values.lock().insert(name.into(), Arc::new(value));
    }

    /// Read a value of the given type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.values.lock().get(name).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Returns true if a value is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.lock().contains_key(name)
    }

    /// Remove a value. Returns true if one was present.
    pub fn remove(&self, name: &str) -> bool {
        self.values.lock().remove(name).is_some()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.lock();
        f.debug_set().entries(values.keys()).finish()
    }
}

/// Coordinate of an element in a sequence view.
///
/// Positions are stored absolute and rebased onto the window of the view an
/// event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    absolute: usize,
    head: usize,
}

impl Position {
    /// A position in a window starting at absolute `head`.
    pub fn new(absolute: usize, head: usize) -> Self {
        Self { absolute, head }
    }

    /// Index in the store.
    pub fn absolute(&self) -> usize {
        self.absolute
    }

    /// Index relative to the view, or `None` when the element sits before
    /// the view's window (an eviction outside the view).
    pub fn index(&self) -> Option<usize> {
        self.absolute.checked_sub(self.head)
    }

    /// The same element, seen from a window starting at `head`.
    pub fn rebase(self, head: usize) -> Self {
        Self { head, ..self }
    }
}

/// Link from a bubbled event to the event it was derived from.
pub struct Cause<C, V> {
    view: ViewInfo,
    event: Arc<ModificationEvent<C, V>>,
}

impl<C, V> Cause<C, V> {
    /// The child view the event came from.
    pub fn view(&self) -> &ViewInfo {
        &self.view
    }

    /// The child event.
    pub fn event(&self) -> &ModificationEvent<C, V> {
        &self.event
    }
}

impl<C: fmt::Debug, V: fmt::Debug> fmt::Debug for Cause<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cause")
            .field("view", &self.view)
            .field("event", &self.event)
            .finish()
    }
}

#[derive(Default)]
struct ChainState {
    attributes: Attributes,
    pre_failure: OnceLock<ModificationError>,
}

/// One change, as seen by one view level.
///
/// `C` is the coordinate ([`Position`] for sequences, the key for maps) and
/// `V` the value.
pub struct ModificationEvent<C, V> {
    view: ViewInfo,
    change: ChangeKind,
    detached: Option<(C, V)>,
    attached: Option<(C, V)>,
    modification: Arc<Modification>,
    cause: Option<Cause<C, V>>,
    range_shift: Option<Arc<PendingRange>>,
    local: Attributes,
    chain: Arc<ChainState>,
    bubbled: Mutex<Option<Arc<ModificationEvent<C, V>>>>,
    snapshot: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

/// Event of a sequence view.
pub type ListEvent<T> = ModificationEvent<Position, T>;

/// Event of a keyed view.
pub type MapEvent<K, V> = ModificationEvent<K, V>;

impl<C, V> ModificationEvent<C, V> {
    fn build(
        view: ViewInfo,
        modification: Arc<Modification>,
        change: ChangeKind,
        detached: Option<(C, V)>,
        attached: Option<(C, V)>,
    ) -> Self {
        Self {
            view,
            change,
            detached,
            attached,
            modification,
            cause: None,
            range_shift: None,
            local: Attributes::default(),
            chain: Arc::default(),
            bubbled: Mutex::new(None),
            snapshot: Mutex::new(None),
        }
    }

    /// Something is being added at `at`.
    pub fn attach(view: ViewInfo, modification: Arc<Modification>, at: C, value: V) -> Self {
        Self::build(view, modification, ChangeKind::Attach, None, Some((at, value)))
    }

    /// Something is being removed from `at`.
    pub fn detach(view: ViewInfo, modification: Arc<Modification>, at: C, value: V) -> Self {
        Self::build(view, modification, ChangeKind::Detach, Some((at, value)), None)
    }

    /// `detached` is being replaced by `attached`.
    pub fn replace(
        view: ViewInfo,
        modification: Arc<Modification>,
        detached: (C, V),
        attached: (C, V),
    ) -> Self {
        Self::build(
            view,
            modification,
            ChangeKind::Replace,
            Some(detached),
            Some(attached),
        )
    }

    /// Attach the hidden-range updates this mutation will commit.
    pub fn with_range_shift(mut self, shift: Option<Arc<PendingRange>>) -> Self {
        self.range_shift = shift;
        self
    }

    /// The level this event belongs to.
    pub fn view(&self) -> &ViewInfo {
        &self.view
    }

    /// Shape of the change.
    pub fn change(&self) -> ChangeKind {
        self.change
    }

    /// Coordinate and value for a phase.
    ///
    /// The post side is `None` once the mutation was aborted or rejected.
    pub fn entry(&self, phase: Phase) -> Option<&(C, V)> {
        match phase {
            Phase::Pre => self.detached.as_ref(),
            Phase::Post => match self.modification.outcome() {
                None | Some(Outcome::Applied) => self.attached.as_ref(),
                Some(Outcome::Aborted | Outcome::Rejected(_)) => None,
            },
        }
    }

    /// Coordinate for a phase.
    pub fn coordinate(&self, phase: Phase) -> Option<&C> {
        self.entry(phase).map(|(at, _)| at)
    }

    /// Key for a phase, for keyed events.
    pub fn key(&self, phase: Phase) -> Option<&C> {
        self.coordinate(phase)
    }

    /// Value for a phase.
    pub fn value(&self, phase: Phase) -> Option<&V> {
        self.entry(phase).map(|(_, value)| value)
    }

    /// The descriptor, for the event the mutation started from.
    ///
    /// Bubbled events return `None`; use
    /// [`final_modification`](Self::final_modification).
    pub fn modification(&self) -> Option<&Modification> {
        match self.cause {
            None => Some(self.modification.as_ref()),
            Some(_) => None,
        }
    }

    /// The descriptor of the originating event at the end of the cause chain.
    pub fn final_modification(&self) -> &Modification {
        let mut event = self;
        while let Some(cause) = &event.cause {
            event = cause.event.as_ref();
        }
        event.modification.as_ref()
    }

    pub(crate) fn modification_handle(&self) -> &Arc<Modification> {
        &self.modification
    }

    /// The child event this one was bubbled from.
    pub fn cause(&self) -> Option<&Cause<C, V>> {
        self.cause.as_ref()
    }

    /// Returns true if this event was bubbled from a child view.
    pub fn is_bubbled(&self) -> bool {
        self.cause.is_some()
    }

    /// Number of bubbling steps between this event and the originating one.
    pub fn cause_depth(&self) -> usize {
        let mut depth = 0;
        let mut cause = self.cause.as_ref();
        while let Some(link) = cause {
            depth += 1;
            cause = link.event.cause.as_ref();
        }
        depth
    }

    /// Views the change travelled through, originating view first.
    pub fn path(&self) -> Vec<ViewInfo> {
        let mut path = vec![self.view.clone()];
        let mut cause = self.cause.as_ref();
        while let Some(link) = cause {
            path.push(link.view.clone());
            cause = link.event.cause.as_ref();
        }
        path.reverse();
        path
    }

    /// Attribute map for a scope.
    pub fn attributes(&self, scope: AttributeScope) -> &Attributes {
        match scope {
            AttributeScope::Local => &self.local,
            AttributeScope::Chain => &self.chain.attributes,
            AttributeScope::Global => self.modification.attributes(),
        }
    }

    /// The first pre-phase failure raised anywhere along this event's chain.
    pub fn pre_failure(&self) -> Option<&ModificationError> {
        self.chain.pre_failure.get()
    }

    /// Pending hidden-range updates for the window this event is relative to.
    pub fn range_shift(&self) -> Option<&Arc<PendingRange>> {
        self.range_shift.as_ref()
    }

    pub(crate) fn record_pre_failure(&self, error: &ModificationError) {
        let _ = self.chain.pre_failure.set(error.clone());
    }

    pub(crate) fn set_bubbled(&self, event: Arc<ModificationEvent<C, V>>) {
        *self.bubbled.lock() = Some(event);
    }

    pub(crate) fn take_bubbled(&self) -> Option<Arc<ModificationEvent<C, V>>> {
        self.bubbled.lock().take()
    }

    pub(crate) fn stash_snapshot(&self, snapshot: Arc<dyn Any + Send + Sync>) {
        *self.snapshot.lock() = Some(snapshot);
    }

    pub(crate) fn take_snapshot<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let snapshot = self.snapshot.lock().take()?;
        snapshot.downcast::<T>().ok()
    }
}

impl<C, V: Clone> ModificationEvent<C, V> {
    /// Re-express this event for a parent level.
    ///
    /// `child` describes the level this event belongs to; it becomes the
    /// view of the new event's [`Cause`].
    pub(crate) fn bubble(
        self: &Arc<Self>,
        parent_view: ViewInfo,
        child: ViewInfo,
        translate: impl Fn(&C, Phase) -> C,
        range_shift: Option<Arc<PendingRange>>,
    ) -> Self {
        let translate_side = |side: &Option<(C, V)>, phase: Phase| {
            side.as_ref()
                .map(|(at, value)| (translate(at, phase), value.clone()))
        };
        Self {
            view: parent_view,
            change: self.change,
            detached: translate_side(&self.detached, Phase::Pre),
            attached: translate_side(&self.attached, Phase::Post),
            modification: Arc::clone(&self.modification),
            cause: Some(Cause {
                view: child,
                event: Arc::clone(self),
            }),
            range_shift,
            local: Attributes::default(),
            chain: Arc::clone(&self.chain),
            bubbled: Mutex::new(None),
            snapshot: Mutex::new(None),
        }
    }
}

impl<T> ModificationEvent<Position, T> {
    /// View-relative index for a phase.
    pub fn index(&self, phase: Phase) -> Option<usize> {
        self.coordinate(phase).and_then(Position::index)
    }

    /// Store index for a phase.
    pub fn absolute_index(&self, phase: Phase) -> Option<usize> {
        self.coordinate(phase).map(Position::absolute)
    }

    /// Element for a phase.
    pub fn element(&self, phase: Phase) -> Option<&T> {
        self.value(phase)
    }
}

impl<C: fmt::Debug, V: fmt::Debug> fmt::Debug for ModificationEvent<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModificationEvent")
            .field("view", &self.view)
            .field("change", &self.change)
            .field("detached", &self.detached)
            .field("attached", &self.attached)
            .field("modification", &self.modification)
            .field("cause_depth", &self.cause_depth())
            .finish()
    }
}

/// The element-only face of an event, as seen by element listeners.
///
/// What "element" means depends on the view: the item of a list, the key of
/// a key view, the value of a value view, the `(key, value)` pair of an
/// entry view.
pub trait ElementEvent<E> {
    /// Element for a phase.
    fn element(&self, phase: Phase) -> Option<&E>;

    /// Shape of the change.
    fn change(&self) -> ChangeKind;

    /// The level the event belongs to.
    fn view(&self) -> &ViewInfo;

    /// The descriptor of the originating event.
    fn final_modification(&self) -> &Modification;

    /// Returns true if the event was bubbled from a child view.
    fn is_bubbled(&self) -> bool;

    /// Number of bubbling steps from the originating event.
    fn cause_depth(&self) -> usize;

    /// Attribute map for a scope.
    fn attributes(&self, scope: AttributeScope) -> &Attributes;

    /// The first pre-phase failure along the chain.
    fn pre_failure(&self) -> Option<&ModificationError>;
}

// Ensure events can cross threads with their cause chain
static_assertions::assert_impl_all!(ModificationEvent<Position, String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn event(change: ChangeKind) -> Arc<ModificationEvent<&'static str, i32>> {
        let modification = Modification::new(ModificationKind::Put);
        let event = match change {
            ChangeKind::Attach => ModificationEvent::attach(ViewInfo::Root, modification, "a", 1),
            ChangeKind::Detach => ModificationEvent::detach(ViewInfo::Root, modification, "a", 1),
            ChangeKind::Replace => {
                ModificationEvent::replace(ViewInfo::Root, modification, ("a", 1), ("b", 2))
            }
        };
        Arc::new(event)
    }

    #[test]
    fn test_attach_has_only_post() {
        let event = event(ChangeKind::Attach);
        assert_eq!(event.key(Phase::Pre), None);
        assert_eq!(event.key(Phase::Post), Some(&"a"));
        assert_eq!(event.value(Phase::Post), Some(&1));
    }

    #[test]
    fn test_post_is_noop_after_rejection() {
        let event = event(ChangeKind::Replace);
        assert_eq!(event.value(Phase::Post), Some(&2));
        event
            .modification_handle()
            .settle(Outcome::Rejected(StoreError::ConflictingKey));
        assert_eq!(event.value(Phase::Post), None);
        assert_eq!(event.value(Phase::Pre), Some(&1));
        assert_eq!(
            event.final_modification().failure(),
            Some(&StoreError::ConflictingKey)
        );
    }

    #[test]
    fn test_outcome_settles_once() {
        let modification = Modification::new(ModificationKind::Clear);
        assert!(modification.outcome().is_none());
        modification.settle(Outcome::Applied);
        modification.settle(Outcome::Aborted);
        assert!(modification.is_applied());
    }

    #[test]
    fn test_bubble_links_cause_and_shares_chain() {
        let leaf = event(ChangeKind::Detach);
        leaf.attributes(AttributeScope::Chain).set("seen", 7u8);
        leaf.attributes(AttributeScope::Local).set("local", true);

        let parent = Arc::new(leaf.bubble(
            ViewInfo::Root,
            ViewInfo::KeyView,
            |key, _| *key,
            None,
        ));

        assert!(parent.is_bubbled());
        assert!(parent.modification().is_none());
        assert_eq!(parent.final_modification().kind(), ModificationKind::Put);
        assert_eq!(parent.cause_depth(), 1);
        assert_eq!(parent.cause().map(Cause::view), Some(&ViewInfo::KeyView));
        assert_eq!(
            parent.attributes(AttributeScope::Chain).get::<u8>("seen").as_deref(),
            Some(&7)
        );
        assert!(!parent.attributes(AttributeScope::Local).contains("local"));
        assert_eq!(parent.path(), vec![ViewInfo::KeyView, ViewInfo::Root]);
    }

    #[test]
    fn test_position_index() {
        let position = Position::new(5, 2);
        assert_eq!(position.index(), Some(3));
        assert_eq!(position.rebase(6).index(), None);
        assert_eq!(position.rebase(0).absolute(), 5);
    }

    #[test]
    fn test_attributes_typed_access() {
        let attributes = Attributes::default();
        attributes.set("count", 3usize);
        assert_eq!(attributes.get::<usize>("count").as_deref(), Some(&3));
        assert!(attributes.get::<i32>("count").is_none());
        assert!(attributes.remove("count"));
        assert!(!attributes.contains("count"));
    }

    #[test]
    fn test_view_info_display() {
        assert_eq!(ViewInfo::SubList { from: 1, to: 4 }.to_string(), "sub-list[1, 4)");
        assert_eq!(
            ViewInfo::SubMap {
                range: "[a, c)".into()
            }
            .to_string(),
            "sub-map[a, c)"
        );
    }
}
