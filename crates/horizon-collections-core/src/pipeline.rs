//! The two-phase notification pipeline.
//!
//! Each view level is a [`Notifier`]: a projection, optional pre and post
//! hooks, two listener chains, and a link to the parent level. An event runs
//! through a level in three steps:
//!
//! | Phase | Step 1 | Step 2             | Step 3 |
//! |-------|--------|--------------------|--------|
//! | pre   | hook   | listener dispatch  | bubble |
//! | post  | bubble | listener dispatch  | hook   |
//!
//! Bubbling derives a translated event for the parent and runs the parent's
//! whole phase, so the pre phase reaches the root last and the post phase
//! reaches it first.
//!
//! All three steps of a level always run; the first failure is the level's
//! failure ([`run_all_keep_first_error`]). Inside the dispatch step every
//! listener runs, element listeners first in the pre phase and last in the
//! post phase.
//!
//! [`run_mutation`] drives one attempt: pre phase, store, post phase.
//!
//! # Threading
//!
//! Hooks and listeners are called with no lock held. The listener chains a
//! level dispatched to in the pre phase are reused for its post phase.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{
    BoxError, CollectionError, ListenerResult, ModificationError, Result, StoreError,
};
use crate::event::{ModificationEvent, Outcome, Phase, ViewInfo};
use crate::listener::{ElementListener, ListenerChain, ModificationListener};
use crate::logging::{ChainDisplay, span_names, targets};
use crate::projection::{Projected, Projection, ViewOperations};
use crate::store::MutationHandler;

/// Run three steps unconditionally and keep the first failure.
pub fn run_all_keep_first_error<E>(
    first: impl FnOnce() -> std::result::Result<(), E>,
    second: impl FnOnce() -> std::result::Result<(), E>,
    third: impl FnOnce() -> std::result::Result<(), E>,
) -> std::result::Result<(), E> {
    let first = first();
    let second = second();
    let third = third();
    first.and(second).and(third)
}

/// One level of a view tree, as seen by its children.
pub trait Level<C, V>: Send + Sync {
    /// Description of the level.
    fn view_info(&self) -> ViewInfo;

    /// Run the pre phase of this level and its ancestors.
    fn execute_pre(
        &self,
        event: &Arc<ModificationEvent<C, V>>,
    ) -> std::result::Result<(), ModificationError>;

    /// Run the post phase of this level and its ancestors.
    fn execute_post(
        &self,
        event: &Arc<ModificationEvent<C, V>>,
    ) -> std::result::Result<(), ModificationError>;
}

/// Local callback run before dispatch in the pre phase, or after it in the
/// post phase.
pub type Hook<C, V> = Arc<dyn Fn(&ModificationEvent<C, V>) -> ListenerResult + Send + Sync>;

struct Hooks<C, V> {
    pre: Option<Hook<C, V>>,
    post: Option<Hook<C, V>>,
}

impl<C, V> Default for Hooks<C, V> {
    fn default() -> Self {
        Self {
            pre: None,
            post: None,
        }
    }
}

struct Snapshot<C, V, E> {
    elements: ListenerChain<dyn ElementListener<E>>,
    listeners: ListenerChain<dyn ModificationListener<C, V>>,
}

/// Hook, listeners and bubbling of one view level.
pub struct Notifier<C, V, P: Projection<C, V>> {
    info: ViewInfo,
    projection: P,
    parent: Option<Arc<dyn Level<C, V>>>,
    element_listeners: RwLock<ListenerChain<dyn ElementListener<P::Element>>>,
    listeners: RwLock<ListenerChain<dyn ModificationListener<C, V>>>,
    hooks: RwLock<Hooks<C, V>>,
}

impl<C, V, P> Notifier<C, V, P>
where
    C: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    P: Projection<C, V>,
    P::Element: 'static,
{
    /// Create a level. `parent` is `None` for the root.
    pub fn new(info: ViewInfo, projection: P, parent: Option<Arc<dyn Level<C, V>>>) -> Self {
        Self {
            info,
            projection,
            parent,
            element_listeners: RwLock::new(ListenerChain::new()),
            listeners: RwLock::new(ListenerChain::new()),
            hooks: RwLock::new(Hooks::default()),
        }
    }

    /// Description of the level.
    pub fn info(&self) -> &ViewInfo {
        &self.info
    }

    /// The level's projection.
    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Operations the level permits.
    pub fn operations(&self) -> ViewOperations {
        self.projection.operations()
    }

    /// Register an element listener.
    pub fn add_element_listener(&self, listener: Arc<dyn ElementListener<P::Element>>) {
        let mut chain = self.element_listeners.write();
        *chain = chain.with(listener);
    }

    /// Remove the first registration of an element listener.
    ///
    /// Returns true if it was registered.
    pub fn remove_element_listener(
        &self,
        listener: &Arc<dyn ElementListener<P::Element>>,
    ) -> bool {
        let mut chain = self.element_listeners.write();
        let next = chain.without(listener);
        let removed = next.len() < chain.len();
        *chain = next;
        removed
    }

    /// Register a modification listener.
    pub fn add_listener(&self, listener: Arc<dyn ModificationListener<C, V>>) {
        let mut chain = self.listeners.write();
        *chain = chain.with(listener);
    }

    /// Remove the first registration of a modification listener.
    ///
    /// Returns true if it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn ModificationListener<C, V>>) -> bool {
        let mut chain = self.listeners.write();
        let next = chain.without(listener);
        let removed = next.len() < chain.len();
        *chain = next;
        removed
    }

    /// Current element listeners.
    pub fn element_listeners(&self) -> ListenerChain<dyn ElementListener<P::Element>> {
        self.element_listeners.read().clone()
    }

    /// Current modification listeners.
    pub fn listeners(&self) -> ListenerChain<dyn ModificationListener<C, V>> {
        self.listeners.read().clone()
    }

    /// Install the pre-phase hook, replacing any previous one.
    pub fn set_pre_hook(
        &self,
        hook: impl Fn(&ModificationEvent<C, V>) -> ListenerResult + Send + Sync + 'static,
    ) {
        self.hooks.write().pre = Some(Arc::new(hook));
    }

    /// Install the post-phase hook, replacing any previous one.
    pub fn set_post_hook(
        &self,
        hook: impl Fn(&ModificationEvent<C, V>) -> ListenerResult + Send + Sync + 'static,
    ) {
        self.hooks.write().post = Some(Arc::new(hook));
    }

    /// Remove both hooks.
    pub fn clear_hooks(&self) {
        *self.hooks.write() = Hooks::default();
    }

    fn snapshot(&self) -> Snapshot<C, V, P::Element> {
        Snapshot {
            elements: self.element_listeners.read().clone(),
            listeners: self.listeners.read().clone(),
        }
    }

    fn raised(
        &self,
        phase: Phase,
        event: &ModificationEvent<C, V>,
        error: BoxError,
    ) -> ModificationError {
        let error = ModificationError::new(phase, self.info.clone(), error);
        if phase == Phase::Pre {
            event.record_pre_failure(&error);
        }
        error
    }

    fn run_hook(
        &self,
        phase: Phase,
        event: &ModificationEvent<C, V>,
    ) -> std::result::Result<(), ModificationError> {
        let hook = {
            let hooks = self.hooks.read();
            match phase {
                Phase::Pre => hooks.pre.clone(),
                Phase::Post => hooks.post.clone(),
            }
        };
        match hook {
            Some(hook) => hook(event).map_err(|error| self.raised(phase, event, error)),
            None => Ok(()),
        }
    }

    fn dispatch(
        &self,
        phase: Phase,
        snapshot: &Snapshot<C, V, P::Element>,
        event: &ModificationEvent<C, V>,
    ) -> std::result::Result<(), ModificationError> {
        let projected = Projected::new(event, &self.projection);
        let mut first: Option<BoxError> = None;
        let mut keep = |result: ListenerResult| {
            if let Err(error) = result {
                tracing::trace!(
                    target: targets::LISTENER,
                    view = %self.info,
                    ?phase,
                    error = %error,
                    "listener failed"
                );
                first.get_or_insert(error);
            }
        };
        match phase {
            Phase::Pre => {
                for listener in snapshot.elements.iter() {
                    keep(listener.modifying(&projected));
                }
                for listener in snapshot.listeners.iter() {
                    keep(listener.modifying(event));
                }
            }
            Phase::Post => {
                for listener in snapshot.listeners.iter() {
                    keep(listener.modified(event));
                }
                for listener in snapshot.elements.iter() {
                    keep(listener.modified(&projected));
                }
            }
        }
        match first {
            Some(error) => Err(self.raised(phase, event, error)),
            None => Ok(()),
        }
    }

    fn bubble_pre(
        &self,
        event: &Arc<ModificationEvent<C, V>>,
    ) -> std::result::Result<(), ModificationError> {
        let Some(parent) = &self.parent else {
            return Ok(());
        };
        let bubbled = Arc::new(event.bubble(
            parent.view_info(),
            self.info.clone(),
            |coordinate, phase| self.projection.to_parent(coordinate, phase, event),
            self.projection.parent_shift(event),
        ));
        event.set_bubbled(Arc::clone(&bubbled));
        parent.execute_pre(&bubbled)
    }

    fn bubble_post(
        &self,
        event: &ModificationEvent<C, V>,
    ) -> std::result::Result<(), ModificationError> {
        // Taking the parent event drops the child -> parent link, so the
        // parent's cause is the only remaining reference between them.
        match (&self.parent, event.take_bubbled()) {
            (Some(parent), Some(bubbled)) => parent.execute_post(&bubbled),
            _ => Ok(()),
        }
    }

    fn log_failure(&self, event: &ModificationEvent<C, V>, error: &ModificationError) {
        tracing::debug!(
            target: targets::PIPELINE,
            view = %self.info,
            path = %ChainDisplay(&event.path()),
            error = %error,
            "level failed"
        );
    }
}

impl<C, V, P> Level<C, V> for Notifier<C, V, P>
where
    C: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    P: Projection<C, V>,
    P::Element: 'static,
{
    fn view_info(&self) -> ViewInfo {
        self.info.clone()
    }

    fn execute_pre(
        &self,
        event: &Arc<ModificationEvent<C, V>>,
    ) -> std::result::Result<(), ModificationError> {
        let span = tracing::trace_span!(
            target: targets::PIPELINE,
            span_names::PRE_PHASE,
            view = %self.info
        );
        let _entered = span.enter();

        let snapshot = Arc::new(self.snapshot());
        event.stash_snapshot(snapshot.clone());
        let result = run_all_keep_first_error(
            || self.run_hook(Phase::Pre, event),
            || self.dispatch(Phase::Pre, &snapshot, event),
            || self.bubble_pre(event),
        );
        if let Err(error) = &result {
            self.log_failure(event, error);
        }
        result
    }

    fn execute_post(
        &self,
        event: &Arc<ModificationEvent<C, V>>,
    ) -> std::result::Result<(), ModificationError> {
        let span = tracing::trace_span!(
            target: targets::PIPELINE,
            span_names::POST_PHASE,
            view = %self.info
        );
        let _entered = span.enter();

        let snapshot = event
            .take_snapshot::<Snapshot<C, V, P::Element>>()
            .unwrap_or_else(|| Arc::new(self.snapshot()));
        let result = run_all_keep_first_error(
            || self.bubble_post(event),
            || self.dispatch(Phase::Post, &snapshot, event),
            || self.run_hook(Phase::Post, event),
        );
        if let Err(error) = &result {
            self.log_failure(event, error);
        }
        result
    }
}

/// Mutation handler handed to `apply`; keeps the store's late failure.
#[derive(Debug, Default)]
pub struct LateFailureSink {
    failure: Option<StoreError>,
}

impl LateFailureSink {
    /// The failure reported by the store, if any.
    pub fn failure(&self) -> Option<&StoreError> {
        self.failure.as_ref()
    }
}

impl<X, Y> MutationHandler<X, Y> for LateFailureSink {
    fn create_attach_argument(&mut self, _at: X, _value: &Y) {}

    fn create_detach_argument(&mut self, _at: X, _value: &Y) {}

    fn create_replace_argument(&mut self, _detached_at: X, _old: &Y, _attached_at: X, _new: &Y) {}

    fn set_late_failure(&mut self, failure: &StoreError) {
        self.failure.get_or_insert_with(|| failure.clone());
    }
}

/// Drive one mutation attempt through `level`.
///
/// 1. The pre phase runs for every event.
/// 2. Unless it failed, `apply` gives the mutation to the store.
/// 3. Every event's descriptor is settled; if the store applied the mutation,
///    `on_applied` runs (commit windows, resync guards).
/// 4. The post phase runs for every event, whatever happened before.
///
/// The first pre-phase failure is returned as
/// [`CollectionError::PreModification`]; a late store failure is returned
/// the same way, with the [`StoreError`] as its cause. Otherwise the first
/// post-phase failure is returned as [`CollectionError::PostModification`].
///
/// The caller keeps the store cell frozen for the whole call.
pub fn run_mutation<C, V>(
    level: &dyn Level<C, V>,
    events: &[Arc<ModificationEvent<C, V>>],
    apply: impl FnOnce(&mut LateFailureSink) -> std::result::Result<(), StoreError>,
    on_applied: impl FnOnce(),
) -> Result<()> {
    let span = tracing::trace_span!(
        target: targets::PIPELINE,
        span_names::MUTATION,
        view = %level.view_info(),
        events = events.len()
    );
    let _entered = span.enter();
    tracing::trace!(target: targets::PIPELINE, "mutation attempt");

    let mut pre_failure = None;
    for event in events {
        if let Err(error) = level.execute_pre(event) {
            pre_failure.get_or_insert(error);
        }
    }

    let outcome = if pre_failure.is_some() {
        Outcome::Aborted
    } else {
        let mut sink = LateFailureSink::default();
        match apply(&mut sink) {
            Ok(()) => Outcome::Applied,
            Err(error) => {
                let error = sink.failure.take().unwrap_or(error);
                tracing::warn!(
                    target: targets::STORE,
                    view = %level.view_info(),
                    error = %error,
                    "store rejected mutation"
                );
                Outcome::Rejected(error)
            }
        }
    };
    for event in events {
        event.modification_handle().settle(outcome.clone());
    }
    if outcome == Outcome::Applied {
        on_applied();
    }

    let mut post_failure = None;
    for event in events {
        if let Err(error) = level.execute_post(event) {
            post_failure.get_or_insert(error);
        }
    }

    if let Some(error) = pre_failure {
        return Err(CollectionError::PreModification(error));
    }
    if let Outcome::Rejected(error) = outcome {
        return Err(CollectionError::PreModification(ModificationError::new(
            Phase::Pre,
            level.view_info(),
            error,
        )));
    }
    match post_failure {
        Some(error) => Err(CollectionError::PostModification(error)),
        None => Ok(()),
    }
}

// Ensure levels can be shared across threads
static_assertions::assert_impl_all!(
    Notifier<usize, String, crate::projection::ByValue>: Send, Sync
);
