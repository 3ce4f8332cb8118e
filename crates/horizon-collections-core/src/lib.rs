//! Core engine for Horizon Collections.
//!
//! This crate provides the view-consistency and change-propagation engine the
//! observable collections of `horizon-collections` are built on:
//!
//! - **Store Contract**: positional and keyed stores with a revision counter
//! - **Hidden-Range Windows**: sub-range offsets that follow structural shifts
//! - **Staleness Guards**: fail-fast detection of views used after drift
//! - **Events**: pre/post change records with cause chains and attributes
//! - **Listeners**: element and modification listeners in persistent chains
//! - **Pipeline**: hook, dispatch and bubbling in two phases per mutation
//!
//! The engine never depends on a concrete store. Collections plan a
//! mutation against the store, hand the resulting events to
//! [`pipeline::run_mutation`], and apply the plan between the two phases.
//!
//! # Pipeline Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_collections_core::{
//!     ByValue, FnListener, Modification, ModificationEvent, ModificationKind,
//!     Notifier, Phase, ViewInfo, run_mutation,
//! };
//!
//! let root: Arc<Notifier<String, i32, ByValue>> =
//!     Arc::new(Notifier::new(ViewInfo::Root, ByValue::new(), None));
//! root.add_listener(Arc::new(FnListener::new().on_modified(|event| {
//!     println!("{:?} -> {:?}", event.key(Phase::Post), event.value(Phase::Post));
//!     Ok(())
//! })));
//!
//! let event = Arc::new(ModificationEvent::attach(
//!     ViewInfo::Root,
//!     Modification::new(ModificationKind::Put),
//!     "answer".to_string(),
//!     42,
//! ));
//! run_mutation(&*root, &[event], |_| Ok(()), || {}).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod guard;
pub mod listener;
pub mod logging;
pub mod pipeline;
pub mod projection;
pub mod store;
pub mod window;

pub use config::{DuplicatePolicy, OrderMode, StoreBuilder, StoreConfig};
pub use error::{
    BoxError, CollectionError, ListenerResult, ModificationError, Result, StaleViewError,
    StoreError, UnsupportedViewOperationError,
};
pub use event::{
    AttributeScope, Attributes, Cause, ChangeKind, ElementEvent, Intent, ListEvent, MapEvent,
    Modification, ModificationEvent, ModificationKind, Outcome, Phase, Position, ViewInfo,
};
pub use guard::RevisionGuard;
pub use listener::{
    ElementListener, FnElementListener, FnListener, ListenerChain, ModificationListener,
};
pub use pipeline::{
    Hook, LateFailureSink, Level, Notifier, run_all_keep_first_error, run_mutation,
};
pub use projection::{
    ByEntry, ByKey, ByValue, Projected, Projection, SubRange, ViewOperation, ViewOperations,
};
pub use store::{
    FreezeGuard, KeyedOp, KeyedStore, MutationHandler, NavigableStore, SequenceOp,
    SequenceStore, Store, StoreCell,
};
pub use window::{HiddenRange, PendingRange, StructuralShift, Window};
