//! Prelude module for Horizon Collections.
//!
//! ```
//! use horizon_collections::prelude::*;
//! ```
//!
//! This provides access to:
//! - Collections (`ObservableList`, `ObservableMap`, `ObservableSet`)
//! - Views (`ListCursor`, `MapCursor`, `SetCursor`, `KeyView`, `ValueView`, `EntryView`, `KeyRange`)
//! - Stores and their configuration (`VecStore`, `LinkedStore`, `SortedStore`)
//! - Events and listeners (`ModificationEvent`, `FnListener`, `Phase`, ...)
//! - Errors (`CollectionError`, `Result`)

// ============================================================================
// Collections and Views
// ============================================================================

pub use crate::cursor::ListCursor;
pub use crate::list::ObservableList;
pub use crate::map::{KeyFilter, KeyRange, ObservableMap};
pub use crate::map_cursor::{MapCursor, SetCursor};
pub use crate::set::ObservableSet;
pub use crate::views::{EntryView, KeyView, ValueView};

// ============================================================================
// Stores
// ============================================================================

pub use crate::store::{LinkedStore, SortedStore, VecStore};
pub use horizon_collections_core::{
    DuplicatePolicy, KeyedStore, NavigableStore, OrderMode, SequenceStore, Store, StoreBuilder,
    StoreConfig,
};

// ============================================================================
// Events and Listeners
// ============================================================================

pub use horizon_collections_core::{
    AttributeScope, ChangeKind, ElementEvent, ElementListener, FnElementListener, FnListener,
    Intent, ListenerResult, Modification, ModificationEvent, ModificationKind,
    ModificationListener, Outcome, Phase, Position, ViewInfo,
};

// ============================================================================
// Errors
// ============================================================================

pub use horizon_collections_core::{CollectionError, Result, StoreError};
