//! Error types for Horizon Collections.
//!
//! Every fallible collection operation returns [`Result<T>`], whose error is
//! a [`CollectionError`]. Hook and listener callbacks report their own
//! failures as a [`BoxError`]; the pipeline wraps the first one raised at a
//! level into a [`ModificationError`] tagged with the phase it happened in.

use std::sync::Arc;

use crate::event::{Phase, ViewInfo};

/// Boxed error type raised by hooks and listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a single hook or listener invocation.
pub type ListenerResult = std::result::Result<(), BoxError>;

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Errors that can occur while reading or mutating a collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// The view observed a revision it did not expect.
    #[error(transparent)]
    Stale(#[from] StaleViewError),

    /// A hook, listener or the store failed before the mutation was applied.
    ///
    /// The store is unchanged.
    #[error("pre-modification notification failed")]
    PreModification(#[source] ModificationError),

    /// A hook or listener failed after the mutation was applied.
    ///
    /// The store has been changed.
    #[error("post-modification notification failed")]
    PostModification(#[source] ModificationError),

    /// The operation is not allowed on this kind of view.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedViewOperationError),

    /// Index outside the view.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Key outside the key range of a sub-map view.
    #[error("key is outside the range of {view}")]
    KeyOutOfRange { view: ViewInfo },

    /// Bounds passed to a range constructor were inverted or escaped the parent.
    #[error("invalid range: {message}")]
    InvalidRange { message: String },

    /// A cursor operation needs an element returned by `next` or `previous`.
    #[error("cursor has no current element")]
    NoCurrentElement,

    /// A mutation was attempted while listeners of the same store were running.
    #[error("collection is frozen while modification listeners run")]
    Frozen,

    /// The store refused the operation while planning it.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollectionError {
    /// Create an index error.
    pub fn index_out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }

    /// Create a range error.
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Wrap a level failure according to the phase it was raised in.
    pub fn modification(error: ModificationError) -> Self {
        match error.phase() {
            Phase::Pre => Self::PreModification(error),
            Phase::Post => Self::PostModification(error),
        }
    }

    /// Returns the modification failure for either phase, if this is one.
    pub fn as_modification(&self) -> Option<&ModificationError> {
        match self {
            Self::PreModification(error) | Self::PostModification(error) => Some(error),
            _ => None,
        }
    }
}

/// A windowed view was used after its store changed through another path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale view: expected store revision {expected}, found {actual}")]
pub struct StaleViewError {
    /// Revision the view was last synchronized with.
    pub expected: u64,
    /// Revision the store reported.
    pub actual: u64,
}

/// A structural operation was attempted on a view that forbids it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} is not supported by {view}")]
pub struct UnsupportedViewOperationError {
    /// The view that refused.
    pub view: ViewInfo,
    /// Name of the refused operation.
    pub operation: &'static str,
}

/// First failure raised at one level of the notification pipeline.
///
/// Cloning is cheap; the underlying cause is shared.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{phase} phase failed at {view}: {source}")]
pub struct ModificationError {
    phase: Phase,
    view: ViewInfo,
    source: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl ModificationError {
    /// Create a failure raised by a level.
    pub fn new(phase: Phase, view: ViewInfo, source: impl Into<BoxError>) -> Self {
        Self {
            phase,
            view,
            source: Arc::from(source.into()),
        }
    }

    /// The phase the failure was raised in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The level that reported the failure.
    pub fn view(&self) -> &ViewInfo {
        &self.view
    }

    /// The underlying hook, listener or store error.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }

    /// Downcast the underlying error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

/// Failures reported by a store.
///
/// `Duplicate` and `ConflictingKey` are late failures: a store detects them
/// while applying a plan and reports them through the mutation handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// An equal element already exists and the store rejects duplicates.
    #[error("an equal element already exists at position {position}")]
    Duplicate { position: usize },

    /// The key already exists and the store rejects overwrites.
    #[error("key already present")]
    ConflictingKey,

    /// The store changed between planning and applying a mutation.
    #[error("store revision moved from {planned} to {actual} between plan and apply")]
    Revision { planned: u64, actual: u64 },

    /// A position outside the store.
    #[error("position {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Any other refusal.
    #[error("{0}")]
    Rejected(String),
}

impl StoreError {
    /// Create a generic refusal.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
