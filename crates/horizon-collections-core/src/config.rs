//! Store configuration.
//!
//! [`StoreConfig`] is plain data with a [`Default`]; [`StoreBuilder`] is the
//! fluent way to fill it in. Reference stores take a config at construction
//! and never change it afterwards.

/// What a store does when an element equal to an existing one is added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DuplicatePolicy {
    /// Sequences keep both elements. Keyed stores overwrite the value.
    #[default]
    Allow,
    /// The existing element is evicted as a conflict. Keyed stores overwrite
    /// the value.
    Evict,
    /// The store refuses while applying the mutation (a late failure).
    Reject,
}

/// Iteration order of linked stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OrderMode {
    /// Entries keep the order they were first inserted in.
    #[default]
    Insertion,
    /// Reading an entry moves it to the end.
    Access,
}

/// Configuration shared by the reference stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Duplicate handling.
    pub duplicates: DuplicatePolicy,
    /// Iteration order (linked stores only).
    pub order: OrderMode,
    /// Initial capacity hint.
    pub capacity: usize,
}

impl StoreConfig {
    /// Configuration for a store that evicts duplicates.
    pub fn unique() -> Self {
        Self {
            duplicates: DuplicatePolicy::Evict,
            ..Default::default()
        }
    }

    /// Configuration for a linked store in access order.
    pub fn access_ordered() -> Self {
        Self {
            order: OrderMode::Access,
            ..Default::default()
        }
    }
}

/// Builder for [`StoreConfig`].
#[derive(Debug, Default)]
pub struct StoreBuilder {
    config: StoreConfig,
}

impl StoreBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duplicate policy.
    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicates = policy;
        self
    }

    /// Set the iteration order.
    pub fn order(mut self, order: OrderMode) -> Self {
        self.config.order = order;
        self
    }

    /// Set the initial capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> StoreConfig {
        self.config
    }
}
