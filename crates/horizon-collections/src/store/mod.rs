//! Store implementations.
//!
//! - [`VecStore`]: positional, over a `Vec`, for lists
//! - [`LinkedStore`]: keyed, in insertion or access order
//! - [`SortedStore`]: keyed and navigable, in key order
//!
//! Any type implementing the store traits of `horizon-collections-core` can
//! back a collection; these cover the common cases.

mod linked_store;
mod sorted_store;
mod vec_store;

pub use linked_store::{LinkedPlan, LinkedStore};
pub use sorted_store::{SortedPlan, SortedStore};
pub use vec_store::{VecPlan, VecStore};
