//! Observable collections with consistent views.
//!
//! Horizon Collections wraps ordinary stores in observable collections whose
//! derived views (sub-lists, cursors, sub-maps, key/value/entry views,
//! descending maps) stay consistent while any of them is mutated:
//!
//! - Every mutation is announced to hooks and listeners before it is
//!   applied, and again afterwards, on the view it was made through and on
//!   every ancestor view.
//! - A pre-phase failure vetoes the mutation; the store stays unchanged.
//! - Positional views and cursors are fail-fast: using one after the store
//!   changed through another path returns [`CollectionError::Stale`].
//! - Sub-lists keep denoting the same elements when a mutation evicts or
//!   inserts elements outside of them.
//!
//! The engine lives in `horizon-collections-core` and is re-exported here.
//! Stores are in [`store`].
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use horizon_collections::prelude::*;
//!
//! let list = ObservableList::new(VecStore::from(vec![1, 2, 3]));
//! list.set_pre_hook(|event| {
//!     if event.value(Phase::Post) == Some(&13) {
//!         return Err("unlucky".into());
//!     }
//!     Ok(())
//! });
//!
//! list.push(4).unwrap();
//! assert!(matches!(list.push(13), Err(CollectionError::PreModification(_))));
//! assert_eq!(list.to_vec().unwrap(), vec![1, 2, 3, 4]);
//! ```

#![warn(missing_docs)]

/// Listener registration methods delegating to a view's notifier.
///
/// Takes the field path of the notifier, the coordinate and value types of
/// its events, and the element type its element listeners receive.
macro_rules! listener_methods {
    ($($level:ident).+, $coord:ty, $value:ty, $element:ty) => {
        /// Register a modification listener on this view.
        pub fn add_listener(
            &self,
            listener: ::std::sync::Arc<
                dyn ::horizon_collections_core::ModificationListener<$coord, $value>,
            >,
        ) {
            self.$($level).+.add_listener(listener);
        }

        /// Remove a modification listener. Returns true if it was registered.
        pub fn remove_listener(
            &self,
            listener: &::std::sync::Arc<
                dyn ::horizon_collections_core::ModificationListener<$coord, $value>,
            >,
        ) -> bool {
            self.$($level).+.remove_listener(listener)
        }

        /// Register an element listener on this view.
        pub fn add_element_listener(
            &self,
            listener: ::std::sync::Arc<dyn ::horizon_collections_core::ElementListener<$element>>,
        ) {
            self.$($level).+.add_element_listener(listener);
        }

        /// Remove an element listener. Returns true if it was registered.
        pub fn remove_element_listener(
            &self,
            listener: &::std::sync::Arc<
                dyn ::horizon_collections_core::ElementListener<$element>,
            >,
        ) -> bool {
            self.$($level).+.remove_element_listener(listener)
        }

        /// Install the hook run before this view's listeners in the pre phase.
        pub fn set_pre_hook(
            &self,
            hook: impl Fn(
                &::horizon_collections_core::ModificationEvent<$coord, $value>,
            ) -> ::horizon_collections_core::ListenerResult
            + Send
            + Sync
            + 'static,
        ) {
            self.$($level).+.set_pre_hook(hook);
        }

        /// Install the hook run after this view's listeners in the post phase.
        pub fn set_post_hook(
            &self,
            hook: impl Fn(
                &::horizon_collections_core::ModificationEvent<$coord, $value>,
            ) -> ::horizon_collections_core::ListenerResult
            + Send
            + Sync
            + 'static,
        ) {
            self.$($level).+.set_post_hook(hook);
        }

        /// Remove both hooks of this view.
        pub fn clear_hooks(&self) {
            self.$($level).+.clear_hooks();
        }
    };
}

pub(crate) use listener_methods;

mod collector;
pub mod cursor;
pub mod list;
pub mod map;
pub mod map_cursor;
pub mod prelude;
pub mod set;
pub mod store;
pub mod views;

pub use horizon_collections_core::*;

pub use cursor::ListCursor;
pub use list::ObservableList;
pub use map::{KeyFilter, KeyRange, ObservableMap};
pub use map_cursor::{MapCursor, SetCursor};
pub use set::ObservableSet;
pub use views::{EntryView, KeyView, ValueView};
