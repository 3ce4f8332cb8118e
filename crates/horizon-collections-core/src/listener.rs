//! Listener traits and persistent listener chains.
//!
//! Two kinds of listeners exist on every view level:
//!
//! - [`ElementListener<E>`] sees the element-only face of an event
//!   ([`ElementEvent`]); what the element is depends on the view.
//! - [`ModificationListener<C, V>`] sees the full [`ModificationEvent`] with
//!   coordinates.
//!
//! In the pre phase element listeners run first; in the post phase the order
//! is reversed.
//!
//! # Chains
//!
//! A [`ListenerChain`] is an immutable, reference-counted list. Adding or
//! removing a listener returns a new chain and leaves the old one intact,
//! so a dispatcher can hold a snapshot while listeners change the
//! registration.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_collections_core::listener::{
//!     ElementListener, FnElementListener, ListenerChain,
//! };
//!
//! let listener: Arc<dyn ElementListener<i32>> = Arc::new(
//!     FnElementListener::new().on_modified(|_event| Ok(())),
//! );
//! let chain = ListenerChain::new().with(Arc::clone(&listener));
//! assert_eq!(chain.len(), 1);
//! assert!(chain.without(&listener).is_empty());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::ListenerResult;
use crate::event::{ElementEvent, ModificationEvent};

/// Listener for the element-only face of events.
pub trait ElementListener<E>: Send + Sync {
    /// Called before the store is mutated. An error aborts the mutation.
    fn modifying(&self, _event: &dyn ElementEvent<E>) -> ListenerResult {
        Ok(())
    }

    /// Called after the store was given the mutation.
    fn modified(&self, _event: &dyn ElementEvent<E>) -> ListenerResult {
        Ok(())
    }
}

/// Listener for full events with coordinates.
pub trait ModificationListener<C, V>: Send + Sync {
    /// Called before the store is mutated. An error aborts the mutation.
    fn modifying(&self, _event: &ModificationEvent<C, V>) -> ListenerResult {
        Ok(())
    }

    /// Called after the store was given the mutation.
    fn modified(&self, _event: &ModificationEvent<C, V>) -> ListenerResult {
        Ok(())
    }
}

type ElementCallback<E> = Box<dyn Fn(&dyn ElementEvent<E>) -> ListenerResult + Send + Sync>;
type EventCallback<C, V> = Box<dyn Fn(&ModificationEvent<C, V>) -> ListenerResult + Send + Sync>;

/// [`ElementListener`] built from closures.
pub struct FnElementListener<E> {
    modifying: Option<ElementCallback<E>>,
    modified: Option<ElementCallback<E>>,
}

impl<E> FnElementListener<E> {
    /// A listener that does nothing until callbacks are set.
    pub fn new() -> Self {
        Self {
            modifying: None,
            modified: None,
        }
    }

    /// Set the pre-phase callback.
    pub fn on_modifying(
        mut self,
        callback: impl Fn(&dyn ElementEvent<E>) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.modifying = Some(Box::new(callback));
        self
    }

    /// Set the post-phase callback.
    pub fn on_modified(
        mut self,
        callback: impl Fn(&dyn ElementEvent<E>) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.modified = Some(Box::new(callback));
        self
    }
}

impl<E> Default for FnElementListener<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ElementListener<E> for FnElementListener<E> {
    fn modifying(&self, event: &dyn ElementEvent<E>) -> ListenerResult {
        self.modifying.as_ref().map_or(Ok(()), |callback| callback(event))
    }

    fn modified(&self, event: &dyn ElementEvent<E>) -> ListenerResult {
        self.modified.as_ref().map_or(Ok(()), |callback| callback(event))
    }
}

/// [`ModificationListener`] built from closures.
pub struct FnListener<C, V> {
    modifying: Option<EventCallback<C, V>>,
    modified: Option<EventCallback<C, V>>,
}

impl<C, V> FnListener<C, V> {
    /// A listener that does nothing until callbacks are set.
    pub fn new() -> Self {
        Self {
            modifying: None,
            modified: None,
        }
    }

    /// Set the pre-phase callback.
    pub fn on_modifying(
        mut self,
        callback: impl Fn(&ModificationEvent<C, V>) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.modifying = Some(Box::new(callback));
        self
    }

    /// Set the post-phase callback.
    pub fn on_modified(
        mut self,
        callback: impl Fn(&ModificationEvent<C, V>) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.modified = Some(Box::new(callback));
        self
    }
}

impl<C, V> Default for FnListener<C, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, V> ModificationListener<C, V> for FnListener<C, V> {
    fn modifying(&self, event: &ModificationEvent<C, V>) -> ListenerResult {
        self.modifying.as_ref().map_or(Ok(()), |callback| callback(event))
    }

    fn modified(&self, event: &ModificationEvent<C, V>) -> ListenerResult {
        self.modified.as_ref().map_or(Ok(()), |callback| callback(event))
    }
}

struct Link<L: ?Sized> {
    listener: Arc<L>,
    next: Option<Arc<Link<L>>>,
}

/// Ordered, immutable list of listeners of one kind.
///
/// Links are stored newest first so adding shares the whole existing chain;
/// iteration yields listeners in registration order.
pub struct ListenerChain<L: ?Sized> {
    head: Option<Arc<Link<L>>>,
    len: usize,
}

impl<L: ?Sized> ListenerChain<L> {
    /// An empty chain.
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the chain holds no listener.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// This chain followed by `listener`.
    pub fn with(&self, listener: Arc<L>) -> Self {
        Self {
            head: Some(Arc::new(Link {
                listener,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// This chain followed by every listener of `other`.
    pub fn combine(&self, other: &Self) -> Self {
        other
            .iter()
            .fold(self.clone(), |chain, listener| chain.with(Arc::clone(listener)))
    }

    /// This chain without the first registration of `listener`.
    ///
    /// Listeners are compared by identity. Registrations newer than the
    /// removed one are re-linked; older ones stay shared.
    pub fn without(&self, listener: &Arc<L>) -> Self {
        let links = self.links();
        // `links` is newest first: the last match is the first registration.
        let Some(found) = links
            .iter()
            .rposition(|link| std::ptr::addr_eq(Arc::as_ptr(&link.listener), Arc::as_ptr(listener)))
        else {
            return self.clone();
        };
        let mut chain = Self {
            head: links[found].next.clone(),
            len: self.len - found - 1,
        };
        for link in links[..found].iter().rev() {
            chain = chain.with(Arc::clone(&link.listener));
        }
        chain
    }

    /// Returns true if `listener` is registered.
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.links()
            .iter()
            .any(|link| std::ptr::addr_eq(Arc::as_ptr(&link.listener), Arc::as_ptr(listener)))
    }

    /// Listeners in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<L>> {
        self.links().into_iter().rev().map(|link| &link.listener)
    }

    fn links(&self) -> Vec<&Link<L>> {
        let mut links = Vec::with_capacity(self.len);
        let mut cursor = self.head.as_deref();
        while let Some(link) = cursor {
            links.push(link);
            cursor = link.next.as_deref();
        }
        links
    }
}

impl<L: ?Sized> Clone for ListenerChain<L> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<L: ?Sized> Default for ListenerChain<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerChain<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerChain").field("len", &self.len).finish()
    }
}
