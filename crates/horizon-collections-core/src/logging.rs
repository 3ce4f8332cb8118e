//! Logging facilities for Horizon Collections.
//!
//! Horizon Collections uses the `tracing` crate for instrumentation. Nothing
//! is printed unless the application installs a subscriber:
//!
//! ```ignore
//! use tracing_subscriber;
//!
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("horizon_collections=debug")
//!         .init();
//! }
//! ```
//!
//! Every mutation attempt runs inside a [`span_names::MUTATION`] span, with
//! one [`span_names::PRE_PHASE`] or [`span_names::POST_PHASE`] span per level
//! it reaches. Failing listeners are logged at `trace` under
//! [`targets::LISTENER`], failing levels at `debug` under
//! [`targets::PIPELINE`], and late store failures at `warn` under
//! [`targets::STORE`].

use std::fmt;

use crate::event::ViewInfo;

/// Span names used throughout Horizon Collections for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// One mutation attempt, from planning to the end of the post phase.
    pub const MUTATION: &str = "horizon_collections::mutation";
    /// The pre phase of one level.
    pub const PRE_PHASE: &str = "horizon_collections::pre_phase";
    /// The post phase of one level.
    pub const POST_PHASE: &str = "horizon_collections::post_phase";
    /// Hidden-range conflict resolution.
    pub const RESOLVE: &str = "horizon_collections::resolve";
}

/// Target names for log filtering.
pub mod targets {
    /// Core engine target.
    pub const CORE: &str = "horizon_collections";
    /// Notification pipeline target.
    pub const PIPELINE: &str = "horizon_collections::pipeline";
    /// Hidden-range window target.
    pub const WINDOW: &str = "horizon_collections::window";
    /// Store adapter target.
    pub const STORE: &str = "horizon_collections::store";
    /// Listener chain target.
    pub const LISTENER: &str = "horizon_collections::listener";
}

/// Renders a view chain leaf-first, the way a bubbled event travels.
///
/// ```
/// use horizon_collections_core::event::ViewInfo;
/// use horizon_collections_core::logging::ChainDisplay;
///
/// let chain = [ViewInfo::SubList { from: 1, to: 3 }, ViewInfo::Root];
/// assert_eq!(ChainDisplay(&chain).to_string(), "sub-list[1, 3) -> root");
/// ```
pub struct ChainDisplay<'a>(pub &'a [ViewInfo]);

impl fmt::Display for ChainDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, info) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{info}")?;
        }
        Ok(())
    }
}

/// Trace-level logging with the core target.
///
/// A wrapper around `tracing::trace!` with consistent target naming.
#[macro_export]
macro_rules! collections_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

/// Debug-level logging with the core target.
#[macro_export]
macro_rules! collections_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}
