//! Shared application state for request handlers.

use crate::store::Store;

/// Shared application state, cloneable across handlers.
///
/// Currently just the embedded store handle; the store itself is cheap to
/// clone and safe to share.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

impl AppState {
    /// Creates a new application state around the given store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}
