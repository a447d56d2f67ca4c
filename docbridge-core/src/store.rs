//! Main entry point of the bridge.
//!
//! A [`BridgeStore`] owns a backend and the [`BridgeConfig`] defaults, and
//! hands out [`Collection`]s and command cursors.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::store::BridgeStore;
//! use docbridge::memory::InMemoryStore;
//!
//! let store = BridgeStore::new(InMemoryStore::new());
//! let users = store.collection("app", "users");
//! ```

use crate::{
    backend::StoreBackend,
    collection::Collection,
    config::BridgeConfig,
    cursor::CommandCursor,
    error::BridgeResult,
    legacy::LegacyValue,
    options::Namespace,
    taxonomy::{ErrorCategory, map_error},
};

/// A bridge over a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct BridgeStore<B: StoreBackend> {
    backend: B,
    config: BridgeConfig,
}

impl<B: StoreBackend> BridgeStore<B> {
    /// Creates a store with the default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, BridgeConfig::default())
    }

    pub fn with_config(backend: B, config: BridgeConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Gets a collection handle.
    ///
    /// # Arguments
    ///
    /// * `database` - The database name
    /// * `name` - The collection name
    pub fn collection<'a>(&'a self, database: &str, name: &str) -> Collection<'a, B> {
        Collection::new(Namespace::new(database, name), &self.backend, &self.config)
    }

    /// Creates a command cursor for a cursor-returning database command.
    ///
    /// The cursor reports the `database.$cmd` namespace.
    pub fn command_cursor<'a>(&'a self, database: &str, command: LegacyValue) -> CommandCursor<'a, B> {
        CommandCursor::new(&self.backend, Namespace::new(database, "$cmd"), command)
            .with_defaults(&self.config)
    }

    /// Shuts down the backend.
    ///
    /// # Errors
    ///
    /// Returns the classified backend failure.
    pub async fn shutdown(self) -> BridgeResult<()> {
        self.backend
            .shutdown()
            .await
            .map_err(|e| map_error(e, ErrorCategory::General).into())
    }
}
