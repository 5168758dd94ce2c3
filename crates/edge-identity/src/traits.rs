//! Collaborator traits consumed by the scope cache.

use async_trait::async_trait;

use crate::error::{DirectoryResult, StoreResult};
use crate::types::Identity;

/// Client for the upstream identity directory.
///
/// Implementations must be thread-safe (`Send + Sync`); the cache calls the
/// single-id lookups from many callers while the refresh loop walks the listing.
///
/// # Example
///
/// ```ignore
/// use edge_identity::{DirectoryResult, Identity, IdentityDirectory};
///
/// async fn lookup(directory: &dyn IdentityDirectory, id: &str) -> DirectoryResult<Option<Identity>> {
///     match id.split_once('/') {
///         Some((device, module)) => directory.get_module_identity(device, module).await,
///         None => directory.get_device_identity(id).await,
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Looks up a device identity.
    ///
    /// Returns `Ok(None)` if the directory has no such identity.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::InvalidState` when the device is confirmed out of
    /// scope or disabled. Any other error means the directory could not answer.
    async fn get_device_identity(&self, device_id: &str) -> DirectoryResult<Option<Identity>>;

    /// Looks up a module identity.
    ///
    /// # Errors
    ///
    /// Same contract as [`get_device_identity`](Self::get_device_identity).
    async fn get_module_identity(
        &self,
        device_id: &str,
        module_id: &str,
    ) -> DirectoryResult<Option<Identity>>;

    /// Starts a new paginated listing of every in-scope identity.
    ///
    /// Each call returns a traversal positioned at the first page.
    fn identities(&self) -> Box<dyn IdentityPages>;
}

/// A single forward-only traversal of the directory listing.
#[async_trait]
pub trait IdentityPages: Send {
    /// Returns `true` while more pages remain.
    fn has_next(&self) -> bool;

    /// Fetches the next page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched. The traversal should be
    /// discarded after an error.
    async fn next_page(&mut self) -> DirectoryResult<Vec<Identity>>;
}

/// Callback invoked once per stored entry during [`KeyValueStore::iterate_all`].
pub type StoreVisitor<'a> = dyn FnMut(String, String) + Send + 'a;

/// Crash-safe key→string store.
///
/// A successful `put` must be durable before it returns: the cache relies on
/// this to keep its in-memory map and the store from diverging.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Inserts or overwrites a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be made durable. In that case
    /// the previous value must remain in place.
    async fn put(&self, key: &str, value: String) -> StoreResult<()>;

    /// Reads a single value.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing keys.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Visits every stored entry. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn iterate_all(&self, visitor: &mut StoreVisitor<'_>) -> StoreResult<()>;
}
