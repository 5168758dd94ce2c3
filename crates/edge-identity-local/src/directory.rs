use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use edge_identity::{
    DirectoryError, DirectoryResult, Identity, IdentityDirectory, IdentityKey, IdentityPages,
};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Default)]
struct DirectoryState {
    identities: BTreeMap<String, Identity>,
    /// Ids the directory reports as out of scope with an explicit signal.
    invalid: BTreeSet<String>,
    lookup_failure: Option<DirectoryError>,
    listing_failure: Option<(usize, DirectoryError)>,
    page_size: usize,
    page_delay: Option<Duration>,
}

/// In-memory identity directory.
///
/// Serves lookups and a paged listing from a map of identities. Cloning shares
/// state, so a test can keep a handle while the cache owns another. Lookup and
/// listing failures can be injected to simulate outages.
#[derive(Debug, Clone)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
    lookups: Arc<AtomicUsize>,
    listings: Arc<AtomicUsize>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(DirectoryState {
                page_size: DEFAULT_PAGE_SIZE,
                ..Default::default()
            })),
            lookups: Arc::new(AtomicUsize::new(0)),
            listings: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let directory = Self::new();
        for identity in identities {
            directory.upsert(identity);
        }
        directory
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds or replaces an identity and clears any invalid-state marker for it.
    pub fn upsert(&self, identity: Identity) {
        let id = identity.id();
        let mut state = self.write();
        state.invalid.remove(&id);
        state.identities.insert(id, identity);
    }

    /// Forgets an identity; lookups return `Ok(None)`.
    pub fn remove(&self, id: &str) {
        let mut state = self.write();
        state.identities.remove(id);
        state.invalid.remove(id);
    }

    /// Forgets an identity; lookups fail with `DirectoryError::InvalidState`.
    pub fn mark_invalid(&self, id: &str) {
        let mut state = self.write();
        state.identities.remove(id);
        state.invalid.insert(id.to_string());
    }

    /// Makes every lookup fail with `error` until cleared with `None`.
    pub fn set_lookup_failure(&self, error: Option<DirectoryError>) {
        self.write().lookup_failure = error;
    }

    /// Makes the listing fail with `error` when page `page` (zero-based) is fetched.
    pub fn fail_listing_at_page(&self, page: usize, error: DirectoryError) {
        self.write().listing_failure = Some((page, error));
    }

    pub fn clear_listing_failure(&self) {
        self.write().listing_failure = None;
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.write().page_size = page_size.max(1);
    }

    /// Delays every page fetch, to keep a listing in flight.
    pub fn set_page_delay(&self, delay: Option<Duration>) {
        self.write().page_delay = delay;
    }

    /// Number of single-id lookups served or failed.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of listings started.
    #[must_use]
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn lookup(&self, key: IdentityKey) -> DirectoryResult<Option<Identity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let id = key.to_string();
        let state = self.read();

        if let Some(error) = &state.lookup_failure {
            return Err(error.clone());
        }
        if state.invalid.contains(&id) {
            return Err(DirectoryError::invalid_state(id, "Device not in scope"));
        }

        Ok(state.identities.get(&id).cloned())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn get_device_identity(&self, device_id: &str) -> DirectoryResult<Option<Identity>> {
        self.lookup(IdentityKey::Device {
            device_id: device_id.to_string(),
        })
    }

    async fn get_module_identity(
        &self,
        device_id: &str,
        module_id: &str,
    ) -> DirectoryResult<Option<Identity>> {
        self.lookup(IdentityKey::Module {
            device_id: device_id.to_string(),
            module_id: module_id.to_string(),
        })
    }

    fn identities(&self) -> Box<dyn IdentityPages> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let state = self.read();

        let all: Vec<Identity> = state.identities.values().cloned().collect();
        let pages: VecDeque<Vec<Identity>> = all
            .chunks(state.page_size)
            .map(<[Identity]>::to_vec)
            .collect();

        Box::new(InMemoryPages {
            pages,
            served: 0,
            failure: state.listing_failure.clone(),
            delay: state.page_delay,
        })
    }
}

/// Snapshot traversal returned by [`InMemoryDirectory::identities`].
struct InMemoryPages {
    pages: VecDeque<Vec<Identity>>,
    served: usize,
    failure: Option<(usize, DirectoryError)>,
    delay: Option<Duration>,
}

#[async_trait]
impl IdentityPages for InMemoryPages {
    fn has_next(&self) -> bool {
        !self.pages.is_empty()
            || matches!(&self.failure, Some((page, _)) if *page >= self.served)
    }

    async fn next_page(&mut self) -> DirectoryResult<Vec<Identity>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((page, error)) = &self.failure
            && *page == self.served
        {
            let error = error.clone();
            self.failure = None;
            self.pages.clear();
            return Err(error);
        }

        self.served += 1;
        Ok(self.pages.pop_front().unwrap_or_default())
    }
}
