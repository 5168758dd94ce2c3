//! Device-scope identity cache.
//!
//! This module provides [`DeviceScopeCache`], the gateway's authoritative view
//! of which devices and modules are in scope. It keeps an in-memory map of
//! [`StoredIdentity`] records mirrored write-through into a durable
//! [`KeyValueStore`], and consults the [`IdentityDirectory`] only when a caller
//! asks for fresh data or the refresh service reconciles.
//!
//! # Architecture
//!
//! ```text
//! verify(id) → read record under lock
//!            → stale or missing and caller allows refresh?
//!                → directory lookup (lock NOT held)
//!                → apply_update / apply_removal (lock held: store write, then map write)
//!                → notify subscribers (lock released)
//!            → decide: Ok(identity) | OutOfScope | Disabled
//! ```
//!
//! # Outage Behavior
//!
//! A directory failure other than an explicit invalid-state signal never
//! changes a record. Callers keep getting the last known decision until the
//! directory answers again.
//!
//! # Example
//!
//! ```ignore
//! use edge_scope_cache::{DeviceScopeCache, ScopeCacheConfig};
//!
//! let cache = DeviceScopeCache::create(directory, store, &ScopeCacheConfig::default()).await?;
//!
//! match cache.verify("device-1/module-a", true).await {
//!     Ok(identity) => accept(identity),
//!     Err(e) if e.is_authorization_failure() => reject(e),
//!     Err(e) => return Err(e),
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use edge_identity::{DirectoryError, Identity, IdentityDirectory, IdentityKey, KeyValueStore};
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

use crate::config::ScopeCacheConfig;
use crate::error::{ScopeError, ScopeResult};
use crate::events::{IdentityChange, IdentityChangeNotifier};
use crate::record::{ScopeEntry, StoredIdentity};

// =============================================================================
// Refresh Outcomes
// =============================================================================

/// What a single-id refresh did to the cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The directory returned the identity; the record now holds it.
    InScope,
    /// The directory reported the id out of scope; the record is now absent.
    OutOfScope,
    /// The directory or store failed; the previous record was kept.
    Retained,
}

/// Totals from [`DeviceScopeCache::refresh_identities`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub in_scope: usize,
    pub out_of_scope: usize,
    pub retained: usize,
}

impl RefreshSummary {
    fn record(&mut self, outcome: RefreshOutcome) {
        match outcome {
            RefreshOutcome::InScope => self.in_scope += 1,
            RefreshOutcome::OutOfScope => self.out_of_scope += 1,
            RefreshOutcome::Retained => self.retained += 1,
        }
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

/// Statistics about the scope cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeCacheStats {
    /// Number of records (present and absent).
    pub records: usize,
    /// Records holding an identity.
    pub present: usize,
    /// Records holding an enabled identity.
    pub enabled: usize,
    /// Records marking an id out of scope.
    pub absent: usize,
    /// Records loaded from the store at startup.
    pub bootstrapped: usize,
    /// Store entries skipped at startup because they could not be decoded.
    pub bootstrap_skipped: usize,
    /// Single-id directory lookups issued.
    pub directory_lookups: u64,
    /// Single-id refreshes that kept the previous record after a failure.
    pub retained_after_failure: u64,
}

// =============================================================================
// Device Scope Cache
// =============================================================================

/// In-memory and durable cache of in-scope device and module identities.
///
/// Every read and write of the record map goes through one mutex. A write
/// holds it across the durable store write so that the map and the store
/// never disagree; directory calls are always made before it is taken.
pub struct DeviceScopeCache {
    /// Upstream identity directory.
    directory: Arc<dyn IdentityDirectory>,

    /// Durable mirror of `entries`.
    store: Arc<dyn KeyValueStore>,

    /// Records by id.
    entries: Mutex<HashMap<String, StoredIdentity>>,

    /// Change notifications.
    notifier: Arc<IdentityChangeNotifier>,

    /// Maximum record age before `verify(id, true)` re-checks.
    refresh_delay: Duration,

    bootstrapped: usize,
    bootstrap_skipped: usize,
    directory_lookups: AtomicU64,
    retained_after_failure: AtomicU64,
}

impl DeviceScopeCache {
    /// Create a cache, repopulating it from every record in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot be
    /// iterated. Individual records that fail to decode are skipped and
    /// counted in [`ScopeCacheStats::bootstrap_skipped`].
    pub async fn create(
        directory: Arc<dyn IdentityDirectory>,
        store: Arc<dyn KeyValueStore>,
        config: &ScopeCacheConfig,
    ) -> ScopeResult<Self> {
        config.validate()?;

        let (entries, skipped) = Self::bootstrap(store.as_ref()).await?;
        let bootstrapped = entries.len();

        info!(
            records = bootstrapped,
            skipped = skipped,
            refresh_delay_secs = config.refresh_delay.as_secs(),
            "Created device scope identities cache"
        );

        Ok(Self {
            directory,
            store,
            entries: Mutex::new(entries),
            notifier: Arc::new(IdentityChangeNotifier::new(config.notification_capacity)),
            refresh_delay: config.refresh_delay,
            bootstrapped,
            bootstrap_skipped: skipped,
            directory_lookups: AtomicU64::new(0),
            retained_after_failure: AtomicU64::new(0),
        })
    }

    /// Reads every record in the store.
    async fn bootstrap(
        store: &dyn KeyValueStore,
    ) -> ScopeResult<(HashMap<String, StoredIdentity>, usize)> {
        let mut raw: Vec<(String, String)> = Vec::new();
        store
            .iterate_all(&mut |key, value| raw.push((key, value)))
            .await?;

        let mut entries = HashMap::with_capacity(raw.len());
        let mut skipped = 0;

        for (key, value) in raw {
            match StoredIdentity::decode(&key, &value) {
                Ok(record) => {
                    entries.insert(key, record);
                }
                Err(e) => {
                    skipped += 1;
                    warn!(key = %key, error = %e, "Skipping unreadable stored identity");
                }
            }
        }

        Ok((entries, skipped))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Get the cached identity for `id`.
    ///
    /// When no record exists and `refresh_if_absent` is set, the directory is
    /// asked for this id first. A record marking the id out of scope returns
    /// `None` without contacting the directory.
    pub async fn get(&self, id: &str, refresh_if_absent: bool) -> Option<Identity> {
        debug!(id = %id, "Getting service identity");

        if refresh_if_absent && !self.contains(id).await {
            self.refresh_identity(id).await;
        }

        self.entries
            .lock()
            .await
            .get(id)
            .and_then(|record| record.identity().cloned())
    }

    /// Get the full record for `id`, including absent markers.
    pub async fn stored(&self, id: &str) -> Option<StoredIdentity> {
        self.entries.lock().await.get(id).cloned()
    }

    /// All records ordered by id.
    pub async fn records(&self) -> Vec<StoredIdentity> {
        let mut records: Vec<StoredIdentity> =
            self.entries.lock().await.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Check whether any record exists for `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.contains_key(id)
    }

    /// Ids whose record currently holds an identity.
    pub async fn present_ids(&self) -> HashSet<String> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|record| record.entry.is_present())
            .map(|record| record.id.clone())
            .collect()
    }

    /// Number of records, present and absent.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    // -------------------------------------------------------------------------
    // Authorization
    // -------------------------------------------------------------------------

    /// Decide whether `id` may connect.
    ///
    /// When `refresh_if_stale` is set and the record is missing or older than
    /// the configured refresh delay, the id is refreshed once and the record
    /// re-read; no further refresh is attempted.
    ///
    /// # Errors
    ///
    /// - `ScopeError::OutOfScope` if there is no record or it marks the id absent
    /// - `ScopeError::Disabled` if the cached identity is disabled
    #[instrument(level = "debug", skip(self))]
    pub async fn verify(&self, id: &str, refresh_if_stale: bool) -> ScopeResult<Identity> {
        let record = self.stored(id).await;

        let needs_refresh = refresh_if_stale
            && record.as_ref().is_none_or(|r| {
                r.is_stale_at(self.refresh_delay, OffsetDateTime::now_utc())
            });

        let record = if needs_refresh {
            self.refresh_identity(id).await;
            self.stored(id).await
        } else {
            record
        };

        match record.map(|r| r.entry) {
            None | Some(ScopeEntry::Absent) => Err(ScopeError::out_of_scope(id)),
            Some(ScopeEntry::Present(identity)) if !identity.is_enabled() => {
                Err(ScopeError::disabled(id))
            }
            Some(ScopeEntry::Present(identity)) => Ok(identity),
        }
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Refresh a single id from the directory.
    ///
    /// An identity returned by the directory is applied as an update; an
    /// explicit "not found" or invalid-state answer is applied as a removal.
    /// Any other failure leaves the record untouched and is only logged.
    #[instrument(level = "debug", skip(self))]
    pub async fn refresh_identity(&self, id: &str) -> RefreshOutcome {
        match self.try_refresh_identity(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.retained_after_failure.fetch_add(1, Ordering::Relaxed);
                warn!(
                    id = %id,
                    error = %e,
                    category = %e.category(),
                    "Error while refreshing the service identity"
                );
                RefreshOutcome::Retained
            }
        }
    }

    async fn try_refresh_identity(&self, id: &str) -> ScopeResult<RefreshOutcome> {
        debug!(id = %id, "Refreshing service identity");
        self.directory_lookups.fetch_add(1, Ordering::Relaxed);

        let result = match IdentityKey::parse(id) {
            IdentityKey::Device { device_id } => {
                self.directory.get_device_identity(&device_id).await
            }
            IdentityKey::Module {
                device_id,
                module_id,
            } => {
                self.directory
                    .get_module_identity(&device_id, &module_id)
                    .await
            }
        };

        match result {
            Ok(Some(identity)) => {
                self.apply_update(identity).await?;
                Ok(RefreshOutcome::InScope)
            }
            Ok(None) | Err(DirectoryError::InvalidState { .. }) => {
                self.apply_removal(id).await?;
                Ok(RefreshOutcome::OutOfScope)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh several ids one after another.
    ///
    /// A failure for one id does not stop the others.
    pub async fn refresh_identities<I, S>(&self, ids: I) -> RefreshSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = RefreshSummary::default();
        for id in ids {
            summary.record(self.refresh_identity(id.as_ref()).await);
        }
        summary
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Record `identity` as in scope.
    ///
    /// Emits [`IdentityChange::Updated`] if the previous record held a
    /// different identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the store write
    /// fails. The cached record is unchanged in that case.
    pub async fn apply_update(&self, identity: Identity) -> ScopeResult<()> {
        let id = identity.id();

        let updated = {
            let mut entries = self.entries.lock().await;

            let updated = entries
                .get(&id)
                .and_then(StoredIdentity::identity)
                .is_some_and(|existing| existing != &identity);

            let record = StoredIdentity::present(identity.clone());
            self.store.put(&id, record.encode()?).await?;
            entries.insert(id.clone(), record);
            updated
        };

        debug!(id = %id, "Identity is in device scope, adding to cache");

        if updated {
            self.notifier.notify(IdentityChange::Updated { identity });
        }

        Ok(())
    }

    /// Record `id` as out of scope.
    ///
    /// Emits [`IdentityChange::Removed`] if the previous record held an
    /// enabled identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails. The cached record is
    /// unchanged in that case.
    pub async fn apply_removal(&self, id: &str) -> ScopeResult<()> {
        let was_enabled = {
            let mut entries = self.entries.lock().await;

            let was_enabled = entries.get(id).is_some_and(|r| r.entry.is_enabled());

            let record = StoredIdentity::absent(id);
            self.store.put(id, record.encode()?).await?;
            entries.insert(id.to_string(), record);
            was_enabled
        };

        debug!(id = %id, "Identity is not in device scope, marking absent");

        if was_enabled {
            self.notifier.notify(IdentityChange::Removed { id: id.to_string() });
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Subscribe to identity change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityChange> {
        self.notifier.subscribe()
    }

    /// Get the upstream directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<IdentityChangeNotifier> {
        &self.notifier
    }

    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> ScopeCacheStats {
        let entries = self.entries.lock().await;

        let present = entries.values().filter(|r| r.entry.is_present()).count();
        let enabled = entries.values().filter(|r| r.entry.is_enabled()).count();

        ScopeCacheStats {
            records: entries.len(),
            present,
            enabled,
            absent: entries.len() - present,
            bootstrapped: self.bootstrapped,
            bootstrap_skipped: self.bootstrap_skipped,
            directory_lookups: self.directory_lookups.load(Ordering::Relaxed),
            retained_after_failure: self.retained_after_failure.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
