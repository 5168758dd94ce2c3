//! End-to-end behavior of the device-scope cache against local backends.
//!
//! These tests drive the cache through `InMemoryDirectory` (call counting and
//! failure injection), `InMemoryStore` (shared clones simulate a restart) and
//! `FileStore` (on-disk snapshot in a temp dir).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edge_identity::{
    AuthenticationMechanism, DirectoryError, DirectoryResult, Identity, IdentityDirectory,
    IdentityPages, IdentityStatus, KeyValueStore,
};
use edge_identity_local::{FileStore, InMemoryDirectory, InMemoryStore};
use edge_scope_cache::{
    CycleOutcome, DeviceScopeCache, IdentityChange, ScopeCacheConfig, ScopeEntry, ScopeError,
    ScopeRefreshService, StoredIdentity,
};
use tokio::sync::Notify;

fn device(id: &str) -> Identity {
    Identity::device(
        id,
        "gen-1",
        AuthenticationMechanism::sas("primary", "secondary"),
        IdentityStatus::Enabled,
    )
}

fn module(device_id: &str, module_id: &str) -> Identity {
    Identity::module(
        device_id,
        module_id,
        "gen-1",
        AuthenticationMechanism::x509_ca(),
        IdentityStatus::Enabled,
    )
}

async fn create_cache(
    directory: &InMemoryDirectory,
    store: &InMemoryStore,
    config: &ScopeCacheConfig,
) -> Arc<DeviceScopeCache> {
    Arc::new(
        DeviceScopeCache::create(
            Arc::new(directory.clone()),
            Arc::new(store.clone()),
            config,
        )
        .await
        .unwrap(),
    )
}

#[tokio::test]
async fn test_never_seen_id_is_out_of_scope() {
    let directory = InMemoryDirectory::new();
    let cache = create_cache(
        &directory,
        &InMemoryStore::new(),
        &ScopeCacheConfig::for_testing(),
    )
    .await;

    assert!(cache.get("nobody", false).await.is_none());
    assert!(matches!(
        cache.verify("nobody", false).await,
        Err(ScopeError::OutOfScope { .. })
    ));
    assert_eq!(directory.lookup_count(), 0);
}

#[tokio::test]
async fn test_update_then_removal() {
    let cache = create_cache(
        &InMemoryDirectory::new(),
        &InMemoryStore::new(),
        &ScopeCacheConfig::for_testing(),
    )
    .await;
    let mut changes = cache.subscribe();

    let identity = module("d1", "m1");
    cache.apply_update(identity.clone()).await.unwrap();
    assert_eq!(cache.verify("d1/m1", false).await.unwrap(), identity);

    cache.apply_removal("d1/m1").await.unwrap();
    assert!(matches!(
        cache.verify("d1/m1", false).await,
        Err(ScopeError::OutOfScope { .. })
    ));
    assert_eq!(
        changes.recv().await.unwrap(),
        IdentityChange::Removed {
            id: "d1/m1".to_string()
        }
    );
}

#[tokio::test]
async fn test_repeated_identical_updates_notify_nothing() {
    let cache = create_cache(
        &InMemoryDirectory::new(),
        &InMemoryStore::new(),
        &ScopeCacheConfig::for_testing(),
    )
    .await;
    let mut changes = cache.subscribe();

    for _ in 0..5 {
        cache.apply_update(device("d1")).await.unwrap();
    }
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_restart_restores_records_exactly() {
    let store = InMemoryStore::new();
    let directory = InMemoryDirectory::new();
    let config = ScopeCacheConfig::for_testing();

    let before = {
        let cache = create_cache(&directory, &store, &config).await;
        cache.apply_update(device("d1")).await.unwrap();
        cache.apply_update(module("d1", "m1")).await.unwrap();
        cache.apply_removal("d2").await.unwrap();
        (
            cache.stored("d1").await.unwrap(),
            cache.stored("d1/m1").await.unwrap(),
            cache.stored("d2").await.unwrap(),
        )
    };

    let restarted = create_cache(&directory, &store, &config).await;
    assert_eq!(restarted.stored("d1").await.unwrap(), before.0);
    assert_eq!(restarted.stored("d1/m1").await.unwrap(), before.1);
    assert_eq!(restarted.stored("d2").await.unwrap(), before.2);
    assert_eq!(restarted.stats().await.bootstrapped, 3);

    // The restored absence is a decision, not a miss.
    assert!(restarted.get("d2", true).await.is_none());
    assert_eq!(directory.lookup_count(), 0);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scope.json");
    let directory = InMemoryDirectory::with_identities([device("d1")]);
    let config = ScopeCacheConfig::for_testing();

    {
        let store = Arc::new(FileStore::open(&path).await.unwrap());
        let cache = DeviceScopeCache::create(Arc::new(directory.clone()), store, &config)
            .await
            .unwrap();
        assert!(cache.verify("d1", true).await.is_ok());
        assert!(cache.verify("d9", true).await.is_err());
    }

    // Directory now unreachable; decisions come from disk.
    directory.set_lookup_failure(Some(DirectoryError::unavailable("offline")));
    let store = Arc::new(FileStore::open(&path).await.unwrap());
    let cache = DeviceScopeCache::create(Arc::new(directory.clone()), store, &config)
        .await
        .unwrap();

    assert!(cache.verify("d1", false).await.is_ok());
    assert_eq!(cache.stored("d9").await.unwrap().entry, ScopeEntry::Absent);
}

#[tokio::test]
async fn test_cycle_diff_removes_only_enabled_unlisted() {
    let directory = InMemoryDirectory::with_identities([device("a")]);
    let config = ScopeCacheConfig::for_testing();
    let cache = create_cache(&directory, &InMemoryStore::new(), &config).await;

    cache.apply_update(device("a")).await.unwrap();
    cache.apply_update(device("b")).await.unwrap();
    cache.apply_removal("c").await.unwrap();

    let mut changes = cache.subscribe();
    let service = ScopeRefreshService::new(cache.clone(), &config);
    let outcome = service.run_cycle().await;
    assert!(outcome.is_completed());

    assert!(cache.verify("a", false).await.is_ok());
    assert!(matches!(
        cache.verify("b", false).await,
        Err(ScopeError::OutOfScope { .. })
    ));
    assert_eq!(cache.stored("c").await.unwrap().entry, ScopeEntry::Absent);

    assert_eq!(
        changes.try_recv().unwrap(),
        IdentityChange::Removed {
            id: "b".to_string()
        }
    );
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_stale_record_refreshed_once_on_verify() {
    let store = InMemoryStore::new();
    let old = StoredIdentity::present(device("d1"))
        .with_timestamp(time::OffsetDateTime::now_utc() - time::Duration::minutes(3));
    store.put("d1", old.encode().unwrap()).await.unwrap();

    let directory = InMemoryDirectory::with_identities([device("d1")]);
    let config = ScopeCacheConfig::for_testing().with_refresh_delay(Duration::from_secs(120));
    let cache = create_cache(&directory, &store, &config).await;

    assert!(cache.verify("d1", false).await.is_ok());
    assert_eq!(directory.lookup_count(), 0);

    assert!(cache.verify("d1", true).await.is_ok());
    assert_eq!(directory.lookup_count(), 1);
    assert!(cache.stored("d1").await.unwrap().timestamp > old.timestamp);

    // Fresh now.
    assert!(cache.verify("d1", true).await.is_ok());
    assert_eq!(directory.lookup_count(), 1);
}

#[tokio::test]
async fn test_stale_record_removed_when_directory_disowns_it() {
    let store = InMemoryStore::new();
    let old = StoredIdentity::present(device("d1"))
        .with_timestamp(time::OffsetDateTime::now_utc() - time::Duration::minutes(3));
    store.put("d1", old.encode().unwrap()).await.unwrap();

    let directory = InMemoryDirectory::new();
    directory.mark_invalid("d1");
    let config = ScopeCacheConfig::for_testing().with_refresh_delay(Duration::from_secs(120));
    let cache = create_cache(&directory, &store, &config).await;

    assert!(matches!(
        cache.verify("d1", true).await,
        Err(ScopeError::OutOfScope { .. })
    ));
    assert_eq!(directory.lookup_count(), 1);
}

#[tokio::test]
async fn test_outage_keeps_last_known_decisions() {
    let directory = InMemoryDirectory::with_identities([device("a"), device("b")]);
    let config = ScopeCacheConfig::for_testing().with_refresh_delay(Duration::ZERO);
    let cache = create_cache(&directory, &InMemoryStore::new(), &config).await;
    let service = ScopeRefreshService::new(cache.clone(), &config);
    service.run_cycle().await;

    directory.set_lookup_failure(Some(DirectoryError::timeout("lookup")));
    directory.fail_listing_at_page(0, DirectoryError::service(503, "unavailable"));

    assert!(matches!(
        service.run_cycle().await,
        CycleOutcome::Aborted { .. }
    ));

    // Zero refresh delay makes every record stale; the failed refresh keeps it.
    assert!(cache.verify("a", true).await.is_ok());
    assert!(cache.verify("b", true).await.is_ok());
    assert!(cache.get("c", true).await.is_none());
    assert!(!cache.contains("c").await);
}

#[tokio::test]
async fn test_concurrent_updates_for_distinct_ids() {
    let store = InMemoryStore::new();
    let cache = create_cache(
        &InMemoryDirectory::new(),
        &store,
        &ScopeCacheConfig::for_testing(),
    )
    .await;

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.apply_update(device(&format!("d{i}"))).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(cache.len().await, 32);
    assert_eq!(store.len(), 32);
    for i in 0..32 {
        let id = format!("d{i}");
        assert!(cache.verify(&id, false).await.is_ok());
        let persisted = store.get(&id).await.unwrap().unwrap();
        assert_eq!(
            StoredIdentity::decode(&id, &persisted).unwrap(),
            cache.stored(&id).await.unwrap()
        );
    }
}

/// Directory whose lookups block until released.
struct GatedDirectory {
    inner: InMemoryDirectory,
    gate: Arc<Notify>,
}

#[async_trait]
impl IdentityDirectory for GatedDirectory {
    async fn get_device_identity(&self, device_id: &str) -> DirectoryResult<Option<Identity>> {
        self.gate.notified().await;
        self.inner.get_device_identity(device_id).await
    }

    async fn get_module_identity(
        &self,
        device_id: &str,
        module_id: &str,
    ) -> DirectoryResult<Option<Identity>> {
        self.gate.notified().await;
        self.inner.get_module_identity(device_id, module_id).await
    }

    fn identities(&self) -> Box<dyn IdentityPages> {
        self.inner.identities()
    }
}

#[tokio::test]
async fn test_pending_lookup_does_not_block_other_callers() {
    let gate = Arc::new(Notify::new());
    let directory = GatedDirectory {
        inner: InMemoryDirectory::with_identities([device("slow")]),
        gate: Arc::clone(&gate),
    };
    let cache = Arc::new(
        DeviceScopeCache::create(
            Arc::new(directory),
            Arc::new(InMemoryStore::new()),
            &ScopeCacheConfig::for_testing(),
        )
        .await
        .unwrap(),
    );
    cache.apply_update(device("fast")).await.unwrap();

    let pending = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.verify("slow", true).await }
    });

    tokio::task::yield_now().await;

    // The lookup for "slow" is parked in the directory; other ids still answer.
    let fast = tokio::time::timeout(Duration::from_secs(1), cache.verify("fast", false))
        .await
        .expect("verify blocked behind a directory call");
    assert!(fast.is_ok());

    gate.notify_one();
    assert!(pending.await.unwrap().is_ok());
}
