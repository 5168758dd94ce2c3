//! Device-scope identity cache for edge gateways.
//!
//! The gateway authorizes downstream devices and modules against the set of
//! identities an upstream directory places in its scope. This crate keeps that
//! set locally so authorization keeps working through directory outages and
//! gateway restarts.
//!
//! # Components
//!
//! - [`DeviceScopeCache`] - in-memory records mirrored into a durable
//!   [`KeyValueStore`](edge_identity::KeyValueStore); answers
//!   [`verify`](DeviceScopeCache::verify) and [`get`](DeviceScopeCache::get)
//! - [`ScopeRefreshService`] - periodic and on-demand reconciliation against
//!   the full directory listing
//! - [`IdentityChangeNotifier`] - broadcast of [`IdentityChange`] events for
//!   connection management
//! - [`StoredIdentity`] - the persisted record, including explicit absence
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_scope_cache::{DeviceScopeCache, ScopeCacheConfig, ScopeRefreshService};
//!
//! let config = ScopeCacheConfig::load("scope-cache.toml")?;
//! let cache = Arc::new(DeviceScopeCache::create(directory, store, &config).await?);
//!
//! let refresh = Arc::new(ScopeRefreshService::new(cache.clone(), &config));
//! let handle = refresh.start();
//!
//! let identity = cache.verify("device-1/module-a", true).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod record;
pub mod refresh;

pub use cache::{DeviceScopeCache, RefreshOutcome, RefreshSummary, ScopeCacheStats};
pub use config::{
    ConfigError, DEFAULT_NOTIFICATION_CAPACITY, DEFAULT_REFRESH_DELAY, DEFAULT_REFRESH_RATE,
    ScopeCacheConfig,
};
pub use error::{ErrorCategory, ScopeError, ScopeResult};
pub use events::{IdentityChange, IdentityChangeNotifier};
pub use record::{ScopeEntry, StoredIdentity};
pub use refresh::{CycleOutcome, CycleReport, RefreshState, RefreshStats, ScopeRefreshService};
