//! # edge-identity
//!
//! Identity model and collaborator traits for the edge device-scope cache.
//!
//! This crate defines the types and traits the scope cache consumes. It does not
//! contain any implementations - those are provided by separate crates.
//!
//! ## Overview
//!
//! - [`Identity`] - a device or module identity as published by the identity
//!   directory, compared by full equality
//! - [`IdentityKey`] - parsed form of a cache id (`deviceId` or `deviceId/moduleId`)
//! - [`IdentityDirectory`] / [`IdentityPages`] - the upstream identity directory
//!   (single-id lookup plus paginated listing)
//! - [`KeyValueStore`] - the durable key→string store the cache writes through to
//!
//! ## Implementing a directory
//!
//! ```ignore
//! use async_trait::async_trait;
//! use edge_identity::{DirectoryResult, Identity, IdentityDirectory, IdentityPages};
//!
//! struct HubDirectory { /* client handle */ }
//!
//! #[async_trait]
//! impl IdentityDirectory for HubDirectory {
//!     async fn get_device_identity(&self, device_id: &str) -> DirectoryResult<Option<Identity>> {
//!         // call the upstream service
//!     }
//!     // ... other methods
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{DirectoryError, DirectoryResult, ErrorCategory, StoreError, StoreResult};
pub use traits::{IdentityDirectory, IdentityPages, KeyValueStore, StoreVisitor};
pub use types::{
    AuthenticationMechanism, AuthenticationType, Identity, IdentityKey, IdentityStatus,
    SymmetricKeys, X509Thumbprints,
};
