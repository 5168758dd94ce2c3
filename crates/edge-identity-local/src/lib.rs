//! Local backends for the edge device-scope cache.
//!
//! This crate provides implementations of the collaborator traits from
//! `edge-identity`:
//!
//! - [`InMemoryStore`] - a [`KeyValueStore`] over a papaya lock-free map
//! - [`FileStore`] - a crash-safe [`KeyValueStore`] persisted as a JSON snapshot
//! - [`InMemoryDirectory`] - an [`IdentityDirectory`] with paging, call counting
//!   and failure injection
//!
//! # Example
//!
//! ```ignore
//! use edge_identity_local::{FileStore, InMemoryDirectory};
//!
//! let store = FileStore::open("/var/lib/edge/scope.json").await?;
//! let directory = InMemoryDirectory::new();
//! ```

mod directory;
mod file;
mod memory;

pub use directory::InMemoryDirectory;
pub use edge_identity::{IdentityDirectory, KeyValueStore};
pub use file::FileStore;
pub use memory::InMemoryStore;
