//! Directory stand-in for offline inspection.
//!
//! The CLI works on the durable store alone. Every lookup and listing fails as
//! unavailable, which the cache treats as "keep what is stored".

use async_trait::async_trait;
use edge_identity::{DirectoryError, DirectoryResult, Identity, IdentityDirectory, IdentityPages};

const OFFLINE: &str = "directory not reachable from the inspector";

pub struct OfflineDirectory;

#[async_trait]
impl IdentityDirectory for OfflineDirectory {
    async fn get_device_identity(&self, _device_id: &str) -> DirectoryResult<Option<Identity>> {
        Err(DirectoryError::unavailable(OFFLINE))
    }

    async fn get_module_identity(
        &self,
        _device_id: &str,
        _module_id: &str,
    ) -> DirectoryResult<Option<Identity>> {
        Err(DirectoryError::unavailable(OFFLINE))
    }

    fn identities(&self) -> Box<dyn IdentityPages> {
        Box::new(OfflinePages { fetched: false })
    }
}

struct OfflinePages {
    fetched: bool,
}

#[async_trait]
impl IdentityPages for OfflinePages {
    fn has_next(&self) -> bool {
        !self.fetched
    }

    async fn next_page(&mut self) -> DirectoryResult<Vec<Identity>> {
        self.fetched = true;
        Err(DirectoryError::unavailable(OFFLINE))
    }
}
