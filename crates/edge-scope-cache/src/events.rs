//! Identity change notifications.
//!
//! The cache publishes an [`IdentityChange`] whenever a refresh changes what
//! it knows about an identity in a way connected clients care about:
//!
//! - [`IdentityChange::Updated`] - an identity already in scope changed (for
//!   example rotated keys or a status flip)
//! - [`IdentityChange::Removed`] - a previously enabled identity left scope
//!
//! Notifications are sent after the cache lock is released, at most once per
//! logical change. Subscribers that fall behind by more than the channel
//! capacity observe `RecvError::Lagged` and should resynchronize with
//! [`DeviceScopeCache::get`](crate::DeviceScopeCache::get).
//!
//! # Example
//!
//! ```ignore
//! let mut changes = cache.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(change) = changes.recv().await {
//!         if let IdentityChange::Removed { id } = change {
//!             connections.close(&id).await;
//!         }
//!     }
//! });
//! ```

use edge_identity::Identity;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::DEFAULT_NOTIFICATION_CAPACITY;

/// A change to a cached identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    /// An in-scope identity was replaced by a different one.
    Updated {
        /// The new identity.
        identity: Identity,
    },
    /// A previously enabled identity is no longer in scope.
    Removed {
        /// The id that left scope.
        id: String,
    },
}

impl IdentityChange {
    /// Returns the cache id this change applies to.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Updated { identity } => identity.id(),
            Self::Removed { id } => id.clone(),
        }
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

/// Broadcast channel for identity change notifications.
///
/// Multiple subscribers each receive every notification sent after they
/// subscribed.
#[derive(Debug)]
pub struct IdentityChangeNotifier {
    sender: broadcast::Sender<IdentityChange>,
}

impl IdentityChangeNotifier {
    /// Create a new notifier.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of pending notifications per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Notify all subscribers of a change.
    ///
    /// Returns the number of subscribers the change was delivered to. With no
    /// subscribers the notification is dropped.
    pub fn notify(&self, change: IdentityChange) -> usize {
        let id = change.id();
        let delivered = self.sender.send(change).unwrap_or(0);
        debug!(id = %id, subscribers = delivered, "Emitted identity change");
        delivered
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityChange> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for IdentityChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_identity::{AuthenticationMechanism, IdentityStatus};

    fn identity() -> Identity {
        Identity::module(
            "d1",
            "m1",
            "g1",
            AuthenticationMechanism::none(),
            IdentityStatus::Enabled,
        )
    }

    #[test]
    fn test_change_id() {
        assert_eq!(
            IdentityChange::Updated {
                identity: identity()
            }
            .id(),
            "d1/m1"
        );
        let removed = IdentityChange::Removed {
            id: "d2".to_string(),
        };
        assert_eq!(removed.id(), "d2");
        assert!(removed.is_removal());
    }

    #[tokio::test]
    async fn test_notifier_multiple_subscribers() {
        let notifier = IdentityChangeNotifier::new(16);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        let delivered = notifier.notify(IdentityChange::Removed {
            id: "d1".to_string(),
        });
        assert_eq!(delivered, 2);

        assert_eq!(first.recv().await.unwrap(), second.recv().await.unwrap());
    }

    #[test]
    fn test_notifier_no_subscribers() {
        let notifier = IdentityChangeNotifier::default();
        assert_eq!(
            notifier.notify(IdentityChange::Removed {
                id: "d1".to_string()
            }),
            0
        );
    }
}
