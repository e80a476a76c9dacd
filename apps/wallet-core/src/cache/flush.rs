//! Process-wide flush signals for session teardown.
//!
//! Caches subscribe to the named signals they care about and evict
//! themselves when one fires, so session teardown does not require every
//! caller to track which caches exist.

use tokio::sync::broadcast;

/// A named process-wide event that may flush caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushNotification {
    /// The user signed out; all session-scoped data is invalid.
    UserLoggedOut,
    /// A transaction was submitted; balances and fees are about to move.
    TransactionSubmitted,
}

/// Broadcast bus carrying [`FlushNotification`]s.
#[derive(Debug, Clone)]
pub struct FlushBus {
    sender: broadcast::Sender<FlushNotification>,
}

impl FlushBus {
    /// Create a new bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Post a notification to every subscriber.
    pub fn post(&self, notification: FlushNotification) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.sender.send(notification);
    }

    /// Subscribe to all future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FlushNotification> {
        self.sender.subscribe()
    }
}

impl Default for FlushBus {
    fn default() -> Self {
        Self::new()
    }
}
