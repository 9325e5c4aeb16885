//! Subscription types.

use crate::events::ChannelEvent;
use crate::types::{Channel, SubscriptionId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Callback invoked for every event on a subscribed channel.
pub type EventCallback = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

type Release = Box<dyn FnOnce() + Send>;

/// Handle to cancel a subscription.
///
/// Cancelling is idempotent and safe after the manager has disconnected or
/// been dropped. Dropping the handle does not cancel the subscription.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    channel: Channel,
    release: Mutex<Option<Release>>,
}

impl SubscriptionHandle {
    pub(crate) fn new<F>(id: SubscriptionId, channel: Channel, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            channel,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Whether `unsubscribe` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }

    /// Cancel this subscription.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}
