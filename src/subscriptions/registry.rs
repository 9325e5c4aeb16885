//! Channel registry with upstream watch ref-counting.

use crate::connection::{ConnectionManager, Session};
use crate::error::{Result, SyncError};
use crate::types::{Channel, SubscriptionId, UpstreamCommand, UserIdentity};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::EventCallback;

/// Internal per-channel state. Exists only while it has callbacks.
struct ChannelEntry {
    callbacks: Vec<(SubscriptionId, EventCallback)>,
    /// Session in which the watch command was last sent.
    watched_session: Option<u64>,
}

/// Maps channels to their callbacks and sends watch/unwatch commands on the
/// 0 -> 1 and 1 -> 0 transitions.
///
/// The channel map lock is held across the upstream emit so that concurrent
/// subscribe/unsubscribe calls for the same channel produce exactly one
/// command per transition, in order.
pub struct SubscriptionRegistry {
    channels: Mutex<HashMap<Channel, ChannelEntry>>,
    identity: RwLock<Option<UserIdentity>>,
    /// Re-send watches on every new session rather than only once.
    replay_on_reconnect: bool,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(identity: Option<UserIdentity>, replay_on_reconnect: bool) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            identity: RwLock::new(identity),
            replay_on_reconnect,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.identity.read().clone()
    }

    /// Identity used when joining the recycle-bin channel.
    pub fn set_identity(&self, identity: UserIdentity) {
        *self.identity.write() = Some(identity);
    }

    /// Add a callback to `channel`, watching it upstream if it is new to
    /// the current session.
    pub fn insert(
        &self,
        channel: Channel,
        callback: EventCallback,
        connection: &ConnectionManager,
    ) -> Result<SubscriptionId> {
        self.insert_as(channel, callback, None, connection)
    }

    /// [`insert`](Self::insert) on behalf of `identity`.
    ///
    /// The identity is adopted only when the recycle-bin channel has no
    /// subscribers yet; an already joined room keeps the identity it was
    /// joined with.
    pub fn insert_as(
        &self,
        channel: Channel,
        callback: EventCallback,
        identity: Option<UserIdentity>,
        connection: &ConnectionManager,
    ) -> Result<SubscriptionId> {
        let mut channels = self.channels.lock();
        if let (Channel::RecycleBin, Some(identity)) = (&channel, identity) {
            if !channels.contains_key(&channel) {
                *self.identity.write() = Some(identity);
            } else if self.identity().as_ref() != Some(&identity) {
                warn!(
                    user = %identity.user_id,
                    "Recycle bin already joined as another user, keeping that identity"
                );
            }
        }

        let identity = self.identity();
        if channel == Channel::RecycleBin && identity.is_none() {
            return Err(SyncError::MissingIdentity);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = channels
            .entry(channel.clone())
            .or_insert_with(|| ChannelEntry {
                callbacks: Vec::new(),
                watched_session: None,
            });
        entry.callbacks.push((id, callback));
        debug!(%channel, subscription = id.0, subscribers = entry.callbacks.len(), "Subscribed");

        if let Some(session) = connection.session() {
            if self.needs_watch(entry, &session) {
                match channel.watch_command(identity.as_ref()) {
                    Ok(command) => {
                        if send(&session, &channel, command) {
                            entry.watched_session = Some(session.id);
                        }
                    }
                    Err(e) => warn!(%channel, error = %e, "Cannot watch channel"),
                }
            }
        }
        Ok(id)
    }

    /// Remove a callback. Unknown channels or ids are ignored.
    ///
    /// Returns whether a callback was removed.
    pub fn remove(
        &self,
        channel: &Channel,
        id: SubscriptionId,
        connection: &ConnectionManager,
    ) -> bool {
        let mut channels = self.channels.lock();
        let Some(entry) = channels.get_mut(channel) else {
            return false;
        };

        let before = entry.callbacks.len();
        entry.callbacks.retain(|(sid, _)| *sid != id);
        if entry.callbacks.len() == before {
            return false;
        }
        debug!(%channel, subscription = id.0, subscribers = entry.callbacks.len(), "Unsubscribed");

        if entry.callbacks.is_empty() {
            if let Some(entry) = channels.remove(channel) {
                if let (Some(session), Some(command)) =
                    (connection.session(), channel.unwatch_command())
                {
                    if self.is_watched(&entry, &session) {
                        send(&session, channel, command);
                    }
                }
            }
        }
        true
    }

    /// Send watch commands for every channel not yet watched in the current
    /// session. Called when the transport (re)connects.
    ///
    /// Returns the number of commands sent.
    pub fn replay(&self, connection: &ConnectionManager) -> usize {
        let mut channels = self.channels.lock();
        let Some(session) = connection.session() else {
            return 0;
        };
        let identity = self.identity();

        let mut sent = 0;
        for (channel, entry) in channels.iter_mut() {
            if !self.needs_watch(entry, &session) {
                continue;
            }
            match channel.watch_command(identity.as_ref()) {
                Ok(command) => {
                    if send(&session, channel, command) {
                        entry.watched_session = Some(session.id);
                        sent += 1;
                    }
                }
                Err(e) => warn!(%channel, error = %e, "Cannot restore watch"),
            }
        }
        if sent > 0 {
            debug!(session = session.id, sent, "Restored channel watches");
        }
        sent
    }

    /// Snapshot of the callbacks on `channel`, in subscription order.
    pub fn callbacks(&self, channel: &Channel) -> Vec<(SubscriptionId, EventCallback)> {
        self.channels
            .lock()
            .get(channel)
            .map(|entry| entry.callbacks.clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, |entry| entry.callbacks.len())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.lock().keys().cloned().collect()
    }

    /// Drop every channel without sending unwatch commands.
    pub fn clear(&self) {
        self.channels.lock().clear();
    }

    fn needs_watch(&self, entry: &ChannelEntry, session: &Session) -> bool {
        if self.replay_on_reconnect {
            entry.watched_session != Some(session.id)
        } else {
            entry.watched_session.is_none()
        }
    }

    fn is_watched(&self, entry: &ChannelEntry, session: &Session) -> bool {
        if self.replay_on_reconnect {
            entry.watched_session == Some(session.id)
        } else {
            entry.watched_session.is_some()
        }
    }
}

fn send(session: &Session, channel: &Channel, command: UpstreamCommand) -> bool {
    match session.transport.emit(command.event, command.payload) {
        Ok(()) => {
            debug!(%channel, event = command.event, session = session.id, "Sent upstream command");
            true
        }
        Err(e) => {
            warn!(%channel, event = command.event, error = %e, "Upstream command failed");
            false
        }
    }
}
