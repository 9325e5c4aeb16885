//! Main SyncManager tying the connection, registry, router and log together.

use crate::clock::{Clock, SystemClock};
use crate::connection::ConnectionManager;
use crate::error::{Result, SyncError};
use crate::events::{ChannelEvent, EventRouter, InboundKind};
use crate::notifications::{NotificationLog, DEFAULT_CAPACITY, DEFAULT_RECENT_WINDOW};
use crate::subscriptions::{EventCallback, SubscriptionHandle, SubscriptionRegistry};
use crate::transport::{wire, Transport, TransportFactory};
use crate::types::{Channel, ConnectionState, ProjectId, SubscriptionId, UserIdentity};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Manager configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Origin server address, handed to the transport factory.
    pub server_url: String,

    /// How long `connect` waits before failing the attempt.
    /// Default: 20s
    pub connect_timeout: Duration,

    /// Notification log capacity.
    /// Default: 50
    pub notification_capacity: usize,

    /// Window used by `NotificationLog::has_recent`.
    /// Default: 5 minutes
    pub recent_window: Duration,

    /// Re-send watch commands for every active channel after each
    /// reconnect. When false, only channels never watched are sent.
    pub replay_watches_on_reconnect: bool,

    /// User on whose behalf the recycle-bin channel is joined.
    pub identity: Option<UserIdentity>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            connect_timeout: Duration::from_secs(20),
            notification_capacity: DEFAULT_CAPACITY,
            recent_window: DEFAULT_RECENT_WINDOW,
            replay_watches_on_reconnect: true,
            identity: None,
        }
    }
}

struct Shared {
    config: SyncConfig,
    factory: Arc<dyn TransportFactory>,
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    notifications: NotificationLog,
    last_summary: RwLock<Option<Value>>,
}

impl Shared {
    fn router(&self) -> EventRouter<'_> {
        EventRouter::new(&self.registry, &self.notifications, &self.last_summary)
    }

    fn handle_connected(&self, generation: u64) {
        if let Some(session) = self.connection.on_connected(generation) {
            let restored = self.registry.replay(&self.connection);
            debug!(session, restored, "Session started");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.connection.teardown();
    }
}

/// Register the lifecycle handlers and one handler per inbound event kind.
fn install_handlers(transport: &Arc<dyn Transport>, generation: u64, shared: Weak<Shared>) {
    let weak = shared.clone();
    transport.on(
        wire::CONNECT,
        Arc::new(move |_: Value| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_connected(generation);
            }
        }),
    );

    let weak = shared.clone();
    transport.on(
        wire::CONNECT_ERROR,
        Arc::new(move |payload: Value| {
            if let Some(shared) = weak.upgrade() {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| payload.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| payload.to_string());
                shared.connection.on_connect_error(generation, message);
            }
        }),
    );

    let weak = shared.clone();
    transport.on(
        wire::DISCONNECT,
        Arc::new(move |payload: Value| {
            if let Some(shared) = weak.upgrade() {
                let reason = payload.as_str().unwrap_or("unknown");
                shared.connection.on_disconnected(generation, reason);
            }
        }),
    );

    for kind in InboundKind::ALL {
        let weak = shared.clone();
        transport.on(
            kind.wire_name(),
            Arc::new(move |payload: Value| {
                if let Some(shared) = weak.upgrade() {
                    if shared.connection.is_current(generation) {
                        shared.router().route(kind, payload);
                    }
                }
            }),
        );
    }
}

/// The live-sync manager.
///
/// Create one per process and hand clones to consumers; all clones share
/// the same connection, channel registry and notification log.
#[derive(Clone)]
pub struct SyncManager {
    shared: Arc<Shared>,
}

impl SyncManager {
    pub fn new(config: SyncConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self::with_clock(config, factory, Arc::new(SystemClock))
    }

    /// Create a manager whose notification timestamps come from `clock`.
    pub fn with_clock(
        config: SyncConfig,
        factory: Arc<dyn TransportFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Shared {
            connection: ConnectionManager::new(config.connect_timeout),
            registry: SubscriptionRegistry::new(
                config.identity.clone(),
                config.replay_watches_on_reconnect,
            ),
            notifications: NotificationLog::with_window(
                config.notification_capacity,
                config.recent_window,
                clock,
            ),
            last_summary: RwLock::new(None),
            factory,
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    // --- Connection ---

    /// Return the live transport, connecting if needed. Concurrent callers
    /// share a single attempt.
    pub fn connect(&self) -> Result<Arc<dyn Transport>> {
        let weak = Arc::downgrade(&self.shared);
        self.shared.connection.connect(
            &*self.shared.factory,
            &self.shared.config,
            move |transport, generation| install_handlers(transport, generation, weak),
        )
    }

    /// Release the transport and drop every subscription and notification
    /// listener. Logged notifications are kept. Idempotent.
    pub fn disconnect(&self) {
        let released = self.shared.connection.teardown();
        self.shared.registry.clear();
        self.shared.notifications.clear_listeners();
        if released {
            info!("Sync manager disconnected");
        }
    }

    /// Disconnect and also clear the notification log. Call at shutdown.
    pub fn teardown(&self) {
        self.disconnect();
        self.shared.notifications.clear();
        *self.shared.last_summary.write() = None;
    }

    /// Whether the connection is established.
    pub fn connection_status(&self) -> bool {
        self.shared.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    // --- Subscriptions ---

    /// Subscribe `callback` to `channel`, connecting first if needed.
    pub fn subscribe<F>(&self, channel: Channel, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe_as(channel, None, Arc::new(callback))
    }

    /// Subscribe to folder changes of one project.
    pub fn subscribe_project<F>(
        &self,
        project_id: impl Into<ProjectId>,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe(Channel::Project(project_id.into()), callback)
    }

    /// Subscribe to recycle-bin events on behalf of `identity`.
    ///
    /// If the room is already joined, it stays joined as the earlier user.
    pub fn subscribe_recycle_bin<F>(
        &self,
        identity: UserIdentity,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe_as(Channel::RecycleBin, Some(identity), Arc::new(callback))
    }

    fn subscribe_as(
        &self,
        channel: Channel,
        identity: Option<UserIdentity>,
        callback: EventCallback,
    ) -> Result<SubscriptionHandle> {
        let registry = &self.shared.registry;
        if channel == Channel::RecycleBin && identity.is_none() && registry.identity().is_none() {
            return Err(SyncError::MissingIdentity);
        }

        self.connect()?;
        let id = registry.insert_as(channel.clone(), callback, identity, &self.shared.connection)?;

        let weak = Arc::downgrade(&self.shared);
        let release_channel = channel.clone();
        Ok(SubscriptionHandle::new(id, channel, move || {
            if let Some(shared) = weak.upgrade() {
                shared
                    .registry
                    .remove(&release_channel, id, &shared.connection);
            }
        }))
    }

    /// Remove one subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, channel: &Channel, id: SubscriptionId) -> bool {
        self.shared
            .registry
            .remove(channel, id, &self.shared.connection)
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.shared.registry.subscriber_count(channel)
    }

    pub fn active_channels(&self) -> Vec<Channel> {
        self.shared.registry.channels()
    }

    // --- Recycle bin ---

    /// Ask the server for recycle-bin statistics. The answer arrives as a
    /// `RecycleBinSummary` event on the recycle-bin channel.
    pub fn request_recycle_bin_summary(&self, user_id: &str) -> Result<()> {
        let transport = self.connect()?;
        transport.emit(wire::GET_RECYCLE_BIN_SUMMARY, json!({ "userId": user_id }))
    }

    /// The most recent summary received, if any.
    pub fn last_recycle_bin_summary(&self) -> Option<Value> {
        self.shared.last_summary.read().clone()
    }

    pub fn notifications(&self) -> &NotificationLog {
        &self.shared.notifications
    }
}
