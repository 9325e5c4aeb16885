//! Core types for the live-sync manager.

use crate::error::{Result, SyncError};
use crate::transport::wire;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(millis)
            .unwrap_or(0);
        Timestamp(ms)
    }

    /// This timestamp shifted forward by `duration`.
    pub fn after(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(millis(duration)))
    }

    /// Whether this timestamp lies within `window` before `now`.
    ///
    /// Timestamps ahead of `now` (clock skew) count as recent.
    pub fn is_within(self, window: Duration, now: Timestamp) -> bool {
        now.0.saturating_sub(self.0) <= millis(window)
    }
}

/// Whole milliseconds in `duration`, saturating at `i64::MAX`.
pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Identifier of a project whose folder tree is watched upstream.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({})", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        ProjectId(s.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        ProjectId(s)
    }
}

/// The user on whose behalf the recycle-bin channel is joined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub user_role: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, user_role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_role: user_role.into(),
        }
    }
}

/// A named stream of server events.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Folder-change events for a single project.
    Project(ProjectId),
    /// Global recycle-bin lifecycle events.
    RecycleBin,
}

impl Channel {
    /// Scoped channel for a project.
    pub fn project(id: impl Into<ProjectId>) -> Self {
        Channel::Project(id.into())
    }

    /// Command that starts upstream delivery for this channel.
    pub fn watch_command(&self, identity: Option<&UserIdentity>) -> Result<UpstreamCommand> {
        match self {
            Channel::Project(id) => Ok(UpstreamCommand::new(
                wire::SUBSCRIBE_PROJECT,
                json!(id.as_str()),
            )),
            Channel::RecycleBin => {
                let identity = identity.ok_or(SyncError::MissingIdentity)?;
                Ok(UpstreamCommand::new(
                    wire::JOIN_RECYCLE_BIN_UPDATES,
                    serde_json::to_value(identity)?,
                ))
            }
        }
    }

    /// Command that stops upstream delivery, if the server has one.
    ///
    /// The recycle-bin room is left implicitly when the connection closes.
    pub fn unwatch_command(&self) -> Option<UpstreamCommand> {
        match self {
            Channel::Project(id) => Some(UpstreamCommand::new(
                wire::UNSUBSCRIBE_PROJECT,
                json!(id.as_str()),
            )),
            Channel::RecycleBin => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Project(id) => write!(f, "project:{}", id),
            Channel::RecycleBin => write!(f, "recycle-bin"),
        }
    }
}

/// An outbound command for the origin server.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamCommand {
    pub event: &'static str,
    pub payload: Value,
}

impl UpstreamCommand {
    pub fn new(event: &'static str, payload: Value) -> Self {
        Self { event, payload }
    }
}

/// State of the single upstream connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Unique identifier for a logged notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(pub u64);

/// Unique identifier for a notification listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);
