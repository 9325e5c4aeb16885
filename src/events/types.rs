//! Normalized events handed to subscriber callbacks.

use crate::types::{Channel, NotificationId, ProjectId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What happened to an entry in a watched folder tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FolderChangeKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
    #[serde(other)]
    Other,
}

/// Kind of a recycle-bin lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecycleBinEventKind {
    FileDeleted,
    FolderDeleted,
    ItemRestored,
    ItemPermanentlyDeleted,
    BinEmptied,
    CleanupCompleted,
    /// Any kind this crate does not know by name.
    Other(String),
}

impl RecycleBinEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            RecycleBinEventKind::FileDeleted => "file_deleted",
            RecycleBinEventKind::FolderDeleted => "folder_deleted",
            RecycleBinEventKind::ItemRestored => "item_restored",
            RecycleBinEventKind::ItemPermanentlyDeleted => "item_permanently_deleted",
            RecycleBinEventKind::BinEmptied => "recycle_bin_emptied",
            RecycleBinEventKind::CleanupCompleted => "cleanup_completed",
            RecycleBinEventKind::Other(s) => s,
        }
    }
}

impl From<&str> for RecycleBinEventKind {
    fn from(s: &str) -> Self {
        match s {
            "file_deleted" => RecycleBinEventKind::FileDeleted,
            "folder_deleted" => RecycleBinEventKind::FolderDeleted,
            "item_restored" => RecycleBinEventKind::ItemRestored,
            "item_permanently_deleted" => RecycleBinEventKind::ItemPermanentlyDeleted,
            "recycle_bin_emptied" => RecycleBinEventKind::BinEmptied,
            "cleanup_completed" => RecycleBinEventKind::CleanupCompleted,
            other => RecycleBinEventKind::Other(other.to_string()),
        }
    }
}

impl From<String> for RecycleBinEventKind {
    fn from(s: String) -> Self {
        RecycleBinEventKind::from(s.as_str())
    }
}

impl From<RecycleBinEventKind> for String {
    fn from(kind: RecycleBinEventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RecycleBinEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which inbound event a recycle-bin notice arrived as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSource {
    /// `recycle_bin_event`
    Event,
    /// `recycleBin`
    General,
    /// `recycle_bin_update`, raised by the server's filesystem watcher.
    Watcher,
}

/// A change inside a project's folder tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FolderChange {
    pub project_id: ProjectId,
    pub event_type: FolderChangeKind,
    pub file_name: String,
    pub relative_path: String,
    pub is_folder: bool,
    pub timestamp: Timestamp,
}

/// A recycle-bin lifecycle event, as logged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecycleBinNotice {
    /// Id of the matching record in the notification log.
    pub id: NotificationId,
    pub kind: RecycleBinEventKind,
    pub source: NoticeSource,
    pub data: Value,
    pub timestamp: Timestamp,
}

/// Event delivered to channel subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A project folder changed.
    Folder(FolderChange),
    /// A recycle-bin lifecycle event.
    RecycleBin(RecycleBinNotice),
    /// Aggregate recycle-bin statistics.
    RecycleBinSummary { summary: Value },
    /// The server reported a failed recycle-bin operation.
    RecycleBinError { message: String },
}

impl ChannelEvent {
    /// The channel this event is delivered on.
    pub fn channel(&self) -> Channel {
        match self {
            ChannelEvent::Folder(change) => Channel::Project(change.project_id.clone()),
            _ => Channel::RecycleBin,
        }
    }
}
