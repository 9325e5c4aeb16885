//! Decoding of inbound wire payloads into a closed set of events.

use super::types::{FolderChange, FolderChangeKind, NoticeSource, RecycleBinEventKind};
use crate::error::{Result, SyncError};
use crate::transport::wire;
use crate::types::{ProjectId, Timestamp};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Inbound event names the router listens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InboundKind {
    FolderSync,
    RecycleBinEvent,
    RecycleBin,
    RecycleBinUpdate,
    RecycleBinSummary,
    RecycleBinError,
}

impl InboundKind {
    pub const ALL: [InboundKind; 6] = [
        InboundKind::FolderSync,
        InboundKind::RecycleBinEvent,
        InboundKind::RecycleBin,
        InboundKind::RecycleBinUpdate,
        InboundKind::RecycleBinSummary,
        InboundKind::RecycleBinError,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            InboundKind::FolderSync => wire::FOLDER_SYNC,
            InboundKind::RecycleBinEvent => wire::RECYCLE_BIN_EVENT,
            InboundKind::RecycleBin => wire::RECYCLE_BIN,
            InboundKind::RecycleBinUpdate => wire::RECYCLE_BIN_UPDATE,
            InboundKind::RecycleBinSummary => wire::RECYCLE_BIN_SUMMARY,
            InboundKind::RecycleBinError => wire::RECYCLE_BIN_ERROR,
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

/// A timestamp as sent by the server: epoch milliseconds or RFC 3339 text.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn resolve(&self) -> Option<Timestamp> {
        match self {
            WireTimestamp::Millis(ms) => Some(Timestamp(*ms)),
            WireTimestamp::Text(text) => text
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    chrono::DateTime::parse_from_rfc3339(text)
                        .ok()
                        .map(|dt| dt.timestamp_millis())
                })
                .map(Timestamp),
        }
    }
}

/// Payload of `folder_sync`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSyncPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub project_id: String,
    pub event_type: FolderChangeKind,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub relative_path: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
}

impl FolderSyncPayload {
    /// Normalize, stamping with `received_at` when the server sent no
    /// usable timestamp.
    pub fn into_change(self, received_at: Timestamp) -> FolderChange {
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(WireTimestamp::resolve)
            .unwrap_or(received_at);

        FolderChange {
            project_id: ProjectId(self.project_id),
            event_type: self.event_type,
            file_name: self.file_name,
            relative_path: self.relative_path,
            is_folder: self.is_folder,
            timestamp,
        }
    }
}

/// Payload of `recycle_bin_event` and `recycleBin`.
#[derive(Clone, Debug, Deserialize)]
struct LifecyclePayload {
    #[serde(alias = "type")]
    event: RecycleBinEventKind,
    #[serde(default)]
    data: Value,
}

/// Payload of `recycle_bin_error`.
#[derive(Clone, Debug, Deserialize)]
struct ErrorPayload {
    #[serde(alias = "message")]
    error: String,
}

/// An inbound event after decoding.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    FolderSync(FolderSyncPayload),
    Lifecycle {
        source: NoticeSource,
        kind: RecycleBinEventKind,
        data: Value,
    },
    Summary(Value),
    Error(String),
}

impl InboundEvent {
    /// Decode a raw payload received under `kind`'s wire name.
    pub fn decode(kind: InboundKind, payload: Value) -> Result<Self> {
        match kind {
            InboundKind::FolderSync => {
                let payload: FolderSyncPayload = serde_json::from_value(payload)?;
                if payload.project_id.is_empty() {
                    return Err(SyncError::Protocol("folder_sync without projectId".into()));
                }
                Ok(InboundEvent::FolderSync(payload))
            }
            InboundKind::RecycleBinEvent | InboundKind::RecycleBin => {
                let LifecyclePayload { event, data } = serde_json::from_value(payload)?;
                let source = if kind == InboundKind::RecycleBinEvent {
                    NoticeSource::Event
                } else {
                    NoticeSource::General
                };
                Ok(InboundEvent::Lifecycle {
                    source,
                    kind: event,
                    data,
                })
            }
            InboundKind::RecycleBinUpdate => {
                let object = payload.as_object().ok_or_else(|| {
                    SyncError::Protocol("recycle_bin_update payload is not an object".into())
                })?;
                let kind = object
                    .get("event")
                    .or_else(|| object.get("type"))
                    .and_then(Value::as_str)
                    .map(RecycleBinEventKind::from)
                    .unwrap_or(RecycleBinEventKind::FileDeleted);
                Ok(InboundEvent::Lifecycle {
                    source: NoticeSource::Watcher,
                    kind,
                    data: payload,
                })
            }
            InboundKind::RecycleBinSummary => {
                if !payload.is_object() {
                    return Err(SyncError::Protocol(
                        "recycle_bin_summary payload is not an object".into(),
                    ));
                }
                Ok(InboundEvent::Summary(payload))
            }
            InboundKind::RecycleBinError => {
                let ErrorPayload { error } = serde_json::from_value(payload)?;
                Ok(InboundEvent::Error(error))
            }
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in InboundKind::ALL {
            assert_eq!(InboundKind::from_wire(kind.wire_name()), Some(kind));
        }
        assert_eq!(InboundKind::from_wire("connect"), None);
    }

    #[test]
    fn test_decode_folder_sync() {
        let event = InboundEvent::decode(
            InboundKind::FolderSync,
            json!({
                "projectId": 42,
                "eventType": "unlinkDir",
                "fileName": "assets",
                "relativePath": "src/assets",
                "isFolder": true,
                "timestamp": "2024-05-01T10:00:00.000Z"
            }),
        )
        .unwrap();

        let InboundEvent::FolderSync(payload) = event else {
            panic!("Expected FolderSync, got {:?}", event);
        };
        let change = payload.into_change(Timestamp(0));
        assert_eq!(change.project_id, ProjectId::from("42"));
        assert_eq!(change.event_type, FolderChangeKind::UnlinkDir);
        assert!(change.is_folder);
        assert_eq!(change.timestamp, Timestamp(1_714_557_600_000));
    }

    #[test]
    fn test_missing_timestamp_uses_arrival_time() {
        let event = InboundEvent::decode(
            InboundKind::FolderSync,
            json!({"projectId": "P1", "eventType": "add", "fileName": "a.txt"}),
        )
        .unwrap();
        let InboundEvent::FolderSync(payload) = event else {
            panic!("Expected FolderSync");
        };
        let change = payload.into_change(Timestamp(77));
        assert_eq!(change.timestamp, Timestamp(77));
        assert_eq!(change.relative_path, "");
        assert!(!change.is_folder);
    }

    #[test]
    fn test_malformed_folder_sync_is_protocol_error() {
        let missing_project = InboundEvent::decode(
            InboundKind::FolderSync,
            json!({"eventType": "add"}),
        );
        assert!(matches!(missing_project, Err(SyncError::Protocol(_))));

        let empty_project = InboundEvent::decode(
            InboundKind::FolderSync,
            json!({"projectId": "", "eventType": "add"}),
        );
        assert!(matches!(empty_project, Err(SyncError::Protocol(_))));

        let not_object = InboundEvent::decode(InboundKind::FolderSync, json!("P1"));
        assert!(matches!(not_object, Err(SyncError::Protocol(_))));
    }

    #[test]
    fn test_decode_lifecycle_variants() {
        let event = InboundEvent::decode(
            InboundKind::RecycleBinEvent,
            json!({"type": "item_restored", "data": {"id": 7}}),
        )
        .unwrap();
        assert!(matches!(
            event,
            InboundEvent::Lifecycle {
                source: NoticeSource::Event,
                kind: RecycleBinEventKind::ItemRestored,
                ..
            }
        ));

        let event = InboundEvent::decode(
            InboundKind::RecycleBin,
            json!({"event": "recycle_bin_emptied"}),
        )
        .unwrap();
        match event {
            InboundEvent::Lifecycle { source, kind, data } => {
                assert_eq!(source, NoticeSource::General);
                assert_eq!(kind, RecycleBinEventKind::BinEmptied);
                assert_eq!(data, Value::Null);
            }
            other => panic!("Expected Lifecycle, got {:?}", other),
        }
    }

    #[test]
    fn test_watcher_update_defaults_to_file_deleted() {
        let payload = json!({"fileName": "old.txt", "deletionMethod": "filesystem"});
        let event = InboundEvent::decode(InboundKind::RecycleBinUpdate, payload.clone()).unwrap();
        match event {
            InboundEvent::Lifecycle { source, kind, data } => {
                assert_eq!(source, NoticeSource::Watcher);
                assert_eq!(kind, RecycleBinEventKind::FileDeleted);
                assert_eq!(data, payload);
            }
            other => panic!("Expected Lifecycle, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_summary_and_error() {
        let summary = InboundEvent::decode(
            InboundKind::RecycleBinSummary,
            json!({"totalItems": 3, "totalSize": 1024}),
        )
        .unwrap();
        assert!(matches!(summary, InboundEvent::Summary(_)));
        assert!(InboundEvent::decode(InboundKind::RecycleBinSummary, json!([1, 2])).is_err());

        let error = InboundEvent::decode(
            InboundKind::RecycleBinError,
            json!({"error": "restore failed"}),
        )
        .unwrap();
        assert!(matches!(error, InboundEvent::Error(ref m) if m == "restore failed"));
    }
}
