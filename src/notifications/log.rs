//! Capacity-bounded log of recycle-bin notifications.

use crate::clock::Clock;
use crate::error::describe_panic;
use crate::events::RecycleBinEventKind;
use crate::types::{ListenerId, NotificationId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Default number of records retained.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default window for [`NotificationLog::has_recent`].
pub const DEFAULT_RECENT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// A logged notification. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub kind: RecycleBinEventKind,
    pub payload: Value,
    pub timestamp: Timestamp,
}

/// Listener invoked for every recorded notification.
pub type NotificationListener = Arc<dyn Fn(&NotificationRecord) + Send + Sync>;

/// Ring buffer of notifications with FIFO eviction.
pub struct NotificationLog {
    records: RwLock<VecDeque<NotificationRecord>>,
    capacity: usize,
    recent_window: Duration,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<ListenerId, NotificationListener>>,
    next_listener: AtomicU64,
}

impl NotificationLog {
    /// Create a log holding at most `capacity` records (at least one).
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self::with_window(capacity, DEFAULT_RECENT_WINDOW, clock)
    }

    pub fn with_window(capacity: usize, recent_window: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            recent_window,
            clock,
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(BTreeMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current time according to the log's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Append a notification stamped with the current time, evicting the
    /// oldest records beyond capacity, then notify listeners.
    pub fn record(&self, kind: RecycleBinEventKind, payload: Value) -> NotificationRecord {
        let record = {
            // Ids are assigned under the lock so log order matches id order.
            let mut records = self.records.write();
            let record = NotificationRecord {
                id: NotificationId(self.next_id.fetch_add(1, Ordering::SeqCst)),
                kind,
                payload,
                timestamp: self.clock.now(),
            };
            records.push_back(record.clone());
            while records.len() > self.capacity {
                records.pop_front();
            }
            record
        };

        self.notify(&record);
        record
    }

    /// Up to `limit` records, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<NotificationRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records, optionally only those of `kind`.
    pub fn count(&self, kind: Option<&RecycleBinEventKind>) -> usize {
        let records = self.records.read();
        match kind {
            Some(kind) => records.iter().filter(|r| &r.kind == kind).count(),
            None => records.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Whether a record of `kind` was logged within `window` of now.
    ///
    /// Evaluated against the clock on every call.
    pub fn has_recent_of_kind(&self, kind: &RecycleBinEventKind, window: Duration) -> bool {
        let now = self.clock.now();
        self.records
            .read()
            .iter()
            .any(|r| &r.kind == kind && r.timestamp.is_within(window, now))
    }

    /// [`has_recent_of_kind`](Self::has_recent_of_kind) with the configured
    /// default window.
    pub fn has_recent(&self, kind: &RecycleBinEventKind) -> bool {
        self.has_recent_of_kind(kind, self.recent_window)
    }

    /// Remove all records. Idempotent.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    // --- Listeners ---

    pub fn watch<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NotificationRecord) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(id, Arc::new(listener));
        id
    }

    /// Returns whether the listener was registered.
    pub fn unwatch(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    fn notify(&self, record: &NotificationRecord) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in listeners {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(record))) {
                error!(
                    listener = id.0,
                    panic = %describe_panic(payload.as_ref()),
                    "Notification listener panicked"
                );
            }
        }
    }
}
