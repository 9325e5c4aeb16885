//! Routing of decoded inbound events to channel subscribers.

use super::inbound::{InboundEvent, InboundKind};
use super::types::{ChannelEvent, RecycleBinNotice};
use crate::error::describe_panic;
use crate::notifications::NotificationLog;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::Channel;
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, trace, warn};

/// Fans inbound events out to the callbacks registered on their channel.
///
/// Lifecycle events are also appended to the notification log, whether or
/// not anyone is subscribed to the recycle-bin channel.
pub struct EventRouter<'a> {
    registry: &'a SubscriptionRegistry,
    log: &'a NotificationLog,
    last_summary: &'a RwLock<Option<Value>>,
}

impl<'a> EventRouter<'a> {
    pub fn new(
        registry: &'a SubscriptionRegistry,
        log: &'a NotificationLog,
        last_summary: &'a RwLock<Option<Value>>,
    ) -> Self {
        Self {
            registry,
            log,
            last_summary,
        }
    }

    /// Decode and route a raw payload. Malformed payloads are logged and
    /// dropped.
    ///
    /// Returns the number of callbacks that completed.
    pub fn route(&self, kind: InboundKind, payload: Value) -> usize {
        match InboundEvent::decode(kind, payload) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                warn!(event = kind.wire_name(), error = %e, "Dropping malformed inbound event");
                0
            }
        }
    }

    /// Route a decoded event.
    pub fn dispatch(&self, event: InboundEvent) -> usize {
        match event {
            InboundEvent::FolderSync(payload) => {
                let change = payload.into_change(self.log.now());
                let channel = Channel::Project(change.project_id.clone());
                self.deliver(&channel, &ChannelEvent::Folder(change))
            }
            InboundEvent::Lifecycle { source, kind, data } => {
                let record = self.log.record(kind.clone(), data.clone());
                let notice = RecycleBinNotice {
                    id: record.id,
                    kind,
                    source,
                    data,
                    timestamp: record.timestamp,
                };
                self.deliver(&Channel::RecycleBin, &ChannelEvent::RecycleBin(notice))
            }
            InboundEvent::Summary(summary) => {
                *self.last_summary.write() = Some(summary.clone());
                self.deliver(
                    &Channel::RecycleBin,
                    &ChannelEvent::RecycleBinSummary { summary },
                )
            }
            InboundEvent::Error(message) => self.deliver(
                &Channel::RecycleBin,
                &ChannelEvent::RecycleBinError { message },
            ),
        }
    }

    /// Invoke every callback on `channel`. A panicking callback is logged
    /// and does not stop delivery to the others.
    fn deliver(&self, channel: &Channel, event: &ChannelEvent) -> usize {
        let callbacks = self.registry.callbacks(channel);
        if callbacks.is_empty() {
            trace!(%channel, "No subscribers, dropping event");
            return 0;
        }

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        %channel,
                        subscription = id.0,
                        panic = %describe_panic(payload.as_ref()),
                        "Subscriber callback panicked"
                    );
                }
            }
        }
        delivered
    }
}
