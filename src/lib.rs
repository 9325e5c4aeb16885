//! # Live Sync
//!
//! Real-time project folder and recycle-bin notifications over a single
//! shared connection to the origin server.
//!
//! ## Core Concepts
//!
//! - **Connection**: One transport per manager; concurrent connects share one attempt
//! - **Channels**: Per-project folder streams plus one global recycle-bin stream
//! - **Subscriptions**: Ref-counted, so upstream watch/unwatch is sent once per channel
//! - **Routing**: One handler per inbound event kind, fanning out to every callback
//! - **Notifications**: Bounded log of recycle-bin events with recency queries
//!
//! ## Example
//!
//! ```ignore
//! use live_sync::{ChannelEvent, RecycleBinEventKind, SyncConfig, SyncManager, UserIdentity};
//!
//! let manager = SyncManager::new(SyncConfig::default(), factory);
//!
//! // Watch a project folder
//! let handle = manager.subscribe_project("P1", |event| {
//!     if let ChannelEvent::Folder(change) = event {
//!         println!("{} changed", change.relative_path);
//!     }
//! })?;
//!
//! // Join recycle-bin updates
//! manager.subscribe_recycle_bin(UserIdentity::new("u-1", "admin"), |_| {})?;
//!
//! // Was anything deleted in the last five minutes?
//! let recent = manager.notifications().has_recent(&RecycleBinEventKind::FileDeleted);
//!
//! handle.unsubscribe();
//! manager.teardown();
//! ```

pub mod clock;
pub mod connection;
pub mod error;
pub mod events;
pub mod manager;
pub mod notifications;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{ConnectionManager, Session};
pub use error::{Result, SyncError};
pub use events::{
    ChannelEvent, EventRouter, FolderChange, FolderChangeKind, InboundEvent, InboundKind,
    NoticeSource, RecycleBinEventKind, RecycleBinNotice,
};
pub use manager::{SyncConfig, SyncManager};
pub use notifications::{NotificationListener, NotificationLog, NotificationRecord};
pub use subscriptions::{EventCallback, SubscriptionHandle, SubscriptionRegistry};
pub use transport::{
    ConnectMode, MemoryTransport, MemoryTransportFactory, Transport, TransportFactory,
    TransportHandler,
};
pub use types::*;
