//! Inbound events: wire decoding, normalized channel events and routing.
//!
//! Each inbound wire name maps to one [`InboundKind`]; the router registers
//! one transport handler per kind, decodes the payload once into an
//! [`InboundEvent`], and delivers a [`ChannelEvent`] to every callback on
//! the resolved channel.

mod inbound;
mod router;
mod types;

pub use inbound::{FolderSyncPayload, InboundEvent, InboundKind, WireTimestamp};
pub use router::EventRouter;
pub use types::{
    ChannelEvent, FolderChange, FolderChangeKind, NoticeSource, RecycleBinEventKind,
    RecycleBinNotice,
};
