//! Subscription registry for live channel updates.
//!
//! Any number of local callbacks may subscribe to the same channel; the
//! upstream watch command is sent when the first one arrives and the unwatch
//! command when the last one leaves.
//!
//! # Example
//!
//! ```ignore
//! let handle = manager.subscribe_project("P1", |event| match event {
//!     ChannelEvent::Folder(change) => println!("{} {:?}", change.file_name, change.event_type),
//!     _ => {}
//! })?;
//!
//! // Later
//! handle.unsubscribe();
//! ```

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{EventCallback, SubscriptionHandle};
