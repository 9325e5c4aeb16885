//! The persistent bidirectional connection to the origin server.
//!
//! The manager never talks to a socket directly. It asks a
//! [`TransportFactory`] for one [`Transport`] per connection generation,
//! registers one handler per inbound event name with [`Transport::on`], and
//! sends commands with [`Transport::emit`].
//!
//! Connection outcomes are reported through the same handler mechanism,
//! using the [`wire::CONNECT`], [`wire::CONNECT_ERROR`] and
//! [`wire::DISCONNECT`] event names. Low-level reconnection and backoff are
//! the transport's business: after an unexpected drop it may fire `connect`
//! again on its own.
//!
//! Implementations must not deliver inbound events synchronously from inside
//! `emit`; the manager emits while holding its channel-map lock.

mod memory;
pub mod wire;

pub use memory::{ConnectMode, MemoryTransport, MemoryTransportFactory};

use crate::error::Result;
use crate::manager::SyncConfig;
use serde_json::Value;
use std::sync::Arc;

/// Handler for one inbound event name.
pub type TransportHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// An event-based connection primitive.
pub trait Transport: Send + Sync {
    /// Register a handler for an inbound event name.
    fn on(&self, event: &str, handler: TransportHandler);

    /// Start connecting. The outcome is signalled via `connect` or
    /// `connect_error`, possibly before this call returns.
    fn connect(&self);

    /// Send an outbound event.
    fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Close the connection and stop reconnecting.
    fn disconnect(&self);
}

/// Creates transports for the manager.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &SyncConfig) -> Result<Arc<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&SyncConfig) -> Result<Arc<dyn Transport>> + Send + Sync,
{
    fn create(&self, config: &SyncConfig) -> Result<Arc<dyn Transport>> {
        self(config)
    }
}
