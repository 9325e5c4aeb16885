//! In-process transport that records outbound commands and lets the caller
//! inject inbound events.

use super::{wire, Transport, TransportFactory, TransportHandler};
use crate::error::{Result, SyncError};
use crate::manager::SyncConfig;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// How a [`MemoryTransport`] answers [`Transport::connect`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectMode {
    /// Wait for an explicit [`MemoryTransport::accept`] or
    /// [`MemoryTransport::reject`].
    #[default]
    Manual,
    /// Fire `connect` immediately.
    Accept,
    /// Fire `connect_error` immediately with this message.
    Reject(String),
}

/// A transport backed by plain memory.
#[derive(Default)]
pub struct MemoryTransport {
    handlers: RwLock<HashMap<String, Vec<TransportHandler>>>,
    emitted: Mutex<Vec<(String, Value)>>,
    mode: Mutex<ConnectMode>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    fail_emits: AtomicBool,
}

impl MemoryTransport {
    pub fn new(mode: ConnectMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            ..Default::default()
        })
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock() = mode;
    }

    /// Make every subsequent `emit` fail.
    pub fn fail_emits(&self, fail: bool) {
        self.fail_emits.store(fail, Ordering::SeqCst);
    }

    /// Deliver an inbound event to the registered handlers.
    ///
    /// Returns the number of handlers invoked.
    pub fn fire(&self, event: &str, payload: Value) -> usize {
        let handlers = self
            .handlers
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// Signal a successful connection.
    pub fn accept(&self) {
        self.fire(wire::CONNECT, Value::Null);
    }

    /// Signal a failed connection attempt.
    pub fn reject(&self, message: &str) {
        self.fire(wire::CONNECT_ERROR, json!({ "message": message }));
    }

    /// Signal an unexpected loss of the connection.
    pub fn drop_connection(&self, reason: &str) {
        self.fire(wire::DISCONNECT, json!(reason));
    }

    /// All emitted commands, oldest first.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().clone()
    }

    /// Payloads emitted under one event name.
    pub fn emitted_payloads(&self, event: &str) -> Vec<Value> {
        self.emitted
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn emit_count(&self, event: &str) -> usize {
        self.emitted
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    pub fn clear_emitted(&self) {
        self.emitted.lock().clear();
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn on(&self, event: &str, handler: TransportHandler) {
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.lock().clone();
        match mode {
            ConnectMode::Manual => {}
            ConnectMode::Accept => self.accept(),
            ConnectMode::Reject(message) => self.reject(&message),
        }
    }

    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if self.fail_emits.load(Ordering::SeqCst) {
            return Err(SyncError::Transport(format!("emit of {} refused", event)));
        }
        self.emitted.lock().push((event.to_string(), payload));
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`MemoryTransport`]s and keeps every one it created.
#[derive(Default)]
pub struct MemoryTransportFactory {
    mode: Mutex<ConnectMode>,
    created: Mutex<Vec<Arc<MemoryTransport>>>,
    refuse: Mutex<Option<String>>,
}

impl MemoryTransportFactory {
    pub fn new(mode: ConnectMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            ..Default::default()
        })
    }

    /// Mode given to transports created from now on.
    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock() = mode;
    }

    /// Make `create` fail with this message (or succeed again with `None`).
    pub fn refuse(&self, message: Option<&str>) {
        *self.refuse.lock() = message.map(str::to_string);
    }

    pub fn created(&self) -> Vec<Arc<MemoryTransport>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// The most recently created transport.
    pub fn latest(&self) -> Option<Arc<MemoryTransport>> {
        self.created.lock().last().cloned()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create(&self, _config: &SyncConfig) -> Result<Arc<dyn Transport>> {
        if let Some(message) = self.refuse.lock().clone() {
            return Err(SyncError::Transport(message));
        }
        let transport = MemoryTransport::new(self.mode.lock().clone());
        self.created.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}
