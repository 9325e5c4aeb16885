//! Connection lifecycle: one transport, de-duplicated connection attempts.

use crate::error::{Result, SyncError};
use crate::manager::SyncConfig;
use crate::transport::{Transport, TransportFactory};
use crate::types::ConnectionState;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Waiter = Sender<Result<Arc<dyn Transport>>>;

/// A live session: the transport plus the id of the `connect` signal that
/// started it.
#[derive(Clone)]
pub struct Session {
    pub id: u64,
    pub transport: Arc<dyn Transport>,
}

/// Internal link state.
#[derive(Default)]
struct Link {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    /// Callers blocked on the attempt in flight.
    waiters: Vec<Waiter>,
    /// Bumped for every transport instance; signals from older ones are stale.
    generation: u64,
    /// Bumped for every connection attempt.
    attempt: u64,
    /// Bumped for every accepted `connect` signal.
    session: u64,
}

impl Link {
    /// Fail the attempt in flight and release the transport.
    fn fail_attempt(&mut self, err: SyncError) -> Option<Arc<dyn Transport>> {
        self.state = ConnectionState::Disconnected;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
        self.generation += 1;
        self.transport.take()
    }
}

/// Owns the single transport and its state machine:
/// `Disconnected -> Connecting(waiters) -> Connected`.
pub struct ConnectionManager {
    link: Mutex<Link>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            link: Mutex::new(Link::default()),
            connect_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether `generation` belongs to the transport currently owned.
    pub fn is_current(&self, generation: u64) -> bool {
        self.link.lock().generation == generation
    }

    /// The live session, if connected.
    pub fn session(&self) -> Option<Session> {
        let link = self.link.lock();
        match (&link.state, &link.transport) {
            (ConnectionState::Connected, Some(transport)) => Some(Session {
                id: link.session,
                transport: Arc::clone(transport),
            }),
            _ => None,
        }
    }

    /// Number of callers waiting on the attempt in flight.
    pub fn waiter_count(&self) -> usize {
        self.link.lock().waiters.len()
    }

    /// Return the live transport, joining or starting a connection attempt
    /// if necessary.
    ///
    /// `install` runs once for every newly created transport, with its
    /// generation, before `connect` is called on it.
    pub fn connect<I>(
        &self,
        factory: &dyn TransportFactory,
        config: &SyncConfig,
        install: I,
    ) -> Result<Arc<dyn Transport>>
    where
        I: FnOnce(&Arc<dyn Transport>, u64),
    {
        let (receiver, attempt, start) = {
            let mut link = self.link.lock();

            let state = link.state;
            let start = match state {
                ConnectionState::Connected => {
                    if let Some(transport) = &link.transport {
                        return Ok(Arc::clone(transport));
                    }
                    // Connected without a transport cannot happen; start over.
                    Some(self.start_attempt(&mut link, factory, config, install)?)
                }
                ConnectionState::Connecting => None,
                ConnectionState::Disconnected => {
                    Some(self.start_attempt(&mut link, factory, config, install)?)
                }
            };

            let (sender, receiver) = bounded(1);
            link.waiters.push(sender);
            (receiver, link.attempt, start)
        };

        if let Some(transport) = start {
            debug!(attempt, "Starting connection attempt");
            transport.connect();
        }

        match receiver.recv_timeout(self.connect_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let err = SyncError::ConnectTimeout(self.connect_timeout);
                self.timeout_attempt(attempt, err.clone());
                // The attempt may have resolved while we were timing out.
                receiver.try_recv().unwrap_or(Err(err))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SyncError::ConnectionAborted),
        }
    }

    fn start_attempt<I>(
        &self,
        link: &mut Link,
        factory: &dyn TransportFactory,
        config: &SyncConfig,
        install: I,
    ) -> Result<Arc<dyn Transport>>
    where
        I: FnOnce(&Arc<dyn Transport>, u64),
    {
        // A transport that dropped mid-session is reused; it keeps its handlers.
        let transport = match &link.transport {
            Some(transport) => Arc::clone(transport),
            None => {
                let transport = factory.create(config)?;
                link.generation += 1;
                install(&transport, link.generation);
                link.transport = Some(Arc::clone(&transport));
                transport
            }
        };
        link.attempt += 1;
        link.state = ConnectionState::Connecting;
        Ok(transport)
    }

    fn timeout_attempt(&self, attempt: u64, err: SyncError) {
        let released = {
            let mut link = self.link.lock();
            if link.state != ConnectionState::Connecting || link.attempt != attempt {
                return;
            }
            warn!(attempt, timeout = ?self.connect_timeout, "Connection attempt timed out");
            link.fail_attempt(err)
        };
        if let Some(transport) = released {
            transport.disconnect();
        }
    }

    /// Transport reported `connect`. Returns the new session id, or `None`
    /// if the signal was stale or redundant.
    pub fn on_connected(&self, generation: u64) -> Option<u64> {
        let mut link = self.link.lock();
        if link.generation != generation || link.state == ConnectionState::Connected {
            return None;
        }
        let transport = link.transport.clone()?;

        link.state = ConnectionState::Connected;
        link.session += 1;
        for waiter in link.waiters.drain(..) {
            let _ = waiter.send(Ok(Arc::clone(&transport)));
        }
        info!(generation, session = link.session, "Connected");
        Some(link.session)
    }

    /// Transport reported `connect_error`.
    pub fn on_connect_error(&self, generation: u64, message: String) {
        let released = {
            let mut link = self.link.lock();
            if link.generation != generation {
                return;
            }
            if link.state != ConnectionState::Connecting {
                debug!(generation, %message, "Reconnect attempt failed");
                return;
            }
            warn!(generation, %message, "Connection attempt failed");
            link.fail_attempt(SyncError::ConnectionFailed(message))
        };
        if let Some(transport) = released {
            transport.disconnect();
        }
    }

    /// Transport reported `disconnect`. Subscriptions stay registered; the
    /// transport is kept so it can reconnect on its own.
    pub fn on_disconnected(&self, generation: u64, reason: &str) {
        let mut link = self.link.lock();
        if link.generation != generation || link.state != ConnectionState::Connected {
            return;
        }
        link.state = ConnectionState::Disconnected;
        warn!(generation, reason, "Connection lost");
    }

    /// Release the transport and fail any attempt in flight. Idempotent.
    ///
    /// Returns whether a transport was released.
    pub fn teardown(&self) -> bool {
        let released = {
            let mut link = self.link.lock();
            link.fail_attempt(SyncError::ConnectionAborted)
        };
        match released {
            Some(transport) => {
                transport.disconnect();
                info!("Connection torn down");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{wire, ConnectMode, MemoryTransportFactory};
    use serde_json::Value;
    use std::thread;

    /// Route the transport's lifecycle signals back into `manager`.
    fn wire_signals(manager: &Arc<ConnectionManager>) -> impl FnOnce(&Arc<dyn Transport>, u64) {
        let manager = Arc::clone(manager);
        move |transport, generation| {
            let m = Arc::clone(&manager);
            transport.on(
                wire::CONNECT,
                Arc::new(move |_: Value| {
                    m.on_connected(generation);
                }),
            );
            let m = Arc::clone(&manager);
            transport.on(
                wire::CONNECT_ERROR,
                Arc::new(move |payload: Value| {
                    m.on_connect_error(generation, payload.to_string());
                }),
            );
            let m = Arc::clone(&manager);
            transport.on(
                wire::DISCONNECT,
                Arc::new(move |_: Value| m.on_disconnected(generation, "test")),
            );
        }
    }

    fn same(a: &Arc<dyn Transport>, b: &Arc<dyn Transport>) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    #[test]
    fn test_connect_reuses_live_transport() {
        let manager = Arc::new(ConnectionManager::new(Duration::from_secs(1)));
        let factory = MemoryTransportFactory::new(ConnectMode::Accept);
        let config = SyncConfig::default();

        let first = manager
            .connect(&*factory, &config, wire_signals(&manager))
            .unwrap();
        let second = manager
            .connect(&*factory, &config, wire_signals(&manager))
            .unwrap();

        assert!(same(&first, &second));
        assert_eq!(factory.created_count(), 1);
        assert!(manager.is_connected());
        assert_eq!(manager.session().map(|s| s.id), Some(1));
    }

    #[test]
    fn test_concurrent_connects_share_one_attempt() {
        let manager = Arc::new(ConnectionManager::new(Duration::from_secs(5)));
        let factory = MemoryTransportFactory::new(ConnectMode::Manual);
        let config = SyncConfig::default();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let factory = Arc::clone(&factory);
                let config = config.clone();
                thread::spawn(move || {
                    manager.connect(&*factory, &config, wire_signals(&manager))
                })
            })
            .collect();

        while manager.waiter_count() < 4 {
            thread::yield_now();
        }
        assert_eq!(manager.state(), ConnectionState::Connecting);
        factory.latest().unwrap().accept();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
        assert!(results.windows(2).all(|w| same(&w[0], &w[1])));
        assert_eq!(factory.created_count(), 1);
        assert_eq!(factory.latest().unwrap().connect_calls(), 1);
    }

    #[test]
    fn test_failed_attempt_rejects_waiters_and_allows_retry() {
        let manager = Arc::new(ConnectionManager::new(Duration::from_secs(1)));
        let factory = MemoryTransportFactory::new(ConnectMode::Reject("refused".into()));
        let config = SyncConfig::default();

        let result = manager.connect(&*factory, &config, wire_signals(&manager));
        assert!(matches!(result, Err(SyncError::ConnectionFailed(_))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(factory.latest().unwrap().disconnect_calls(), 1);

        factory.set_mode(ConnectMode::Accept);
        manager
            .connect(&*factory, &config, wire_signals(&manager))
            .unwrap();
        assert_eq!(factory.created_count(), 2);
        assert!(manager.is_connected());
    }

    #[test]
    fn test_timeout_fails_attempt() {
        let manager = Arc::new(ConnectionManager::new(Duration::from_millis(20)));
        let factory = MemoryTransportFactory::new(ConnectMode::Manual);
        let config = SyncConfig::default();

        let result = manager.connect(&*factory, &config, wire_signals(&manager));
        assert_eq!(
            result.err(),
            Some(SyncError::ConnectTimeout(Duration::from_millis(20)))
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // A late accept from the abandoned transport is ignored.
        let stale = factory.latest().unwrap();
        stale.accept();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_drop_keeps_transport_for_reconnect() {
        let manager = Arc::new(ConnectionManager::new(Duration::from_secs(1)));
        let factory = MemoryTransportFactory::new(ConnectMode::Accept);
        let config = SyncConfig::default();

        manager
            .connect(&*factory, &config, wire_signals(&manager))
            .unwrap();
        let transport = factory.latest().unwrap();

        transport.drop_connection("transport close");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.session().is_none());

        // The transport reconnects by itself.
        transport.accept();
        assert_eq!(manager.session().map(|s| s.id), Some(2));
        assert_eq!(factory.created_count(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent_and_aborts_waiters() {
        let manager = Arc::new(ConnectionManager::new(Duration::from_secs(5)));
        let factory = MemoryTransportFactory::new(ConnectMode::Manual);
        let config = SyncConfig::default();

        let waiter = {
            let manager = Arc::clone(&manager);
            let factory = Arc::clone(&factory);
            thread::spawn(move || manager.connect(&*factory, &config, wire_signals(&manager)))
        };
        while manager.waiter_count() < 1 {
            thread::yield_now();
        }

        assert!(manager.teardown());
        assert!(!manager.teardown());
        assert_eq!(
            waiter.join().unwrap().err(),
            Some(SyncError::ConnectionAborted)
        );
        assert_eq!(factory.latest().unwrap().disconnect_calls(), 1);
    }
}
