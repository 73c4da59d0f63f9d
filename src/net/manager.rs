//! Outbound connection manager.
//!
//! # Responsibilities
//! - Cache one live connection per backend address
//! - Reuse usable connections, replace failed ones
//! - Make dial-and-insert atomic per address
//! - Drain every connection at shutdown
//!
//! # Design Decisions
//! - Each address has its own slot: a lock-free pointer to the current
//!   connection and a dial mutex. Reading a healthy connection never takes
//!   the mutex; unrelated addresses never wait on each other's dials.
//! - The dial is bounded by the connect timeout; failure surfaces as
//!   `BackendUnreachable` and leaves the slot empty.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};

use crate::error::{GatewayError, GatewayResult};
use crate::net::connection::{ConnectivityState, ManagedConnection};
use crate::net::tls::ClientTlsOptions;

/// HTTP/2 keep-alive ping interval.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
/// How long to wait for a keep-alive ping ack.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Error type for establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid backend address: {0}")]
    InvalidAddress(String),

    #[error("tls configuration rejected: {0}")]
    Tls(String),

    #[error("{0}")]
    Transport(String),
}

/// Establishes transport handles to backends.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Dial `address` with the given TLS options.
    async fn connect(
        &self,
        address: &str,
        tls: &ClientTlsOptions,
    ) -> Result<Self::Handle, ConnectError>;

    /// State reported for a freshly dialed handle.
    fn initial_state(&self) -> ConnectivityState {
        ConnectivityState::Ready
    }
}

/// gRPC connector over tonic channels.
#[derive(Debug, Clone)]
pub struct TonicConnector {
    connect_timeout: Duration,
}

impl TonicConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TonicConnector {
    type Handle = Channel;

    async fn connect(&self, address: &str, tls: &ClientTlsOptions) -> Result<Channel, ConnectError> {
        let uri = if address.contains("://") {
            address.to_string()
        } else if tls.enabled {
            format!("https://{}", address)
        } else {
            format!("http://{}", address)
        };

        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|e| ConnectError::InvalidAddress(describe(&e)))?
            .connect_timeout(self.connect_timeout)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        if tls.enabled {
            endpoint = endpoint
                .tls_config(tls.to_tonic(address))
                .map_err(|e| ConnectError::Tls(describe(&e)))?;
        }

        endpoint
            .connect()
            .await
            .map_err(|e| ConnectError::Transport(describe(&e)))
    }
}

/// Render an error with its source chain.
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

struct Slot<H> {
    current: ArcSwapOption<ManagedConnection<H>>,
    dial: tokio::sync::Mutex<()>,
}

impl<H> Default for Slot<H> {
    fn default() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            dial: tokio::sync::Mutex::new(()),
        }
    }
}

/// Owns every live outbound connection, keyed by backend address.
pub struct ConnectionManager<C: Connector = TonicConnector> {
    connector: C,
    connect_timeout: Duration,
    slots: DashMap<String, Arc<Slot<C::Handle>>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            slots: DashMap::new(),
        }
    }

    /// Return the cached connection for `address`, dialing one if needed.
    pub async fn acquire(
        &self,
        address: &str,
        tls: &ClientTlsOptions,
    ) -> GatewayResult<Arc<ManagedConnection<C::Handle>>> {
        let slot = self.slots.entry(address.to_string()).or_default().clone();

        if let Some(conn) = usable(&slot) {
            return Ok(conn);
        }

        let _dial = slot.dial.lock().await;

        // Another task may have dialed while we waited.
        if let Some(conn) = slot.current.load_full() {
            if conn.state().is_usable() {
                return Ok(conn);
            }
            tracing::warn!(
                connection_id = %conn.id(),
                address = %address,
                state = %conn.state(),
                "Replacing stale connection"
            );
            conn.close();
            slot.current.store(None);
        }

        let dialed = tokio::time::timeout(self.connect_timeout, self.connector.connect(address, tls))
            .await
            .map_err(|_| GatewayError::BackendUnreachable {
                address: address.to_string(),
                reason: format!("connect timed out after {:?}", self.connect_timeout),
            })?;

        let handle = dialed.map_err(|e| {
            tracing::warn!(address = %address, error = %e, "Backend connection failed");
            GatewayError::BackendUnreachable {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        let conn = Arc::new(ManagedConnection::new(
            address,
            handle,
            self.connector.initial_state(),
        ));
        tracing::info!(connection_id = %conn.id(), address = %address, tls = tls.enabled, "Backend connection established");
        slot.current.store(Some(conn.clone()));
        Ok(conn)
    }

    /// Close and forget every connection.
    pub fn close_all(&self) {
        let addresses: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0usize;
        for address in addresses {
            if let Some((_, slot)) = self.slots.remove(&address) {
                if let Some(conn) = slot.current.swap(None) {
                    conn.close();
                    closed += 1;
                }
            }
        }
        tracing::info!(closed, "Connection manager drained");
    }

    /// Address → observed state, for diagnostics. Does not touch any connection.
    pub fn health_snapshot(&self) -> BTreeMap<String, String> {
        self.slots
            .iter()
            .filter_map(|entry| {
                let conn = entry.value().current.load_full()?;
                Some((entry.key().clone(), conn.state().as_str().to_string()))
            })
            .collect()
    }

    /// Number of addresses with a cached connection.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().current.load().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn usable<H>(slot: &Slot<H>) -> Option<Arc<ManagedConnection<H>>> {
    slot.current.load_full().filter(|conn| conn.state().is_usable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts dials; fails for addresses starting with "down".
    #[derive(Default, Clone)]
    struct CountingConnector {
        dials: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Handle = usize;

        async fn connect(&self, address: &str, _tls: &ClientTlsOptions) -> Result<usize, ConnectError> {
            let n = self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if address.starts_with("down") {
                return Err(ConnectError::Transport("connection refused".into()));
            }
            Ok(n)
        }
    }

    fn manager(delay: Duration) -> (Arc<ConnectionManager<CountingConnector>>, Arc<AtomicUsize>) {
        let connector = CountingConnector {
            dials: Arc::new(AtomicUsize::new(0)),
            delay,
        };
        let dials = connector.dials.clone();
        (Arc::new(ConnectionManager::new(connector, Duration::from_secs(1))), dials)
    }

    #[tokio::test]
    async fn reuses_usable_connection() {
        let (mgr, dials) = manager(Duration::ZERO);
        let tls = ClientTlsOptions::plaintext();

        let a = mgr.acquire("b1:80", &tls).await.unwrap();
        let b = mgr.acquire("b1:80", &tls).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        mgr.acquire("b2:80", &tls).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_acquires_dial_once() {
        let (mgr, dials) = manager(Duration::from_millis(50));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let mgr = mgr.clone();
                tokio::spawn(async move {
                    mgr.acquire("b1:80", &ClientTlsOptions::plaintext())
                        .await
                        .unwrap()
                        .id()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn failed_connection_is_replaced() {
        let (mgr, dials) = manager(Duration::ZERO);
        let tls = ClientTlsOptions::plaintext();

        let first = mgr.acquire("b1:80", &tls).await.unwrap();
        first.mark_failed();

        let second = mgr.acquire("b1:80", &tls).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), ConnectivityState::Shutdown);
        assert_eq!(second.state(), ConnectivityState::Ready);
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_backend() {
        let (mgr, _) = manager(Duration::ZERO);
        let err = mgr
            .acquire("down:80", &ClientTlsOptions::plaintext())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnreachable { .. }));
        assert!(mgr.health_snapshot().is_empty());
    }

    #[tokio::test]
    async fn dial_timeout_is_unreachable() {
        let connector = CountingConnector {
            dials: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_secs(5),
        };
        let mgr = ConnectionManager::new(connector, Duration::from_millis(20));
        let err = mgr
            .acquire("b1:80", &ClientTlsOptions::plaintext())
            .await
            .unwrap_err();
        match err {
            GatewayError::BackendUnreachable { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn snapshot_and_close_all() {
        let (mgr, _) = manager(Duration::ZERO);
        let tls = ClientTlsOptions::plaintext();
        let b1 = mgr.acquire("b1:80", &tls).await.unwrap();
        let b2 = mgr.acquire("b2:80", &tls).await.unwrap();
        b2.mark_failed();

        let snapshot = mgr.health_snapshot();
        assert_eq!(snapshot["b1:80"], "READY");
        assert_eq!(snapshot["b2:80"], "TRANSIENT_FAILURE");
        // Reading the snapshot changes nothing.
        assert_eq!(b2.state(), ConnectivityState::TransientFailure);

        mgr.close_all();
        assert!(mgr.is_empty());
        assert_eq!(b1.state(), ConnectivityState::Shutdown);
        assert_eq!(b2.state(), ConnectivityState::Shutdown);
    }

    #[tokio::test]
    async fn tonic_connector_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mgr = ConnectionManager::new(
            TonicConnector::new(Duration::from_millis(500)),
            Duration::from_millis(500),
        );
        let err = mgr
            .acquire(&addr.to_string(), &ClientTlsOptions::plaintext())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnreachable { .. }));
    }
}
