//! Managed backend connections and their observed state.
//!
//! # Responsibilities
//! - Wrap one outbound connection handle per backend address
//! - Track the last observed connectivity state
//! - Generate unique connection IDs for tracing
//!
//! # State Machine
//! ```text
//! Idle ⇄ Connecting → Ready → TransientFailure
//!                       ↑            │
//!                       └────────────┘ (call succeeds again)
//! any → Shutdown (closed by the manager)
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connectivity state of an outbound connection.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle = 0,
    Connecting = 1,
    Ready = 2,
    TransientFailure = 3,
    Shutdown = 4,
}

impl ConnectivityState {
    /// Ready, idle and connecting connections are reused as they are.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            ConnectivityState::Ready | ConnectivityState::Idle | ConnectivityState::Connecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectivityState::Idle => "IDLE",
            ConnectivityState::Connecting => "CONNECTING",
            ConnectivityState::Ready => "READY",
            ConnectivityState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectivityState::Shutdown => "SHUTDOWN",
        }
    }
}

impl From<u8> for ConnectivityState {
    fn from(val: u8) -> Self {
        match val {
            0 => ConnectivityState::Idle,
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            _ => ConnectivityState::Shutdown,
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live connection owned by the connection manager.
///
/// Callers get a shared reference and can only report what they observed;
/// replacing or closing the connection is the manager's job.
#[derive(Debug)]
pub struct ManagedConnection<H> {
    id: ConnectionId,
    address: String,
    handle: H,
    state: AtomicU8,
}

impl<H> ManagedConnection<H> {
    pub(crate) fn new(address: &str, handle: H, state: ConnectivityState) -> Self {
        Self {
            id: ConnectionId::new(),
            address: address.to_string(),
            handle,
            state: AtomicU8::new(state as u8),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The underlying transport handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Last observed state.
    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::from(self.state.load(Ordering::Acquire))
    }

    /// A call on this connection completed at the transport level.
    pub fn mark_ready(&self) {
        self.transition(ConnectivityState::Ready);
    }

    /// A call on this connection failed at the transport level.
    pub fn mark_failed(&self) {
        self.transition(ConnectivityState::TransientFailure);
    }

    pub(crate) fn close(&self) {
        self.state
            .store(ConnectivityState::Shutdown as u8, Ordering::Release);
        tracing::debug!(connection_id = %self.id, address = %self.address, "Connection closed");
    }

    fn transition(&self, next: ConnectivityState) {
        // Shutdown is terminal; a late report from an in-flight call must not revive it.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != ConnectivityState::Shutdown as u8).then_some(next as u8)
            });
    }
}
