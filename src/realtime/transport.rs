//! Push transport abstraction
//!
//! The engine never talks to a socket directly. It installs handler callbacks
//! and a state listener on a [`RealtimeTransport`] and asks it to connect.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::messages::{ClientAction, RealtimeMessage};
use super::state::{ConnectionState, ReconnectBackoff};
use crate::config::RealtimeConfig;
use crate::error::{AppError, Result};
use crate::metrics::CONNECTION_TRANSITIONS_TOTAL;
use crate::models::Incident;

/// Callbacks a transport invokes for every decoded server message.
///
/// Calls arrive one at a time, in delivery order.
pub trait RealtimeHandlers: Send + Sync {
    fn on_initial(&self, incidents: Vec<Incident>);
    fn on_add(&self, incident: Incident);
    fn on_modify(&self, incident: Incident);
    fn on_remove(&self, incident: Incident);
}

/// Receives `(previous, current)` on every connection state change
pub type StateListener = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

fn noop_listener() -> StateListener {
    Arc::new(|_, _| {})
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open the connection and subscribe. No-op unless currently closed.
    async fn connect(&self) -> Result<()>;

    /// Close the connection on purpose
    async fn disconnect(&self) -> Result<()>;

    /// Install the message callbacks, replacing any previous ones
    fn set_handlers(&self, handlers: Arc<dyn RealtimeHandlers>);

    /// Remove the message callbacks; later messages are dropped
    fn reset_handlers(&self);

    fn set_state_listener(&self, listener: StateListener);

    /// Replace the state listener with a no-op
    fn reset_state_listener(&self);

    fn state(&self) -> ConnectionState;
}

struct TransportInner {
    state: ConnectionState,
    handlers: Option<Arc<dyn RealtimeHandlers>>,
    listener: StateListener,
    backoff: ReconnectBackoff,
    sent: Vec<ClientAction>,
}

/// Deterministic transport driven by the caller.
///
/// Behaves like a socket whose server side is the test (or a replay file):
/// `deliver` plays a server message, `drop_connection` simulates the server
/// going away, and `reconnect` is the retry a real socket would schedule.
pub struct InMemoryTransport {
    inner: Mutex<TransportInner>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_backoff(ReconnectBackoff::default())
    }

    /// A transport reconnecting with the configured backoff
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::with_backoff(config.backoff())
    }

    pub fn with_backoff(backoff: ReconnectBackoff) -> Self {
        Self {
            inner: Mutex::new(TransportInner {
                state: ConnectionState::Closed,
                handlers: None,
                listener: noop_listener(),
                backoff,
                sent: Vec::new(),
            }),
        }
    }

    /// Play one server message
    pub fn deliver(&self, message: RealtimeMessage) -> Result<()> {
        let state = self.state();
        if !state.is_live() {
            return Err(AppError::Transport(format!(
                "cannot deliver '{}' while {}",
                message.kind(),
                state
            )));
        }

        if state == ConnectionState::Opened {
            self.transition(ConnectionState::Connected)?;
        }

        let handlers = self.inner.lock().handlers.clone();
        match handlers {
            Some(handlers) => {
                debug!(kind = message.kind(), "Dispatching realtime message");
                message.dispatch(handlers.as_ref());
            }
            None => warn!(kind = message.kind(), "Realtime message dropped, no handlers installed"),
        }
        Ok(())
    }

    /// Play one server message given as its JSON text
    pub fn deliver_json(&self, text: &str) -> Result<()> {
        let message = RealtimeMessage::from_json(text)?;
        self.deliver(message)
    }

    /// The server closed the socket. Returns how long a real socket would wait
    /// before its next reconnect attempt.
    pub fn drop_connection(&self) -> Result<Duration> {
        self.transition(ConnectionState::Closed)?;
        let delay = self.inner.lock().backoff.next_delay();
        info!(retry_in_ms = delay.as_millis() as u64, "Realtime connection lost");
        Ok(delay)
    }

    /// Retry after an unexpected close
    pub async fn reconnect(&self) -> Result<()> {
        self.connect().await
    }

    /// Give up on the connection for good
    pub fn fail(&self, reason: &str) -> Result<()> {
        warn!(reason = reason, "Realtime transport failed");
        self.transition(ConnectionState::Failed)
    }

    /// Client messages sent so far
    pub fn sent_actions(&self) -> Vec<ClientAction> {
        self.inner.lock().sent.clone()
    }

    fn transition(&self, next: ConnectionState) -> Result<()> {
        let (previous, listener) = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            if !previous.can_transition_to(next) {
                return Err(AppError::InvalidStateTransition(format!(
                    "{} -> {}",
                    previous, next
                )));
            }
            inner.state = next;
            (previous, inner.listener.clone())
        };

        info!(from = %previous, to = %next, "Realtime connection state changed");
        CONNECTION_TRANSITIONS_TOTAL
            .with_label_values(&[&next.to_string()])
            .inc();
        listener(previous, next);
        Ok(())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeTransport for InMemoryTransport {
    async fn connect(&self) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Closed {
            debug!(state = %state, "connect() called on an existing connection, ignoring");
            return Ok(());
        }

        self.transition(ConnectionState::Connecting)?;
        self.transition(ConnectionState::Opened)?;

        let mut inner = self.inner.lock();
        inner.sent.push(ClientAction::Subscribe);
        inner.backoff.reset();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let state = self.state();
        if matches!(state, ConnectionState::Closed | ConnectionState::Failed) {
            return Ok(());
        }

        self.transition(ConnectionState::Disconnecting)?;
        self.transition(ConnectionState::Closed)
    }

    fn set_handlers(&self, handlers: Arc<dyn RealtimeHandlers>) {
        self.inner.lock().handlers = Some(handlers);
    }

    fn reset_handlers(&self) {
        self.inner.lock().handlers = None;
    }

    fn set_state_listener(&self, listener: StateListener) {
        self.inner.lock().listener = listener;
    }

    fn reset_state_listener(&self) {
        self.inner.lock().listener = noop_listener();
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }
}
