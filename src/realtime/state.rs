use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};

/// Lifecycle of a realtime push connection
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Socket is being opened
    Connecting,
    /// Socket open and subscription sent, nothing received yet
    Opened,
    /// At least one message received
    Connected,
    /// Close requested by the client
    Disconnecting,
    /// No socket
    #[default]
    Closed,
    /// Transport gave up; no further transitions
    Failed,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Closed, Connecting)
                | (Connecting, Opened)
                | (Connecting, Closed)
                | (Connecting, Disconnecting)
                | (Opened, Connected)
                | (Opened, Disconnecting)
                | (Opened, Closed)
                | (Connected, Disconnecting)
                | (Connected, Closed)
                | (Disconnecting, Closed)
                | (Connecting | Opened | Connected | Disconnecting | Closed, Failed)
        )
    }

    /// Whether messages can flow in this state
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Opened | ConnectionState::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }
}

/// Exponential delay between reconnect attempts after an unexpected close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    factor: u32,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            initial,
            max,
            factor: factor.max(1),
            current: initial,
        }
    }

    /// Delay before the next attempt. Each call grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self
            .current
            .checked_mul(self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }

    /// Called once a connection opens
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2, Duration::from_secs(60))
    }
}
