//! Realtime wire protocol
//!
//! Server messages are JSON objects tagged by `type`. The only client message
//! is the subscription request sent once the socket opens; without it the
//! server sends nothing.

use serde::{Deserialize, Serialize};

use super::transport::RealtimeHandlers;
use crate::error::Result;
use crate::models::Incident;

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    /// Incident created upstream
    Created { payload: Incident },
    /// Incident changed upstream
    Modified { payload: Incident },
    /// Incident deleted upstream
    Deleted { payload: Incident },
    /// Subscription confirmed, with every incident the server knows about
    Subscribed { start_incidents: Vec<Incident> },
}

impl RealtimeMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The `type` tag as sent on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeMessage::Created { .. } => "created",
            RealtimeMessage::Modified { .. } => "modified",
            RealtimeMessage::Deleted { .. } => "deleted",
            RealtimeMessage::Subscribed { .. } => "subscribed",
        }
    }

    /// The single incident carried by this message (if any)
    pub fn incident(&self) -> Option<&Incident> {
        match self {
            RealtimeMessage::Created { payload }
            | RealtimeMessage::Modified { payload }
            | RealtimeMessage::Deleted { payload } => Some(payload),
            RealtimeMessage::Subscribed { .. } => None,
        }
    }

    /// Hand the message to the matching handler callback
    pub fn dispatch(self, handlers: &dyn RealtimeHandlers) {
        match self {
            RealtimeMessage::Created { payload } => handlers.on_add(payload),
            RealtimeMessage::Modified { payload } => handlers.on_modify(payload),
            RealtimeMessage::Deleted { payload } => handlers.on_remove(payload),
            RealtimeMessage::Subscribed { start_incidents } => handlers.on_initial(start_incidents),
        }
    }
}

/// Message sent from client to server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Start receiving updates for all incidents
    Subscribe,
}
