//! WebSocket Message Schemas
//!
//! Real-time messages exchanged with connected clients:
//! - Session snapshots after every state change or tick
//! - The break-end notification (the client plays its sound on this)
//! - Timer commands sent by the client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::mode::Mode;
use crate::models::session::SessionSnapshot;

/// Messages pushed from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full session state
    SessionUpdate(SessionSnapshot),

    /// A break ran out and the session returned to Focus
    BreakFinished(BreakFinishedMessage),

    /// Reply to a client ping
    Pong { timestamp: DateTime<Utc> },

    /// A client command could not be applied
    Error(ErrorMessage),
}

/// Break-end notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakFinishedMessage {
    /// The break mode that just finished
    pub finished_mode: Mode,
    pub timestamp: DateTime<Utc>,
}

/// Error notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}

/// Commands accepted from clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Toggle,
    Reset,
    NextMode,
    SwitchMode { mode: Mode },
    GetSession,
    Ping,
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            code: code.to_string(),
            message: message.into(),
        })
    }
}
