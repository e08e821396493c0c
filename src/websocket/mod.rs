//! WebSocket Module
//!
//! Live session updates and timer commands over `GET /ws`.

pub mod handler;

pub use handler::{handle_client_message, websocket_handler};
