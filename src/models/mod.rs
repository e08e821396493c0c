//! Models module for Flow Timer
//!
//! Contains all data models and their validation logic.

pub mod auth;
pub mod billing;
pub mod chart;
pub mod mode;
pub mod session;
pub mod statistics;
pub mod websocket_messages;

// Re-export commonly used types
pub use mode::Mode;
pub use session::{Session, SessionSnapshot};
pub use statistics::{FocusHistory, UserStats};
