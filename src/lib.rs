//! Flow Timer
//!
//! Flow-style focus timer service. Focus time counts up, breaks are earned
//! as a fifth of the focus period, completed focus time is tracked per day
//! and synced to the signed-in user's remote document, and premium users get
//! weekly, monthly and yearly productivity reports.

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod websocket;

pub use app::Application;
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
