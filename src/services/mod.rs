//! Services module for Flow Timer
//!
//! Business logic: the session state machine and its async driver, the
//! statistics aggregator, chart reports and the identity and payment
//! provider clients.

pub mod auth_service;
pub mod billing_service;
pub mod chart_service;
pub mod session_machine;
pub mod stats_service;
pub mod time_format;
pub mod time_provider;
pub mod timer_service;

// Re-export commonly used services
pub use auth_service::{AuthProvider, IdentityToolkitAuth};
pub use billing_service::BillingService;
pub use session_machine::{SessionMachine, TickOutcome};
pub use stats_service::{spawn_upload_worker, StatisticsAggregator};
pub use time_provider::{MockTimeProvider, SharedTimeProvider, SystemTimeProvider, TimeProvider};
pub use timer_service::TimerService;
