//! dualsign daemon library
//!
//! REST surface over the two-party signing workflow:
//! - contract creation and lookup
//! - per-party signing with phase transitions
//! - finalization retries

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod telemetry;

pub use api::build_router;
pub use config::ServiceConfig;
pub use error::{ApiError, ServiceError, ServiceResult};
pub use server::Server;
pub use state::ServiceState;
