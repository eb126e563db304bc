//! HTTP front end for runbox: script upload, run control, logs and status.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use state::AppState;
