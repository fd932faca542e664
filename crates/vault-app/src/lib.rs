//! Command-line client for collectible holdings.
//!
//! Wires the pieces together:
//! - TOML configuration
//! - HTTP or fixture-backed source
//! - portfolio loading, actions and the countdown

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, Backend};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
