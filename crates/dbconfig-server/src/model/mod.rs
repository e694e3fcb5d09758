//! Data models module
//!
//! - `constants` - Configuration keys and server defaults
//! - `config` - Command line and layered configuration
//! - `response` - The `{code, message, data}` envelope
//! - `app_state` - Application state shared across handlers

pub mod app_state;
pub mod config;
pub mod constants;
pub mod response;

pub use app_state::AppState;
pub use config::{Cli, Command, Configuration, ConfigurationError};
pub use response::Result;
