//! Application startup utilities module.

mod engine;
mod http;
mod logging;

pub use engine::{build_engine, build_engine_with_codec, init_store};
pub use http::api_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
