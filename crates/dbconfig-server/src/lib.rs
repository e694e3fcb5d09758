// Main library module for the dbconfig server: HTTP surface, configuration,
// logging and maintenance commands over the dbconfig engine

// Module declarations
pub mod api; // API handlers and request models
pub mod command; // dump and rekey commands
pub mod error; // Transport error boundary
pub mod middleware; // HTTP middleware
pub mod model; // Configuration, state and response envelope
pub mod startup; // Application startup utilities

pub use error::AppError;
pub use model::{AppState, Configuration};
