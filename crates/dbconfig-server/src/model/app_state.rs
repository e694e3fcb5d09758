//! Application state shared across handlers

use std::sync::Arc;

use dbconfig_engine::ConfigEngine;

use super::config::Configuration;

/// Built once at startup and handed to every worker
pub struct AppState {
    pub configuration: Configuration,
    pub engine: Arc<ConfigEngine>,
}

impl AppState {
    pub fn new(configuration: Configuration, engine: ConfigEngine) -> Self {
        Self {
            configuration,
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &ConfigEngine {
        &self.engine
    }
}
