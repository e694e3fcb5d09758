//! HTTP API handlers and request models

pub mod conffile;
pub mod confitem;
pub mod health;
pub mod model;
pub mod route;
pub mod version;
