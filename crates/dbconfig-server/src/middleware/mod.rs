// HTTP middleware implementations

pub mod auth; // Gateway identity header
