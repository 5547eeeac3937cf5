//! REST adapter for the booking backend: reservations, enrollment uploads and
//! the order resource.

pub mod classify;
pub mod config;
pub mod http;

pub use config::{BackendConfig, StaticToken};
pub use http::HttpBackend;
