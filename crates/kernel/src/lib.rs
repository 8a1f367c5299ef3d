//! Meridian Kernel Library
//!
//! Content search, curated feeds, widget block editing and managed file
//! promotion behind an axum HTTP surface. The `meridian` binary wires these
//! to Postgres and Redis; integration tests wire them to in-memory fakes.

pub mod cache;
pub mod clock;
pub mod config;
pub mod config_storage;
pub mod content;
pub mod curated;
pub mod db;
pub mod editor;
pub mod error;
pub mod file;
pub mod form;
pub mod routes;
pub mod search;
pub mod session;
pub mod settings;
pub mod state;
pub mod theme;

pub use config::Config;
pub use state::{AppState, StateParts};
