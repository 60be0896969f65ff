//! # DataMap Common Library
//!
//! Shared code for the DataMap backend:
//! - Error types
//! - Settings loading (env / TOML file)
//! - Event types and EventBus for SSE progress streaming
//! - Metadata store initialization and row models
//! - Dictionary data types and canonical-table schema provisioning

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
