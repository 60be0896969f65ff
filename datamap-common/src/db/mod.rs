//! Metadata store access and canonical-table provisioning

pub mod data_types;
pub mod init;
pub mod models;
pub mod schema_sync;

pub use data_types::*;
pub use init::*;
pub use models::*;
pub use schema_sync::*;
