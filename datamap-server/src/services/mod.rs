//! Engine modules for datamap-server

pub mod coercion;
pub mod dictionary_sync;
pub mod dqa;
pub mod extraction;
pub mod query_builder;
pub mod reconcile;
pub mod source;
pub mod transmission;
pub mod universal_dictionary;

pub use dictionary_sync::provision_canonical_tables;
