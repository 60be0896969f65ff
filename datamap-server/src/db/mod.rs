//! Metadata store repositories for datamap-server

pub mod active;
pub mod canonical;
pub mod change_log;
pub mod dictionaries;
pub mod dqa_reports;
pub mod extract_queries;
pub mod history;
pub mod mappings;
pub mod terms;

pub use dictionaries::DictionaryLayer;
