//! HTTP API modules for datamap-server

pub mod connections;
pub mod dictionaries;
pub mod dqa;
pub mod extraction;
pub mod health;
pub mod mappings;
pub mod site;
pub mod sse;
pub mod transmission;

pub use connections::connection_routes;
pub use dictionaries::dictionary_routes;
pub use dqa::dqa_routes;
pub use extraction::extraction_routes;
pub use health::health_routes;
pub use mappings::mapping_routes;
pub use site::site_routes;
pub use sse::sse_routes;
pub use transmission::transmission_routes;
