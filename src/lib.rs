// Library exports for wishd
// This allows integration tests and external code to use wishd modules

pub mod catalog;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod provenance;
pub mod routes;
pub mod search;
pub mod state;
pub mod storage;
pub mod wishes;
