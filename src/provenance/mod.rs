pub mod repository;

pub use repository::{DynProvenanceRepository, ProvenanceRepository, SqliteProvenanceRepository};
