//! Storage-side checks run while the engine's storages initialize.

pub mod neo4j;

pub use neo4j::GraphStore;
