//! Third-party service integrations used while bringing the engine up.

pub mod openai;

pub use openai::ModelCatalog;
