pub mod index;
pub mod persistence;
pub mod repository;

pub use repository::{EmbeddedVectorRepository, VectorRepository};
