pub mod chunker;
pub mod loader;
pub mod ocr;

pub use chunker::{chunk_pages, ChunkerConfig};
pub use loader::load;
