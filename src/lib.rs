pub mod config;
pub mod document;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod logging;
pub mod retrieval;
pub mod session;
pub mod state;
pub mod streaming;
pub mod utils;
pub mod vector;
pub mod websearch;
