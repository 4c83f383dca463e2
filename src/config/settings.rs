//! Layered configuration: environment variables (primary) over built-in
//! defaults, loaded once at process start.
//!
//! Built on `Config::builder()` + `dotenvy`, flattened (no
//! `APP__`-prefixed nesting) so the field names match the published env
//! var names verbatim.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::utils::limiters::LimitsConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server_host: String,
    pub server_port: u16,

    pub openai_api_key: String,
    pub web_search_api_key: Option<String>,
    pub use_hybrid_agent: bool,

    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_dimension: usize,

    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_temperature: f32,

    pub chunk_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub min_chars: usize,
    pub max_digit_ratio: f32,

    pub default_search_k: usize,
    pub relevance_threshold: f32,
    pub context_char_budget: usize,

    pub web_search_base_url: String,
    pub web_search_results_limit: usize,
    pub web_search_days_back: u32,

    pub max_history_messages: usize,
    pub chroma_persist_dir: String,

    pub retrieval_deadline_ms: u64,
    pub turn_deadline_ms: u64,
    pub web_search_timeout_ms: u64,
    pub embedding_timeout_ms: u64,

    pub embed_batch: usize,
    pub embed_concurrency: usize,
    pub db_search_concurrency: usize,
    pub llm_generate_concurrency: usize,
    pub llm_stream_concurrency: usize,
    pub limiter_acquire_timeout_ms: u64,

    pub ocr_threshold: usize,
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("web_search_api_key", None::<String>)?
            .set_default("use_hybrid_agent", true)?
            .set_default("embedding_model", "text-embedding-3-small")?
            .set_default("embedding_base_url", "https://api.openai.com")?
            .set_default("embedding_dimension", 1536)?
            .set_default("llm_model", "gpt-4o-mini")?
            .set_default("llm_base_url", "https://api.openai.com")?
            .set_default("llm_temperature", 0.7)?
            .set_default("chunk_tokens", 800)?
            .set_default("chunk_overlap_tokens", 100)?
            .set_default("min_chars", 100)?
            .set_default("max_digit_ratio", 0.5)?
            .set_default("default_search_k", 4)?
            .set_default("relevance_threshold", 0.2)?
            .set_default("context_char_budget", 16_000)?
            .set_default("web_search_base_url", "https://api.search.brave.com/res/v1/web/search")?
            .set_default("web_search_results_limit", 3)?
            .set_default("web_search_days_back", 90)?
            .set_default("max_history_messages", 10)?
            .set_default("chroma_persist_dir", "./chroma_db")?
            .set_default("retrieval_deadline_ms", 8_000)?
            .set_default("turn_deadline_ms", 60_000)?
            .set_default("web_search_timeout_ms", 10_000)?
            .set_default("embedding_timeout_ms", 10_000)?
            .set_default("embed_batch", 64)?
            .set_default("embed_concurrency", 4)?
            .set_default("db_search_concurrency", 8)?
            .set_default("llm_generate_concurrency", 4)?
            .set_default("llm_stream_concurrency", 4)?
            .set_default("limiter_acquire_timeout_ms", 5_000)?
            .set_default("ocr_threshold", 100)?
            .set_default("max_upload_bytes", 50 * 1024 * 1024)?
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn limits(&self) -> LimitsConfig {
        LimitsConfig {
            embedding_concurrency: self.embed_concurrency,
            db_search_concurrency: self.db_search_concurrency,
            llm_generate_concurrency: self.llm_generate_concurrency,
            llm_stream_concurrency: self.llm_stream_concurrency,
            acquire_timeout_ms: self.limiter_acquire_timeout_ms,
        }
    }
}
