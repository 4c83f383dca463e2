//! Shared application state, built around the `State<Arc<AppState>>` +
//! `FromRef` substate pattern rather than per-service `Extension` layers.

use std::sync::Arc;

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::ingestion::IngestionOrchestrator;
use crate::retrieval::generator::Generator;
use crate::session::SessionManager;
use crate::utils::Limiters;
use crate::vector::VectorRepository;
use crate::websearch::WebSearchTool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub vector_repo: Arc<dyn VectorRepository>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub web_search: Arc<dyn WebSearchTool>,
    pub generator: Arc<Generator>,
    pub sessions: Arc<SessionManager>,
    pub limiters: Arc<Limiters>,
    pub ingestion: Arc<IngestionOrchestrator>,
    /// Shared client for fetching webpages ingested via `/process-webpages`.
    pub http_client: reqwest::Client,
}
