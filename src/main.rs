use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use hybrid_rag_assistant::config::Settings;
use hybrid_rag_assistant::document::ChunkerConfig;
use hybrid_rag_assistant::embedding::OpenAiEmbeddingProvider;
use hybrid_rag_assistant::handlers;
use hybrid_rag_assistant::ingestion::IngestionOrchestrator;
use hybrid_rag_assistant::logging;
use hybrid_rag_assistant::retrieval::generator::Generator;
use hybrid_rag_assistant::session::SessionManager;
use hybrid_rag_assistant::state::AppState;
use hybrid_rag_assistant::utils::Limiters;
use hybrid_rag_assistant::vector::{EmbeddedVectorRepository, VectorRepository};
use hybrid_rag_assistant::websearch::BraveWebSearchTool;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let settings = Arc::new(Settings::load().context("failed to load configuration")?);
    info!(port = settings.server_port, "configuration loaded");

    let limiters = Arc::new(Limiters::new(&settings.limits()));

    let embedder = Arc::new(OpenAiEmbeddingProvider::new(
        settings.embedding_base_url.clone(),
        settings.embedding_model.clone(),
        settings.embedding_dimension,
        Some(settings.openai_api_key.clone()),
        settings.embed_batch,
        settings.embedding_timeout_ms,
        limiters.clone(),
    ));

    let vector_repo = Arc::new(
        EmbeddedVectorRepository::open(settings.embedding_dimension, &settings.chroma_persist_dir)
            .context("failed to open the embedded vector store")?,
    );
    info!(entries = vector_repo.size().await, "vector store opened");

    let web_search = Arc::new(BraveWebSearchTool::new(
        settings.web_search_base_url.clone(),
        settings.web_search_api_key.clone(),
        settings.web_search_timeout_ms,
    ));

    let generator = Arc::new(Generator::new(
        settings.llm_base_url.clone(),
        settings.llm_model.clone(),
        Some(settings.openai_api_key.clone()),
        settings.llm_temperature,
        settings.turn_deadline_ms,
    ));

    let sessions = Arc::new(SessionManager::new(settings.max_history_messages));

    let chunker_cfg = ChunkerConfig {
        chunk_tokens: settings.chunk_tokens,
        overlap_tokens: settings.chunk_overlap_tokens,
        min_chars: settings.min_chars,
        max_digit_ratio: settings.max_digit_ratio,
    };
    let ingestion = Arc::new(IngestionOrchestrator::new(
        embedder.clone() as Arc<dyn hybrid_rag_assistant::embedding::EmbeddingProvider>,
        vector_repo.clone() as Arc<dyn hybrid_rag_assistant::vector::VectorRepository>,
        chunker_cfg,
    ));

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(settings.web_search_timeout_ms))
        .build()
        .context("failed to build the webpage-fetch HTTP client")?;

    let state = Arc::new(AppState {
        settings: settings.clone(),
        vector_repo: vector_repo as Arc<dyn hybrid_rag_assistant::vector::VectorRepository>,
        embedder: embedder as Arc<dyn hybrid_rag_assistant::embedding::EmbeddingProvider>,
        web_search: web_search as Arc<dyn hybrid_rag_assistant::websearch::WebSearchTool>,
        generator,
        sessions,
        limiters,
        ingestion,
        http_client,
    });

    let app = build_router(state, settings.max_upload_bytes);

    let addr = SocketAddr::from((settings.server_host.parse::<std::net::IpAddr>()?, settings.server_port));
    info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload-pdf", post(handlers::upload::upload_pdf_handler))
        .route("/process-webpages", post(handlers::upload::process_webpages_handler))
        .route("/chat", post(handlers::chat::chat_handler))
        .route("/chat/stream", post(handlers::chat::chat_stream_handler))
        .route("/query", post(handlers::query::query_handler))
        .route("/chat/history/{id}", get(handlers::session::history_handler))
        .route("/chat/clear/{id}", delete(handlers::session::clear_session_handler))
        .route("/clear-vector-store", delete(handlers::session::clear_vector_store_handler))
        .route("/health", get(handlers::health::health_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .with_state(state)
}
