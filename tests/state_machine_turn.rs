//! End-to-end scenarios for a single retrieval turn, driven against
//! trait-double repositories/providers and a `wiremock` stand-in for the
//! OpenAI-compatible generation endpoint, since `Generator` is a concrete
//! `reqwest` client rather than a trait object.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hybrid_rag_assistant::config::Settings;
use hybrid_rag_assistant::domain::{Chunk, ChunkMetadata, RetrievedChunk, Route, WebResult};
use hybrid_rag_assistant::embedding::EmbeddingProvider;
use hybrid_rag_assistant::error::Result;
use hybrid_rag_assistant::retrieval::generator::Generator;
use hybrid_rag_assistant::retrieval::{run_turn, TurnDeps};
use hybrid_rag_assistant::streaming::StreamEvent;
use hybrid_rag_assistant::utils::Limiters;
use hybrid_rag_assistant::vector::VectorRepository;
use hybrid_rag_assistant::websearch::WebSearchTool;

struct CountingEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }
    fn dimension(&self) -> usize {
        4
    }
}

struct FixedVectorRepo {
    calls: AtomicUsize,
    hits: Vec<RetrievedChunk>,
}

#[async_trait]
impl VectorRepository for FixedVectorRepo {
    async fn add(&self, chunks: Vec<(Chunk, Vec<f32>)>) -> Result<usize> {
        Ok(chunks.len())
    }
    async fn search(&self, _query_embedding: &[f32], _top_k: usize, _threshold: f32) -> Result<Vec<RetrievedChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }
    async fn size(&self) -> usize {
        if self.hits.is_empty() {
            0
        } else {
            1
        }
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

struct CountingWebSearch {
    calls: AtomicUsize,
}

#[async_trait]
impl WebSearchTool for CountingWebSearch {
    async fn search_recent(&self, _query: &str, _num_results: usize, _days_back: u32) -> Vec<WebResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }
    async fn search_educational(&self, _query: &str, _num_results: usize) -> Vec<WebResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }
}

fn test_settings(llm_base_url: String) -> Settings {
    Settings {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        openai_api_key: "test-key".to_string(),
        web_search_api_key: None,
        use_hybrid_agent: true,
        embedding_model: "text-embedding-3-small".to_string(),
        embedding_base_url: llm_base_url.clone(),
        embedding_dimension: 4,
        llm_model: "gpt-4o-mini".to_string(),
        llm_base_url,
        llm_temperature: 0.0,
        chunk_tokens: 800,
        chunk_overlap_tokens: 100,
        min_chars: 100,
        max_digit_ratio: 0.5,
        default_search_k: 4,
        relevance_threshold: 0.2,
        context_char_budget: 16_000,
        web_search_base_url: "https://example.invalid".to_string(),
        web_search_results_limit: 3,
        web_search_days_back: 90,
        max_history_messages: 10,
        chroma_persist_dir: "./does-not-matter".to_string(),
        retrieval_deadline_ms: 2_000,
        turn_deadline_ms: 5_000,
        web_search_timeout_ms: 2_000,
        embedding_timeout_ms: 2_000,
        embed_batch: 64,
        embed_concurrency: 4,
        db_search_concurrency: 8,
        llm_generate_concurrency: 4,
        llm_stream_concurrency: 4,
        limiter_acquire_timeout_ms: 2_000,
        ocr_threshold: 100,
        max_upload_bytes: 50 * 1024 * 1024,
    }
}

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{delta}\"}}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mock_generation_server(deltas: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(deltas), "text/event-stream"),
        )
        .mount(&server)
        .await;
    server
}

fn deps(
    settings: Settings,
    vector_repo: Arc<FixedVectorRepo>,
    embedder: Arc<CountingEmbedder>,
    web_search: Arc<CountingWebSearch>,
) -> TurnDeps {
    let settings = Arc::new(settings);
    let limiters = Arc::new(Limiters::new(&settings.limits()));
    let generator = Arc::new(Generator::new(
        settings.llm_base_url.clone(),
        settings.llm_model.clone(),
        Some(settings.openai_api_key.clone()),
        settings.llm_temperature,
        settings.turn_deadline_ms,
    ));

    TurnDeps {
        vector_repo,
        embedder,
        web_search,
        generator,
        limiters,
        settings,
    }
}

#[tokio::test]
async fn greeting_skips_retrieval_entirely() {
    let server = mock_generation_server(&["Hello", "!"]).await;

    let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
    let vector_repo = Arc::new(FixedVectorRepo { calls: AtomicUsize::new(0), hits: Vec::new() });
    let web_search = Arc::new(CountingWebSearch { calls: AtomicUsize::new(0) });

    let settings = test_settings(server.uri());
    let turn_deps = deps(settings, vector_repo.clone(), embedder.clone(), web_search.clone());

    let events: Vec<StreamEvent> =
        run_turn("hello".to_string(), Vec::new(), turn_deps, true).collect().await;

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0, "greeting must not trigger embedding");
    assert_eq!(vector_repo.calls.load(Ordering::SeqCst), 0, "greeting must not trigger vector search");
    assert_eq!(web_search.calls.load(Ordering::SeqCst), 0, "greeting must not trigger web search");

    let full_answer: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(full_answer, "Hello!");

    match events.iter().find(|e| matches!(e, StreamEvent::Sources { .. })).unwrap() {
        StreamEvent::Sources { pdf_sources, web_sources, route_used } => {
            assert!(pdf_sources.is_empty());
            assert!(web_sources.is_empty());
            assert_eq!(*route_used, Route::None);
        }
        _ => unreachable!(),
    }
    assert!(matches!(events.last().unwrap(), StreamEvent::Done {}));
}

#[tokio::test]
async fn textbook_question_routes_to_pdf_only_and_surfaces_page_metadata() {
    let server = mock_generation_server(&["A rational number is p/q."]).await;

    let hit = RetrievedChunk {
        chunk: Chunk {
            id: "abc123".to_string(),
            text: "A rational number is a number that can be expressed as p/q.".to_string(),
            metadata: ChunkMetadata {
                source: "algebra.pdf".to_string(),
                page: 3,
                chunk_index: 0,
                total_chunks: 1,
                subject: Some("algebra".to_string()),
                chapter: None,
                section: None,
                content_type: None,
                has_math: true,
            },
        },
        score: 0.91,
    };

    let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
    let vector_repo = Arc::new(FixedVectorRepo { calls: AtomicUsize::new(0), hits: vec![hit] });
    let web_search = Arc::new(CountingWebSearch { calls: AtomicUsize::new(0) });

    let settings = test_settings(server.uri());
    let turn_deps = deps(settings, vector_repo.clone(), embedder.clone(), web_search.clone());

    let events: Vec<StreamEvent> = run_turn(
        "explain exercise 3 from chapter 2".to_string(),
        Vec::new(),
        turn_deps,
        true,
    )
    .collect()
    .await;

    assert_eq!(web_search.calls.load(Ordering::SeqCst), 0, "PDF_ONLY must not call the web search tool");

    match events.iter().find(|e| matches!(e, StreamEvent::Sources { .. })).unwrap() {
        StreamEvent::Sources { pdf_sources, web_sources, route_used } => {
            assert_eq!(*route_used, Route::PdfOnly);
            assert!(web_sources.is_empty());
            assert_eq!(pdf_sources.len(), 1);
            assert_eq!(pdf_sources[0].chunk.metadata.page, 3);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn generation_failure_yields_a_single_terminal_error_with_no_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
    let vector_repo = Arc::new(FixedVectorRepo { calls: AtomicUsize::new(0), hits: Vec::new() });
    let web_search = Arc::new(CountingWebSearch { calls: AtomicUsize::new(0) });

    let settings = test_settings(server.uri());
    let turn_deps = deps(settings, vector_repo, embedder, web_search);

    let events: Vec<StreamEvent> =
        run_turn("hello".to_string(), Vec::new(), turn_deps, true).collect().await;

    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Chunk { .. })));
    assert_eq!(events.len(), 1, "a pre-generation failure yields exactly the terminal error event");
    assert!(matches!(events[0], StreamEvent::Error { .. }));
}
