//! The hybrid retrieval orchestrator: ROUTE → {retrieve in parallel} →
//! FUSE → GENERATE → DONE/FAILED, expressed as a plain async function
//! yielding a typed event stream rather than a graph DSL.
//!
//! Deliberately five states and nothing more: no LLM planner layered on
//! top, no "deep scan" pass, no self-verification retry loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use chrono::Datelike;
use futures::Stream;

use crate::config::Settings;
use crate::domain::{Message, Role, RetrievedChunk, Route, WebResult};
use crate::embedding::EmbeddingProvider;
use crate::error::CoreError;
use crate::streaming::StreamEvent;
use crate::utils::token_estimator::estimate_tokens;
use crate::utils::Limiters;
use crate::vector::VectorRepository;
use crate::websearch::WebSearchTool;

use super::fusion::fuse;
use super::generator::{ChatMessage, Generator};
use super::router;

pub struct TurnDeps {
    pub vector_repo: Arc<dyn VectorRepository>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub web_search: Arc<dyn WebSearchTool>,
    pub generator: Arc<Generator>,
    pub limiters: Arc<Limiters>,
    pub settings: Arc<Settings>,
}

const SYSTEM_PROMPT: &str = "You are an educational assistant. Answer in markdown. Delimit inline math \
with $...$ and block math with $$...$$ — no other math delimiter is valid. When you use a textbook or web \
source, cite it inline using its label, e.g. (1) or (W2). If the provided context is empty, explicitly say \
that no information was found before answering from general knowledge.";

pub fn run_turn(
    query: String,
    history: Vec<Message>,
    deps: TurnDeps,
    use_rag: bool,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    stream! {
        let current_year = chrono::Utc::now().year();

        let route = if use_rag {
            let index_size = deps.vector_repo.size().await;
            let decided = router::route(&query, current_year, index_size == 0, &deps.generator).await;
            if deps.settings.use_hybrid_agent {
                decided
            } else {
                downgrade_web(decided)
            }
        } else {
            Route::None
        };
        tracing::info!(route = ?route, use_rag, use_hybrid_agent = deps.settings.use_hybrid_agent, query = %query, "route decided");

        let retrieval_deadline = Duration::from_millis(deps.settings.retrieval_deadline_ms);
        let recency = router::is_recency(&query.to_lowercase(), current_year);

        let (pdf_sources, web_sources) = match route {
            Route::None => (Vec::new(), Vec::new()),
            Route::PdfOnly => {
                let pdf = retrieve_pdf(&query, &deps, retrieval_deadline).await;
                (pdf, Vec::new())
            }
            Route::WebOnly => {
                let web = retrieve_web(&query, recency, &deps, retrieval_deadline).await;
                (Vec::new(), web)
            }
            Route::Both => {
                let pdf_fut = retrieve_pdf(&query, &deps, retrieval_deadline);
                let web_fut = retrieve_web(&query, recency, &deps, retrieval_deadline);
                tokio::join!(pdf_fut, web_fut)
            }
        };

        let combined_context = fuse(&pdf_sources, &web_sources, deps.settings.context_char_budget);

        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: format!("{SYSTEM_PROMPT}\n\n{combined_context}"),
        }];
        let history_window = history
            .iter()
            .rev()
            .take(deps.settings.max_history_messages)
            .collect::<Vec<_>>()
            .into_iter()
            .rev();
        for message in history_window {
            messages.push(ChatMessage {
                role: role_str(message.role).to_string(),
                content: message.content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: query.clone(),
        });

        let estimated_prompt_tokens: usize = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        tracing::debug!(estimated_prompt_tokens, "prompt token budget (chars/4 fallback estimate)");

        let (_permit, wait) = match Limiters::acquire_timed(
            deps.limiters.llm_generate.clone(),
            deps.limiters.acquire_timeout,
            "llm_generate",
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                yield StreamEvent::Error { message: CoreError::GenerationUnavailable(e.to_string()).user_message() };
                return;
            }
        };
        tracing::debug!(wait_ms = wait.as_millis() as u64, op = "llm_generate", "wait_queue");

        let turn_deadline = Duration::from_millis(deps.settings.turn_deadline_ms);
        let turn_start = Instant::now();

        let mut generation_stream = Box::pin(deps.generator.chat_stream(messages));
        let mut full_answer = String::new();
        let mut emitted_any = false;

        use futures::StreamExt;
        loop {
            if turn_start.elapsed() >= turn_deadline {
                yield StreamEvent::Error { message: "the turn exceeded its time budget".to_string() };
                return;
            }

            let remaining = turn_deadline.saturating_sub(turn_start.elapsed());
            let next = tokio::time::timeout(remaining, generation_stream.next()).await;

            match next {
                Ok(Some(Ok(delta))) => {
                    full_answer.push_str(&delta);
                    emitted_any = true;
                    yield StreamEvent::Chunk { content: delta };
                }
                Ok(Some(Err(e))) => {
                    if emitted_any {
                        yield StreamEvent::Error { message: CoreError::GenerationInterrupted(e.to_string()).user_message() };
                    } else {
                        yield StreamEvent::Error { message: CoreError::GenerationUnavailable(e.to_string()).user_message() };
                    }
                    return;
                }
                Ok(None) => break,
                Err(_) => {
                    yield StreamEvent::Error { message: "the turn exceeded its time budget".to_string() };
                    return;
                }
            }
        }

        if !emitted_any {
            yield StreamEvent::Error {
                message: CoreError::GenerationUnavailable("no response produced".to_string()).user_message(),
            };
            return;
        }

        yield StreamEvent::Sources { pdf_sources, web_sources, route_used: route };
        yield StreamEvent::Done {};
    }
}

/// Strips the web leg from a decided route when web retrieval is disabled,
/// mirroring how `use_rag = false` forces `Route::None` upstream.
fn downgrade_web(route: Route) -> Route {
    match route {
        Route::WebOnly => Route::None,
        Route::Both => Route::PdfOnly,
        other => other,
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

async fn retrieve_pdf(query: &str, deps: &TurnDeps, deadline: Duration) -> Vec<RetrievedChunk> {
    let fut = async {
        // No embedding-limiter acquisition here: `deps.embedder.embed` already
        // bounds its own concurrency on a cache miss, and this task would
        // otherwise hold an outer permit while waiting on an inner one from
        // the same semaphore.
        let embedding = deps.embedder.embed(query).await?;

        let (_permit, _wait) = Limiters::acquire_timed(
            deps.limiters.db_search.clone(),
            deps.limiters.acquire_timeout,
            "db_search",
        )
        .await
        .map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;

        deps.vector_repo
            .search(&embedding, deps.settings.default_search_k, deps.settings.relevance_threshold)
            .await
    };

    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "pdf retrieval failed, degrading to empty");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("pdf retrieval exceeded the retrieval deadline");
            Vec::new()
        }
    }
}

async fn retrieve_web(query: &str, recency: bool, deps: &TurnDeps, deadline: Duration) -> Vec<WebResult> {
    let limit = deps.settings.web_search_results_limit;
    let fut = async {
        if recency {
            deps.web_search.search_recent(query, limit, deps.settings.web_search_days_back).await
        } else {
            deps.web_search.search_educational(query, limit).await
        }
    };

    match tokio::time::timeout(deadline, fut).await {
        Ok(results) => results,
        Err(_) => {
            tracing::warn!("web retrieval exceeded the retrieval deadline");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downgrade_web_strips_the_web_leg() {
        assert_eq!(downgrade_web(Route::WebOnly), Route::None);
        assert_eq!(downgrade_web(Route::Both), Route::PdfOnly);
    }

    #[test]
    fn downgrade_web_leaves_non_web_routes_untouched() {
        assert_eq!(downgrade_web(Route::None), Route::None);
        assert_eq!(downgrade_web(Route::PdfOnly), Route::PdfOnly);
    }
}
