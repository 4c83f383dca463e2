//! The ROUTE state: rule-based classification with an LLM fallback.
//!
//! Lowercase the query, test it against small keyword-pattern arrays in
//! priority order, log which pattern fired, then fall back to an
//! LLM-classified label when no rule fires unambiguously.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::Route;
use crate::retrieval::generator::Generator;

const GREETING_KEYWORDS: &[&str] = &["hello", "hi", "hey", "good morning", "good evening", "greetings"];
const RECENCY_KEYWORDS: &[&str] = &["latest", "recent", "current", "news", "today", "this year"];
const TEXTBOOK_KEYWORDS: &[&str] = &["chapter", "section", "exercise", "textbook"];

static STRUCTURAL_SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+").expect("valid regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a retrieval router. Reply with exactly one token: \
NONE, PDF_ONLY, WEB_ONLY, or BOTH. NONE means the message needs no factual grounding (a greeting or \
chit-chat). PDF_ONLY means the question is about textbook material. WEB_ONLY means it needs current \
information. BOTH means it needs both. Reply with only the token, nothing else.";

fn is_greeting(query: &str) -> bool {
    let word_count = query.split_whitespace().count();
    let has_question_marker = query.contains('?');
    word_count <= 4 && !has_question_marker && GREETING_KEYWORDS.iter().any(|k| query.contains(k))
}

pub(crate) fn is_recency(query: &str, current_year: i32) -> bool {
    if RECENCY_KEYWORDS.iter().any(|k| query.contains(k)) {
        return true;
    }
    YEAR_RE
        .find_iter(query)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .any(|year| year >= current_year - 1)
}

fn is_textbook(query: &str) -> bool {
    TEXTBOOK_KEYWORDS.iter().any(|k| query.contains(k)) || STRUCTURAL_SECTION_RE.is_match(query)
}

/// Rule-based classification. Returns `None` when neither pattern fires
/// uniquely and an LLM fallback (or the deterministic default) is needed.
fn classify_by_rules(query: &str, current_year: i32) -> Option<Route> {
    if is_greeting(query) {
        return Some(Route::None);
    }

    let recency = is_recency(query, current_year);
    let textbook = is_textbook(query);

    match (recency, textbook) {
        (true, false) => Some(Route::WebOnly),
        (false, true) => Some(Route::PdfOnly),
        // Both patterns firing is as ambiguous as neither firing; let the
        // classifier break the tie rather than assuming `Both`.
        (true, true) => None,
        (false, false) => None,
    }
}

fn parse_classifier_label(label: &str) -> Option<Route> {
    match label.trim().to_ascii_uppercase().as_str() {
        "NONE" => Some(Route::None),
        "PDF_ONLY" => Some(Route::PdfOnly),
        "WEB_ONLY" => Some(Route::WebOnly),
        "BOTH" => Some(Route::Both),
        _ => None,
    }
}

/// Resolves the route for a query. `index_is_empty` decides the
/// deterministic default on classifier failure/invalid-label.
pub async fn route(query: &str, current_year: i32, index_is_empty: bool, generator: &Generator) -> Route {
    let normalized = query.trim().to_lowercase();

    if let Some(route) = classify_by_rules(&normalized, current_year) {
        tracing::debug!(query = %query, ?route, "route decided by rules");
        return route;
    }

    match generator.classify(CLASSIFIER_SYSTEM_PROMPT, query).await {
        Ok(label) => match parse_classifier_label(&label) {
            Some(route) => {
                tracing::debug!(query = %query, ?route, label, "route decided by classifier");
                route
            }
            None => {
                tracing::warn!(query = %query, label, "classifier returned an invalid label, using default fallback");
                default_fallback(index_is_empty)
            }
        },
        Err(e) => {
            tracing::warn!(query = %query, error = %e, "route classifier failed, using default fallback");
            default_fallback(index_is_empty)
        }
    }
}

fn default_fallback(index_is_empty: bool) -> Route {
    if index_is_empty {
        Route::WebOnly
    } else {
        Route::PdfOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2026;

    #[test]
    fn greeting_routes_to_none() {
        assert_eq!(classify_by_rules("hello", YEAR), Some(Route::None));
        assert_eq!(classify_by_rules("hi there friend", YEAR), Some(Route::None));
    }

    #[test]
    fn greeting_with_question_mark_is_not_a_greeting() {
        assert_eq!(classify_by_rules("hi, how are you?", YEAR), None);
    }

    #[test]
    fn recency_keywords_route_to_web_only() {
        assert_eq!(
            classify_by_rules("what are the latest developments in ai", YEAR),
            Some(Route::WebOnly)
        );
    }

    #[test]
    fn textbook_keywords_route_to_pdf_only() {
        assert_eq!(
            classify_by_rules("explain exercise 3 from chapter 2", YEAR),
            Some(Route::PdfOnly)
        );
    }

    #[test]
    fn structural_pattern_routes_to_pdf_only() {
        assert_eq!(classify_by_rules("what does section 4.2 cover", YEAR), Some(Route::PdfOnly));
    }

    #[test]
    fn both_patterns_firing_defers_to_the_classifier() {
        assert_eq!(
            classify_by_rules("how do modern chapter 3 concepts relate to current events", YEAR),
            None
        );
    }

    #[test]
    fn neither_pattern_firing_needs_classifier() {
        assert_eq!(classify_by_rules("how do computers use rational numbers", YEAR), None);
    }

    #[test]
    fn default_fallback_prefers_pdf_when_index_nonempty() {
        assert_eq!(default_fallback(false), Route::PdfOnly);
        assert_eq!(default_fallback(true), Route::WebOnly);
    }

    #[test]
    fn invalid_label_parses_to_none() {
        assert_eq!(parse_classifier_label("maybe"), None);
        assert_eq!(parse_classifier_label("both"), Some(Route::Both));
    }
}
