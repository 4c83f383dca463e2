//! Deterministic, dependency-free token estimate used for prompt-budget
//! arithmetic: `chars / 4` as a cheap fallback. The chunker's actual sizing
//! decisions use a real tokenizer (`text-splitter`'s `tiktoken-rs`
//! feature); this estimator is for the cheaper, tokenizer-free budget
//! check the retrieval state machine logs before a generation call.

/// `chars / 4`, rounded up. No tokenizer dependency, so this is safe to
/// call on the hot path for a quick budget estimate.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_over_four_rounded_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}