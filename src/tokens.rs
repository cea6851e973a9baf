use tracing::debug;

use crate::error::TokenizeError;
use crate::types::CompletedTool;

/// Counts tokens for a piece of text. Plug in a real tokenizer here; the
/// accounting layer falls back to the length heuristic if it fails.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<u64, TokenizeError>;
}

/// chars/4. Good enough for before/after comparisons.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> Result<u64, TokenizeError> {
        Ok(heuristic_tokens(text))
    }
}

pub fn heuristic_tokens(text: &str) -> u64 {
    (text.len() as u64) / 4
}

/// Estimate tokens, never failing.
pub fn estimate_tokens(counter: &dyn TokenCounter, text: &str) -> u64 {
    match counter.count(text) {
        Ok(n) => n,
        Err(e) => {
            debug!(error = %e, "token counter failed, using length heuristic");
            heuristic_tokens(text)
        }
    }
}

/// Cost of a completed tool part as the model sees it: serialized input
/// plus output text.
pub fn part_cost(counter: &dyn TokenCounter, tool: &CompletedTool) -> u64 {
    let input = serde_json::to_string(&tool.input).unwrap_or_default();
    estimate_tokens(counter, &input) + estimate_tokens(counter, &tool.output)
}
