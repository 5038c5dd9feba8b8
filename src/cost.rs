//! Token and cost estimation for the usage ledger.
//!
//! Both numbers come from a fixed linear heuristic over the word count of
//! the generated text, not from provider-reported usage.

use crate::config::CostConfig;

#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    tokens_per_word: f64,
    cost_per_1k_tokens: f64,
}

impl CostModel {
    pub fn new(tokens_per_word: f64, cost_per_1k_tokens: f64) -> Self {
        Self {
            tokens_per_word,
            cost_per_1k_tokens,
        }
    }

    pub fn from_config(config: &CostConfig) -> Self {
        Self::new(config.tokens_per_word, config.cost_per_1k_tokens)
    }

    /// Estimated tokens: whitespace-delimited words × tokens per word, truncated.
    pub fn estimate_tokens(&self, text: &str) -> i64 {
        let words = text.split_whitespace().count();
        (words as f64 * self.tokens_per_word) as i64
    }

    pub fn calculate_cost(&self, tokens: i64) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k_tokens
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_config(&CostConfig::default())
    }
}
