//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This is an
//! approximation for bounding memory, not a model of any specific tokenizer,
//! so callers must tolerate drift.

use parley_core::memory::ShortTermEntry;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Sum the stored estimates of a slice of entries.
pub fn estimate_entries_tokens(entries: &[ShortTermEntry]) -> usize {
    entries.iter().map(|e| e.estimated_tokens).sum()
}
