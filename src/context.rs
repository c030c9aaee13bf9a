//! Budgeted assembly of retrieved passages into generation context.
//!
//! Token cost is estimated as `ceil(chars / 4)` over whitespace-normalized
//! text. This is a heuristic, not a tokenizer, and every budgeting decision
//! goes through it so results are reproducible.

use crate::retriever::RankedResult;
use crate::utils::normalize_whitespace;

pub const CHARS_PER_TOKEN: usize = 4;

/// Fixed cost charged per entry for its header and separator.
pub const ENTRY_OVERHEAD_TOKENS: usize = 16;

pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Estimated token cost of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    normalize_whitespace(text).chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn format_entry(position: usize, result: &RankedResult, text: &str) -> String {
    format!("Document {} (Page {}):\n{}", position, result.id, text)
}

/// Packs rank-ordered `results` into at most `max_tokens` estimated tokens.
///
/// Returns the context and how many results it includes. Results are taken
/// whole, in order, until the next one would not fit. A first result that
/// alone overflows the budget is truncated and becomes the only entry.
pub fn assemble_context(results: &[RankedResult], max_tokens: usize) -> (String, usize) {
    let mut entries: Vec<String> = Vec::new();
    let mut used_tokens = 0;

    for result in results {
        let text = normalize_whitespace(&result.text);
        let cost = text.chars().count().div_ceil(CHARS_PER_TOKEN) + ENTRY_OVERHEAD_TOKENS;

        if used_tokens + cost > max_tokens {
            if entries.is_empty() {
                if let Some(truncated) = truncate_to_budget(&text, max_tokens) {
                    entries.push(format_entry(1, result, &truncated));
                }
            }
            break;
        }

        used_tokens += cost;
        entries.push(format_entry(entries.len() + 1, result, &text));
    }

    let used_count = entries.len();
    (entries.join("\n\n"), used_count)
}

/// Cuts `text` so that it, the marker and the entry overhead fit in
/// `max_tokens`. `None` when not even the marker fits.
fn truncate_to_budget(text: &str, max_tokens: usize) -> Option<String> {
    let marker_chars = TRUNCATION_MARKER.chars().count();
    let body_chars = (max_tokens * CHARS_PER_TOKEN)
        .checked_sub(ENTRY_OVERHEAD_TOKENS * CHARS_PER_TOKEN + marker_chars)?;

    let mut truncated: String = text.chars().take(body_chars).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push_str(TRUNCATION_MARKER);
    Some(truncated)
}

/// Applies an entry cap and a token budget derived from configuration.
pub struct ContextBudgeter {
    max_tokens: usize,
    max_entries: usize,
}

impl ContextBudgeter {
    pub fn new(max_tokens: usize, max_entries: usize) -> Self {
        ContextBudgeter {
            max_tokens,
            max_entries,
        }
    }

    pub fn assemble(&self, results: &[RankedResult]) -> (String, usize) {
        let capped = &results[..results.len().min(self.max_entries)];
        assemble_context(capped, self.max_tokens)
    }
}
