//! Prompt assembly for the text-generation oracle.
//!
//! The layout is fixed so prompts stay stable and testable regardless of
//! what the model does with them:
//!
//! ```text
//! You are a helpful AI assistant that analyzes CSV data.
//! Answer questions about the data in a clear, concise manner.
//!
//! Question: {question}
//!
//! Data Context:
//! Columns: {headers}
//! Total rows: {total_rows}
//! Summary: {summary}
//!
//! Please provide a helpful answer based on the data.
//! ```
//!
//! The `Data Context:` block appears only when a context with at least one
//! field is supplied, and each field line only when that field is present.

use std::borrow::Cow;

use crate::models::PromptContext;
use crate::services::csv::utils::group_thousands;

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant for analyzing CSV data.";

const PREAMBLE: &str = "You are a helpful AI assistant that analyzes CSV data.\n\
                        Answer questions about the data in a clear, concise manner.\n";
const CLOSING: &str = "Please provide a helpful answer based on the data.";
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_context_tokens: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { max_context_tokens: 2000 }
    }
}

impl PromptBuilder {
    pub fn new(max_context_tokens: usize) -> Self {
        Self { max_context_tokens }
    }

    pub fn build(&self, question: &str, context: Option<&PromptContext>) -> String {
        let mut prompt = String::from(PREAMBLE);
        prompt.push_str(&format!("\nQuestion: {}\n", question.trim()));

        if let Some(ctx) = context.filter(|c| !c.is_empty()) {
            prompt.push_str("\nData Context:\n");
            if let Some(headers) = ctx.headers() {
                prompt.push_str(&format!("Columns: {}\n", headers.join(", ")));
            }
            if let Some(total_rows) = ctx.total_rows {
                prompt.push_str(&format!("Total rows: {}\n", group_thousands(total_rows)));
            }
            if let Some(summary) = ctx.summary() {
                prompt.push_str(&format!(
                    "Summary: {}\n",
                    truncate_to_tokens(summary, self.max_context_tokens)
                ));
            }
        }

        prompt.push('\n');
        prompt.push_str(CLOSING);
        prompt
    }
}

pub fn build_prompt(question: &str, context: Option<&PromptContext>) -> String {
    PromptBuilder::default().build(question, context)
}

/// Rough token count: about four bytes of text per token.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

fn truncate_to_tokens(text: &str, max_tokens: usize) -> Cow<'_, str> {
    if estimate_tokens(text) <= max_tokens {
        return Cow::Borrowed(text);
    }

    let byte_budget = (max_tokens * 4).saturating_sub(ELLIPSIS.len());
    let end = text
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= byte_budget)
        .last()
        .unwrap_or(0);

    Cow::Owned(format!("{}{}", &text[..end], ELLIPSIS))
}
