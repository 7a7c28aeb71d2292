use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, OracleError};
use crate::models::PromptContext;
use crate::services::file_processor::UploadRegistry;
use crate::services::llm_agent::{CompletionRequest, TextOracle};
use crate::services::prompt::{PromptBuilder, SYSTEM_PROMPT};
use crate::services::session::{SessionEntry, SessionStore};
use crate::services::vector_index::{Metadata, SimilarityIndex};

pub const ORACLE_CONFIDENCE: f64 = 0.85;
pub const FALLBACK_ANSWER: &str =
    "AI answering is not configured on this server. Set OPENAI_API_KEY to get answers about your data.";

const SOURCE_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

impl Answer {
    fn fallback() -> Self {
        Self {
            text: FALLBACK_ANSWER.to_string(),
            confidence: 0.0,
            sources: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence == 0.0 && self.text == FALLBACK_ANSWER
    }
}

/// Answers questions about uploaded data through the text oracle.
pub struct QueryService {
    oracle: Arc<dyn TextOracle>,
    sessions: Arc<SessionStore>,
    index: Option<Arc<dyn SimilarityIndex>>,
    registry: UploadRegistry,
    prompt_builder: PromptBuilder,
    model: String,
    max_tokens: u16,
    temperature: f32,
}

impl QueryService {
    pub fn new(
        oracle: Arc<dyn TextOracle>,
        sessions: Arc<SessionStore>,
        index: Option<Arc<dyn SimilarityIndex>>,
        registry: UploadRegistry,
        config: &Config,
    ) -> Self {
        Self {
            oracle,
            sessions,
            index,
            registry,
            prompt_builder: PromptBuilder::new(config.max_context_tokens),
            model: config.openai_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// One oracle round trip. A missing credential yields the fixed
    /// fallback answer; transport failures propagate.
    pub async fn answer(&self, question: &str, context: Option<&PromptContext>) -> Result<Answer, AppError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidInput("Question must not be empty".to_string()));
        }

        let prompt = self.prompt_builder.build(question, context);
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT,
            user_prompt: &prompt,
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        match self.oracle.complete(request).await {
            Ok(text) => Ok(Answer {
                text,
                confidence: ORACLE_CONFIDENCE,
                sources: Vec::new(),
            }),
            Err(OracleError::Unavailable(reason)) => {
                warn!("Answering without oracle: {}", reason);
                Ok(Answer::fallback())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full question flow: resolves context from a registered upload when the
    /// caller sent none, attaches index sources and records the exchange in
    /// the session.
    pub async fn process_query(
        &self,
        question: &str,
        context: Option<PromptContext>,
        session_id: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<Answer, AppError> {
        let start = Instant::now();
        let file_id = file_id.map(str::trim).filter(|id| !id.is_empty());

        let context = match context.filter(|c| !c.is_empty()) {
            Some(ctx) => Some(ctx),
            None => file_id.and_then(|id| self.registry.context_for(id)),
        };

        let mut answer = self.answer(question, context.as_ref()).await?;

        if !answer.is_fallback() {
            if let Some(id) = file_id {
                answer.sources = self.find_sources(question, id).await;
            }
            if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
                self.sessions
                    .append(session_id, SessionEntry::new(question.trim(), answer.text.clone()));
            }
        }

        info!(
            "Processed query ({} chars, {} sources) in {:?}",
            question.len(),
            answer.sources.len(),
            start.elapsed()
        );
        Ok(answer)
    }

    async fn find_sources(&self, question: &str, file_id: &str) -> Vec<String> {
        let Some(index) = &self.index else {
            return Vec::new();
        };

        let mut filter = Metadata::new();
        filter.insert("file_id".to_string(), Value::String(file_id.to_string()));

        match index
            .query(&[question.trim().to_string()], SOURCE_LIMIT, Some(&filter))
            .await
        {
            Ok(mut results) => results
                .pop()
                .unwrap_or_default()
                .into_iter()
                .map(|m| m.id)
                .collect(),
            Err(e) => {
                warn!("Source lookup failed for file {}: {}", file_id, e);
                Vec::new()
            }
        }
    }
}
