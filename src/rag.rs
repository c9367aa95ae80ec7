//! Retrieval-augmented question answering.
//!
//! [`RagPipeline::ask`] runs one stateless request:
//!
//! ```text
//! question + session window
//!        │
//!        ▼
//!  embed → top-k search ──(no hits)──► NoRelevantContext, LLM not called
//!        │
//!        ▼
//!  "File: <source>\n<text>" blocks → prompt template → CompletionModel
//!        │
//!        ├─ Ok(text) ──► Answered
//!        └─ Err(e)   ──► Failed { reason }
//! ```
//!
//! Embedding and retrieval failures are returned as `Err`. Completion
//! failures are reported through [`AnswerStatus::Failed`] so a caller can
//! never mistake an error message for model output.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::index::{self, Collection};
use crate::llm::CompletionModel;
use crate::models::{ConversationTurn, ScoredChunk};
use crate::session::Session;

/// Returned when retrieval finds nothing to ground an answer on.
pub const NO_RELEVANT_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the repository to answer your question.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The model produced an answer from retrieved context.
    Answered,
    /// Retrieval returned nothing; the model was not called.
    NoRelevantContext,
    /// The completion call failed.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub status: AnswerStatus,
    /// Model output, the fixed no-context answer, or empty on failure.
    pub answer: String,
    /// Chunks placed in the prompt, best first.
    pub sources: Vec<ScoredChunk>,
}

impl RagAnswer {
    pub fn is_answered(&self) -> bool {
        self.status == AnswerStatus::Answered
    }

    /// Session record for this exchange.
    pub fn to_turn(&self, question: &str) -> ConversationTurn {
        ConversationTurn {
            question: question.to_string(),
            answer: self.answer.clone(),
            cited_chunks: self.sources.iter().map(|s| s.chunk.clone()).collect(),
        }
    }
}

pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn CompletionModel>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn CompletionModel>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            llm,
            top_k,
        }
    }

    /// Answer `question` against `collection`, replaying the session window.
    ///
    /// The session is read, not modified; recording the turn is the caller's job.
    pub async fn ask(
        &self,
        collection: Option<&Collection>,
        question: &str,
        session: &Session,
    ) -> Result<RagAnswer> {
        let query = session.windowed_query(question);
        let hits = index::search(self.embedder.as_ref(), collection, &query, self.top_k).await?;

        if hits.is_empty() {
            tracing::debug!("no chunks retrieved; skipping completion call");
            return Ok(RagAnswer {
                status: AnswerStatus::NoRelevantContext,
                answer: NO_RELEVANT_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let prompt = render_prompt(&build_context(&hits), &query);
        tracing::debug!(
            hits = hits.len(),
            prompt_chars = prompt.len(),
            model = self.llm.model_name(),
            "calling completion model"
        );

        match self.llm.complete(&prompt).await {
            Ok(answer) => Ok(RagAnswer {
                status: AnswerStatus::Answered,
                answer,
                sources: hits,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "completion call failed");
                Ok(RagAnswer {
                    status: AnswerStatus::Failed {
                        reason: e.to_string(),
                    },
                    answer: String::new(),
                    sources: hits,
                })
            }
        }
    }
}

/// Join retrieved chunks as `File: <source>\n<text>` blocks.
pub fn build_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| format!("File: {}\n{}", hit.chunk.source_id, hit.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an expert software engineer and documentation analyst. \
Based on the provided context from a GitHub repository, answer the user's question comprehensively and accurately.

Context from repository files:
{context}

Question: {question}

Instructions:
- Provide a detailed, technical answer based on the repository context
- Reference specific files, functions, or code sections when relevant
- If you need to show code examples, use proper formatting
- If the context doesn't contain sufficient information, clearly state what's missing
- Be helpful and educational in your explanations
- Include practical advice when applicable

Answer:"
    )
}
