//! Code generation from a free-form task description.
//!
//! Uses the same [`CompletionModel`] as question answering; there is one
//! configured model for every call path. Prior prompt/code pairs from the
//! session are replayed so follow-up requests ("now add tests") work.

use std::sync::Arc;

use crate::llm::CompletionModel;
use crate::models::ConversationTurn;
use crate::rag::AnswerStatus;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub status: AnswerStatus,
    pub code: String,
}

impl GeneratedCode {
    pub fn to_turn(&self, prompt: &str) -> ConversationTurn {
        ConversationTurn {
            question: prompt.to_string(),
            answer: self.code.clone(),
            cited_chunks: Vec::new(),
        }
    }
}

pub struct CodeGenerator {
    llm: Arc<dyn CompletionModel>,
}

impl CodeGenerator {
    pub fn new(llm: Arc<dyn CompletionModel>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, prompt: &str, session: &Session) -> GeneratedCode {
        let full = render_code_prompt(&session.code_request(prompt));

        match self.llm.complete(&full).await {
            Ok(code) => GeneratedCode {
                status: AnswerStatus::Answered,
                code,
            },
            Err(e) => {
                tracing::warn!(error = %e, "code generation failed");
                GeneratedCode {
                    status: AnswerStatus::Failed {
                        reason: e.to_string(),
                    },
                    code: String::new(),
                }
            }
        }
    }
}

pub fn render_code_prompt(task: &str) -> String {
    format!(
        "You are an expert software engineer. Generate the **best possible code** for the following task:

Task: {task}

Guidelines:
- Write clean, efficient, and bug-free code.
- Use best coding practices (readability, modularity).
- Add concise comments where needed.
- Prefer clarity over cleverness.
- If multiple approaches exist, choose the most efficient and maintainable.

Return only the complete code block."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_prompt_embeds_task() {
        let prompt = render_code_prompt("User Prompt: fizzbuzz\nPlease generate the code accordingly.");
        assert!(prompt.contains("Task: User Prompt: fizzbuzz\n"));
        assert!(prompt.ends_with("Return only the complete code block."));
    }
}
