//! Terminal front end for the three interactive flows.
//!
//! Each flow owns one [`Session`]. Answers go to stdout; logs go to stderr
//! through `tracing`, so piping the output keeps only the answers.
//!
//! Loops read one line per question from stdin and end on EOF, `exit` or
//! `quit`. Passing a single question (or prompt) runs one exchange and
//! returns.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::chunk::Language;
use crate::codegen::CodeGenerator;
use crate::index::Collection;
use crate::models::ScoredChunk;
use crate::rag::{AnswerStatus, RagAnswer, RagPipeline};
use crate::session::Session;

/// Questions asked by `codevo analyze`.
pub const ANALYSIS_QUESTIONS: [&str; 3] = [
    "What programming languages are primarily used in this repository?",
    "What is the overall project structure and organization?",
    "What are the main entry points or important files?",
];

const PREVIEW_CHARS: usize = 1000;

/// Ask one question, or loop over stdin when `question` is `None`.
pub async fn run_ask(
    pipeline: &RagPipeline,
    collection: &Collection,
    question: Option<String>,
    history_turns: usize,
) -> Result<()> {
    let mut session = Session::new(history_turns);

    if let Some(question) = question {
        ask_once(pipeline, collection, &question, &mut session).await?;
        return Ok(());
    }

    println!(
        "Loaded {} ({} chunks). Ask a question, or 'exit' to quit.",
        collection.name,
        collection.len()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    ask_loop(pipeline, collection, &mut lines, &mut session).await
}

/// Answer each input line in turn. A failed question is reported and the
/// loop keeps reading.
async fn ask_loop<R>(
    pipeline: &RagPipeline,
    collection: &Collection,
    lines: &mut Lines<R>,
    session: &mut Session,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = next_input(lines, "? ").await? {
        if let Err(e) = ask_once(pipeline, collection, &line, session).await {
            tracing::warn!(error = %e, "question failed");
            eprintln!("error: {:#}", e);
        }
    }
    Ok(())
}

async fn ask_once(
    pipeline: &RagPipeline,
    collection: &Collection,
    question: &str,
    session: &mut Session,
) -> Result<()> {
    let answer = pipeline.ask(Some(collection), question, session).await?;
    print!("{}", format_answer(&answer));
    if answer.is_answered() {
        session.record(answer.to_turn(question));
    }
    Ok(())
}

/// Run the fixed repository-overview questions, each on its own.
pub async fn run_analyze(pipeline: &RagPipeline, collection: &Collection) -> Result<()> {
    let session = Session::new(0);
    for question in ANALYSIS_QUESTIONS {
        let answer = pipeline.ask(Some(collection), question, &session).await?;
        println!("## {}\n", question);
        match &answer.status {
            AnswerStatus::Failed { reason } => println!("error: {}\n", reason),
            _ => println!("{}\n", answer.answer.trim_end()),
        }
    }
    Ok(())
}

/// Generate code for one prompt, or loop over stdin when `prompt` is `None`.
pub async fn run_generate(
    generator: &CodeGenerator,
    prompt: Option<String>,
    history_turns: usize,
) -> Result<()> {
    let mut session = Session::new(history_turns);

    if let Some(prompt) = prompt {
        generate_once(generator, &prompt, &mut session).await;
        return Ok(());
    }

    println!("Describe the code you need, or 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_input(&mut lines, "> ").await? {
        generate_once(generator, &line, &mut session).await;
    }
    Ok(())
}

async fn generate_once(generator: &CodeGenerator, prompt: &str, session: &mut Session) {
    let generated = generator.generate(prompt, session).await;
    match &generated.status {
        AnswerStatus::Failed { reason } => eprintln!("error: {}", reason),
        _ => {
            println!("{}\n", generated.code.trim_end());
            session.record(generated.to_turn(prompt));
        }
    }
}

/// Next non-empty line, or `None` on EOF / `exit` / `quit`.
async fn next_input<R>(lines: &mut Lines<R>, prompt: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    use std::io::Write;

    loop {
        print!("{}", prompt);
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => return Ok(None),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Ok(None);
        }
        return Ok(Some(line.to_string()));
    }
}

/// Render an answer and its citations for the terminal.
pub fn format_answer(answer: &RagAnswer) -> String {
    let mut out = String::new();
    match &answer.status {
        AnswerStatus::Failed { reason } => {
            out.push_str(&format!("error: the model call failed: {}\n", reason));
        }
        _ => {
            out.push_str(answer.answer.trim_end());
            out.push('\n');
        }
    }

    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        out.push_str(&format_sources(&answer.sources));
    }
    out.push('\n');
    out
}

/// One block per cited chunk: path, type, position, size, preview, link.
pub fn format_sources(sources: &[ScoredChunk]) -> String {
    let mut out = String::new();
    for (i, hit) in sources.iter().enumerate() {
        let chunk = &hit.chunk;
        out.push_str(&format!(
            "[{}] {} ({}) chunk {}/{}, {} chars, score {:.3}\n",
            i + 1,
            chunk.source_id,
            file_type(&chunk.source_id),
            chunk.position_index + 1,
            chunk.sibling_count,
            chunk.size,
            hit.score
        ));
        for line in preview(&chunk.text).lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        if let Some(url) = &chunk.url {
            out.push_str(&format!("    {}\n", url));
        }
    }
    out
}

fn file_type(path: &str) -> String {
    Language::from_path(path)
        .map(|lang| format!("{:?}", lang).to_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

/// First `PREVIEW_CHARS` characters, with `...` when cut.
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::error::LlmError;
    use crate::llm::CompletionModel;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Fails for any text mentioning "unreachable".
    struct FlakyEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("unreachable")) {
                anyhow::bail!("embedding service unreachable");
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl CompletionModel for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok("x is one".to_string())
        }
    }

    fn hit(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                source_id: "src/app.py".to_string(),
                position_index: 1,
                sibling_count: 4,
                size: text.chars().count(),
                start_offset: 0,
                url: Some("https://github.com/o/r/blob/main/src/app.py".to_string()),
            },
            score: 0.8123,
        }
    }

    #[tokio::test]
    async fn test_ask_loop_survives_a_failed_question() {
        let pipeline = RagPipeline::new(Arc::new(FlakyEmbedder), Arc::new(EchoLlm), 3);
        let collection = Collection::from_parts(
            "k".into(),
            "repo".into(),
            "flaky".into(),
            chrono::Utc::now(),
            vec![hit("x = 1").chunk],
            vec![vec![1.0, 0.0]],
        )
        .unwrap();

        let input: &[u8] = b"is the unreachable service up?\nwhat is x?\n";
        let mut lines = BufReader::new(input).lines();
        let mut session = Session::new(2);

        ask_loop(&pipeline, &collection, &mut lines, &mut session)
            .await
            .unwrap();

        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].question, "what is x?");
        assert_eq!(session.turns()[0].answer, "x is one");
    }

    #[test]
    fn test_format_sources() {
        let out = format_sources(&[hit("def main():\n    pass")]);
        assert!(out.starts_with("[1] src/app.py (python) chunk 2/4, 20 chars, score 0.812\n"));
        assert!(out.contains("    def main():\n"));
        assert!(out.contains("    https://github.com/o/r/blob/main/src/app.py\n"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(PREVIEW_CHARS + 5);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_failed_answer_is_marked() {
        let answer = RagAnswer {
            status: AnswerStatus::Failed {
                reason: "rate limited".to_string(),
            },
            answer: String::new(),
            sources: vec![],
        };
        assert!(format_answer(&answer).starts_with("error: the model call failed: rate limited"));
    }
}
