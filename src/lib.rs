//! # Codevo
//!
//! Ask questions about a GitHub repository (or a batch of local files) and
//! generate code, grounded in the repository's own text.
//!
//! Codevo loads the text files of a source, splits them into overlapping
//! language-aware chunks, embeds the chunks into an in-memory vector index,
//! and answers questions by retrieving the closest chunks and handing them
//! to a completion model together with the question.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌────────────┐
//! │  Connectors  │──▶│  Chunk +    │──▶│ Collection │◀──┐
//! │ GitHub/Local │   │  Embed      │   │   cache    │   │ SQLite
//! └──────────────┘   └─────────────┘   └─────┬──────┘───┘
//!                                            │
//!                  question + session ──▶ ┌──▼──┐   ┌─────┐
//!                                         │ RAG │──▶│ LLM │
//!                                         └─────┘   └─────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! codevo branches https://github.com/rust-lang/log
//! codevo ask --repo https://github.com/rust-lang/log --branch master
//! codevo ask --files ./notes ./design.md --question "What is pending?"
//! codevo generate --prompt "a token bucket rate limiter in Rust"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Typed GitHub and completion errors |
//! | [`filter`] | Extension / directory / size rules for loaded files |
//! | [`connector_github`] | GitHub tree + raw content loader |
//! | [`connector_upload`] | Local file loader |
//! | [`chunk`] | Recursive, language-aware text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory cosine similarity index |
//! | [`store`] | SQLite persistence for built collections |
//! | [`cache`] | Single-flight collection cache |
//! | [`ingest`] | Cache keys and collection preparation |
//! | [`llm`] | Completion model clients |
//! | [`session`] | Conversation window |
//! | [`rag`] | Retrieval-augmented answering |
//! | [`codegen`] | Code generation |
//! | [`chat`] | Terminal loops and citation display |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod chat;
pub mod chunk;
pub mod codegen;
pub mod config;
pub mod connector_github;
pub mod connector_upload;
pub mod db;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod session;
pub mod store;
