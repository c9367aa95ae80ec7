//! End-to-end pipeline tests with in-process stand-ins for GitHub, the
//! embedding service and the completion model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use codevo::cache::CollectionCache;
use codevo::config::Config;
use codevo::connector_github::{load_repository, GitHubApi, RepoRef, TreeEntry};
use codevo::embedding::EmbeddingProvider;
use codevo::error::{GitHubError, LlmError};
use codevo::filter::FileFilter;
use codevo::index::{self, Collection};
use codevo::ingest::prepare_collection;
use codevo::llm::CompletionModel;
use codevo::models::{SourceFile, SourceSet};
use codevo::rag::{AnswerStatus, RagPipeline, NO_RELEVANT_CONTEXT_ANSWER};
use codevo::session::Session;
use codevo::store::CollectionStore;

// ── Stubs ──────────────────────────────────────────────────────────────

/// Hashes words into a small bag-of-words vector and counts calls.
struct CountingEmbedder {
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

const DIMS: usize = 32;

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
            % DIMS;
        v[bucket] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_name(&self) -> &str {
        "stub-bow"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

struct StubLlm {
    calls: AtomicUsize,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    fn answering() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for StubLlm {
    fn model_name(&self) -> &str {
        "stub-llm"
    }
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            Err(LlmError::RateLimited)
        } else {
            Ok("The entry point is app.py.".to_string())
        }
    }
}

/// Serves a fixed tree and records every fetched path.
struct StubGitHub {
    files: HashMap<String, Vec<u8>>,
    broken: Vec<String>,
    reject_token: bool,
    fetched: Mutex<Vec<String>>,
    tree_listed: AtomicUsize,
}

impl StubGitHub {
    fn new(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_vec()))
                .collect(),
            broken: Vec::new(),
            reject_token: false,
            fetched: Mutex::new(Vec::new()),
            tree_listed: AtomicUsize::new(0),
        }
    }

    fn fetched(&self) -> Vec<String> {
        let mut paths = self.fetched.lock().unwrap().clone();
        paths.sort();
        paths
    }
}

#[async_trait]
impl GitHubApi for StubGitHub {
    async fn validate_token(&self) -> Result<(), GitHubError> {
        if self.reject_token {
            Err(GitHubError::Unauthorized("GITHUB_TOKEN".to_string()))
        } else {
            Ok(())
        }
    }

    async fn list_branches(&self, _repo: &RepoRef) -> Result<Vec<String>, GitHubError> {
        Ok(vec!["main".to_string()])
    }

    async fn list_tree(&self, _repo: &RepoRef, _branch: &str) -> Result<Vec<TreeEntry>, GitHubError> {
        self.tree_listed.fetch_add(1, Ordering::SeqCst);
        let mut entries: Vec<TreeEntry> = self
            .files
            .iter()
            .map(|(path, content)| TreeEntry {
                path: path.clone(),
                size: Some(content.len() as u64),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn fetch_file(
        &self,
        _repo: &RepoRef,
        _branch: &str,
        path: &str,
    ) -> Result<Vec<u8>, GitHubError> {
        self.fetched.lock().unwrap().push(path.to_string());
        if self.broken.iter().any(|b| b == path) {
            return Err(GitHubError::NotFound(path.to_string()));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(path.to_string()))
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

fn md_py_filter() -> FileFilter {
    FileFilter::new(
        &[".md".to_string(), ".py".to_string()],
        &["node_modules".to_string()],
        &[],
        1_000_000,
    )
    .unwrap()
}

fn repo() -> RepoRef {
    RepoRef::parse("acme/widgets").unwrap()
}

fn sample_set() -> SourceSet {
    SourceSet::new(
        "acme/widgets@main",
        vec![
            SourceFile::new(
                "README.md",
                "# Widgets\n\nWidgets renders dashboards for factory sensors.",
            ),
            SourceFile::new(
                "app.py",
                "def main():\n    server = start_server(port=8080)\n    server.run()\n",
            ),
            SourceFile::new(
                "db.py",
                "def connect(url):\n    return sqlite_connect(url)\n",
            ),
        ],
    )
}

async fn build(
    config: &Config,
    cache: &CollectionCache,
    embedder: &CountingEmbedder,
    set: &SourceSet,
) -> Arc<Collection> {
    prepare_collection(config, cache, embedder, set, false)
        .await
        .unwrap()
}

// ── Content loading ────────────────────────────────────────────────────

#[tokio::test]
async fn test_loader_includes_allowed_files_and_never_fetches_excluded() {
    let api = StubGitHub::new(&[
        ("README.md", b"# Readme"),
        ("app.py", b"print('hi')"),
        ("node_modules/x.js", b"module.exports = 1"),
        ("node_modules/pkg/setup.py", b"vendored"),
    ]);

    let set = load_repository(&api, &repo(), "main", &md_py_filter())
        .await
        .unwrap();

    let paths: Vec<&str> = set.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "app.py"]);
    assert_eq!(api.fetched(), vec!["README.md".to_string(), "app.py".to_string()]);
    assert_eq!(set.name, "acme/widgets@main");
    assert_eq!(
        set.files[1].url.as_deref(),
        Some("https://github.com/acme/widgets/blob/main/app.py")
    );
}

#[tokio::test]
async fn test_loader_fails_fast_on_rejected_token() {
    let mut api = StubGitHub::new(&[("README.md", b"# Readme")]);
    api.reject_token = true;

    let err = load_repository(&api, &repo(), "main", &md_py_filter())
        .await
        .unwrap_err();

    assert!(matches!(err, GitHubError::Unauthorized(_)));
    assert_eq!(api.tree_listed.load(Ordering::SeqCst), 0);
    assert!(api.fetched().is_empty());
}

#[tokio::test]
async fn test_loader_skips_failed_and_undecodable_files() {
    let mut api = StubGitHub::new(&[
        ("README.md", b"# Readme"),
        ("gone.py", b"x = 1"),
        ("latin1.md", &[0x63, 0x61, 0x66, 0xe9]),
    ]);
    api.broken.push("gone.py".to_string());

    let set = load_repository(&api, &repo(), "main", &md_py_filter())
        .await
        .unwrap();

    let paths: Vec<&str> = set.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md"]);
    assert_eq!(api.fetched().len(), 3);
}

#[tokio::test]
async fn test_loader_applies_size_cap_before_fetching() {
    let big = vec![b'a'; 64];
    let api = StubGitHub::new(&[("big.md", &big), ("small.md", b"ok")]);
    let filter = FileFilter::new(&[".md".to_string()], &[], &[], 10).unwrap();

    let set = load_repository(&api, &repo(), "main", &filter).await.unwrap();

    assert_eq!(set.files.len(), 1);
    assert_eq!(api.fetched(), vec!["small.md".to_string()]);
}

// ── Index and cache ────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_is_bounded_and_ordered() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = CountingEmbedder::new();
    let collection = build(&config, &cache, &embedder, &sample_set()).await;

    for k in 1..=5 {
        let hits = index::search(&embedder, Some(&collection), "start the server on a port", k)
            .await
            .unwrap();
        assert!(hits.len() <= k);
        assert!(!hits.is_empty());
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    let top = index::search(&embedder, Some(&collection), "start server port run", 1)
        .await
        .unwrap();
    assert_eq!(top[0].chunk.source_id, "app.py");
}

#[tokio::test]
async fn test_search_without_collection_is_empty_not_error() {
    let embedder = CountingEmbedder::new();

    let hits = index::search(&embedder, None, "anything", 5).await.unwrap();
    assert!(hits.is_empty());

    let empty = Collection::from_parts(
        "k".into(),
        "empty".into(),
        "stub-bow".into(),
        chrono::Utc::now(),
        vec![],
        vec![],
    )
    .unwrap();
    let hits = index::search(&embedder, Some(&empty), "anything", 5)
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_cache_hit_does_not_reembed() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = CountingEmbedder::new();

    let first = build(&config, &cache, &embedder, &sample_set()).await;
    let calls_after_first = embedder.calls();
    assert!(calls_after_first > 0);

    let second = build(&config, &cache, &embedder, &sample_set()).await;
    assert_eq!(embedder.calls(), calls_after_first);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_persisted_collection_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("collections.sqlite");
    let config = Config::default();
    let embedder = CountingEmbedder::new();

    {
        let cache = CollectionCache::with_store(CollectionStore::open(&db_path).await.unwrap());
        build(&config, &cache, &embedder, &sample_set()).await;
    }
    let calls_after_build = embedder.calls();

    let cache = CollectionCache::with_store(CollectionStore::open(&db_path).await.unwrap());
    let reloaded = build(&config, &cache, &embedder, &sample_set()).await;

    assert_eq!(embedder.calls(), calls_after_build);
    assert_eq!(reloaded.name, "acme/widgets@main");
    assert_eq!(reloaded.model, "stub-bow");
    assert_eq!(reloaded.dims, DIMS);
}

#[tokio::test]
async fn test_rebuild_and_content_change_reembed() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = CountingEmbedder::new();

    let original = build(&config, &cache, &embedder, &sample_set()).await;
    let calls = embedder.calls();

    let rebuilt = prepare_collection(&config, &cache, &embedder, &sample_set(), true)
        .await
        .unwrap();
    assert!(embedder.calls() > calls);
    assert_eq!(rebuilt.key, original.key);

    let mut changed = sample_set();
    changed.files[0].content.push_str("\n\nNow with alerts.");
    let calls = embedder.calls();
    let updated = build(&config, &cache, &embedder, &changed).await;

    assert!(embedder.calls() > calls);
    assert_ne!(updated.key, original.key);
    assert!(!cache.contains(&original.key));
}

#[tokio::test]
async fn test_fork_with_identical_files_gets_its_own_collection() {
    let api = StubGitHub::new(&[("README.md", b"# Widgets"), ("app.py", b"print('hi')")]);
    let upstream = load_repository(&api, &repo(), "main", &md_py_filter())
        .await
        .unwrap();
    let fork_repo = RepoRef::parse("forker/widgets").unwrap();
    let fork = load_repository(&api, &fork_repo, "main", &md_py_filter())
        .await
        .unwrap();
    assert_eq!(upstream.content_hash(), fork.content_hash());

    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = CountingEmbedder::new();

    let first = build(&config, &cache, &embedder, &upstream).await;
    let calls = embedder.calls();
    let second = build(&config, &cache, &embedder, &fork).await;

    assert!(embedder.calls() > calls);
    assert_ne!(first.key, second.key);
    assert_eq!(second.name, "forker/widgets@main");
    assert_eq!(
        second.chunks[0].url.as_deref(),
        Some("https://github.com/forker/widgets/blob/main/README.md")
    );
    assert_eq!(
        first.chunks[0].url.as_deref(),
        Some("https://github.com/acme/widgets/blob/main/README.md")
    );

    assert_eq!(cache.invalidate("forker/widgets@main").await.unwrap(), 1);
    assert!(cache.contains(&first.key));
}

#[tokio::test]
async fn test_empty_source_set_is_an_error() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = CountingEmbedder::new();
    let empty = SourceSet::new("nothing", vec![]);

    assert!(prepare_collection(&config, &cache, &embedder, &empty, false)
        .await
        .is_err());
    assert_eq!(embedder.calls(), 0);
}

// ── Question answering ─────────────────────────────────────────────────

#[tokio::test]
async fn test_ask_without_context_skips_llm() {
    let embedder = Arc::new(CountingEmbedder::new());
    let llm = Arc::new(StubLlm::answering());
    let pipeline = RagPipeline::new(embedder, llm.clone(), 3);

    let answer = pipeline
        .ask(None, "What does this repo do?", &Session::new(2))
        .await
        .unwrap();

    assert_eq!(answer.status, AnswerStatus::NoRelevantContext);
    assert_eq!(answer.answer, NO_RELEVANT_CONTEXT_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_ask_answers_with_cited_sources() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = Arc::new(CountingEmbedder::new());
    let collection = build(&config, &cache, &embedder, &sample_set()).await;

    let llm = Arc::new(StubLlm::answering());
    let pipeline = RagPipeline::new(embedder, llm.clone(), 2);

    let answer = pipeline
        .ask(Some(&collection), "Where does the server start?", &Session::new(2))
        .await
        .unwrap();

    assert_eq!(answer.status, AnswerStatus::Answered);
    assert_eq!(answer.answer, "The entry point is app.py.");
    assert!(!answer.sources.is_empty() && answer.sources.len() <= 2);
    assert_eq!(llm.calls(), 1);

    let prompt = llm.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("File: app.py\n"));
    assert!(prompt.contains("Question: Where does the server start?"));
}

#[tokio::test]
async fn test_llm_failure_has_distinct_status() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = Arc::new(CountingEmbedder::new());
    let collection = build(&config, &cache, &embedder, &sample_set()).await;

    let ok = RagPipeline::new(embedder.clone(), Arc::new(StubLlm::answering()), 3)
        .ask(Some(&collection), "How do I connect?", &Session::new(2))
        .await
        .unwrap();
    let failed = RagPipeline::new(embedder, Arc::new(StubLlm::failing()), 3)
        .ask(Some(&collection), "How do I connect?", &Session::new(2))
        .await
        .unwrap();

    assert_eq!(ok.status, AnswerStatus::Answered);
    assert!(matches!(failed.status, AnswerStatus::Failed { ref reason } if reason.contains("rate limit")));
    assert!(!failed.is_answered());
    assert!(failed.answer.is_empty());
}

#[tokio::test]
async fn test_session_window_reaches_the_prompt() {
    let config = Config::default();
    let cache = CollectionCache::in_memory();
    let embedder = Arc::new(CountingEmbedder::new());
    let collection = build(&config, &cache, &embedder, &sample_set()).await;

    let llm = Arc::new(StubLlm::answering());
    let pipeline = RagPipeline::new(embedder, llm.clone(), 3);
    let mut session = Session::new(2);

    let first = pipeline
        .ask(Some(&collection), "What is the entry point?", &session)
        .await
        .unwrap();
    session.record(first.to_turn("What is the entry point?"));

    pipeline
        .ask(Some(&collection), "Which port does it use?", &session)
        .await
        .unwrap();

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts[1].contains(
        "Q: What is the entry point?\nA: The entry point is app.py.\nQ: Which port does it use?\nA:"
    ));
    assert_eq!(session.turns().len(), 1);
}
