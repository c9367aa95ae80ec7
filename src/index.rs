//! In-memory vector index over the chunks of one source set.
//!
//! A [`Collection`] pairs every chunk with its embedding vector. Search is a
//! brute-force cosine scan: collections are one repository or one upload
//! batch, small enough that an approximate index would not pay for itself.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::models::{Chunk, ScoredChunk};

/// A built, immutable index. Vectors are aligned with chunks by position.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Cache key (content, origin, chunking and model digest).
    pub key: String,
    /// Display name of the source set.
    pub name: String,
    /// Embedding model that produced `vectors`.
    pub model: String,
    pub dims: usize,
    pub created_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

impl Collection {
    /// Assemble a collection from already-computed vectors.
    ///
    /// # Errors
    ///
    /// Fails when the chunk and vector counts differ or the vectors do not
    /// all share one dimensionality.
    pub fn from_parts(
        key: String,
        name: String,
        model: String,
        created_at: DateTime<Utc>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dims) {
            bail!("embedding vectors have inconsistent dimensions");
        }

        Ok(Self {
            key,
            name,
            model,
            dims,
            created_at,
            chunks,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-`k` chunks by cosine similarity to `query`, best first.
    ///
    /// Ties keep index order, so results are deterministic.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }
}

/// Embed `chunks` in batches and build a collection.
///
/// # Errors
///
/// Fails on an empty chunk list, on any embedding error, or when the
/// provider returns the wrong number of vectors or vectors of a length
/// other than its declared [`EmbeddingProvider::dims`].
pub async fn build_collection(
    embedder: &dyn EmbeddingProvider,
    key: String,
    name: String,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Collection> {
    if chunks.is_empty() {
        bail!("no chunks to index for '{}'", name);
    }

    let batch_size = batch_size.max(1);
    let dims = embedder.dims();
    let mut vectors = Vec::with_capacity(chunks.len());

    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;
        if embedded.len() != texts.len() {
            bail!(
                "embedding provider returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            );
        }
        if let Some(v) = embedded.iter().find(|v| dims > 0 && v.len() != dims) {
            bail!(
                "embedding model '{}' returned {}-dim vectors, expected {}",
                embedder.model_name(),
                v.len(),
                dims
            );
        }
        tracing::debug!(batch = batch_no, size = texts.len(), "embedded batch");
        vectors.extend(embedded);
    }

    tracing::info!(
        collection = %name,
        chunks = chunks.len(),
        model = embedder.model_name(),
        "built collection"
    );

    Collection::from_parts(
        key,
        name,
        embedder.model_name().to_string(),
        Utc::now(),
        chunks,
        vectors,
    )
}

/// Embed `query` and return the `k` most similar chunks.
///
/// An absent or empty collection yields an empty result without calling
/// the embedder.
pub async fn search(
    embedder: &dyn EmbeddingProvider,
    collection: Option<&Collection>,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let collection = match collection {
        Some(c) if !c.is_empty() => c,
        _ => return Ok(Vec::new()),
    };
    if k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, query).await?;
    Ok(collection.search_vector(&query_vec, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Returns `width`-long vectors while claiming `declared` dimensions.
    struct FixedEmbedder {
        declared: usize,
        width: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.declared
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; self.width]).collect())
        }
    }

    fn chunk(text: &str, i: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_id: "f.md".to_string(),
            position_index: i,
            sibling_count: 3,
            size: text.chars().count(),
            start_offset: 0,
            url: None,
        }
    }

    fn collection() -> Collection {
        Collection::from_parts(
            "k".into(),
            "repo".into(),
            "m".into(),
            Utc::now(),
            vec![chunk("a", 0), chunk("b", 1), chunk("c", 2)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap()
    }

    #[test]
    fn test_search_vector_orders_by_score() {
        let hits = collection().search_vector(&[1.0, 0.0], 3);
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c", "b"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_vector_respects_k() {
        assert_eq!(collection().search_vector(&[1.0, 0.0], 1).len(), 1);
        assert_eq!(collection().search_vector(&[1.0, 0.0], 10).len(), 3);
    }

    #[tokio::test]
    async fn test_build_checks_declared_dims() {
        let chunks = || vec![chunk("a", 0), chunk("b", 1)];

        let ok = FixedEmbedder { declared: 3, width: 3 };
        let built = build_collection(&ok, "k".into(), "repo".into(), chunks(), 1)
            .await
            .unwrap();
        assert_eq!(built.dims, 3);

        let unknown = FixedEmbedder { declared: 0, width: 4 };
        assert!(build_collection(&unknown, "k".into(), "repo".into(), chunks(), 8)
            .await
            .is_ok());

        let wrong = FixedEmbedder { declared: 384, width: 3 };
        let err = build_collection(&wrong, "k".into(), "repo".into(), chunks(), 8)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 384"));
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let err = Collection::from_parts(
            "k".into(),
            "r".into(),
            "m".into(),
            Utc::now(),
            vec![chunk("a", 0)],
            vec![],
        );
        assert!(err.is_err());

        let err = Collection::from_parts(
            "k".into(),
            "r".into(),
            "m".into(),
            Utc::now(),
            vec![chunk("a", 0), chunk("b", 1)],
            vec![vec![1.0], vec![1.0, 0.0]],
        );
        assert!(err.is_err());
    }
}
