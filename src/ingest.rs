//! Collection preparation: source set → chunks → embeddings → cached index.
//!
//! The cache key is a SHA-256 over the source content hash, where the
//! content came from (set name and file URLs), the chunking settings and
//! the embedding model. A repository whose files changed upstream, or a
//! config change that alters chunk boundaries, produces a new key and a
//! fresh build. Two sources with identical files (a fork and its upstream)
//! get separate collections, so citations keep pointing at the right place.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::cache::CollectionCache;
use crate::chunk::chunk_source_set;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::EmbeddingProvider;
use crate::index::{build_collection, Collection};
use crate::models::SourceSet;

/// Cache key for `set` chunked with `chunking` and embedded with `model`.
pub fn collection_key(set: &SourceSet, chunking: &ChunkingConfig, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(set.content_hash().as_bytes());
    hasher.update(set.name.as_bytes());
    hasher.update([0u8]);

    let mut urls: Vec<(&str, &str)> = set
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.url.as_deref().unwrap_or("")))
        .collect();
    urls.sort();
    for (path, url) in urls {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
    }

    hasher.update(
        format!(
            "|size={}|overlap={}|per_file={}|model={}",
            chunking.chunk_size, chunking.chunk_overlap, chunking.per_file, model
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

/// Return the collection for `set`, building and caching it on a miss.
///
/// With `rebuild`, any cached collection for the same key or name is
/// dropped first.
pub async fn prepare_collection(
    config: &Config,
    cache: &CollectionCache,
    embedder: &dyn EmbeddingProvider,
    set: &SourceSet,
    rebuild: bool,
) -> Result<Arc<Collection>> {
    if set.is_empty() {
        bail!("'{}' has no loadable text files", set.name);
    }

    let key = collection_key(set, &config.chunking, embedder.model_name());

    if rebuild {
        let removed = cache.invalidate(&set.name).await? + cache.invalidate(&key).await?;
        tracing::info!(name = %set.name, removed, "rebuild requested");
    }

    cache
        .get_or_build(&key, &set.name, || async {
            let chunks = chunk_source_set(set, &config.chunking);
            tracing::info!(
                name = %set.name,
                files = set.files.len(),
                chunks = chunks.len(),
                "chunked source set"
            );
            build_collection(
                embedder,
                key.clone(),
                set.name.clone(),
                chunks,
                config.embedding.batch_size,
            )
            .await
        })
        .await
}
