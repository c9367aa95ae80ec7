use anyhow::Result;
use sqlx::SqlitePool;

/// Create the cache tables if they do not exist yet. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per built collection
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_collections_name ON collections(name)")
        .execute(pool)
        .await?;

    // Chunks in insertion order; seq aligns with the vectors table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            collection_key TEXT NOT NULL,
            seq INTEGER NOT NULL,
            source_id TEXT NOT NULL,
            position_index INTEGER NOT NULL,
            sibling_count INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            url TEXT,
            text TEXT NOT NULL,
            PRIMARY KEY (collection_key, seq),
            FOREIGN KEY (collection_key) REFERENCES collections(key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            collection_key TEXT NOT NULL,
            seq INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection_key, seq),
            FOREIGN KEY (collection_key) REFERENCES collections(key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("cache schema ready");
    Ok(())
}
