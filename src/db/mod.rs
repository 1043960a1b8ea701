//! Metadata store
//!
//! A SQLite table living in the destination root. One row per replicated
//! source file; `src` is the primary key so re-inserts are upserts and a
//! source can never hold more than one row. The store is what makes an
//! interrupted run resumable: a destination that exists with a matching
//! stored hash is never re-copied, and a stored score is never recomputed.

use crate::error::{Error, Result};
use crate::models::MediaDescriptor;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

const STORE_FILENAME: &str = ".badger_metadata.sqlite";

/// One persisted row of the `mediaData` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub src: String,
    pub dst: String,
    pub hash: String,
    pub id: i64,
    pub cluster_id: i64,
    pub blur: Option<i64>,
    pub media_type: String,
    pub iso: Option<String>,
    pub aperture: Option<String>,
    pub shutter_speed: Option<String>,
    pub mtime: Option<String>,
}

impl MetadataRow {
    /// Build the row for a descriptor about to be replicated. Descriptors
    /// without a burst (the flat copy command) record a cluster id of -1.
    pub fn from_descriptor(descriptor: &MediaDescriptor, dst: &Path, hash: &str) -> Self {
        let exif = descriptor.exif();
        Self {
            src: descriptor.source_key(),
            dst: dst.to_string_lossy().to_string(),
            hash: hash.to_string(),
            id: descriptor.sequence_id() as i64,
            cluster_id: descriptor.burst_id().map(|b| b as i64).unwrap_or(-1),
            blur: descriptor.score(),
            media_type: descriptor.kind().as_str().to_string(),
            iso: exif.and_then(|e| e.iso.clone()),
            aperture: exif.and_then(|e| e.aperture.clone()),
            shutter_speed: exif.and_then(|e| e.shutter_speed.clone()),
            mtime: Some(descriptor.mtime_epoch().to_string()),
        }
    }
}

#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open (creating if absent) the store under the destination root.
    pub async fn open(dest_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(dest_root)?;
        let db_path = dest_root.join(STORE_FILENAME);
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!(url = %db_url, "opening metadata store");

        // One shared connection; SQLite serialises the writes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await?;
        let store = Self { pool };
        store.create_if_absent().await?;
        Ok(store)
    }

    /// In-memory store for tests
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.create_if_absent().await?;
        Ok(store)
    }

    async fn create_if_absent(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mediaData (
                src          TEXT PRIMARY KEY,
                dst          TEXT NOT NULL,
                hash         TEXT NOT NULL,
                id           INTEGER NOT NULL,
                clusterId    INTEGER NOT NULL,
                blur         INTEGER,
                mediaType    TEXT NOT NULL,
                iso          TEXT,
                aperture     TEXT,
                shutterSpeed TEXT,
                mtime        TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Single-row read; absence is not an error.
    pub async fn lookup(&self, src: &str) -> Result<Option<MetadataRow>> {
        let row = sqlx::query(
            r#"
            SELECT src, dst, hash, id, clusterId, blur, mediaType,
                   iso, aperture, shutterSpeed, mtime
            FROM mediaData
            WHERE src = ?
            "#,
        )
        .bind(src)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| MetadataRow {
            src: row.get("src"),
            dst: row.get("dst"),
            hash: row.get("hash"),
            id: row.get("id"),
            cluster_id: row.get("clusterId"),
            blur: row.get("blur"),
            media_type: row.get("mediaType"),
            iso: row.get("iso"),
            aperture: row.get("aperture"),
            shutter_speed: row.get("shutterSpeed"),
            mtime: row.get("mtime"),
        }))
    }

    /// Upsert one row. Each insert commits or rolls back on its own; a
    /// duplicate source path overwrites the previous row.
    pub async fn insert(&self, row: &MetadataRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mediaData (
                src, dst, hash, id, clusterId, blur, mediaType,
                iso, aperture, shutterSpeed, mtime
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(src) DO UPDATE SET
                dst = excluded.dst,
                hash = excluded.hash,
                id = excluded.id,
                clusterId = excluded.clusterId,
                blur = excluded.blur,
                mediaType = excluded.mediaType,
                iso = excluded.iso,
                aperture = excluded.aperture,
                shutterSpeed = excluded.shutterSpeed,
                mtime = excluded.mtime
            "#,
        )
        .bind(&row.src)
        .bind(&row.dst)
        .bind(&row.hash)
        .bind(row.id)
        .bind(row.cluster_id)
        .bind(row.blur)
        .bind(&row.media_type)
        .bind(&row.iso)
        .bind(&row.aperture)
        .bind(&row.shutter_speed)
        .bind(&row.mtime)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mediaData")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Flush and release the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Row-insert failures are per-file problems, not store-wide ones.
pub fn insert_error_for_file(src: &str, error: Error) -> Error {
    Error::Descriptor(format!("{}: metadata row insert failed: {}", src, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(src: &str) -> MetadataRow {
        MetadataRow {
            src: src.to_string(),
            dst: "/out/0/410_0.jpg".to_string(),
            hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            id: 0,
            cluster_id: 0,
            blur: Some(410),
            media_type: "photo".to_string(),
            iso: Some("200".to_string()),
            aperture: Some("2.8".to_string()),
            shutter_speed: Some("1/250".to_string()),
            mtime: Some("1690000000".to_string()),
        }
    }

    #[tokio::test]
    async fn test_lookup_absent_is_none() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        assert!(store.lookup("/never/seen.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_and_lookup_roundtrip() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        let row = sample_row("/media/a.jpg");
        store.insert(&row).await.unwrap();

        let loaded = store.lookup("/media/a.jpg").await.unwrap().unwrap();
        assert_eq!(loaded, row);
    }

    #[tokio::test]
    async fn test_duplicate_insert_upserts() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        let mut row = sample_row("/media/a.jpg");
        store.insert(&row).await.unwrap();

        row.blur = Some(999);
        row.dst = "/out/0/999_0.jpg".to_string();
        store.insert(&row).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let loaded = store.lookup("/media/a.jpg").await.unwrap().unwrap();
        assert_eq!(loaded.blur, Some(999));
        assert_eq!(loaded.dst, "/out/0/999_0.jpg");
    }

    #[tokio::test]
    async fn test_create_if_absent_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).await.unwrap();
        store.insert(&sample_row("/media/a.jpg")).await.unwrap();
        store.close().await;

        // Reopening must keep existing rows.
        let store = MetadataStore::open(dir.path()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        store.close().await;
    }
}
