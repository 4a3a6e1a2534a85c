//! Durable ledger of completed and failed work.
//!
//! The ledger is the idempotency source of truth across invocations. It
//! holds three independent relations, each in its own SQLite file:
//!
//! * `downloads(source, id)` - presence means the track's bytes and tags
//!   were written successfully.
//! * `failed_downloads(source, media_type, id, reason)` - presence means a
//!   terminal failure was recorded.
//! * `releases(source, media_type, id, child_count)` - presence means a
//!   container (album, artist, label) was processed to completion.
//!
//! Keys are namespaced by source because providers reuse integer ids.
//! Each pool holds a single connection, serializing writes per table and
//! guaranteeing read-your-writes within the process. Rows are independent;
//! no cross-row transactions are needed.
//!
//! A disabled table degrades to a no-op store: every write vanishes and
//! every membership query answers `false`.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{
    client::{MediaKind, Source},
    config::DatabaseConfig,
    error::Result,
};

/// One ledger table: a real SQLite store or a no-op placeholder.
enum Store {
    Sqlite(SqlitePool),
    Dummy,
}

impl Store {
    async fn open(path: &Path, schema: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(schema).execute(&pool).await?;

        Ok(Self::Sqlite(pool))
    }

    fn pool(&self) -> Option<&SqlitePool> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            Self::Dummy => None,
        }
    }
}

/// Handle to the three ledger tables.
pub struct Ledger {
    downloads: Store,
    failures: Store,
    releases: Store,
}

impl Ledger {
    const DOWNLOADS_SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS downloads (
        source TEXT NOT NULL,
        id TEXT NOT NULL,
        PRIMARY KEY (source, id)
    )";

    const FAILURES_SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS failed_downloads (
        source TEXT NOT NULL,
        media_type TEXT NOT NULL,
        id TEXT NOT NULL,
        reason TEXT,
        PRIMARY KEY (source, media_type, id)
    )";

    const RELEASES_SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS releases (
        source TEXT NOT NULL,
        media_type TEXT NOT NULL,
        id TEXT NOT NULL,
        child_count INTEGER NOT NULL,
        completed_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (source, media_type, id)
    )";

    /// Opens the ledger files configured in `config`, creating missing
    /// files and tables.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` when a database cannot be opened.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let downloads = if config.downloads_enabled {
            Store::open(&config.downloads_path(), Self::DOWNLOADS_SCHEMA).await?
        } else {
            Store::Dummy
        };

        let failures = if config.failed_downloads_enabled {
            Store::open(&config.failed_downloads_path(), Self::FAILURES_SCHEMA).await?
        } else {
            Store::Dummy
        };

        // Releases share the downloads switch: both answer "is this done?".
        let releases = if config.downloads_enabled {
            Store::open(&config.releases_path(), Self::RELEASES_SCHEMA).await?
        } else {
            Store::Dummy
        };

        Ok(Self {
            downloads,
            failures,
            releases,
        })
    }

    /// A ledger that records nothing. Used for dry runs and tests.
    #[must_use]
    pub fn dummy() -> Self {
        Self {
            downloads: Store::Dummy,
            failures: Store::Dummy,
            releases: Store::Dummy,
        }
    }

    /// Records a track as fully downloaded and tagged.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` on database failure.
    pub async fn mark_downloaded(&self, source: Source, track_id: &str) -> Result<()> {
        let Some(pool) = self.downloads.pool() else {
            return Ok(());
        };
        sqlx::query("INSERT OR IGNORE INTO downloads (source, id) VALUES (?, ?)")
            .bind(source.to_string())
            .bind(track_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Whether a track was downloaded by this or any earlier invocation.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` on database failure.
    pub async fn downloaded(&self, source: Source, track_id: &str) -> Result<bool> {
        let Some(pool) = self.downloads.pool() else {
            return Ok(false);
        };
        let row = sqlx::query("SELECT 1 FROM downloads WHERE source = ? AND id = ?")
            .bind(source.to_string())
            .bind(track_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    /// Records a terminal failure for an item.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` on database failure.
    pub async fn mark_failed(
        &self,
        source: Source,
        kind: MediaKind,
        id: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let Some(pool) = self.failures.pool() else {
            return Ok(());
        };
        sqlx::query(
            "INSERT OR REPLACE INTO failed_downloads (source, media_type, id, reason)
             VALUES (?, ?, ?, ?)",
        )
        .bind(source.to_string())
        .bind(kind.to_string())
        .bind(id)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Whether an item has a recorded terminal failure.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` on database failure.
    pub async fn failed(&self, source: Source, kind: MediaKind, id: &str) -> Result<bool> {
        let Some(pool) = self.failures.pool() else {
            return Ok(false);
        };
        let row = sqlx::query(
            "SELECT 1 FROM failed_downloads WHERE source = ? AND media_type = ? AND id = ?",
        )
        .bind(source.to_string())
        .bind(kind.to_string())
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    }

    /// Records a container (album, artist, label) as processed to
    /// completion with `child_count` children.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` on database failure.
    pub async fn mark_release_complete(
        &self,
        source: Source,
        kind: MediaKind,
        id: &str,
        child_count: usize,
    ) -> Result<()> {
        let Some(pool) = self.releases.pool() else {
            return Ok(());
        };
        sqlx::query(
            "INSERT OR REPLACE INTO releases (source, media_type, id, child_count)
             VALUES (?, ?, ?, ?)",
        )
        .bind(source.to_string())
        .bind(kind.to_string())
        .bind(id)
        .bind(child_count as i64)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Whether a container is recorded complete, and with how many
    /// children.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Io` on database failure.
    pub async fn release_complete(
        &self,
        source: Source,
        kind: MediaKind,
        id: &str,
    ) -> Result<Option<usize>> {
        let Some(pool) = self.releases.pool() else {
            return Ok(None);
        };
        let row = sqlx::query(
            "SELECT child_count FROM releases WHERE source = ? AND media_type = ? AND id = ?",
        )
        .bind(source.to_string())
        .bind(kind.to_string())
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|row| row.get::<i64, _>(0).unsigned_abs() as usize))
    }
}
