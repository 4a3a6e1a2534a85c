//! Shared cover artwork downloads.
//!
//! Embeddable covers are downloaded once per album into a session-scoped
//! temp directory and shared by every track of the album (and by singles
//! that happen to hit the same album). The directory is removed when the
//! session ends, not earlier: a later single may still want a cover that
//! an album just fetched.

use std::{collections::HashMap, path::PathBuf, process, sync::Arc};

use tokio::sync::Mutex;

use crate::{error::Result, metadata::Covers};

/// Session-scoped cover cache.
pub struct ArtworkCache {
    root: PathBuf,
    entries: Mutex<HashMap<String, Option<Arc<PathBuf>>>>,
}

impl ArtworkCache {
    /// Creates the cache rooted in the OS temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: std::env::temp_dir().join(format!("ripstream-covers-{}", process::id())),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches (or reuses) the embeddable cover for `key`.
    ///
    /// `key` should be namespaced by source, e.g. `deezer:302127`.
    /// Returns `None` when the album has no artwork or the fetch failed;
    /// a missing cover never fails a download.
    pub async fn embed_cover(
        &self,
        http: &reqwest::Client,
        key: &str,
        covers: &Covers,
    ) -> Option<Arc<PathBuf>> {
        let mut entries = self.entries.lock().await;
        if let Some(cached) = entries.get(key) {
            return cached.clone();
        }

        let fetched = match self.fetch(http, key, covers).await {
            Ok(path) => path.map(Arc::new),
            Err(e) => {
                warn!("cover download failed for {key}: {e}");
                None
            }
        };

        entries.insert(key.to_string(), fetched.clone());
        fetched
    }

    async fn fetch(
        &self,
        http: &reqwest::Client,
        key: &str,
        covers: &Covers,
    ) -> Result<Option<PathBuf>> {
        let Some(url) = covers.for_embedding() else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(format!("{}.jpg", key.replace([':', '/'], "-")));

        let response = http.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&path, &bytes).await?;

        debug!("cover for {key} cached at {}", path.display());
        Ok(Some(path))
    }

    /// Removes the cache directory and forgets all entries.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        let _ = tokio::fs::remove_dir_all(&self.root).await;
    }
}

impl Default for ArtworkCache {
    fn default() -> Self {
        Self::new()
    }
}
