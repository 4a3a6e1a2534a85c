//! User favorites: a collection of liked items downloaded individually.
//!
//! Favorites arrive in the uniform `{"items": [...]}` envelope from the
//! provider. The collection itself is never recorded in the releases
//! ledger; only the items it expands into are.
//!
//! With `download_full_album_for_liked_tracks` enabled, liked tracks are
//! upgraded to their albums: track metadata is batch-fetched, album ids
//! are deduplicated, and the albums are downloaded instead - each album
//! exactly once, however many of its tracks were liked.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::{
    client::{FavoritesKind, MediaKind},
    error::{ErrorKind, Result},
    metadata::util::id_of,
};

use super::{
    album::PendingAlbum, artist::PendingArtist, playlist::PendingPlaylist, track::PendingSingle,
    Context, Media, Pending,
};

/// Items resolved and ripped concurrently per batch.
const BATCH_SIZE: usize = 5;

/// A resolved favorites collection.
pub struct UserFavorites {
    user_id: String,
    kind: FavoritesKind,
    items: Vec<Value>,
    ctx: Context,
}

#[async_trait]
impl Media for UserFavorites {
    async fn preprocess(&mut self) -> Result<()> {
        info!(
            "starting download of {} favorited {} for user {}",
            self.items.len(),
            self.kind,
            self.user_id
        );
        Ok(())
    }

    async fn download(&mut self) -> Result<()> {
        let ids: Vec<String> = self
            .items
            .iter()
            .filter_map(|item| id_of(item, "id"))
            .collect();

        // Liked tracks are queue work like any other track; everything
        // else is a container that expands itself.
        if self.kind == FavoritesKind::Tracks
            && !self
                .ctx
                .config
                .downloads
                .download_full_album_for_liked_tracks
        {
            let source = self.ctx.client.source();
            let mut completions = Vec::with_capacity(ids.len());
            for id in ids {
                let descriptor = format!("favorited track {id}");
                completions.push(self.ctx.queue.submit(
                    Box::new(PendingSingle {
                        id: id.clone(),
                        ctx: self.ctx.clone(),
                    }),
                    descriptor,
                    source,
                    id,
                ));
            }
            for completion in completions {
                let _ = completion.await;
            }
            return Ok(());
        }

        let pending_items = self.expand(ids).await;
        for batch in pending_items.chunks(BATCH_SIZE) {
            join_all(batch.iter().map(|item| async move {
                match item.resolve().await {
                    Ok(Some(mut media)) => {
                        if let Err(e) = media.rip().await {
                            error!("error downloading favorited item: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("error resolving favorited item: {e}"),
                }
            }))
            .await;
        }
        Ok(())
    }

    async fn postprocess(&mut self) -> Result<()> {
        info!(
            "completed download of favorited {} for user {}",
            self.kind, self.user_id
        );
        Ok(())
    }
}

impl UserFavorites {
    /// Expands container favorites (or album-upgraded liked tracks)
    /// into pendings.
    async fn expand(&self, ids: Vec<String>) -> Vec<Box<dyn Pending>> {
        if self.kind == FavoritesKind::Tracks {
            // Only reachable in full-album mode.
            return self.albums_of_liked_tracks(&ids).await;
        }

        ids.into_iter()
            .map(|id| -> Box<dyn Pending> {
                let ctx = self.ctx.clone();
                match self.kind {
                    FavoritesKind::Tracks | FavoritesKind::Albums => {
                        Box::new(PendingAlbum { id, ctx })
                    }
                    FavoritesKind::Artists => Box::new(PendingArtist { id, ctx }),
                    FavoritesKind::Playlists => Box::new(PendingPlaylist { id, ctx }),
                }
            })
            .collect()
    }

    /// Batch-fetches track metadata and deduplicates the album ids, so
    /// two liked tracks from one album download that album once.
    async fn albums_of_liked_tracks(&self, track_ids: &[String]) -> Vec<Box<dyn Pending>> {
        let mut album_ids: Vec<String> = Vec::new();

        for batch in track_ids.chunks(BATCH_SIZE) {
            let results = join_all(batch.iter().map(|track_id| {
                self.ctx.client.get_metadata(track_id, MediaKind::Track)
            }))
            .await;

            for result in results {
                match result {
                    Ok(resp) => {
                        let album_id = resp.get("album").and_then(|album| id_of(album, "id"));
                        if let Some(album_id) = album_id {
                            if !album_ids.contains(&album_id) {
                                album_ids.push(album_id);
                            }
                        }
                    }
                    Err(e) if e.kind == ErrorKind::NotStreamable => {
                        debug!("skipping unavailable liked track: {e}");
                    }
                    Err(e) => error!("error fetching liked track metadata: {e}"),
                }
            }
        }

        info!(
            "found {} unique albums from {} liked tracks",
            album_ids.len(),
            track_ids.len()
        );

        album_ids
            .into_iter()
            .map(|id| -> Box<dyn Pending> {
                Box::new(PendingAlbum {
                    id,
                    ctx: self.ctx.clone(),
                })
            })
            .collect()
    }
}

/// A deferred favorites fetch.
pub struct PendingUserFavorites {
    pub user_id: String,
    pub kind: FavoritesKind,
    pub ctx: Context,
}

#[async_trait]
impl Pending for PendingUserFavorites {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let resp = match self
            .ctx
            .client
            .get_user_favorites(self.kind, &self.user_id)
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable || e.kind == ErrorKind::Unsupported => {
                error!(
                    "user favorites {}/{} not available: {e}",
                    self.user_id, self.kind
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let items = resp
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if items.is_empty() {
            info!(
                "no {} found in user {} favorites",
                self.kind, self.user_id
            );
            return Ok(None);
        }
        info!(
            "found {} favorited {} for user {}",
            items.len(),
            self.kind,
            self.user_id
        );

        Ok(Some(Box::new(UserFavorites {
            user_id: self.user_id.clone(),
            kind: self.kind,
            items,
            ctx: self.ctx.clone(),
        })))
    }
}
