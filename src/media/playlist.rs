//! Playlist media: an ordered list of tracks from arbitrary albums.
//!
//! Playlist tracks resolve like standalone tracks (each builds its own
//! album metadata and cover), but they all land in one playlist folder
//! and their track numbers follow the playlist position rather than the
//! album position.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::MediaKind,
    error::{ErrorKind, Result},
    filepath::clean_filename,
    metadata::{
        util::{id_of, str_of},
        AlbumMetadata, TrackMetadata,
    },
};

use super::{
    track::{PendingTrack, Track},
    Context, Media, Pending,
};

/// A resolved playlist.
pub struct Playlist {
    name: String,
    tracks: Vec<PendingPlaylistTrack>,
    folder: PathBuf,
    ctx: Context,
}

#[async_trait]
impl Media for Playlist {
    async fn preprocess(&mut self) -> Result<()> {
        info!("downloading playlist '{}' ({} tracks)", self.name, self.tracks.len());
        if !self.ctx.dry_run() {
            tokio::fs::create_dir_all(&self.folder).await?;
        }
        Ok(())
    }

    /// Playlist tracks share the global queue like album tracks do.
    async fn download(&mut self) -> Result<()> {
        let source = self.ctx.client.source();
        let mut completions = Vec::with_capacity(self.tracks.len());

        for track in self.tracks.drain(..) {
            let descriptor = format!("track {} of playlist '{}'", track.id, self.name);
            let track_id = track.id.clone();
            completions.push(self.ctx.queue.submit(
                Box::new(track),
                descriptor,
                source,
                track_id,
            ));
        }

        for completion in completions {
            let _ = completion.await;
        }
        Ok(())
    }

    /// Playlists are not recorded in the releases ledger; only their
    /// tracks count.
    async fn postprocess(&mut self) -> Result<()> {
        info!("finished playlist '{}'", self.name);
        Ok(())
    }
}

/// One playlist entry: a track reference plus its position.
struct PendingPlaylistTrack {
    id: String,
    position: usize,
    folder: PathBuf,
    ctx: Context,
}

#[async_trait]
impl Pending for PendingPlaylistTrack {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let source = self.ctx.client.source();

        if self.ctx.ledger.downloaded(source, &self.id).await? {
            info!("skipping track {}, marked as downloaded", self.id);
            return Ok(None);
        }

        let resp = match self
            .ctx
            .client
            .get_metadata(&self.id, MediaKind::Track)
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("track {} not available for stream on {source}: {e}", self.id);
                self.ctx
                    .ledger
                    .mark_failed(source, MediaKind::Track, &self.id, Some("not streamable"))
                    .await?;
                self.ctx.queue.count_failure();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut album = match AlbumMetadata::from_track_resp(&resp, source) {
            Ok(album) => album,
            Err(e) => {
                error!("error building album metadata for track {}: {e}", self.id);
                return Ok(None);
            }
        };
        if let Some(rym) = &self.ctx.rym {
            rym.enrich_album(&mut album).await;
        }
        let album = Arc::new(album);

        let meta = match TrackMetadata::from_resp(Arc::clone(&album), source, &resp) {
            Ok(mut meta) => {
                // Playlist order wins over album order.
                meta.tracknumber = self.position;
                meta.discnumber = 1;
                meta
            }
            Err(e) => {
                error!("error building track metadata for track {}: {e}", self.id);
                return Ok(None);
            }
        };

        let Some((meta, downloadable)) =
            PendingTrack::finish_resolve(meta, &self.id, &self.ctx).await?
        else {
            return Ok(None);
        };

        let cover_key = format!(
            "{source}:{}",
            album.source_album_id.as_deref().unwrap_or(&album.info.id)
        );
        let cover_path = self
            .ctx
            .artwork
            .embed_cover(&self.ctx.http, &cover_key, &album.covers)
            .await;

        Ok(Some(Box::new(Track::new(
            meta,
            downloadable,
            self.folder.clone(),
            cover_path,
            false,
            self.ctx.clone(),
        ))))
    }
}

/// A deferred playlist fetch.
pub struct PendingPlaylist {
    pub id: String,
    pub ctx: Context,
}

#[async_trait]
impl Pending for PendingPlaylist {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let resp = match self
            .ctx
            .client
            .get_metadata(&self.id, MediaKind::Playlist)
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("playlist {} not available: {e}", self.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let name = str_of(&resp, "title")
            .or_else(|| str_of(&resp, "name"))
            .unwrap_or_else(|| format!("Playlist {}", self.id));

        let track_ids = playlist_track_ids(&resp);
        if track_ids.is_empty() {
            warn!("playlist '{name}' has no tracks, skipping");
            return Ok(None);
        }

        let config = &self.ctx.config;
        let mut folder = config.downloads.folder.clone();
        if config.downloads.source_subdirectories {
            folder = folder.join(self.ctx.client.source().capitalized());
        }
        folder = folder.join(clean_filename(&name, config.filepaths.restrict_characters));

        let tracks = track_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| PendingPlaylistTrack {
                id,
                position: index + 1,
                folder: folder.clone(),
                ctx: self.ctx.clone(),
            })
            .collect();

        Ok(Some(Box::new(Playlist {
            name,
            tracks,
            folder,
            ctx: self.ctx.clone(),
        })))
    }
}

/// Track ids from a playlist payload; handles a bare tracklist array,
/// the `{"items": [...]}` envelope, and Tidal's `{"item": {...}}`
/// wrapping.
fn playlist_track_ids(resp: &Value) -> Vec<String> {
    let tracks = resp
        .get("tracks")
        .map(|tracks| tracks.get("items").unwrap_or(tracks));
    tracks
        .and_then(Value::as_array)
        .map(|tracks| {
            tracks
                .iter()
                .filter_map(|entry| {
                    id_of(entry, "id")
                        .or_else(|| entry.get("item").and_then(|item| id_of(item, "id")))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn track_ids_from_flat_and_nested_envelopes() {
        let flat = json!({"tracks": [{"id": 1}, {"id": 2}]});
        assert_eq!(playlist_track_ids(&flat), vec!["1", "2"]);

        let nested = json!({"tracks": {"items": [{"id": "a"}, {"item": {"id": "b"}}]}});
        assert_eq!(playlist_track_ids(&nested), vec!["a", "b"]);

        assert!(playlist_track_ids(&json!({})).is_empty());
    }
}
