//! Album media: a container of tracks sharing one metadata snapshot.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::MediaKind,
    error::{ErrorKind, Result},
    metadata::{util::id_of, AlbumMetadata},
};

use super::{track::PendingTrack, Context, Media, Pending};

/// A resolved album whose tracks are ready to enqueue.
pub struct Album {
    meta: Arc<AlbumMetadata>,
    tracks: Vec<PendingTrack>,
    track_ids: Vec<String>,
    folder: PathBuf,
    ctx: Context,
}

impl Album {
    /// The shared metadata snapshot; the filter engine reads it.
    #[must_use]
    pub fn meta(&self) -> &AlbumMetadata {
        &self.meta
    }

    fn print_dry_run_info(&self) {
        let mut lines = format!(
            "Would download album: {}\n  Artist: {}\n  Year: {}\n  Tracks: {}\n",
            self.meta.title,
            self.meta.albumartist,
            self.meta.year,
            self.tracks.len()
        );
        if self.meta.disctotal > 1 {
            lines.push_str(&format!("  Discs: {}\n", self.meta.disctotal));
        }
        lines.push_str(&format!(
            "  Source: {}\n  Folder: {}",
            self.ctx.client.source(),
            self.folder.display()
        ));
        self.ctx.progress.println(&lines);
    }
}

#[async_trait]
impl Media for Album {
    async fn preprocess(&mut self) -> Result<()> {
        if self.ctx.dry_run() {
            self.print_dry_run_info();
        }
        Ok(())
    }

    /// Enqueues every track on the global queue and waits for all of
    /// them to terminate. Tracks may finish in any order; the
    /// completion receivers are what makes `postprocess` run strictly
    /// after the last track.
    async fn download(&mut self) -> Result<()> {
        debug!(
            "queuing {} tracks from album {}",
            self.tracks.len(),
            self.meta.title
        );

        let source = self.ctx.client.source();
        let mut completions = Vec::with_capacity(self.tracks.len());

        for track in self.tracks.drain(..) {
            let descriptor = format!("track {} of '{}'", track.id, self.meta.title);
            let track_id = track.id.clone();
            completions.push(self.ctx.queue.submit(
                Box::new(track),
                descriptor,
                source,
                track_id,
            ));
        }

        for completion in completions {
            // A dropped sender (queue shutdown) resolves the receiver
            // too; either way the track has terminated.
            let _ = completion.await;
        }
        Ok(())
    }

    /// Records the album complete iff every track is in the downloads
    /// ledger.
    async fn postprocess(&mut self) -> Result<()> {
        if self.ctx.dry_run() {
            return Ok(());
        }

        let source = self.ctx.client.source();
        let mut downloaded = 0usize;
        for track_id in &self.track_ids {
            if self.ctx.ledger.downloaded(source, track_id).await? {
                downloaded += 1;
            }
        }

        let total = self.track_ids.len();
        if downloaded == total && total > 0 {
            self.ctx
                .ledger
                .mark_release_complete(source, MediaKind::Album, &self.meta.info.id, total)
                .await?;
            info!(
                "album {} fully downloaded ({total} tracks), marked as complete",
                self.meta.info.id
            );
        } else {
            debug!(
                "album {} incomplete: {downloaded}/{total} tracks downloaded",
                self.meta.info.id
            );
        }
        Ok(())
    }
}

/// A deferred album fetch.
pub struct PendingAlbum {
    pub id: String,
    pub ctx: Context,
}

impl PendingAlbum {
    /// Track ids from the album payload; handles both a bare tracklist
    /// array and the `{"items": [...]}` envelope.
    fn track_ids(resp: &Value) -> Vec<String> {
        let tracks = resp
            .get("tracks")
            .map(|tracks| tracks.get("items").unwrap_or(tracks));
        tracks
            .and_then(Value::as_array)
            .map(|tracks| tracks.iter().filter_map(|t| id_of(t, "id")).collect())
            .unwrap_or_default()
    }

    fn folder(&self, meta: &AlbumMetadata) -> PathBuf {
        let config = &self.ctx.config;
        let mut parent = config.downloads.folder.clone();
        if config.downloads.source_subdirectories {
            parent = parent.join(self.ctx.client.source().capitalized());
        }
        parent.join(meta.format_folder_path(
            &config.filepaths.folder_format,
            config.filepaths.restrict_characters,
        ))
    }
}

#[async_trait]
impl Pending for PendingAlbum {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        Ok(self
            .resolve_album()
            .await?
            .map(|album| Box::new(album) as Box<dyn Media>))
    }
}

impl PendingAlbum {
    /// Typed resolution, used by the discography filter engine which
    /// needs to read album metadata before deciding whether to rip.
    pub(crate) async fn resolve_album(&self) -> Result<Option<Album>> {
        let source = self.ctx.client.source();

        // A release row means a previous run finished this album.
        if self
            .ctx
            .ledger
            .release_complete(source, MediaKind::Album, &self.id)
            .await?
            .is_some()
        {
            info!("album {} already fully downloaded, skipping", self.id);
            return Ok(None);
        }

        let resp = match self.ctx.client.get_metadata(&self.id, MediaKind::Album).await {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("album {} not available to stream on {source}: {e}", self.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut meta = match AlbumMetadata::from_album_resp(&resp, source) {
            Ok(meta) => meta,
            Err(e) => {
                error!("error building album metadata for {}: {e}", self.id);
                return Ok(None);
            }
        };

        if !meta.info.streamable {
            error!(
                "album '{}' by {} [{}] not available for stream on {source}",
                meta.title, meta.albumartist, self.id
            );
            self.ctx
                .ledger
                .mark_failed(source, MediaKind::Album, &self.id, Some("not streamable"))
                .await?;
            return Ok(None);
        }

        let track_ids = Self::track_ids(&resp);
        if track_ids.is_empty() {
            warn!("album {} has no tracks, skipping", self.id);
            return Ok(None);
        }

        // Recover installations that predate the releases table: when
        // every track is already recorded, complete the album without
        // further API calls.
        let mut all_downloaded = true;
        for track_id in &track_ids {
            if !self.ctx.ledger.downloaded(source, track_id).await? {
                all_downloaded = false;
                break;
            }
        }
        if all_downloaded {
            info!(
                "album {} has all tracks already downloaded, marking as complete",
                self.id
            );
            self.ctx
                .ledger
                .mark_release_complete(source, MediaKind::Album, &self.id, track_ids.len())
                .await?;
            return Ok(None);
        }

        // Enrichment runs once, while the metadata still has a single
        // owner; afterwards the snapshot is shared immutably with every
        // track.
        if let Some(rym) = &self.ctx.rym {
            rym.enrich_album(&mut meta).await;
        }

        let folder = self.folder(&meta);
        if !self.ctx.dry_run() {
            tokio::fs::create_dir_all(&folder).await?;
        }

        let cover_key = format!("{source}:{}", meta.info.id);
        let cover_path = self
            .ctx
            .artwork
            .embed_cover(&self.ctx.http, &cover_key, &meta.covers)
            .await;

        let meta = Arc::new(meta);
        let tracks = track_ids
            .iter()
            .map(|track_id| PendingTrack {
                id: track_id.clone(),
                album: Arc::clone(&meta),
                folder: folder.clone(),
                cover_path: cover_path.clone(),
                ctx: self.ctx.clone(),
            })
            .collect();

        Ok(Some(Album {
            meta,
            tracks,
            track_ids,
            folder,
            ctx: self.ctx.clone(),
        }))
    }
}
