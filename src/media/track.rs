//! Track media: the leaf of the pipeline.
//!
//! [`PendingTrack`] is a track reference inside an already-resolved album
//! (shared metadata, shared cover). [`PendingSingle`] is a standalone
//! track download that resolves its own album metadata and cover first.
//!
//! Resolution performs the fixed sequence: idempotency check, metadata
//! fetch, normalization, streamability check, quality selection, and
//! downloadable acquisition. Quality selection is `min(requested,
//! advertised)`; when the advertised maximum is below the request and
//! downgrades are disabled, the track is recorded as failed and skipped.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;

use crate::{
    client::Downloadable,
    error::{Error, ErrorKind, Result},
    filepath::{clean_filepath, truncate_stem},
    metadata::{AlbumMetadata, TrackMetadata},
    tag::tag_file,
    validate::validate_audio_file,
};

use super::{Context, Media, Pending};

/// A fully resolved track, ready for byte transfer.
pub struct Track {
    meta: TrackMetadata,
    downloadable: Box<dyn Downloadable>,
    folder: PathBuf,
    cover_path: Option<Arc<PathBuf>>,
    download_path: PathBuf,
    is_single: bool,
    ctx: Context,
}

impl Track {
    pub(crate) fn new(
        meta: TrackMetadata,
        downloadable: Box<dyn Downloadable>,
        folder: PathBuf,
        cover_path: Option<Arc<PathBuf>>,
        is_single: bool,
        ctx: Context,
    ) -> Self {
        Self {
            meta,
            downloadable,
            folder,
            cover_path,
            download_path: PathBuf::new(),
            is_single,
            ctx,
        }
    }

    fn descriptor(&self) -> String {
        format!(
            "'{}' by {} (Album: {}) [{}]",
            self.meta.title, self.meta.artist, self.meta.album.title, self.meta.info.id
        )
    }

    fn set_download_path(&mut self) {
        let filepaths = &self.ctx.config.filepaths;
        let stem = self
            .meta
            .format_track_path(&filepaths.track_format, filepaths.restrict_characters);
        let stem = clean_filepath(&stem, filepaths.restrict_characters);
        let stem = truncate_stem(&stem, filepaths.truncate_to);

        self.download_path = self
            .folder
            .join(format!("{stem}.{}", self.downloadable.extension()));
    }

    async fn transfer(&self) -> Result<()> {
        let size = self.downloadable.size().await?;
        let bar = self
            .ctx
            .progress
            .transfer(size, &format!("Track {:02}", self.meta.tracknumber));

        let result = self
            .downloadable
            .download(&self.download_path, bar.callback())
            .await;
        bar.finish();
        result
    }

    async fn validate(&mut self) -> Result<()> {
        let outcome = validate_audio_file(&self.download_path).await;
        if outcome.is_valid {
            debug!(
                "audio validation passed for {} (method: {})",
                self.download_path.display(),
                outcome.method
            );
            return Ok(());
        }

        let detail = outcome.detail.unwrap_or_default();
        error!(
            "audio validation failed for {} (method: {}): {detail}",
            self.descriptor(),
            outcome.method
        );

        let downloads = &self.ctx.config.downloads;
        if downloads.delete_invalid_files {
            if let Err(e) = tokio::fs::remove_file(&self.download_path).await {
                warn!("could not delete invalid file: {e}");
            }
        }

        if downloads.retry_on_validation_failure {
            info!("retrying transfer after validation failure: {}", self.descriptor());
            self.transfer().await?;
            let retried = validate_audio_file(&self.download_path).await;
            if retried.is_valid {
                info!("retry passed validation: {}", self.descriptor());
                return Ok(());
            }
            if downloads.delete_invalid_files {
                let _ = tokio::fs::remove_file(&self.download_path).await;
            }
        }

        Err(Error::validation(detail))
    }

    fn print_dry_run_info(&self) {
        let meta = &self.meta;
        let album = &meta.album;
        let mut lines = format!(
            "Would download: {}\n  Artist: {}\n  Album: {}\n  Track: {}/{}\n",
            meta.title, meta.artist, album.title, meta.tracknumber, album.tracktotal
        );
        if album.disctotal > 1 {
            lines.push_str(&format!("  Disc: {}/{}\n", meta.discnumber, album.disctotal));
        }
        lines.push_str(&format!(
            "  Source: {}\n  Quality: {}\n  Format: {}\n  Path: {}",
            self.downloadable.source(),
            meta.info.quality,
            meta.info.container.as_deref().unwrap_or("Unknown"),
            self.download_path.display()
        ));
        self.ctx.progress.println(&lines);
    }
}

#[async_trait]
impl Media for Track {
    async fn preprocess(&mut self) -> Result<()> {
        self.set_download_path();
        if !self.ctx.dry_run() {
            tokio::fs::create_dir_all(&self.folder).await?;
        }
        Ok(())
    }

    /// Byte transfer under the global transfer semaphore, with one
    /// inline retry before the error escapes to the queue retry layer.
    async fn download(&mut self) -> Result<()> {
        if self.ctx.dry_run() {
            self.print_dry_run_info();
            return Ok(());
        }

        let _permit = self.ctx.queue.transfer_permit().await?;

        if self.ctx.queue.is_shutting_down() {
            return Err(Error::cancelled("shutdown before transfer"));
        }

        match self.transfer().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind == ErrorKind::Cancelled => Err(e),
            Err(e) => {
                error!("error downloading track {}, retrying: {e}", self.descriptor());
                self.transfer().await.map_err(|e| {
                    error!(
                        "persistent error downloading track {}: {e}",
                        self.descriptor()
                    );
                    e
                })
            }
        }
    }

    async fn postprocess(&mut self) -> Result<()> {
        if self.ctx.dry_run() {
            return Ok(());
        }

        if self.ctx.config.downloads.validate_audio {
            self.validate().await?;
        }

        tag_file(
            &self.download_path,
            &self.meta,
            self.cover_path.as_ref().map(|path| path.as_path()),
        )
        .await?;

        if self.ctx.config.conversion.enabled {
            self.download_path =
                crate::convert::convert_file(&self.download_path, &self.ctx.config.conversion)
                    .await?;
        }

        self.ctx
            .ledger
            .mark_downloaded(self.downloadable.source(), &self.meta.info.id)
            .await?;

        if self.is_single {
            info!("finished {}", self.descriptor());
        }
        Ok(())
    }
}

/// A track reference inside an album whose metadata and cover are
/// already resolved.
pub struct PendingTrack {
    pub id: String,
    pub album: Arc<AlbumMetadata>,
    pub folder: PathBuf,
    pub cover_path: Option<Arc<PathBuf>>,
    pub ctx: Context,
}

impl PendingTrack {
    /// Quality selection: `min(requested, advertised)` gated by
    /// the downgrade policy. `None` means the track was recorded as
    /// failed and must be skipped.
    async fn select_quality(
        meta: &TrackMetadata,
        id: &str,
        ctx: &Context,
    ) -> Result<Option<crate::metadata::Quality>> {
        let source = ctx.client.source();
        let source_config = ctx.config.source(source);
        let requested = source_config.quality;
        let advertised = meta.info.quality;

        if advertised < requested && !source_config.lower_quality_if_not_available {
            error!(
                "track '{}' by {} [{id}]: quality {} available but {} requested, \
                 skipping because downgrades are disabled",
                meta.title,
                meta.artist,
                advertised.as_u8(),
                requested.as_u8()
            );
            ctx.ledger
                .mark_failed(
                    source,
                    crate::client::MediaKind::Track,
                    id,
                    Some("requested quality unavailable"),
                )
                .await?;
            ctx.queue.count_failure();
            return Ok(None);
        }

        if advertised < requested {
            warn!(
                "track '{}' by {}: downloading at quality {} instead of requested {}",
                meta.title,
                meta.artist,
                advertised.as_u8(),
                requested.as_u8()
            );
        }

        Ok(Some(requested.min(advertised)))
    }

    /// Common tail of the track resolvers: streamability gate, quality
    /// selection, downloadable acquisition, container fix-up.
    pub(crate) async fn finish_resolve(
        mut meta: TrackMetadata,
        id: &str,
        ctx: &Context,
    ) -> Result<Option<(TrackMetadata, Box<dyn Downloadable>)>> {
        let source = ctx.client.source();

        if !meta.info.streamable {
            error!(
                "track '{}' by {} (Album: {}) [{id}] not available for stream on {source}",
                meta.title, meta.artist, meta.album.title
            );
            ctx.ledger
                .mark_failed(
                    source,
                    crate::client::MediaKind::Track,
                    id,
                    Some("not streamable"),
                )
                .await?;
            ctx.queue.count_failure();
            return Ok(None);
        }

        let Some(quality) = Self::select_quality(&meta, id, ctx).await? else {
            return Ok(None);
        };

        let downloadable = match ctx.client.get_downloadable(id, quality).await {
            Ok(downloadable) => downloadable,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!(
                    "error getting downloadable for track '{}' by {} [{id}]: {e}",
                    meta.title, meta.artist
                );
                ctx.ledger
                    .mark_failed(source, crate::client::MediaKind::Track, id, Some("no stream"))
                    .await?;
                ctx.queue.count_failure();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Container reality may differ from the advertised one.
        meta.info.container = Some(downloadable.extension().to_uppercase());

        Ok(Some((meta, downloadable)))
    }
}

#[async_trait]
impl Pending for PendingTrack {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let source = self.ctx.client.source();

        if self.ctx.ledger.downloaded(source, &self.id).await? {
            info!("skipping track {}, marked as downloaded", self.id);
            return Ok(None);
        }

        let resp = match self
            .ctx
            .client
            .get_metadata(&self.id, crate::client::MediaKind::Track)
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("track {} not available for stream on {source}: {e}", self.id);
                self.ctx
                    .ledger
                    .mark_failed(
                        source,
                        crate::client::MediaKind::Track,
                        &self.id,
                        Some("not streamable"),
                    )
                    .await?;
                self.ctx.queue.count_failure();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let meta = match TrackMetadata::from_resp(Arc::clone(&self.album), source, &resp) {
            Ok(meta) => meta,
            Err(e) => {
                error!("error building track metadata for {}: {e}", self.id);
                return Ok(None);
            }
        };

        let Some((meta, downloadable)) = Self::finish_resolve(meta, &self.id, &self.ctx).await?
        else {
            return Ok(None);
        };

        let downloads = &self.ctx.config.downloads;
        let folder = if downloads.disc_subdirectories && self.album.disctotal > 1 {
            self.folder.join(format!("Disc {}", meta.discnumber))
        } else {
            self.folder.clone()
        };

        Ok(Some(Box::new(Track {
            meta,
            downloadable,
            folder,
            cover_path: self.cover_path.clone(),
            download_path: PathBuf::new(),
            is_single: false,
            ctx: self.ctx.clone(),
        })))
    }
}

/// A standalone track download.
///
/// Unlike [`PendingTrack`], the album metadata and cover have not been
/// resolved yet; this resolver builds both from the track payload.
pub struct PendingSingle {
    pub id: String,
    pub ctx: Context,
}

impl PendingSingle {
    fn folder(&self, album: &AlbumMetadata) -> PathBuf {
        let config = &self.ctx.config;
        let mut parent = config.downloads.folder.clone();
        if config.downloads.source_subdirectories {
            parent = parent.join(self.ctx.client.source().capitalized());
        }

        if config.filepaths.add_singles_to_folder {
            parent.join(album.format_folder_path(
                &config.filepaths.folder_format,
                config.filepaths.restrict_characters,
            ))
        } else {
            parent
        }
    }
}

#[async_trait]
impl Pending for PendingSingle {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let source = self.ctx.client.source();

        if self.ctx.ledger.downloaded(source, &self.id).await? {
            info!("skipping track {}, marked as downloaded", self.id);
            return Ok(None);
        }

        let resp = match self
            .ctx
            .client
            .get_metadata(&self.id, crate::client::MediaKind::Track)
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("track {} not available for stream on {source}: {e}", self.id);
                self.ctx
                    .ledger
                    .mark_failed(
                        source,
                        crate::client::MediaKind::Track,
                        &self.id,
                        Some("not streamable"),
                    )
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

        // Enrichment runs while the metadata still has a single owner.
        if let Some(rym) = &self.ctx.rym {
            rym.enrich_album(&mut album).await;
        }
        let album = Arc::new(album);

        let meta = match TrackMetadata::from_resp(Arc::clone(&album), source, &resp) {
            Ok(meta) => meta,
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

        let folder = self.folder(&album);
        if !self.ctx.dry_run() {
            tokio::fs::create_dir_all(&folder).await?;
        }

        let cover_key = format!(
            "{source}:{}",
            album.source_album_id.as_deref().unwrap_or(&album.info.id)
        );
        let cover_path = self
            .ctx
            .artwork
            .embed_cover(&self.ctx.http, &cover_key, &album.covers)
            .await;

        Ok(Some(Box::new(Track {
            meta,
            downloadable,
            folder,
            cover_path,
            download_path: PathBuf::new(),
            is_single: true,
            ctx: self.ctx.clone(),
        })))
    }
}
