//! Artist media: a discography of albums, with filtering.
//!
//! An artist resolves into a list of pending albums downloaded in one of
//! two modes:
//!
//! * **Batch** - resolve *all* albums first, then filter, then download.
//!   Required by the `repeats` filter, which compares album titles
//!   pairwise across the whole set.
//! * **Stream** - resolve and download in chunks, applying the per-item
//!   filters inline as each album becomes known.
//!
//! Albums are resolved a chunk at a time either way, so downloads start
//! before the whole discography has been fetched.

use async_trait::async_trait;
use futures_util::future::join_all;
use regex_lite::Regex;
use serde_json::Value;

use crate::{
    client::MediaKind,
    config::FilterConfig,
    error::{ErrorKind, Result},
    metadata::{util::{id_of, str_of}, AlbumMetadata},
};

use super::{
    album::{Album, PendingAlbum},
    Context, Media, Pending,
};

/// Albums resolved concurrently per chunk, so the first downloads start
/// without waiting for the whole discography.
const RESOLVE_CHUNK_SIZE: usize = 10;

/// A resolved artist discography.
pub struct Artist {
    name: String,
    albums: Vec<PendingAlbum>,
    artist_id: String,
    ctx: Context,
}

#[async_trait]
impl Media for Artist {
    async fn preprocess(&mut self) -> Result<()> {
        Ok(())
    }

    async fn download(&mut self) -> Result<()> {
        let filters = self.ctx.config.filters;
        if filters.needs_batch() {
            info!(
                "resolving all albums of {} to detect repeats, this may take a while",
                self.name
            );
            self.resolve_then_download(filters).await;
        } else {
            self.download_streaming(filters).await;
        }
        Ok(())
    }

    /// Artists are recorded complete leniently: after all albums have
    /// terminated, regardless of per-album partial failure. The album
    /// rows carry the finer state.
    async fn postprocess(&mut self) -> Result<()> {
        if self.ctx.dry_run() || self.albums.is_empty() {
            return Ok(());
        }

        let source = self.ctx.client.source();
        self.ctx
            .ledger
            .mark_release_complete(source, MediaKind::Artist, &self.artist_id, self.albums.len())
            .await?;
        info!(
            "artist {} processed ({} albums), marked as complete",
            self.artist_id,
            self.albums.len()
        );
        Ok(())
    }
}

impl Artist {
    /// Batch mode: resolve everything, filter over the full set, then
    /// download.
    async fn resolve_then_download(&self, filters: FilterConfig) {
        let mut resolved: Vec<Album> = Vec::new();
        for chunk in self.albums.chunks(RESOLVE_CHUNK_SIZE) {
            let results = join_all(chunk.iter().map(PendingAlbum::resolve_album)).await;
            for result in results {
                match result {
                    Ok(Some(album)) => resolved.push(album),
                    Ok(None) => {}
                    Err(e) => error!("error resolving album of {}: {e}", self.name),
                }
            }
        }

        let filtered = self.apply_filters(resolved, filters);

        let mut rips: Vec<Album> = filtered;
        for chunk in rips.chunks_mut(RESOLVE_CHUNK_SIZE) {
            join_all(chunk.iter_mut().map(|album| async move {
                if let Err(e) = album.rip().await {
                    error!("error downloading album: {e}");
                }
            }))
            .await;
        }
    }

    /// Stream mode: per-item filters applied as each album resolves.
    async fn download_streaming(&self, filters: FilterConfig) {
        for chunk in self.albums.chunks(RESOLVE_CHUNK_SIZE) {
            join_all(chunk.iter().map(|pending| async move {
                let album = match pending.resolve_album().await {
                    Ok(Some(album)) => album,
                    Ok(None) => return,
                    Err(e) => {
                        error!("error resolving album of {}: {e}", self.name);
                        return;
                    }
                };

                if !self.keeps(album.meta(), filters) {
                    debug!("album '{}' dropped by filters", album.meta().title);
                    return;
                }

                let mut album = album;
                if let Err(e) = album.rip().await {
                    error!("error downloading album: {e}");
                }
            }))
            .await;
        }
    }

    /// Applies the active filter set over a fully resolved album list.
    /// Repeats go first; the remaining predicates commute.
    fn apply_filters(&self, albums: Vec<Album>, filters: FilterConfig) -> Vec<Album> {
        let mut albums = albums;
        if filters.repeats {
            albums = filter_repeats(albums, Album::meta);
        }
        albums
            .into_iter()
            .filter(|album| self.keeps(album.meta(), filters))
            .collect()
    }

    /// Per-item predicates; `true` keeps the album.
    fn keeps(&self, meta: &AlbumMetadata, filters: FilterConfig) -> bool {
        if filters.extras && !is_not_extra(meta) {
            return false;
        }
        if filters.features && meta.albumartist != self.name {
            return false;
        }
        if filters.non_studio_albums
            && !(meta.albumartist != "Various Artists" && is_not_extra(meta))
        {
            return false;
        }
        if filters.non_remaster && !is_remaster(meta) {
            return false;
        }
        true
    }
}

/// Keeps the best variant of albums sharing a base title.
///
/// Two albums are considered the same release when their titles agree
/// after stripping parenthesized and bracketed suffixes. The winner is
/// chosen by bit depth, then sampling rate, then explicitness.
pub(crate) fn filter_repeats<T>(albums: Vec<T>, meta: impl Fn(&T) -> &AlbumMetadata) -> Vec<T> {
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();
    for album in albums {
        let title = essence(&meta(&album).title);
        match groups.iter_mut().find(|(key, _)| *key == title) {
            Some((_, group)) => group.push(album),
            None => groups.push((title, vec![album])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(_, mut group)| {
            group.sort_by(|a, b| {
                let a = meta(a);
                let b = meta(b);
                b.info
                    .bit_depth
                    .unwrap_or(0)
                    .cmp(&a.info.bit_depth.unwrap_or(0))
                    .then(
                        b.info
                            .sampling_rate
                            .unwrap_or(0)
                            .cmp(&a.info.sampling_rate.unwrap_or(0)),
                    )
                    .then(b.info.explicit.cmp(&a.info.explicit))
            });
            group.into_iter().next()
        })
        .collect()
}

/// Base title with parenthesized and bracketed suffixes stripped,
/// lowercased and trimmed. Will not fail on any nonempty string.
pub(crate) fn essence(title: &str) -> String {
    let re = Regex::new(r"[^\(\[]+").expect("valid regex");
    re.find(title)
        .map_or(title, |m| m.as_str())
        .trim()
        .to_lowercase()
}

/// Whether the album is a regular release rather than an
/// anniversary/deluxe/live/collector/demo/expanded/remix edition.
fn is_not_extra(meta: &AlbumMetadata) -> bool {
    let re = Regex::new(r"(?i)(anniversary|deluxe|live|collector|demo|expanded|remix)")
        .expect("valid regex");
    !re.is_match(&meta.title)
}

/// Whether the album presents itself as a remaster.
fn is_remaster(meta: &AlbumMetadata) -> bool {
    let re = Regex::new(r"(?i)(re)?master(ed)?").expect("valid regex");
    re.is_match(&meta.title)
}

/// A deferred artist fetch.
pub struct PendingArtist {
    pub id: String,
    pub ctx: Context,
}

#[async_trait]
impl Pending for PendingArtist {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let source = self.ctx.client.source();

        let resp = match self.ctx.client.get_metadata(&self.id, MediaKind::Artist).await {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("artist {} not available to stream on {source}: {e}", self.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(name) = str_of(&resp, "name") else {
            error!("error building artist metadata: artist {} has no name", self.id);
            return Ok(None);
        };

        let album_ids = album_ids(&resp);
        if album_ids.is_empty() {
            warn!("artist {name} ({}) has no albums", self.id);
            return Ok(None);
        }

        // When every album is already recorded complete, log a summary
        // instead of resolving each one just to skip it.
        let mut new_albums = 0usize;
        for album_id in &album_ids {
            if self
                .ctx
                .ledger
                .release_complete(source, MediaKind::Album, album_id)
                .await?
                .is_none()
            {
                new_albums += 1;
            }
        }
        if new_albums == 0 {
            info!(
                "artist {name} ({}): all {} albums already downloaded",
                self.id,
                album_ids.len()
            );
            return Ok(None);
        }
        info!(
            "artist {name} ({}): found {new_albums} new albums to download",
            self.id
        );

        let albums = album_ids
            .into_iter()
            .map(|album_id| PendingAlbum {
                id: album_id,
                ctx: self.ctx.clone(),
            })
            .collect();

        Ok(Some(Box::new(Artist {
            name,
            albums,
            artist_id: self.id.clone(),
            ctx: self.ctx.clone(),
        })))
    }
}

/// Album ids from an artist payload; handles both a bare array and the
/// `{"items": [...]}` envelope.
pub(crate) fn album_ids(resp: &Value) -> Vec<String> {
    let albums = resp
        .get("albums")
        .map(|albums| albums.get("items").unwrap_or(albums));
    albums
        .and_then(Value::as_array)
        .map(|albums| albums.iter().filter_map(|a| id_of(a, "id")).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essence_strips_bracketed_suffixes() {
        assert_eq!(essence("X (Deluxe)"), "x");
        assert_eq!(essence("X [Remastered]"), "x");
        assert_eq!(essence("X"), "x");
        assert_eq!(essence("Plain Title  "), "plain title");
    }

    #[test]
    fn extras_match_known_edition_markers() {
        let mut meta = test_meta("OK Computer");
        assert!(is_not_extra(&meta));
        meta.title = "OK Computer (Deluxe)".to_string();
        assert!(!is_not_extra(&meta));
        meta.title = "Live at Pompeii".to_string();
        assert!(!is_not_extra(&meta));
    }

    #[test]
    fn remaster_predicate() {
        let mut meta = test_meta("OK Computer [Remastered]");
        assert!(is_remaster(&meta));
        meta.title = "OK Computer (2017 Remaster)".to_string();
        assert!(is_remaster(&meta));
        meta.title = "OK Computer".to_string();
        assert!(!is_remaster(&meta));
    }

    fn test_meta(title: &str) -> AlbumMetadata {
        let resp = serde_json::json!({
            "id": 1,
            "title": title,
            "artist": {"name": "A"},
            "release_date": "2001-01-01",
            "tracks": []
        });
        AlbumMetadata::from_album_resp(&resp, crate::client::Source::Deezer).unwrap()
    }

    fn ident(meta: &AlbumMetadata) -> &AlbumMetadata {
        meta
    }

    #[test]
    fn repeats_filter_keeps_best_variant_per_group() {
        let mut base = test_meta("X");
        base.info.bit_depth = Some(16);
        base.info.sampling_rate = Some(44_100);

        let mut deluxe = test_meta("X (Deluxe)");
        deluxe.info.bit_depth = Some(16);
        deluxe.info.sampling_rate = Some(44_100);

        let mut remaster = test_meta("X [Remastered]");
        remaster.info.bit_depth = Some(24);
        remaster.info.sampling_rate = Some(96_000);

        let other = test_meta("Y");

        let kept = filter_repeats(vec![base, deluxe, remaster, other], ident);
        let titles: Vec<&str> = kept.iter().map(|meta| meta.title.as_str()).collect();

        assert_eq!(kept.len(), 2);
        // The 24-bit variant wins its group.
        assert!(titles.contains(&"X [Remastered]"));
        assert!(titles.contains(&"Y"));
    }

    #[test]
    fn repeats_filter_is_idempotent() {
        let mut a = test_meta("X");
        a.info.explicit = true;
        let b = test_meta("X (Deluxe)");
        let c = test_meta("Y");

        let once = filter_repeats(vec![a, b, c], ident);
        let titles_once: Vec<String> = once.iter().map(|m| m.title.clone()).collect();
        let twice = filter_repeats(once, ident);
        let titles_twice: Vec<String> = twice.iter().map(|m| m.title.clone()).collect();

        assert_eq!(titles_once, titles_twice);
    }
}
