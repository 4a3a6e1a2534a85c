//! The Pending/Media pipeline.
//!
//! Downloads move through a two-stage pipeline:
//!
//! * A [`Pending`] is a deferred metadata fetch: a reference plus the
//!   collaborators it needs. `resolve()` is idempotent and total - it
//!   yields a [`Media`] or `None` (already done, skipped, or not
//!   streamable), and only transport errors propagate, so the retry
//!   layer can tell "try again" from "give up".
//! * A [`Media`] is a fetched, normalized unit - a single track or a
//!   container of further pendings - with lifecycle hooks `preprocess`,
//!   `download` and `postprocess`, composed as [`Media::rip`].
//!
//! Containers (albums, artists, labels, playlists, favorites) expand
//! into tracks that all share the one global download queue.

pub mod album;
pub mod artist;
pub mod artwork;
pub mod favorites;
pub mod label;
pub mod lastfm;
pub mod playlist;
pub mod track;

pub use album::{Album, PendingAlbum};
pub use artist::{Artist, PendingArtist};
pub use artwork::ArtworkCache;
pub use favorites::PendingUserFavorites;
pub use label::{Label, PendingLabel};
pub use lastfm::PendingLastfmPlaylist;
pub use playlist::{PendingPlaylist, Playlist};
pub use track::{PendingSingle, PendingTrack, Track};

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    client::Client,
    config::Config,
    db::Ledger,
    error::Result,
    progress::Progress,
    queue::QueueHandle,
    rym::RymService,
};

/// Collaborators threaded through the pipeline.
///
/// Every pending carries one of these; cloning is cheap (everything is
/// shared behind `Arc`s).
#[derive(Clone)]
pub struct Context {
    /// Provider adapter the reference belongs to.
    pub client: Arc<dyn Client>,

    /// Session configuration.
    pub config: Arc<Config>,

    /// Idempotency ledger.
    pub ledger: Arc<Ledger>,

    /// Global download queue handle.
    pub queue: QueueHandle,

    /// Enrichment service, when enabled.
    pub rym: Option<Arc<RymService>>,

    /// Terminal progress renderer.
    pub progress: Progress,

    /// Shared cover art downloads.
    pub artwork: Arc<ArtworkCache>,

    /// Plain HTTP client for CDN fetches (artwork, short-links).
    pub http: reqwest::Client,
}

impl Context {
    /// Whether this session only reports what it would do.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.config.cli.dry_run
    }
}

/// A fetched, normalized, downloadable unit.
#[async_trait]
pub trait Media: Send {
    /// Create directories, fetch cover art, print dry-run info.
    async fn preprocess(&mut self) -> Result<()>;

    /// Move the actual bytes (or expand into queued child tasks).
    async fn download(&mut self) -> Result<()>;

    /// Update the ledger, convert, clean up.
    async fn postprocess(&mut self) -> Result<()>;

    /// The full lifecycle.
    async fn rip(&mut self) -> Result<()> {
        self.preprocess().await?;
        self.download().await?;
        self.postprocess().await
    }
}

/// A request to download a [`Media`] whose metadata has not been
/// fetched yet.
#[async_trait]
pub trait Pending: Send + Sync {
    /// Fetches metadata and resolves into a downloadable media object.
    ///
    /// Returns `None` when the item should be skipped: already recorded
    /// in the ledger, not streamable (recorded as a failure), or
    /// uninterpretable (logged, not recorded).
    ///
    /// # Errors
    ///
    /// Only transport-level failures return `Err`; they are retryable.
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>>;
}
