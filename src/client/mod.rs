//! Provider client capability.
//!
//! The download engine treats providers as opaque capability holders behind
//! the [`Client`] trait: login, metadata fetch, downloadable production,
//! search, and the favorites envelope. Adapters own their session state and
//! must be safe to share across workers.
//!
//! One reference adapter ships in-tree ([`deezer::DeezerClient`]); the
//! session registry accepts any implementation of the trait.

pub mod deezer;
pub mod downloadable;

pub use deezer::DeezerClient;
pub use downloadable::HttpDownloadable;

use std::{fmt, path::Path, str::FromStr};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    metadata::Quality,
};

/// Streaming provider identity.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Qobuz,
    Tidal,
    Deezer,
    Soundcloud,
}

impl Source {
    /// All supported providers.
    pub const ALL: [Self; 4] = [Self::Qobuz, Self::Tidal, Self::Deezer, Self::Soundcloud];

    /// Capitalized name, used for the per-provider subdirectory layout.
    #[must_use]
    pub fn capitalized(self) -> &'static str {
        match self {
            Self::Qobuz => "Qobuz",
            Self::Tidal => "Tidal",
            Self::Deezer => "Deezer",
            Self::Soundcloud => "Soundcloud",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qobuz => write!(f, "qobuz"),
            Self::Tidal => write!(f, "tidal"),
            Self::Deezer => write!(f, "deezer"),
            Self::Soundcloud => write!(f, "soundcloud"),
        }
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "qobuz" => Ok(Self::Qobuz),
            "tidal" => Ok(Self::Tidal),
            "deezer" => Ok(Self::Deezer),
            "soundcloud" => Ok(Self::Soundcloud),
            _ => Err(Error::invalid_url(format!("unknown source: {s}"))),
        }
    }
}

/// What kind of provider object a reference points at.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MediaKind {
    Track,
    Album,
    Artist,
    Label,
    Playlist,
    Favorites,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Track => write!(f, "track"),
            Self::Album => write!(f, "album"),
            Self::Artist => write!(f, "artist"),
            Self::Label => write!(f, "label"),
            Self::Playlist => write!(f, "playlist"),
            Self::Favorites => write!(f, "favorites"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "track" => Ok(Self::Track),
            "album" => Ok(Self::Album),
            "artist" => Ok(Self::Artist),
            "label" => Ok(Self::Label),
            "playlist" => Ok(Self::Playlist),
            "favorites" => Ok(Self::Favorites),
            _ => Err(Error::invalid_url(format!("unknown media type: {s}"))),
        }
    }
}

/// Which favorite collection of a user profile to download.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FavoritesKind {
    Tracks,
    Albums,
    Artists,
    Playlists,
}

impl fmt::Display for FavoritesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracks => write!(f, "tracks"),
            Self::Albums => write!(f, "albums"),
            Self::Artists => write!(f, "artists"),
            Self::Playlists => write!(f, "playlists"),
        }
    }
}

impl FromStr for FavoritesKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tracks" => Ok(Self::Tracks),
            "albums" => Ok(Self::Albums),
            "artists" => Ok(Self::Artists),
            "playlists" => Ok(Self::Playlists),
            _ => Err(Error::invalid_url(format!("unknown favorites kind: {s}"))),
        }
    }
}

/// Byte-count progress callback for transfers.
pub type ProgressCallback = Box<dyn Fn(u64) + Send + Sync>;

/// A byte-stream producer for one track at one chosen quality.
///
/// Obtained at task-execution time, not at enqueue time, so media URLs do
/// not expire while a task waits in the queue. Owned by the worker
/// processing it and released when the transfer completes.
#[async_trait]
pub trait Downloadable: Send + Sync {
    /// Size of the stream in bytes.
    async fn size(&self) -> Result<u64>;

    /// Streams the bytes to `path`, reporting received byte counts to
    /// `callback`.
    async fn download(&self, path: &Path, callback: ProgressCallback) -> Result<()>;

    /// File extension for the stream, lowercase without the dot.
    fn extension(&self) -> &str;

    /// Provider the stream comes from.
    fn source(&self) -> Source;
}

/// A provider adapter.
///
/// Implementations carry their own session state internally and must be
/// thread-safe; the engine calls them from many workers at once.
#[async_trait]
pub trait Client: Send + Sync {
    /// Provider this adapter talks to.
    fn source(&self) -> Source;

    /// Whether `login` has completed successfully.
    fn logged_in(&self) -> bool;

    /// Authenticates with the provider. Idempotent.
    ///
    /// # Errors
    ///
    /// * `ErrorKind::MissingCredentials` when nothing is configured
    /// * `ErrorKind::Auth` when the provider rejects the credentials
    async fn login(&self) -> Result<()>;

    /// Fetches the raw metadata payload for an object.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotStreamable` when the provider refuses the
    /// item and `ErrorKind::Transport` on network failure.
    async fn get_metadata(&self, id: &str, kind: MediaKind) -> Result<Value>;

    /// Produces a byte-stream handle for a track at the chosen quality.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotStreamable` when no stream is available at
    /// any acceptable quality.
    async fn get_downloadable(&self, id: &str, quality: Quality) -> Result<Box<dyn Downloadable>>;

    /// Searches the provider, returning raw result pages.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Transport` on network failure.
    async fn search(&self, kind: MediaKind, query: &str, limit: usize) -> Result<Vec<Value>>;

    /// Fetches a user's favorite collection in the uniform
    /// `{"items": [...]}` envelope.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Transport` on network failure and
    /// `ErrorKind::Unsupported` for providers without favorites.
    async fn get_user_favorites(&self, kind: FavoritesKind, user_id: &str) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_display() {
        for source in Source::ALL {
            assert_eq!(source.to_string().parse::<Source>().unwrap(), source);
        }
    }

    #[test]
    fn media_kind_round_trips_through_display() {
        for kind in [
            MediaKind::Track,
            MediaKind::Album,
            MediaKind::Artist,
            MediaKind::Label,
            MediaKind::Playlist,
            MediaKind::Favorites,
        ] {
            assert_eq!(kind.to_string().parse::<MediaKind>().unwrap(), kind);
        }
    }
}
