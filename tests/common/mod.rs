//! Shared test fixtures: an in-memory provider adapter and a config
//! builder pointed at temporary directories.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::Value;

use ripstream::{
    client::{Client, Downloadable, FavoritesKind, MediaKind, ProgressCallback, Source},
    config::Config,
    error::{Error, Result},
    metadata::Quality,
};

/// Bytes served for every mock download.
pub const FAKE_AUDIO: &[u8] = b"FAKEAUDIODATA-NOT-A-REAL-STREAM";

/// A scripted provider adapter.
///
/// Serves canned JSON payloads keyed by `(kind, id)` and counts every
/// call, so tests can assert how much network traffic a scenario needs.
pub struct MockClient {
    source: Source,
    payloads: Mutex<HashMap<(MediaKind, String), Value>>,
    favorites: Mutex<HashMap<String, Value>>,
    pub metadata_calls: AtomicUsize,
    pub downloadable_calls: AtomicUsize,
    pub download_calls: Arc<AtomicUsize>,
}

impl MockClient {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            payloads: Mutex::new(HashMap::new()),
            favorites: Mutex::new(HashMap::new()),
            metadata_calls: AtomicUsize::new(0),
            downloadable_calls: AtomicUsize::new(0),
            download_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn put(&self, kind: MediaKind, id: &str, payload: Value) {
        self.payloads
            .lock()
            .unwrap()
            .insert((kind, id.to_string()), payload);
    }

    pub fn put_favorites(&self, kind: FavoritesKind, user_id: &str, items: Value) {
        self.favorites
            .lock()
            .unwrap()
            .insert(format!("{kind}:{user_id}"), items);
    }

    pub fn metadata_call_count(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn download_call_count(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Client for MockClient {
    fn source(&self) -> Source {
        self.source
    }

    fn logged_in(&self) -> bool {
        true
    }

    async fn login(&self) -> Result<()> {
        Ok(())
    }

    async fn get_metadata(&self, id: &str, kind: MediaKind) -> Result<Value> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_streamable(format!("no payload for {kind} {id}")))
    }

    async fn get_downloadable(&self, id: &str, _quality: Quality) -> Result<Box<dyn Downloadable>> {
        self.downloadable_calls.fetch_add(1, Ordering::SeqCst);
        let _ = id;
        Ok(Box::new(MockDownloadable {
            source: self.source,
            download_calls: Arc::clone(&self.download_calls),
        }))
    }

    async fn search(&self, _kind: MediaKind, _query: &str, _limit: usize) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn get_user_favorites(&self, kind: FavoritesKind, user_id: &str) -> Result<Value> {
        self.favorites
            .lock()
            .unwrap()
            .get(&format!("{kind}:{user_id}"))
            .cloned()
            .ok_or_else(|| Error::not_streamable(format!("no favorites for {user_id}")))
    }
}

/// A downloadable that writes a fixed byte string.
pub struct MockDownloadable {
    source: Source,
    download_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Downloadable for MockDownloadable {
    async fn size(&self) -> Result<u64> {
        Ok(FAKE_AUDIO.len() as u64)
    }

    async fn download(&self, path: &Path, callback: ProgressCallback) -> Result<()> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(path, FAKE_AUDIO).await?;
        callback(FAKE_AUDIO.len() as u64);
        Ok(())
    }

    fn extension(&self) -> &str {
        "mp3"
    }

    fn source(&self) -> Source {
        self.source
    }
}

/// A configuration rooted entirely inside `dir`, with progress bars off.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.downloads.folder = dir.join("music");
    config.downloads.max_connections = 2;
    config.database.downloads_path = Some(dir.join("downloads.db"));
    config.database.failed_downloads_path = Some(dir.join("failed.db"));
    config.database.releases_path = Some(dir.join("releases.db"));
    config.cli.progress_bars = false;
    config
}

/// Qobuz-shaped album payload with sequentially numbered tracks.
pub fn qobuz_album(id: u64, title: &str, artist: &str, track_ids: &[u64]) -> Value {
    serde_json::json!({
        "qobuz_id": id,
        "title": title,
        "tracks_count": track_ids.len(),
        "release_date_original": "2001-03-07",
        "maximum_bit_depth": 16,
        "maximum_sampling_rate": 44.1,
        "parental_warning": false,
        "artist": {"name": artist, "id": 7},
        "label": {"name": "Test Label"},
        "tracks": track_ids
            .iter()
            .map(|track_id| serde_json::json!({"id": track_id, "media_number": 1}))
            .collect::<Vec<_>>(),
    })
}

/// Qobuz-shaped track payload.
pub fn qobuz_track(id: u64, title: &str, artist: &str, number: usize) -> Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "isrc": format!("TEST{id:08}"),
        "streamable": true,
        "track_number": number,
        "media_number": 1,
        "maximum_bit_depth": 16,
        "maximum_sampling_rate": 44.1,
        "performer": {"name": artist, "id": 7},
    })
}

/// Deezer-shaped track payload with an embedded (partial) album.
pub fn deezer_track(id: u64, album_id: u64, title: &str, artist: &str) -> Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "isrc": format!("TEST{id:08}"),
        "readable": true,
        "track_position": 1,
        "disk_number": 1,
        "explicit_lyrics": false,
        "qualities": [serde_json::json!("MP3_128"), serde_json::json!("MP3_320"), serde_json::json!("FLAC")],
        "contributors": [{"name": artist, "id": 7}],
        "album": {
            "id": album_id,
            "title": format!("Album {album_id}"),
            "release_date": "2001-03-07",
        },
    })
}

/// Deezer-shaped album payload with an embedded tracklist.
pub fn deezer_album(id: u64, title: &str, artist: &str, track_ids: &[u64]) -> Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "nb_tracks": track_ids.len(),
        "release_date": "2001-03-07",
        "artist": {"name": artist, "id": 7},
        "genres": {"data": [{"name": "Electronic"}]},
        "tracks": track_ids
            .iter()
            .map(|track_id| serde_json::json!({"id": track_id, "disk_number": 1}))
            .collect::<Vec<_>>(),
    })
}

