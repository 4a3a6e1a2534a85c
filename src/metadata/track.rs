//! Normalized track metadata and the provider-specific track mappers.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    client::Source,
    error::{Error, Result},
    filepath::{clean_filename, interpolate},
};

use super::{
    album::AlbumMetadata,
    util::{bool_of, id_of, nested_str, str_of, u64_of},
    Quality,
};

/// Stream-level facts about a track.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackInfo {
    /// Provider identifier of the track.
    pub id: String,

    /// Best quality tier available for this track. The quality actually
    /// downloaded is `min(requested, this)`.
    pub quality: Quality,

    /// Whether the track is available for streaming.
    pub streamable: bool,

    /// Bit depth, lossless tracks only.
    pub bit_depth: Option<u8>,

    /// Parental advisory flag.
    pub explicit: bool,

    /// Sampling rate in Hz, lossless tracks only.
    pub sampling_rate: Option<u32>,

    /// Classical work this track belongs to.
    pub work: Option<String>,

    /// Container after download: the downloadable's extension, uppercased.
    /// `None` until a downloadable has been obtained.
    pub container: Option<String>,
}

/// Normalized track record.
///
/// The album is shared by reference: every track of an album points at the
/// same [`AlbumMetadata`] snapshot, finalized before any track is enqueued.
#[derive(Clone, Debug)]
pub struct TrackMetadata {
    pub info: TrackInfo,

    /// Track title, with version/work folded in.
    pub title: String,

    /// Album this track belongs to.
    pub album: Arc<AlbumMetadata>,

    /// Primary artist (first credited).
    pub artist: String,

    /// All credited artists; the first equals `artist`.
    pub artists: Vec<String>,

    pub tracknumber: usize,
    pub discnumber: usize,

    pub composer: Option<Vec<String>>,

    /// Songwriters / lyricists.
    pub author: Option<Vec<String>>,

    pub isrc: Option<String>,
    pub lyrics: Option<String>,

    /// Provider this track came from.
    pub source_platform: Option<Source>,

    /// Provider identifiers, for tagging.
    pub source_track_id: Option<String>,
    pub source_album_id: Option<String>,
    pub source_artist_id: Option<String>,

    pub bpm: Option<u16>,

    /// ReplayGain in `"+/-X.XX dB"` form.
    pub replaygain_track_gain: Option<String>,

    /// Artist credit when it differs from the primary artist.
    pub track_artist_credit: Option<String>,

    /// MusicBrainz media type.
    pub media_type: Option<String>,
}

impl TrackMetadata {
    /// Dispatches to the provider-specific track mapper.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Parse` when the payload cannot be interpreted.
    pub fn from_resp(album: Arc<AlbumMetadata>, source: Source, resp: &Value) -> Result<Self> {
        match source {
            Source::Qobuz => Self::from_qobuz(album, resp),
            Source::Tidal => Self::from_tidal(album, resp),
            Source::Soundcloud => Self::from_soundcloud(album, resp),
            Source::Deezer => Self::from_deezer(album, resp),
        }
    }

    /// Renders the track filename stem from a user format string.
    ///
    /// Recognized keys: `{tracknumber}`, `{artist}`, `{artists}`,
    /// `{albumartist}`, `{albumcomposer}`, `{composer}`, `{title}`,
    /// `{explicit}`, `{album}`, `{source_platform}`, `{container}`.
    #[must_use]
    pub fn format_track_path(&self, formatter: &str, restrict: bool) -> String {
        const NONE_STR: &str = "Unknown";

        let artists = if self.artists.is_empty() {
            self.artist.clone()
        } else {
            self.artists.join(", ")
        };

        let values = [
            ("title", clean_filename(&self.title, restrict)),
            ("tracknumber", format!("{:02}", self.tracknumber)),
            ("artist", clean_filename(&self.artist, restrict)),
            ("artists", clean_filename(&artists, restrict)),
            (
                "albumartist",
                clean_filename(&self.album.albumartist, restrict),
            ),
            (
                "albumcomposer",
                self.album
                    .albumcomposer
                    .as_deref()
                    .map_or_else(|| NONE_STR.to_string(), |c| clean_filename(c, restrict)),
            ),
            (
                "composer",
                self.composer
                    .as_ref()
                    .map_or_else(|| NONE_STR.to_string(), |c| {
                        clean_filename(&c.join("; "), restrict)
                    }),
            ),
            (
                "explicit",
                if self.info.explicit {
                    " (Explicit)".to_string()
                } else {
                    String::new()
                },
            ),
            ("album", clean_filename(&self.album.title, restrict)),
            (
                "source_platform",
                self.source_platform
                    .map_or_else(|| NONE_STR.to_string(), |s| s.to_string()),
            ),
            (
                "container",
                self.info
                    .container
                    .clone()
                    .unwrap_or_else(|| NONE_STR.to_string()),
            ),
        ];

        interpolate(formatter, &values)
    }

    /// Qobuz track payload.
    fn from_qobuz(album: Arc<AlbumMetadata>, resp: &Value) -> Result<Self> {
        let mut title = str_of(resp, "title")
            .map(|t| t.trim().to_string())
            .ok_or_else(|| Error::parse("qobuz track has no title"))?;

        // Fold version and work into the displayed title.
        let version = str_of(resp, "version");
        let work = str_of(resp, "work");
        if let Some(version) = &version {
            if !title.contains(version.as_str()) {
                title = format!("{title} ({version})");
            }
        }
        if let Some(work) = &work {
            if !title.contains(work.as_str()) {
                title = format!("{work}: {title}");
            }
        }

        let track_id =
            id_of(resp, "id").ok_or_else(|| Error::parse("qobuz track has no id"))?;
        let artist = nested_str(resp, "performer", "name")
            .unwrap_or_else(|| album.albumartist.clone());

        let bit_depth = u64_of(resp, "maximum_bit_depth").map(|b| b as u8);
        let sampling_rate = resp
            .get("maximum_sampling_rate")
            .and_then(Value::as_f64)
            .map(|rate| {
                if rate < 1000.0 {
                    (rate * 1000.0).round()
                } else {
                    rate.round()
                }
            })
            .map(|rate| rate as u32);

        let replaygain_track_gain = resp
            .get("audio_info")
            .and_then(|info| info.get("replaygain_track_gain"))
            .and_then(Value::as_f64)
            .map(|gain| format!("{gain:+.2} dB"));

        let composer = nested_str(resp, "composer", "name").map(|base| {
            base.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
        });

        let source_album_id = resp
            .get("album")
            .and_then(|a| id_of(a, "qobuz_id"))
            .or_else(|| album.source_album_id.clone());
        let source_artist_id = resp.get("performer").and_then(|p| id_of(p, "id"));

        Ok(Self {
            info: TrackInfo {
                id: track_id.clone(),
                quality: album.info.quality,
                streamable: bool_of(resp, "streamable", false),
                bit_depth,
                explicit: false, // not included in the track payload
                sampling_rate,
                work,
                container: None,
            },
            title,
            artist: artist.clone(),
            artists: vec![artist],
            tracknumber: u64_of(resp, "track_number").unwrap_or(1) as usize,
            discnumber: u64_of(resp, "media_number").unwrap_or(1) as usize,
            composer,
            author: None,
            isrc: str_of(resp, "isrc"),
            lyrics: None,
            source_platform: Some(Source::Qobuz),
            source_track_id: Some(track_id),
            source_album_id,
            source_artist_id,
            bpm: None,
            replaygain_track_gain,
            track_artist_credit: None,
            media_type: Some("Digital Media".to_string()),
            album,
        })
    }

    /// Deezer track payload.
    ///
    /// The `qualities` array arrives from the client as
    /// `[MP3_128?, MP3_320?, FLAC?]`; the highest non-null index is the
    /// advertised maximum.
    fn from_deezer(album: Arc<AlbumMetadata>, resp: &Value) -> Result<Self> {
        let track_id =
            id_of(resp, "id").ok_or_else(|| Error::parse("deezer track has no id"))?;
        let title = str_of(resp, "title").ok_or_else(|| Error::parse("deezer track has no title"))?;

        let qualities = resp.get("qualities").and_then(Value::as_array);
        let available_quality = qualities.and_then(|qualities| {
            qualities
                .iter()
                .enumerate()
                .filter(|(_, q)| !q.is_null())
                .map(|(i, _)| i)
                .max()
        });

        let streamable = bool_of(resp, "readable", true) && available_quality.is_some();
        let quality = available_quality
            .and_then(|i| Quality::try_from(i as u8).ok())
            .unwrap_or(Quality::Low);

        let contributors: Vec<String> = resp
            .get("contributors")
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(|a| str_of(a, "name")).collect())
            .unwrap_or_default();
        let (artist, artists) = if contributors.is_empty() {
            let artist =
                nested_str(resp, "artist", "name").unwrap_or_else(|| "Unknown Artist".to_string());
            (artist.clone(), vec![artist])
        } else {
            (contributors[0].clone(), contributors)
        };

        let source_artist_id = resp
            .get("contributors")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|a| id_of(a, "id"));

        let string_list = |key: &str| -> Option<Vec<String>> {
            match resp.get(key) {
                Some(Value::String(s)) => Some(vec![s.clone()]),
                Some(Value::Array(a)) => {
                    let list: Vec<String> = a
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    (!list.is_empty()).then_some(list)
                }
                _ => None,
            }
        };

        Ok(Self {
            info: TrackInfo {
                id: track_id.clone(),
                quality,
                streamable,
                bit_depth: Some(16),
                explicit: bool_of(resp, "explicit_lyrics", false),
                sampling_rate: Some(44_100),
                work: None,
                container: None,
            },
            title,
            artist,
            artists,
            tracknumber: u64_of(resp, "track_position").unwrap_or(1) as usize,
            discnumber: u64_of(resp, "disk_number").unwrap_or(1) as usize,
            composer: string_list("composer"),
            author: string_list("author"),
            isrc: str_of(resp, "isrc"),
            lyrics: None,
            source_platform: album.source_platform,
            source_track_id: Some(track_id),
            source_album_id: album.source_album_id.clone(),
            source_artist_id,
            bpm: u64_of(resp, "bpm").filter(|&bpm| bpm > 0).map(|bpm| bpm as u16),
            replaygain_track_gain: str_of(resp, "gain"),
            track_artist_credit: str_of(resp, "artist_credit"),
            media_type: Some("Digital Media".to_string()),
            album,
        })
    }

    /// SoundCloud track payload.
    fn from_soundcloud(album: Arc<AlbumMetadata>, resp: &Value) -> Result<Self> {
        let track_id =
            id_of(resp, "id").ok_or_else(|| Error::parse("soundcloud track has no id"))?;
        let title = str_of(resp, "title")
            .map(|t| t.trim().to_string())
            .ok_or_else(|| Error::parse("soundcloud track has no title"))?;
        let artist = nested_str(resp, "user", "username")
            .ok_or_else(|| Error::parse("soundcloud track has no user"))?;
        let publisher = resp.get("publisher_metadata").cloned().unwrap_or(Value::Null);

        Ok(Self {
            info: TrackInfo {
                id: track_id.clone(),
                quality: album.info.quality,
                streamable: true,
                bit_depth: None,
                explicit: bool_of(&publisher, "explicit", false),
                sampling_rate: None,
                work: None,
                container: None,
            },
            title,
            artist: artist.clone(),
            artists: vec![artist],
            tracknumber: 1,
            discnumber: 1,
            composer: None,
            author: None,
            isrc: str_of(&publisher, "isrc"),
            lyrics: None,
            source_platform: Some(Source::Soundcloud),
            source_track_id: Some(track_id),
            source_album_id: None,
            source_artist_id: None,
            bpm: None,
            replaygain_track_gain: None,
            track_artist_credit: None,
            media_type: Some("Digital Media".to_string()),
            album,
        })
    }

    /// Tidal track payload.
    fn from_tidal(album: Arc<AlbumMetadata>, resp: &Value) -> Result<Self> {
        let track_id =
            id_of(resp, "id").ok_or_else(|| Error::parse("tidal track has no id"))?;
        let mut title = str_of(resp, "title")
            .map(|t| t.trim().to_string())
            .ok_or_else(|| Error::parse("tidal track has no title"))?;
        if let Some(version) = str_of(resp, "version") {
            title = format!("{title} ({version})");
        }

        let artists_json = resp.get("artists").and_then(Value::as_array);
        let (artist, artists, source_artist_id) = match artists_json {
            Some(list) if !list.is_empty() => {
                let names: Vec<String> =
                    list.iter().filter_map(|a| str_of(a, "name")).collect();
                let id = list.first().and_then(|a| id_of(a, "id"));
                (names[0].clone(), names, id)
            }
            _ => {
                let name = nested_str(resp, "artist", "name")
                    .ok_or_else(|| Error::parse("tidal track has no artist"))?;
                let id = resp.get("artist").and_then(|a| id_of(a, "id"));
                (name.clone(), vec![name], id)
            }
        };

        // Tidal returns a single quality matching the request; stream
        // parameters follow the album's tier.
        let quality = album.info.quality;
        let (bit_depth, sampling_rate) = match quality {
            Quality::HiRes => (Some(24), Some(44_100)),
            Quality::Lossless => (Some(16), Some(44_100)),
            _ => (None, None),
        };

        let replaygain_track_gain = resp
            .get("replayGain")
            .and_then(Value::as_f64)
            .map(|gain| format!("{gain:+.2} dB"));

        Ok(Self {
            info: TrackInfo {
                id: track_id.clone(),
                quality,
                streamable: bool_of(resp, "allowStreaming", true),
                bit_depth,
                explicit: bool_of(resp, "explicit", false),
                sampling_rate,
                work: None,
                container: None,
            },
            title,
            artist,
            artists,
            tracknumber: u64_of(resp, "trackNumber").unwrap_or(1) as usize,
            discnumber: u64_of(resp, "volumeNumber").unwrap_or(1) as usize,
            composer: None,
            author: None,
            isrc: str_of(resp, "isrc"),
            lyrics: str_of(resp, "lyrics"),
            source_platform: album.source_platform,
            source_track_id: Some(track_id),
            source_album_id: album.source_album_id.clone(),
            source_artist_id,
            bpm: u64_of(resp, "bpm").filter(|&bpm| bpm > 0).map(|bpm| bpm as u16),
            replaygain_track_gain,
            track_artist_credit: None,
            media_type: Some("Digital Media".to_string()),
            album,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn album() -> Arc<AlbumMetadata> {
        let resp = json!({
            "id": 302127,
            "title": "Discovery",
            "nb_tracks": 14,
            "release_date": "2001-03-07",
            "artist": {"name": "Daft Punk", "id": 27},
            "tracks": []
        });
        Arc::new(AlbumMetadata::from_album_resp(&resp, Source::Deezer).unwrap())
    }

    #[test]
    fn deezer_quality_is_highest_available_index() {
        let resp = json!({
            "id": 3135556,
            "title": "Harder, Better, Faster, Stronger",
            "isrc": "GBDUW0000059",
            "track_position": 4,
            "disk_number": 1,
            "explicit_lyrics": false,
            "readable": true,
            "qualities": ["MP3_128", "MP3_320", null],
            "contributors": [{"name": "Daft Punk", "id": 27}]
        });

        let meta = TrackMetadata::from_resp(album(), Source::Deezer, &resp).unwrap();
        assert_eq!(meta.info.quality, Quality::High);
        assert!(meta.info.streamable);
        assert_eq!(meta.artist, "Daft Punk");
        assert_eq!(meta.artists, vec!["Daft Punk"]);
    }

    #[test]
    fn deezer_without_any_quality_is_unstreamable() {
        let resp = json!({
            "id": 1,
            "title": "Gone",
            "readable": true,
            "qualities": [null, null, null],
            "contributors": []
        });

        let meta = TrackMetadata::from_resp(album(), Source::Deezer, &resp).unwrap();
        assert!(!meta.info.streamable);
    }

    #[test]
    fn primary_artist_is_first_contributor() {
        let resp = json!({
            "id": 1,
            "title": "Collab",
            "qualities": ["MP3_128", null, null],
            "contributors": [
                {"name": "Primary", "id": 1},
                {"name": "Guest", "id": 2}
            ]
        });

        let meta = TrackMetadata::from_resp(album(), Source::Deezer, &resp).unwrap();
        assert_eq!(meta.artist, "Primary");
        assert_eq!(meta.artists, vec!["Primary", "Guest"]);
        assert_eq!(meta.artists[0], meta.artist);
    }

    #[test]
    fn qobuz_folds_version_and_work_into_title() {
        let album = album();
        let resp = json!({
            "id": 7002,
            "title": "Jóga",
            "version": "Live",
            "work": "Homogenic",
            "isrc": "GBAYE9700122",
            "track_number": 3,
            "media_number": 1,
            "streamable": true,
            "performer": {"name": "Björk", "id": 5}
        });

        let meta = TrackMetadata::from_resp(album, Source::Qobuz, &resp).unwrap();
        assert_eq!(meta.title, "Homogenic: Jóga (Live)");
        assert_eq!(meta.tracknumber, 3);
    }

    #[test]
    fn track_path_formatting() {
        let resp = json!({
            "id": 1,
            "title": "One More Time",
            "track_position": 1,
            "disk_number": 1,
            "explicit_lyrics": true,
            "qualities": [null, null, "FLAC"],
            "contributors": [{"name": "Daft Punk", "id": 27}]
        });
        let meta = TrackMetadata::from_resp(album(), Source::Deezer, &resp).unwrap();

        let path = meta.format_track_path("{tracknumber}. {artist} - {title}{explicit}", false);
        assert_eq!(path, "01. Daft Punk - One More Time (Explicit)");
    }
}
