//! Normalized album metadata and the provider-specific album mappers.
//!
//! An [`AlbumMetadata`] is produced once per album and shared by reference
//! with every track the album spawns. It is immutable after enrichment,
//! which runs on a single task before any worker observes it.

use serde_json::Value;

use regex_lite::Regex;

use crate::{
    client::Source,
    error::{Error, Result},
    filepath::{clean_filename, clean_filepath, interpolate},
};

use super::{
    covers::Covers,
    util::{bool_of, id_of, nested_str, str_of, u64_of, year_of},
    Quality,
};

/// Phonogram copyright symbol, substituted for `(P)`.
const PHON_COPYRIGHT: &str = "\u{2117}";

/// Copyright symbol, substituted for `(C)`.
const COPYRIGHT: &str = "\u{a9}";

/// Stream-level facts about an album: identity, fidelity, availability.
#[derive(Clone, Debug, PartialEq)]
pub struct AlbumInfo {
    /// Provider identifier of the album.
    pub id: String,

    /// Best quality tier the provider advertises for this album.
    pub quality: Quality,

    /// Container format, uppercased (`FLAC`, `MP3`, `MP4`).
    pub container: String,

    /// Record label, when known.
    pub label: Option<String>,

    /// Parental advisory flag.
    pub explicit: bool,

    /// Sampling rate in Hz, lossless albums only.
    pub sampling_rate: Option<u32>,

    /// Bit depth, lossless albums only.
    pub bit_depth: Option<u8>,

    /// Digital booklets (Qobuz "goodies").
    pub booklets: Option<Vec<Value>>,

    /// Whether the album is available for streaming. `false` terminates
    /// the pipeline for this album.
    pub streamable: bool,
}

/// Normalized album record shared by all of an album's tracks.
#[derive(Clone, Debug, PartialEq)]
pub struct AlbumMetadata {
    pub info: AlbumInfo,

    /// Album title.
    pub title: String,

    /// Primary album artist (first credited, MusicBrainz style).
    pub albumartist: String,

    /// Release year, `"Unknown"` when the provider has no date.
    pub year: String,

    /// Genres in provider order, possibly replaced or extended by
    /// enrichment.
    pub genre: Vec<String>,

    /// Multi-resolution artwork.
    pub covers: Covers,

    /// Number of tracks on the release.
    pub tracktotal: usize,

    /// Number of discs on the release.
    pub disctotal: usize,

    pub albumcomposer: Option<String>,
    pub comment: Option<String>,
    pub compilation: Option<String>,
    pub copyright: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub grouping: Option<String>,

    /// UPC / barcode.
    pub barcode: Option<String>,

    /// ReplayGain in `"+/-X.XX dB"` form.
    pub replaygain_album_gain: Option<String>,

    /// Release type (Album, EP, Single, Compilation...).
    pub releasetype: Option<String>,

    /// Album artist credit when it differs from the album artist.
    pub album_artist_credit: Option<String>,

    /// Original release date (Vorbis `ORIGINALDATE`).
    pub originaldate: Option<String>,

    /// MusicBrainz media type; always `"Digital Media"` for streams.
    pub media_type: Option<String>,

    /// Provider this album came from.
    pub source_platform: Option<Source>,

    /// Provider identifier of the album, for tagging.
    pub source_album_id: Option<String>,

    /// Provider identifier of the primary artist, for tagging.
    pub source_artist_id: Option<String>,

    /// RateYourMusic descriptors merged in by enrichment.
    pub rym_descriptors: Option<Vec<String>>,
}

impl AlbumMetadata {
    /// Genres joined for single-valued tag fields.
    #[must_use]
    pub fn genres(&self) -> String {
        self.genre.join(", ")
    }

    /// Copyright string with `(P)`/`(C)` replaced by their symbols.
    #[must_use]
    pub fn formatted_copyright(&self) -> Option<String> {
        self.copyright.as_ref().map(|c| {
            let re = Regex::new(r"(?i)\(P\)").expect("valid regex");
            let out = re.replace_all(c, PHON_COPYRIGHT);
            let re = Regex::new(r"(?i)\(C\)").expect("valid regex");
            re.replace_all(&out, COPYRIGHT).into_owned()
        })
    }

    /// Release type normalized for RateYourMusic lookups.
    #[must_use]
    pub fn rym_release_type(&self) -> &'static str {
        match self
            .releasetype
            .as_deref()
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("ep") => "ep",
            Some("single") => "single",
            Some("compilation" | "best of") => "compilation",
            _ => "album",
        }
    }

    /// Renders the album folder name from a user format string.
    ///
    /// Recognized keys: `{albumartist}`, `{albumcomposer}`, `{bit_depth}`,
    /// `{sampling_rate}`, `{id}`, `{title}`, `{year}`, `{container}`,
    /// `{releasetype}`.
    #[must_use]
    pub fn format_folder_path(&self, formatter: &str, restrict: bool) -> String {
        const NONE_STR: &str = "Unknown";

        // Keep EP uppercase, title-case everything else.
        let releasetype = self.releasetype.as_deref().map_or_else(
            || NONE_STR.to_string(),
            |rt| {
                let rt = clean_filename(rt, restrict);
                if rt.eq_ignore_ascii_case("ep") {
                    "EP".to_string()
                } else {
                    title_case(&rt)
                }
            },
        );

        let values = [
            ("albumartist", clean_filename(&self.albumartist, restrict)),
            (
                "albumcomposer",
                self.albumcomposer
                    .as_deref()
                    .map_or_else(|| NONE_STR.to_string(), |c| clean_filename(c, restrict)),
            ),
            (
                "bit_depth",
                self.info
                    .bit_depth
                    .map_or_else(|| NONE_STR.to_string(), |b| b.to_string()),
            ),
            (
                "sampling_rate",
                self.info
                    .sampling_rate
                    .map_or_else(|| NONE_STR.to_string(), |s| s.to_string()),
            ),
            ("id", self.info.id.clone()),
            ("title", clean_filename(&self.title, restrict)),
            ("year", self.year.clone()),
            ("container", self.info.container.clone()),
            ("releasetype", releasetype),
        ];

        clean_filepath(&interpolate(formatter, &values), restrict)
    }

    /// Dispatches to the provider-specific album mapper.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Parse` when the payload cannot be interpreted.
    pub fn from_album_resp(resp: &Value, source: Source) -> Result<Self> {
        match source {
            Source::Qobuz => Self::from_qobuz(resp),
            Source::Tidal => Self::from_tidal(resp),
            Source::Deezer => Self::from_deezer(resp),
            Source::Soundcloud => Self::from_soundcloud(resp),
        }
    }

    /// Builds album metadata from a *track* payload, used when a single
    /// track is downloaded outside an album context.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Parse` when the payload cannot be interpreted.
    pub fn from_track_resp(resp: &Value, source: Source) -> Result<Self> {
        match source {
            Source::Qobuz => Self::from_qobuz(
                resp.get("album")
                    .ok_or_else(|| Error::parse("track payload has no album"))?,
            ),
            Source::Tidal => Self::from_tidal_track_resp(resp),
            Source::Soundcloud => Self::from_soundcloud(resp),
            Source::Deezer => {
                let album = resp
                    .get("album")
                    .ok_or_else(|| Error::parse("track payload has no album"))?;
                if album.get("tracks").is_some() {
                    Self::from_deezer(album)
                } else {
                    Self::from_incomplete_deezer_track_resp(resp)
                }
            }
        }
    }

    /// Qobuz album payload.
    fn from_qobuz(resp: &Value) -> Result<Self> {
        let title = str_of(resp, "title").unwrap_or_else(|| "Unknown Album".to_string());
        let tracktotal = u64_of(resp, "tracks_count").unwrap_or(1) as usize;

        // Qobuz genre strings are slash-separated breadcrumbs; keep the
        // leaf segments, deduplicated.
        let raw_genres: Vec<String> = resp
            .get("genres_list")
            .or_else(|| resp.get("genre"))
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let genre = clean_genres(&raw_genres);

        let date = str_of(resp, "release_date_original").or_else(|| str_of(resp, "release_date"));
        let year = year_of(date.as_deref());

        let albumartist = resp
            .get("artists")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|a| str_of(a, "name"))
            .or_else(|| nested_str(resp, "artist", "name"))
            .ok_or_else(|| Error::parse("qobuz album has no artist"))?;

        let source_artist_id = resp
            .get("artists")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|a| id_of(a, "id"))
            .or_else(|| resp.get("artist").and_then(|a| id_of(a, "id")));

        let disctotal = resp
            .get("tracks")
            .and_then(|t| t.get("items"))
            .or_else(|| resp.get("tracks"))
            .and_then(Value::as_array)
            .map_or(1, |tracks| {
                tracks
                    .iter()
                    .filter_map(|t| u64_of(t, "media_number"))
                    .max()
                    .unwrap_or(1) as usize
            });

        let (quality, bit_depth, sampling_rate, container) = stream_quality(
            u64_of(resp, "maximum_bit_depth").map(|b| b as u8),
            resp.get("maximum_sampling_rate")
                .and_then(Value::as_f64)
                .map(khz_to_hz),
        );

        let booklets = resp
            .get("goodies")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .map(|a| a.to_vec());

        let id = id_of(resp, "qobuz_id")
            .or_else(|| id_of(resp, "id"))
            .ok_or_else(|| Error::parse("qobuz album has no id"))?;

        let releasetype = str_of(resp, "release_type").map(|raw| match raw.to_lowercase().as_str() {
            "epmini" => "EP".to_string(),
            "bestof" => "Best Of".to_string(),
            other => title_case(other),
        });

        Ok(Self {
            info: AlbumInfo {
                id: id.clone(),
                quality,
                container: container.to_string(),
                label: resp.get("label").map_or_else(
                    || str_of(resp, "label"),
                    |l| str_of(l, "name").or_else(|| l.as_str().map(str::to_string)),
                ),
                explicit: bool_of(resp, "parental_warning", false),
                sampling_rate,
                bit_depth,
                booklets,
                streamable: bool_of(resp, "streamable", true),
            },
            title,
            albumartist,
            year,
            genre,
            covers: Covers::from_qobuz(resp),
            tracktotal,
            disctotal,
            albumcomposer: nested_str(resp, "composer", "name"),
            comment: None,
            compilation: None,
            copyright: str_of(resp, "copyright"),
            date: date.clone(),
            description: str_of(resp, "description").filter(|d| !d.is_empty()),
            grouping: None,
            barcode: id_of(resp, "upc"),
            replaygain_album_gain: None,
            releasetype,
            album_artist_credit: None,
            originaldate: str_of(resp, "release_date_original"),
            media_type: Some("Digital Media".to_string()),
            source_platform: Some(Source::Qobuz),
            source_album_id: Some(id),
            source_artist_id,
            rym_descriptors: None,
        })
    }

    /// Deezer album payload (tracklist embedded by the client).
    fn from_deezer(resp: &Value) -> Result<Self> {
        let title = str_of(resp, "title").unwrap_or_else(|| "Unknown Album".to_string());
        let tracks = resp.get("tracks").and_then(Value::as_array);
        let tracktotal = u64_of(resp, "track_total")
            .or_else(|| u64_of(resp, "nb_tracks"))
            .unwrap_or_else(|| tracks.map_or(0, |t| t.len() as u64)) as usize;
        let disctotal = tracks
            .and_then(|t| t.last())
            .and_then(|t| u64_of(t, "disk_number"))
            .unwrap_or(1) as usize;

        let genre = resp
            .get("genres")
            .and_then(|g| g.get("data"))
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|g| str_of(g, "name"))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let date = str_of(resp, "release_date");
        let year = year_of(date.as_deref());
        let albumartist = nested_str(resp, "artist", "name")
            .ok_or_else(|| Error::parse("deezer album has no artist"))?;
        let source_artist_id = resp.get("artist").and_then(|a| id_of(a, "id"));
        let id = id_of(resp, "id").ok_or_else(|| Error::parse("deezer album has no id"))?;

        let explicit =
            bool_of(resp, "parental_warning", false) || bool_of(resp, "explicit_lyrics", false);

        Ok(Self {
            info: AlbumInfo {
                id: id.clone(),
                // Deezer advertises CD quality account-wide; the track
                // mapper refines this per track.
                quality: Quality::Lossless,
                container: "FLAC".to_string(),
                label: str_of(resp, "label"),
                explicit,
                sampling_rate: Some(44_100),
                bit_depth: Some(16),
                booklets: None,
                streamable: true,
            },
            title,
            albumartist,
            year,
            genre,
            covers: Covers::from_deezer(resp),
            tracktotal,
            disctotal,
            albumcomposer: None,
            comment: None,
            compilation: None,
            copyright: None,
            date,
            description: None,
            grouping: None,
            barcode: id_of(resp, "upc"),
            replaygain_album_gain: str_of(resp, "gain"),
            releasetype: str_of(resp, "record_type"),
            album_artist_credit: str_of(resp, "album_artist_credit"),
            originaldate: str_of(resp, "original_release_date"),
            media_type: Some("Digital Media".to_string()),
            source_platform: Some(Source::Deezer),
            source_album_id: Some(id),
            source_artist_id,
            rym_descriptors: None,
        })
    }

    /// Deezer track payload whose embedded album is partial.
    fn from_incomplete_deezer_track_resp(resp: &Value) -> Result<Self> {
        let album = resp
            .get("album")
            .ok_or_else(|| Error::parse("deezer track has no album"))?;
        let id = id_of(album, "id").ok_or_else(|| Error::parse("deezer album has no id"))?;
        let title = str_of(album, "title").unwrap_or_else(|| "Unknown Album".to_string());
        let date = str_of(album, "release_date");
        let year = year_of(date.as_deref());

        let albumartist = resp
            .get("contributors")
            .and_then(Value::as_array)
            .map(|contributors| {
                contributors
                    .iter()
                    .filter_map(|c| str_of(c, "name"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|names| !names.is_empty())
            .or_else(|| nested_str(resp, "artist", "name"))
            .ok_or_else(|| Error::parse("deezer track has no contributors"))?;

        Ok(Self {
            info: AlbumInfo {
                id: id.clone(),
                quality: Quality::Lossless,
                container: "FLAC".to_string(),
                label: None,
                explicit: bool_of(resp, "explicit_lyrics", false),
                sampling_rate: None,
                bit_depth: None,
                booklets: None,
                streamable: true,
            },
            title,
            albumartist,
            year,
            genre: Vec::new(),
            covers: Covers::from_deezer(album),
            tracktotal: 1,
            disctotal: 1,
            albumcomposer: None,
            comment: None,
            compilation: None,
            copyright: None,
            date,
            description: None,
            grouping: None,
            barcode: None,
            replaygain_album_gain: None,
            releasetype: None,
            album_artist_credit: None,
            originaldate: None,
            media_type: Some("Digital Media".to_string()),
            source_platform: Some(Source::Deezer),
            source_album_id: Some(id),
            source_artist_id: None,
            rym_descriptors: None,
        })
    }

    /// SoundCloud track payload; there are no albums, each track stands
    /// alone identified by its track id.
    fn from_soundcloud(resp: &Value) -> Result<Self> {
        let id = id_of(resp, "id").ok_or_else(|| Error::parse("soundcloud track has no id"))?;
        let publisher = resp.get("publisher_metadata").cloned().unwrap_or(Value::Null);

        let artist = str_of(&publisher, "artist")
            .or_else(|| nested_str(resp, "user", "username"))
            .ok_or_else(|| Error::parse("soundcloud track has no artist"))?;

        let date = str_of(resp, "created_at");
        let year = year_of(date.as_deref());
        let title = str_of(&publisher, "album_title")
            .unwrap_or_else(|| "Unknown album".to_string());

        Ok(Self {
            info: AlbumInfo {
                id,
                quality: Quality::Low,
                container: "MP3".to_string(),
                label: str_of(resp, "label_name"),
                explicit: bool_of(&publisher, "explicit", false),
                sampling_rate: None,
                bit_depth: None,
                booklets: None,
                streamable: true,
            },
            title,
            albumartist: artist,
            year,
            genre: str_of(resp, "genre").map(|g| vec![g]).unwrap_or_default(),
            covers: Covers::from_soundcloud(resp),
            tracktotal: 1,
            disctotal: 1,
            albumcomposer: None,
            comment: None,
            compilation: None,
            copyright: str_of(&publisher, "p_line"),
            date,
            description: str_of(resp, "description"),
            grouping: None,
            barcode: None,
            replaygain_album_gain: None,
            releasetype: None,
            album_artist_credit: None,
            originaldate: None,
            media_type: Some("Digital Media".to_string()),
            source_platform: Some(Source::Soundcloud),
            source_album_id: None,
            source_artist_id: None,
            rym_descriptors: None,
        })
    }

    /// Tidal album payload.
    fn from_tidal(resp: &Value) -> Result<Self> {
        let id = id_of(resp, "id").ok_or_else(|| Error::parse("tidal album has no id"))?;
        let title = str_of(resp, "title").unwrap_or_else(|| "Unknown Album".to_string());
        let tracktotal = u64_of(resp, "numberOfTracks").unwrap_or(1) as usize;
        let disctotal = u64_of(resp, "numberOfVolumes").unwrap_or(1) as usize;
        let date = str_of(resp, "releaseDate");
        let year = year_of(date.as_deref());
        let copyright = str_of(resp, "copyright");

        let (albumartist, source_artist_id) = tidal_primary_artist(resp)?;

        let (quality, bit_depth, sampling_rate, container) =
            tidal_quality(str_of(resp, "audioQuality").as_deref());

        Ok(Self {
            info: AlbumInfo {
                id: id.clone(),
                quality,
                container: container.to_string(),
                label: copyright.as_deref().and_then(label_from_copyright),
                explicit: bool_of(resp, "explicit", false),
                sampling_rate,
                bit_depth,
                booklets: None,
                streamable: bool_of(resp, "allowStreaming", true),
            },
            title,
            albumartist,
            year,
            genre: Vec::new(), // genre not returned by the API
            covers: Covers::from_tidal(resp),
            tracktotal,
            disctotal,
            albumcomposer: None,
            comment: None,
            compilation: None,
            copyright,
            date,
            description: None,
            grouping: None,
            barcode: id_of(resp, "upc"),
            replaygain_album_gain: None,
            releasetype: str_of(resp, "type").map(|raw| {
                if raw.eq_ignore_ascii_case("ep") {
                    "EP".to_string()
                } else {
                    title_case(&raw)
                }
            }),
            album_artist_credit: None,
            originaldate: None,
            media_type: Some("Digital Media".to_string()),
            source_platform: Some(Source::Tidal),
            source_album_id: Some(id),
            source_artist_id,
            rym_descriptors: None,
        })
    }

    /// Tidal *track* payload with partial album info (playlist entries,
    /// single-track downloads).
    fn from_tidal_track_resp(resp: &Value) -> Result<Self> {
        let album = resp
            .get("album")
            .ok_or_else(|| Error::parse("tidal track has no album"))?;
        let album_id = id_of(album, "id").ok_or_else(|| Error::parse("tidal album has no id"))?;
        let title = str_of(album, "title").unwrap_or_else(|| "Unknown Album".to_string());

        let date = str_of(resp, "streamStartDate");
        let year = year_of(date.as_deref());
        let copyright = str_of(resp, "copyright");
        let (albumartist, source_artist_id) = tidal_primary_artist(resp)?;

        let (quality, bit_depth, sampling_rate, container) =
            tidal_quality(str_of(resp, "audioQuality").as_deref());

        Ok(Self {
            info: AlbumInfo {
                id: id_of(resp, "id").unwrap_or_else(|| album_id.clone()),
                quality,
                container: container.to_string(),
                label: copyright.as_deref().and_then(label_from_copyright),
                explicit: bool_of(resp, "explicit", false),
                sampling_rate,
                bit_depth,
                booklets: None,
                streamable: bool_of(resp, "allowStreaming", true),
            },
            title,
            albumartist,
            year,
            genre: Vec::new(),
            covers: Covers::from_tidal(album),
            tracktotal: 1,
            disctotal: u64_of(resp, "volumeNumber").unwrap_or(1) as usize,
            albumcomposer: None,
            comment: None,
            compilation: None,
            copyright,
            date,
            description: None,
            grouping: None,
            barcode: None,
            replaygain_album_gain: None,
            releasetype: str_of(resp, "type").map(|raw| {
                if raw.eq_ignore_ascii_case("ep") {
                    "EP".to_string()
                } else {
                    title_case(&raw)
                }
            }),
            album_artist_credit: None,
            originaldate: None,
            media_type: Some("Digital Media".to_string()),
            source_platform: Some(Source::Tidal),
            source_album_id: Some(album_id),
            source_artist_id,
            rym_descriptors: None,
        })
    }
}

/// Splits slash-separated genre breadcrumbs and deduplicates the segments,
/// preserving first-occurrence order.
fn clean_genres(raw: &[String]) -> Vec<String> {
    let re = Regex::new(r"[^\u{2192}/]+").expect("valid regex");
    let joined = raw.join("/");

    let mut seen = Vec::new();
    for m in re.find_iter(&joined) {
        let genre = m.as_str().trim().to_string();
        if !genre.is_empty() && !seen.contains(&genre) {
            seen.push(genre);
        }
    }
    seen
}

/// First credited artist name and id from a Tidal payload.
fn tidal_primary_artist(resp: &Value) -> Result<(String, Option<String>)> {
    if let Some(artists) = resp.get("artists").and_then(Value::as_array) {
        if let Some(first) = artists.first() {
            let name =
                str_of(first, "name").ok_or_else(|| Error::parse("tidal artist has no name"))?;
            return Ok((name, id_of(first, "id")));
        }
    }

    let name = nested_str(resp, "artist", "name")
        .ok_or_else(|| Error::parse("tidal payload has no artist"))?;
    Ok((name, resp.get("artist").and_then(|a| id_of(a, "id"))))
}

/// Maps advertised stream parameters onto a tier.
///
/// Quality, bit depth, sampling rate and container are decided together
/// so they cannot disagree: hi-res always comes as 24-bit FLAC, CD
/// quality as 16-bit FLAC, and anything missing either parameter is
/// lossy and carries neither parameter nor the FLAC container.
/// Unusual depths are normalized to their tier's depth.
fn stream_quality(
    bit_depth: Option<u8>,
    sampling_rate: Option<u32>,
) -> (Quality, Option<u8>, Option<u32>, &'static str) {
    match (bit_depth, sampling_rate) {
        (Some(depth), Some(rate)) if depth >= 24 => {
            (Quality::HiRes, Some(24), Some(rate), "FLAC")
        }
        (Some(depth), Some(rate)) if depth >= 16 => {
            (Quality::Lossless, Some(16), Some(rate), "FLAC")
        }
        _ => (Quality::High, None, None, "MP3"),
    }
}

/// Maps Tidal's quality labels onto tiers and stream parameters.
fn tidal_quality(label: Option<&str>) -> (Quality, Option<u8>, Option<u32>, &'static str) {
    let quality = match label {
        Some("HI_RES") => Quality::HiRes,
        Some("LOSSLESS") => Quality::Lossless,
        Some("HIGH") => Quality::High,
        _ => Quality::Low,
    };

    match quality {
        Quality::HiRes => (quality, Some(24), Some(44_100), "FLAC"),
        Quality::Lossless => (quality, Some(16), Some(44_100), "FLAC"),
        // AAC for the lossy tiers.
        _ => (quality, None, None, "MP4"),
    }
}

/// Extracts the label from a copyright line like `(C) 2001 Label Name`.
fn label_from_copyright(copyright: &str) -> Option<String> {
    let re = Regex::new(r"(?i)^\([CP]\)\s*(?:\d{4}\s+)?(.+)$").expect("valid regex");
    re.captures(copyright)
        .map(|caps| caps[1].trim().to_string())
}

/// Title-cases each whitespace-separated word.
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Converts a kHz float (Qobuz style) to integral Hz.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn khz_to_hz(rate: f64) -> u32 {
    if rate < 1000.0 {
        (rate * 1000.0).round() as u32
    } else {
        rate.round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qobuz_album_maps_quality_and_artist() {
        let resp = json!({
            "qobuz_id": 88883,
            "title": "Vespertine",
            "tracks_count": 12,
            "release_date_original": "2001-08-27",
            "maximum_bit_depth": 24,
            "maximum_sampling_rate": 88.2,
            "parental_warning": false,
            "artist": {"name": "Björk", "id": 42},
            "label": {"name": "One Little Indian"},
            "genres_list": ["Pop/Electronic", "Pop/Art Pop"],
            "tracks": [
                {"media_number": 1},
                {"media_number": 2}
            ]
        });

        let meta = AlbumMetadata::from_qobuz(&resp).unwrap();
        assert_eq!(meta.info.quality, Quality::HiRes);
        assert_eq!(meta.info.bit_depth, Some(24));
        assert_eq!(meta.info.sampling_rate, Some(88_200));
        assert_eq!(meta.info.container, "FLAC");
        assert_eq!(meta.albumartist, "Björk");
        assert_eq!(meta.year, "2001");
        assert_eq!(meta.disctotal, 2);
        assert_eq!(meta.genre, vec!["Pop", "Electronic", "Art Pop"]);
        assert_eq!(meta.source_platform, Some(Source::Qobuz));
        assert_eq!(meta.source_artist_id.as_deref(), Some("42"));
    }

    #[test]
    fn qobuz_quality_and_container_are_decided_together() {
        // 24-bit advertised without a sampling rate is not hi-res FLAC;
        // the whole stream description falls back to lossy.
        let resp = json!({
            "qobuz_id": 1,
            "title": "T",
            "artist": {"name": "A", "id": 2},
            "maximum_bit_depth": 24
        });
        let meta = AlbumMetadata::from_qobuz(&resp).unwrap();
        assert_eq!(meta.info.quality, Quality::High);
        assert_eq!(meta.info.container, "MP3");
        assert_eq!(meta.info.bit_depth, None);
        assert_eq!(meta.info.sampling_rate, None);

        // Same for a sampling rate without a bit depth.
        let resp = json!({
            "qobuz_id": 1,
            "title": "T",
            "artist": {"name": "A", "id": 2},
            "maximum_sampling_rate": 44.1
        });
        let meta = AlbumMetadata::from_qobuz(&resp).unwrap();
        assert_eq!(meta.info.quality, Quality::High);
        assert_eq!(meta.info.container, "MP3");

        // An unusual depth lands on the CD tier, normalized to 16-bit.
        let resp = json!({
            "qobuz_id": 1,
            "title": "T",
            "artist": {"name": "A", "id": 2},
            "maximum_bit_depth": 20,
            "maximum_sampling_rate": 44.1
        });
        let meta = AlbumMetadata::from_qobuz(&resp).unwrap();
        assert_eq!(meta.info.quality, Quality::Lossless);
        assert_eq!(meta.info.container, "FLAC");
        assert_eq!(meta.info.bit_depth, Some(16));
        assert_eq!(meta.info.sampling_rate, Some(44_100));
    }

    #[test]
    fn deezer_album_takes_disc_count_from_last_track() {
        let resp = json!({
            "id": 302127,
            "title": "Discovery",
            "nb_tracks": 14,
            "release_date": "2001-03-07",
            "artist": {"name": "Daft Punk", "id": 27},
            "genres": {"data": [{"name": "Electro"}, {"name": "House"}]},
            "tracks": [
                {"disk_number": 1},
                {"disk_number": 1},
                {"disk_number": 2}
            ]
        });

        let meta = AlbumMetadata::from_deezer(&resp).unwrap();
        assert_eq!(meta.disctotal, 2);
        assert_eq!(meta.tracktotal, 14);
        assert_eq!(meta.info.quality, Quality::Lossless);
        assert_eq!(meta.genre, vec!["Electro", "House"]);
    }

    #[test]
    fn tidal_quality_tiers_determine_container() {
        let hires = json!({
            "id": 1,
            "title": "X",
            "artists": [{"name": "A", "id": 2}],
            "audioQuality": "HI_RES",
            "releaseDate": "2020-01-01"
        });
        let meta = AlbumMetadata::from_tidal(&hires).unwrap();
        assert_eq!(meta.info.quality, Quality::HiRes);
        assert_eq!(meta.info.bit_depth, Some(24));
        assert_eq!(meta.info.container, "FLAC");

        let lossy = json!({
            "id": 1,
            "title": "X",
            "artists": [{"name": "A", "id": 2}],
            "audioQuality": "HIGH",
            "releaseDate": "2020-01-01"
        });
        let meta = AlbumMetadata::from_tidal(&lossy).unwrap();
        assert_eq!(meta.info.quality, Quality::High);
        assert_eq!(meta.info.bit_depth, None);
        assert_eq!(meta.info.container, "MP4");
    }

    #[test]
    fn tidal_label_extracted_from_copyright() {
        assert_eq!(
            label_from_copyright("(C) 2001 One Little Indian").as_deref(),
            Some("One Little Indian")
        );
        assert_eq!(
            label_from_copyright("(p) XL Recordings").as_deref(),
            Some("XL Recordings")
        );
        assert_eq!(label_from_copyright("2001 No Prefix"), None);
    }

    #[test]
    fn unstreamable_tidal_album_is_flagged() {
        let resp = json!({
            "id": 1,
            "title": "Gone",
            "artists": [{"name": "A", "id": 2}],
            "allowStreaming": false,
            "releaseDate": "2020-01-01"
        });
        let meta = AlbumMetadata::from_tidal(&resp).unwrap();
        assert!(!meta.info.streamable);
    }

    #[test]
    fn copyright_symbols_are_substituted() {
        let mut meta = AlbumMetadata::from_deezer(&json!({
            "id": 1,
            "title": "T",
            "artist": {"name": "A"},
            "release_date": "2020-01-01",
            "tracks": []
        }))
        .unwrap();
        meta.copyright = Some("(P) 2020 (C) Label".to_string());
        assert_eq!(
            meta.formatted_copyright().as_deref(),
            Some("\u{2117} 2020 \u{a9} Label")
        );
    }

    #[test]
    fn folder_path_formats_and_cleans() {
        let meta = AlbumMetadata::from_deezer(&json!({
            "id": 1,
            "title": "OK Computer: OKNOTOK",
            "artist": {"name": "Radiohead"},
            "release_date": "1997-05-21",
            "tracks": []
        }))
        .unwrap();

        let folder = meta.format_folder_path("{albumartist} - {title} ({year})", false);
        assert_eq!(folder, "Radiohead - OK Computer_ OKNOTOK (1997)");
    }
}
