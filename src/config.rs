//! Configuration for ripstream.
//!
//! All recognized options are enumerated here; the configuration surface is
//! closed, not open-ended. Settings are grouped by concern:
//!
//! * [`DownloadsConfig`] - worker pool size, target folder, layout switches
//! * [`SourceConfig`] - per-provider quality, rate limit and credentials
//! * [`FilepathsConfig`] - folder/track format strings and sanitization
//! * [`FilterConfig`] - artist discography filters
//! * [`RymConfig`] - metadata enrichment policy
//! * [`ConversionConfig`] - optional post-download conversion
//! * [`DatabaseConfig`] - ledger file locations
//!
//! The file is TOML, read from the OS config directory by default
//! (`~/.config/ripstream/config.toml` on Linux). Every section and field is
//! optional; missing values take the defaults below.

use std::path::PathBuf;

use serde::Deserialize;
use veil::Redact;

use crate::{
    client::Source,
    error::{Error, Result},
    metadata::Quality,
};

/// Application directory name, used under the OS config and data dirs.
pub const APP_DIR: &str = "ripstream";

/// Complete configuration for a ripstream session.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Download queue and file layout settings.
    pub downloads: DownloadsConfig,

    /// Per-provider settings, keyed by section name.
    pub qobuz: SourceConfig,
    pub tidal: SourceConfig,
    pub deezer: SourceConfig,
    pub soundcloud: SourceConfig,

    /// Path format strings and sanitization.
    pub filepaths: FilepathsConfig,

    /// Artist discography filters.
    pub filters: FilterConfig,

    /// RateYourMusic enrichment.
    pub rym: RymConfig,

    /// Post-download conversion.
    pub conversion: ConversionConfig,

    /// Ledger database locations.
    pub database: DatabaseConfig,

    /// Terminal behavior.
    pub cli: CliConfig,

    /// Last.fm playlist resolution.
    pub lastfm: LastfmConfig,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` if the file cannot be read or parsed,
    /// or contains unrecognized keys.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads the configuration file from the default location, falling back
    /// to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` if a file exists but cannot be parsed.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default configuration file location under the OS config dir.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Per-provider settings for `source`.
    #[must_use]
    pub fn source(&self, source: Source) -> &SourceConfig {
        match source {
            Source::Qobuz => &self.qobuz,
            Source::Tidal => &self.tidal,
            Source::Deezer => &self.deezer,
            Source::Soundcloud => &self.soundcloud,
        }
    }
}

/// Download queue and file layout settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadsConfig {
    /// Root folder for downloaded audio.
    pub folder: PathBuf,

    /// Number of download workers, and the capacity of the global byte
    /// transfer semaphore, the per-provider concurrency semaphores and the
    /// enrichment semaphore.
    pub max_connections: usize,

    /// Whether to nest downloads under a per-provider directory.
    pub source_subdirectories: bool,

    /// Whether multi-disc albums get a `Disc N` subdirectory per disc.
    pub disc_subdirectories: bool,

    /// Whether to run the audio validator on each downloaded file.
    pub validate_audio: bool,

    /// Whether to delete files that failed validation.
    pub delete_invalid_files: bool,

    /// Whether to retry the byte transfer once after a validation failure.
    pub retry_on_validation_failure: bool,

    /// When downloading favorites-of-tracks, fetch the full album for each
    /// liked track instead of the single track.
    pub download_full_album_for_liked_tracks: bool,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            folder: dirs::audio_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR),
            max_connections: 6,
            source_subdirectories: false,
            disc_subdirectories: true,
            validate_audio: false,
            delete_invalid_files: false,
            retry_on_validation_failure: false,
            download_full_album_for_liked_tracks: false,
        }
    }
}

/// Per-provider quality, rate limiting and credentials.
///
/// Credentials are redacted from debug output. Which fields are meaningful
/// depends on the provider: Deezer uses `arl`, Qobuz and Tidal use
/// email/password or token, SoundCloud needs none.
#[derive(Clone, Redact, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Requested quality tier (0 = lossy low, 1 = lossy high, 2 = CD,
    /// 3 = hi-res). Clamped to what the provider actually offers.
    pub quality: Quality,

    /// Token bucket refill: API calls allowed per minute.
    pub requests_per_minute: u32,

    /// Whether to downgrade when the requested quality is unavailable.
    /// When `false`, such tracks are recorded as failures and skipped.
    pub lower_quality_if_not_available: bool,

    /// Deezer ARL cookie token.
    #[redact]
    pub arl: Option<String>,

    /// Account email.
    pub email: Option<String>,

    /// Account password.
    #[redact]
    pub password: Option<String>,

    /// Pre-authenticated API token.
    #[redact]
    pub token: Option<String>,

    /// Deezer master decryption key. Extracted from the web player at
    /// login when not configured.
    #[redact]
    pub bf_secret: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            quality: Quality::Lossless,
            requests_per_minute: 600,
            lower_quality_if_not_available: true,
            arl: None,
            email: None,
            password: None,
            token: None,
            bf_secret: None,
        }
    }
}

/// Path format strings and sanitization settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilepathsConfig {
    /// Album folder format. Recognized keys: `{albumartist}`,
    /// `{albumcomposer}`, `{bit_depth}`, `{sampling_rate}`, `{id}`,
    /// `{title}`, `{year}`, `{container}`, `{releasetype}`.
    pub folder_format: String,

    /// Track filename format. Recognized keys: `{tracknumber}`, `{artist}`,
    /// `{artists}`, `{albumartist}`, `{albumcomposer}`, `{composer}`,
    /// `{title}`, `{explicit}`, `{album}`, `{source_platform}`,
    /// `{container}`.
    pub track_format: String,

    /// Restrict filenames to `[A-Za-z0-9._ -]`.
    pub restrict_characters: bool,

    /// Truncate the track filename stem to this many characters.
    /// Zero disables truncation.
    pub truncate_to: usize,

    /// Whether singles get their own album folder.
    pub add_singles_to_folder: bool,
}

impl Default for FilepathsConfig {
    fn default() -> Self {
        Self {
            folder_format: "{albumartist} - {title} ({year})".to_string(),
            track_format: "{tracknumber}. {artist} - {title}{explicit}".to_string(),
            restrict_characters: false,
            truncate_to: 120,
            add_singles_to_folder: false,
        }
    }
}

/// Artist discography filters.
///
/// `repeats` requires the full album set and forces batch resolution;
/// the other predicates apply per-item while streaming.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Collapse album variants with the same base title, keeping the best.
    pub repeats: bool,

    /// Drop anniversary/deluxe/live/collector/demo/expanded/remix editions.
    pub extras: bool,

    /// Drop albums whose album artist differs from the artist.
    pub features: bool,

    /// Drop extras and Various Artists compilations.
    pub non_studio_albums: bool,

    /// Keep only remasters.
    pub non_remaster: bool,
}

impl FilterConfig {
    /// Whether any filter needs the full set of resolved albums before
    /// a selection can be made.
    #[must_use]
    pub fn needs_batch(&self) -> bool {
        self.repeats
    }
}

/// Genre enrichment policy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GenreMode {
    /// Replace provider genres with RYM genres when RYM returned any.
    Replace,

    /// Append RYM genres to provider genres, deduplicated, original
    /// order preserved.
    #[default]
    Append,
}

/// RateYourMusic enrichment settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RymConfig {
    /// Whether enrichment runs at all.
    pub enabled: bool,

    /// How RYM genres combine with provider genres.
    pub genre_mode: GenreMode,
}

/// Post-download conversion settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionConfig {
    /// Whether to convert after tagging.
    pub enabled: bool,

    /// Target codec, passed to the external converter: `flac`, `alac`,
    /// `mp3` or `opus`.
    pub codec: String,

    /// Target sampling rate in Hz. `None` keeps the source rate.
    pub sampling_rate: Option<u32>,

    /// Target bit depth. `None` keeps the source depth.
    pub bit_depth: Option<u32>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            codec: "flac".to_string(),
            sampling_rate: None,
            bit_depth: None,
        }
    }
}

/// Ledger database locations.
///
/// Three durable files: downloaded tracks, failed items, and completed
/// releases. Disabling a table replaces it with a no-op store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Whether the downloads and releases tables are active.
    pub downloads_enabled: bool,

    /// Whether the failures table is active.
    pub failed_downloads_enabled: bool,

    /// Downloads database path. Defaults to the OS data dir.
    pub downloads_path: Option<PathBuf>,

    /// Failures database path. Defaults to the OS data dir.
    pub failed_downloads_path: Option<PathBuf>,

    /// Releases database path. Defaults to the OS data dir.
    pub releases_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            downloads_enabled: true,
            failed_downloads_enabled: true,
            downloads_path: None,
            failed_downloads_path: None,
            releases_path: None,
        }
    }
}

impl DatabaseConfig {
    /// Resolved downloads database path.
    #[must_use]
    pub fn downloads_path(&self) -> PathBuf {
        self.downloads_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("downloads.db"))
    }

    /// Resolved failures database path.
    #[must_use]
    pub fn failed_downloads_path(&self) -> PathBuf {
        self.failed_downloads_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("failed_downloads.db"))
    }

    /// Resolved releases database path.
    #[must_use]
    pub fn releases_path(&self) -> PathBuf {
        self.releases_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("downloads_releases.db"))
    }

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Terminal behavior.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Print what would be downloaded without touching the network,
    /// filesystem or ledger.
    pub dry_run: bool,

    /// Render progress bars during byte transfers.
    pub progress_bars: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress_bars: true,
        }
    }
}

/// Last.fm playlist resolution settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LastfmConfig {
    /// Provider used to resolve scraped tracks.
    pub source: Source,

    /// Optional second provider tried when the primary has no match.
    pub fallback_source: Option<Source>,
}

impl Default for LastfmConfig {
    fn default() -> Self {
        Self {
            source: Source::Deezer,
            fallback_source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.downloads.max_connections, 6);
        assert!(config.downloads.disc_subdirectories);
        assert_eq!(config.deezer.quality, Quality::Lossless);
        assert!(config.deezer.lower_quality_if_not_available);
        assert_eq!(config.rym.genre_mode, GenreMode::Append);
        assert!(!config.filters.needs_batch());
    }

    #[test]
    fn parses_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [downloads]
            max_connections = 2
            validate_audio = true

            [deezer]
            quality = 1
            arl = "secret"

            [filters]
            repeats = true
            "#,
        )
        .unwrap();

        assert_eq!(config.downloads.max_connections, 2);
        assert!(config.downloads.validate_audio);
        assert_eq!(config.deezer.quality, Quality::High);
        assert_eq!(config.deezer.arl.as_deref(), Some("secret"));
        assert!(config.filters.needs_batch());
        // Untouched sections keep defaults.
        assert_eq!(config.qobuz.quality, Quality::Lossless);
        assert!(config.cli.progress_bars);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [downloads]
            max_speed = 9000
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn arl_is_redacted_in_debug_output() {
        let config = SourceConfig {
            arl: Some("very-secret-arl".to_string()),
            ..SourceConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret-arl"));
    }
}
