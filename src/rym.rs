//! RateYourMusic metadata enrichment.
//!
//! Enrichment is a decorator over [`AlbumMetadata`]: a session-scoped
//! service looks up an album (falling back to the artist page) and merges
//! what it finds into the normalized record:
//!
//! * Genres follow the configured [`GenreMode`]: `replace` swaps the
//!   provider genres out when RYM returned at least one, `append` extends
//!   them, deduplicated, with the original order preserved.
//! * Descriptors are merged unconditionally when present.
//!
//! Lookups are cached per `(artist, album)` for the lifetime of the
//! session and bounded by their own semaphore so enrichment backpressures
//! independently of downloads. Enrichment never fails the pipeline;
//! lookup errors are logged at debug severity and ignored.

use std::collections::HashMap;

use regex_lite::Regex;
use tokio::sync::{Mutex, Semaphore};

use crate::{
    config::{GenreMode, RymConfig},
    error::Result,
    http,
    metadata::AlbumMetadata,
};

/// What a lookup produced.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RymMetadata {
    /// Genres, most significant first.
    pub genres: Vec<String>,

    /// Mood/style descriptors.
    pub descriptors: Vec<String>,

    /// Page the data came from.
    pub url: Option<String>,
}

/// Session-scoped enrichment service.
pub struct RymService {
    genre_mode: GenreMode,
    http: http::Client,
    semaphore: Semaphore,
    cache: Mutex<HashMap<(String, String), Option<RymMetadata>>>,
}

impl RymService {
    /// RYM is aggressive about scrapers; stay far below any plausible limit.
    const REQUESTS_PER_MINUTE: u32 = 30;

    /// Creates the service.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` if the HTTP client cannot be built.
    pub fn new(config: &RymConfig, max_connections: usize) -> Result<Self> {
        Ok(Self {
            genre_mode: config.genre_mode,
            http: http::Client::without_cookies(Self::REQUESTS_PER_MINUTE, max_connections)?,
            semaphore: Semaphore::new(max_connections),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Enriches an album in place.
    ///
    /// Runs under the enrichment semaphore. Lookup failures leave the
    /// album untouched.
    pub async fn enrich_album(&self, meta: &mut AlbumMetadata) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return;
        };

        let release_type = meta.rym_release_type();
        let year = meta.year.parse::<i32>().ok();
        let Some(rym) = self
            .lookup(&meta.albumartist, &meta.title, year, release_type)
            .await
        else {
            debug!(
                "no RYM data for {} - {}, keeping provider metadata",
                meta.albumartist, meta.title
            );
            return;
        };

        meta.genre = apply_genre_policy(self.genre_mode, &meta.genre, &rym.genres);
        if !rym.descriptors.is_empty() {
            meta.rym_descriptors = Some(rym.descriptors);
        }
    }

    /// Album lookup with artist fallback, cached per `(artist, album)`.
    pub async fn lookup(
        &self,
        artist: &str,
        album: &str,
        year: Option<i32>,
        release_type: &str,
    ) -> Option<RymMetadata> {
        let cache_key = (artist.to_lowercase(), album.to_lowercase());
        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            return cached.clone();
        }

        debug!("RYM search: {artist} - {album} ({year:?}) [type: {release_type}]");

        let result = match self.fetch_release(artist, album, release_type).await {
            Ok(found @ Some(_)) => found,
            Ok(None) => match self.fetch_artist(artist).await {
                Ok(found) => found,
                Err(e) => {
                    debug!("RYM artist lookup failed for {artist}: {e}");
                    None
                }
            },
            Err(e) => {
                debug!("RYM release lookup failed for {artist} - {album}: {e}");
                None
            }
        };

        self.cache.lock().await.insert(cache_key, result.clone());
        result
    }

    /// Direct release page: `/release/{type}/{artist}/{album}/`.
    async fn fetch_release(
        &self,
        artist: &str,
        album: &str,
        release_type: &str,
    ) -> Result<Option<RymMetadata>> {
        let url = format!(
            "https://rateyourmusic.com/release/{release_type}/{}/{}/",
            slugify(artist),
            slugify(album)
        );
        let page = self.fetch_page(&url).await?;
        Ok(page.map(|html| RymMetadata {
            genres: extract_genres(&html),
            descriptors: extract_descriptors(&html),
            url: Some(url),
        })
        .filter(|meta| !meta.genres.is_empty() || !meta.descriptors.is_empty()))
    }

    /// Artist page fallback: `/artist/{artist}`.
    async fn fetch_artist(&self, artist: &str) -> Result<Option<RymMetadata>> {
        let url = format!("https://rateyourmusic.com/artist/{}", slugify(artist));
        let page = self.fetch_page(&url).await?;
        Ok(page.map(|html| RymMetadata {
            genres: extract_genres(&html),
            descriptors: Vec::new(),
            url: Some(url),
        })
        .filter(|meta| !meta.genres.is_empty()))
    }

    async fn fetch_page(&self, url: &str) -> Result<Option<String>> {
        let response = self.http.execute(self.http.get(url.parse()?)).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

/// Applies the configured genre policy.
///
/// * `replace`: RYM genres win iff RYM returned at least one.
/// * `append`: original genres first, RYM genres after, deduplicated
///   case-insensitively with first-occurrence order preserved.
#[must_use]
pub fn apply_genre_policy(mode: GenreMode, existing: &[String], rym: &[String]) -> Vec<String> {
    if rym.is_empty() {
        return existing.to_vec();
    }

    match mode {
        GenreMode::Replace => rym.to_vec(),
        GenreMode::Append => {
            let mut seen: Vec<String> = Vec::new();
            let mut out = Vec::new();
            for genre in existing.iter().chain(rym.iter()) {
                let key = genre.to_lowercase();
                if !seen.contains(&key) {
                    seen.push(key);
                    out.push(genre.clone());
                }
            }
            out
        }
    }
}

/// RYM URL slugs: lowercase, non-alphanumerics collapsed into hyphens.
fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_hyphen = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_hyphen = false;
        } else if !prev_hyphen && !out.is_empty() {
            out.push('-');
            prev_hyphen = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

fn extract_genres(html: &str) -> Vec<String> {
    let re = Regex::new(r#"class="genre"[^>]*>([^<]+)</a>"#).expect("valid regex");
    let mut genres = Vec::new();
    for caps in re.captures_iter(html) {
        let genre = caps[1].trim().to_string();
        if !genre.is_empty() && !genres.contains(&genre) {
            genres.push(genre);
        }
    }
    genres
}

fn extract_descriptors(html: &str) -> Vec<String> {
    let re =
        Regex::new(r#"class="release_pri_descriptors"[^>]*>([^<]+)<"#).expect("valid regex");
    let result = re
        .captures_iter(html)
        .next()
        .map(|caps| {
            caps[1]
                .split(',')
                .map(|descriptor| descriptor.trim().to_string())
                .filter(|descriptor| !descriptor.is_empty())
                .collect()
        })
        .unwrap_or_default();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn replace_mode_swaps_genres_when_rym_has_any() {
        let out = apply_genre_policy(
            GenreMode::Replace,
            &strings(&["Electro", "House"]),
            &strings(&["French House"]),
        );
        assert_eq!(out, strings(&["French House"]));
    }

    #[test]
    fn replace_mode_keeps_original_when_rym_is_empty() {
        let out = apply_genre_policy(GenreMode::Replace, &strings(&["Electro"]), &[]);
        assert_eq!(out, strings(&["Electro"]));
    }

    #[test]
    fn append_mode_preserves_original_order_and_dedupes() {
        let out = apply_genre_policy(
            GenreMode::Append,
            &strings(&["Electro", "House"]),
            &strings(&["house", "French House", "Electro"]),
        );
        assert_eq!(out, strings(&["Electro", "House", "French House"]));
    }

    #[test]
    fn slugify_matches_rym_conventions() {
        assert_eq!(slugify("Daft Punk"), "daft-punk");
        assert_eq!(slugify("OK Computer: OKNOTOK"), "ok-computer-oknotok");
        assert_eq!(slugify("múm"), "m-m");
    }

    #[test]
    fn genres_extracted_in_page_order() {
        let html = r#"
            <a class="genre" href="/genre/house/">House</a>
            <a class="genre" href="/genre/french-house/">French House</a>
            <a class="genre" href="/genre/house/">House</a>
        "#;
        assert_eq!(extract_genres(html), strings(&["House", "French House"]));
    }

    #[test]
    fn descriptors_split_on_commas() {
        let html = r#"<span class="release_pri_descriptors">warm, nocturnal, rhythmic</span>"#;
        assert_eq!(
            extract_descriptors(html),
            strings(&["warm", "nocturnal", "rhythmic"])
        );
    }
}
