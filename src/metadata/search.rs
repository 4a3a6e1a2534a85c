//! Search result aggregation across providers.
//!
//! Providers return search pages in differently-shaped envelopes; this
//! module flattens them into a uniform list that the CLI can render as a
//! numbered menu, take the first hit from, or dump to JSON.

use serde_json::{json, Value};

use crate::client::{MediaKind, Source};

use super::util::{id_of, nested_str, str_of};

/// One selectable search hit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchResult {
    /// Provider identifier, usable with an id-download.
    pub id: String,

    /// Display title (track/album title, artist or playlist name).
    pub title: String,

    /// Credited artist, when the kind has one.
    pub artist: Option<String>,

    /// What kind of object this hit is.
    pub media_type: MediaKind,
}

/// Flattened, ordered search results from one query.
#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    /// Provider the results came from.
    pub source: Option<Source>,

    /// Hits in provider ranking order.
    pub results: Vec<SearchResult>,
}

impl SearchResults {
    /// Flattens provider search pages into a result list.
    ///
    /// Recognizes the common envelopes: a bare array, `{"data": [...]}`
    /// (Deezer), `{"items": [...]}` (Tidal), and `{"<plural kind>":
    /// {"items": [...]}}` (Qobuz).
    #[must_use]
    pub fn from_pages(source: Source, media_type: MediaKind, pages: &[Value]) -> Self {
        let mut results = Vec::new();

        for page in pages {
            let items = page
                .as_array()
                .map(|items| items.to_vec())
                .or_else(|| {
                    page.get("data")
                        .or_else(|| page.get("items"))
                        .and_then(Value::as_array)
                        .map(|items| items.to_vec())
                })
                .or_else(|| {
                    page.get(plural(media_type))
                        .and_then(|envelope| envelope.get("items"))
                        .and_then(Value::as_array)
                        .map(|items| items.to_vec())
                })
                .unwrap_or_default();

            for item in &items {
                let Some(id) = id_of(item, "id") else {
                    continue;
                };
                let Some(title) = str_of(item, "title")
                    .or_else(|| str_of(item, "name"))
                else {
                    continue;
                };

                let artist = nested_str(item, "artist", "name")
                    .or_else(|| nested_str(item, "performer", "name"))
                    .or_else(|| nested_str(item, "user", "username"));

                results.push(SearchResult {
                    id,
                    title,
                    artist,
                    media_type,
                });
            }
        }

        Self {
            source: Some(source),
            results,
        }
    }

    /// One line per hit for menu rendering.
    #[must_use]
    pub fn summaries(&self) -> Vec<String> {
        self.results
            .iter()
            .enumerate()
            .map(|(i, result)| match &result.artist {
                Some(artist) => format!("{}. {} - {}", i + 1, artist, result.title),
                None => format!("{}. {}", i + 1, result.title),
            })
            .collect()
    }

    /// JSON value suitable for writing to a results file.
    #[must_use]
    pub fn as_json(&self) -> Value {
        Value::Array(
            self.results
                .iter()
                .map(|result| {
                    json!({
                        "source": self.source.map(|s| s.to_string()),
                        "media_type": result.media_type.to_string(),
                        "id": result.id,
                        "title": result.title,
                        "artist": result.artist,
                    })
                })
                .collect(),
        )
    }
}

/// Plural envelope key some providers nest items under.
fn plural(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Track => "tracks",
        MediaKind::Album => "albums",
        MediaKind::Artist => "artists",
        MediaKind::Label => "labels",
        MediaKind::Playlist => "playlists",
        MediaKind::Favorites => "favorites",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_deezer_data_envelope() {
        let pages = vec![json!({
            "data": [
                {"id": 1, "title": "One More Time", "artist": {"name": "Daft Punk"}},
                {"id": 2, "title": "Aerodynamic", "artist": {"name": "Daft Punk"}}
            ],
            "total": 2
        })];

        let results = SearchResults::from_pages(Source::Deezer, MediaKind::Track, &pages);
        assert_eq!(results.results.len(), 2);
        assert_eq!(results.results[0].id, "1");
        assert_eq!(results.results[0].artist.as_deref(), Some("Daft Punk"));
    }

    #[test]
    fn flattens_qobuz_nested_envelope() {
        let pages = vec![json!({
            "albums": {
                "items": [
                    {"id": "abc", "title": "Vespertine", "artist": {"name": "Björk"}}
                ]
            }
        })];

        let results = SearchResults::from_pages(Source::Qobuz, MediaKind::Album, &pages);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].title, "Vespertine");
    }

    #[test]
    fn summaries_are_numbered() {
        let pages = vec![json!({"data": [{"id": 7, "name": "Aphex Twin"}]})];
        let results = SearchResults::from_pages(Source::Deezer, MediaKind::Artist, &pages);
        assert_eq!(results.summaries(), vec!["1. Aphex Twin"]);
    }
}
