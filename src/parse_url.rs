//! URL and reference classification.
//!
//! A small rules table turns an input string into a provider reference:
//! `(source, kind, id)`. Rules cover direct web links for Qobuz, Tidal and
//! Deezer (with optional language codes and `browse`/`play`/`listen`
//! subdomains), Deezer profile favorites paths, Deezer mobile short-links
//! (which need one HTTP round trip to recover the canonical reference),
//! and SoundCloud permalinks (opaque; resolved by the provider).
//!
//! Classification failure is not an error at this layer: `parse_url`
//! returns `None` and the caller reports the input and continues.

use regex_lite::Regex;

use crate::{
    client::{FavoritesKind, MediaKind, Source},
    error::{Error, Result},
};

/// A classified input reference.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedUrl {
    /// Direct `(source, kind, id)` reference.
    Item {
        source: Source,
        kind: MediaKind,
        id: String,
    },

    /// A user's favorite collection.
    Favorites {
        source: Source,
        user_id: String,
        kind: FavoritesKind,
    },

    /// Deezer mobile short-link; the canonical reference is only known
    /// after following the redirect.
    DeezerDynamic { url: String },

    /// SoundCloud permalink, resolved through the provider's resolve
    /// endpoint.
    Soundcloud { url: String },
}

impl ParsedUrl {
    /// Provider the reference belongs to.
    #[must_use]
    pub fn source(&self) -> Source {
        match self {
            Self::Item { source, .. } | Self::Favorites { source, .. } => *source,
            Self::DeezerDynamic { .. } => Source::Deezer,
            Self::Soundcloud { .. } => Source::Soundcloud,
        }
    }

    /// Follows a Deezer short-link once and re-classifies the canonical
    /// URL it lands on.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Transport` when the redirect cannot be
    /// followed and `ErrorKind::InvalidUrl` when the landing URL is not a
    /// recognizable reference.
    pub async fn resolve_dynamic(&self, http: &reqwest::Client) -> Result<Self> {
        let Self::DeezerDynamic { url } = self else {
            return Ok(self.clone());
        };

        let response = http.get(url.as_str()).send().await?;
        let landed = response.url().to_string();

        if let Some(parsed) = parse_url(&landed) {
            if !matches!(parsed, Self::DeezerDynamic { .. }) {
                return Ok(parsed);
            }
        }

        // Some short-links land on an interstitial page; scrape the
        // canonical link out of the HTML.
        let body = response.text().await?;
        let re = Regex::new(r"deezer\.com/(?:[a-z]{2}/)?(track|album|playlist|artist)/(\d+)")
            .expect("valid regex");
        let caps = re
            .captures(&body)
            .ok_or_else(|| Error::invalid_url(format!("cannot resolve short-link {url}")))?;

        Ok(Self::Item {
            source: Source::Deezer,
            kind: caps[1].parse()?,
            id: caps[2].to_string(),
        })
    }
}

/// Classifies an input string into a provider reference.
///
/// Returns `None` for anything that matches no rule.
#[must_use]
pub fn parse_url(url: &str) -> Option<ParsedUrl> {
    let rules = rules();

    if let Some(caps) = rules.generic.captures(url) {
        let source: Source = caps[1].parse().ok()?;
        let kind: MediaKind = caps[2].parse().ok()?;
        return Some(ParsedUrl::Item {
            source,
            kind,
            id: caps[3].to_string(),
        });
    }

    if let Some(caps) = rules.deezer_profile.captures(url) {
        return Some(ParsedUrl::Favorites {
            source: Source::Deezer,
            user_id: caps[1].to_string(),
            kind: caps[2].parse().ok()?,
        });
    }

    if rules.deezer_dynamic.is_match(url) {
        return Some(ParsedUrl::DeezerDynamic {
            url: url.to_string(),
        });
    }

    if rules.soundcloud.is_match(url) {
        return Some(ParsedUrl::Soundcloud {
            url: url.to_string(),
        });
    }

    None
}

struct Rules {
    generic: Regex,
    deezer_profile: Regex,
    deezer_dynamic: Regex,
    soundcloud: Regex,
}

fn rules() -> Rules {
    Rules {
        // Direct web links: optional subdomain, optional language code,
        // optional `browse` segment, kind, optional slug, id.
        generic: Regex::new(
            r"^https?://(?:www\.|open\.|play\.|listen\.)?(qobuz|tidal|deezer)\.com(?:/[a-z]{2}-[a-z]{2}|/[a-z]{2})?(?:/browse)?/(track|playlist|artist|album|label)/(?:[^/?#]+/)?([^/?#]+)",
        )
        .expect("valid regex"),
        // Favorites: language code is mandatory on profile links.
        deezer_profile: Regex::new(
            r"^https?://(?:www\.)?deezer\.com/[a-z]{2}/profile/(\d+)/(tracks|albums|artists|playlists)$",
        )
        .expect("valid regex"),
        deezer_dynamic: Regex::new(r"^https?://dzr\.page\.link/\w+$").expect("valid regex"),
        soundcloud: Regex::new(r"^https?://(?:www\.)?soundcloud\.com/[^\s?#]+").expect("valid regex"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qobuz_album_with_slug_and_language() {
        let parsed = parse_url(
            "https://www.qobuz.com/fr-fr/album/bizarre-ride-ii-the-pharcyde-the-pharcyde/0066991040005",
        )
        .unwrap();
        assert_eq!(
            parsed,
            ParsedUrl::Item {
                source: Source::Qobuz,
                kind: MediaKind::Album,
                id: "0066991040005".to_string(),
            }
        );
    }

    #[test]
    fn tidal_browse_track() {
        let parsed = parse_url("https://tidal.com/browse/track/3083287").unwrap();
        assert_eq!(
            parsed,
            ParsedUrl::Item {
                source: Source::Tidal,
                kind: MediaKind::Track,
                id: "3083287".to_string(),
            }
        );
    }

    #[test]
    fn deezer_track_with_and_without_language() {
        for url in [
            "https://www.deezer.com/track/4195713",
            "https://www.deezer.com/en/track/4195713",
            "https://www.deezer.com/fr/track/4195713",
        ] {
            let parsed = parse_url(url).expect(url);
            assert_eq!(parsed.source(), Source::Deezer);
        }
    }

    #[test]
    fn unparseable_inputs_return_none() {
        for url in [
            "https://example.com",
            "not a url",
            "https://spotify.com/track/123456",
            "https://tidal.com/invalid/3083287",
        ] {
            assert!(parse_url(url).is_none(), "should not parse: {url}");
        }
    }

    #[test]
    fn deezer_profile_favorites() {
        let parsed = parse_url("https://www.deezer.com/en/profile/4606587402/artists").unwrap();
        assert_eq!(
            parsed,
            ParsedUrl::Favorites {
                source: Source::Deezer,
                user_id: "4606587402".to_string(),
                kind: FavoritesKind::Artists,
            }
        );
    }

    #[test]
    fn deezer_profile_requires_language_and_known_collection() {
        for url in [
            "https://www.deezer.com/profile/4606587402/artists",
            "https://www.deezer.com/en/profile/not-a-number/artists",
            "https://www.deezer.com/en/profile/4606587402/invalid",
            "https://www.deezer.com/en/profile/4606587402/",
            "https://www.deezer.com/en/user/4606587402/artists",
        ] {
            assert!(
                !matches!(parse_url(url), Some(ParsedUrl::Favorites { .. })),
                "should not match profile rule: {url}"
            );
        }
    }

    #[test]
    fn deezer_dynamic_short_link() {
        let parsed = parse_url("https://dzr.page.link/SnV6hCyHihkmCCwUA").unwrap();
        assert!(matches!(parsed, ParsedUrl::DeezerDynamic { .. }));
        assert_eq!(parsed.source(), Source::Deezer);
    }

    #[test]
    fn soundcloud_permalinks() {
        for url in [
            "https://soundcloud.com/artist-name/track-name",
            "https://soundcloud.com/artist-name/sets/playlist-name",
        ] {
            let parsed = parse_url(url).expect(url);
            assert!(matches!(parsed, ParsedUrl::Soundcloud { .. }));
            assert_eq!(parsed.source(), Source::Soundcloud);
        }
    }

    #[test]
    fn alternate_subdomains() {
        for url in [
            "https://open.tidal.com/track/3083287",
            "https://play.qobuz.com/album/0066991040005",
            "https://listen.tidal.com/track/3083287",
        ] {
            assert!(
                matches!(parse_url(url), Some(ParsedUrl::Item { .. })),
                "should parse: {url}"
            );
        }
    }
}
