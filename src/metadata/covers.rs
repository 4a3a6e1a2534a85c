//! Multi-resolution cover artwork sets.
//!
//! Each provider exposes artwork at different sizes under different names;
//! this module normalizes them into a single ordered set so later stages can
//! ask for "the largest" (embedding, saved hires cover) or "the smallest"
//! (thumbnails) without caring about the provider.

use serde_json::Value;

use super::util::{id_of, str_of};

/// Ordered set of cover URLs, smallest first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Covers {
    /// Around 50px, list views.
    pub thumbnail: Option<String>,

    /// Around 300px, embedding on constrained devices.
    pub small: Option<String>,

    /// Around 600-1200px, the usual embed size.
    pub large: Option<String>,

    /// Original resolution, when the provider offers it.
    pub original: Option<String>,
}

impl Covers {
    /// Whether no artwork at all is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thumbnail.is_none()
            && self.small.is_none()
            && self.large.is_none()
            && self.original.is_none()
    }

    /// The largest known artwork URL.
    #[must_use]
    pub fn largest(&self) -> Option<&str> {
        self.original
            .as_deref()
            .or(self.large.as_deref())
            .or(self.small.as_deref())
            .or(self.thumbnail.as_deref())
    }

    /// The best URL for embedding: large preferred, anything as fallback.
    #[must_use]
    pub fn for_embedding(&self) -> Option<&str> {
        self.large
            .as_deref()
            .or(self.original.as_deref())
            .or(self.small.as_deref())
            .or(self.thumbnail.as_deref())
    }

    /// Qobuz: `image` object with named sizes; the original is reachable by
    /// rewriting the size segment.
    #[must_use]
    pub fn from_qobuz(resp: &Value) -> Self {
        let image = resp.get("image").cloned().unwrap_or(Value::Null);
        let large = str_of(&image, "large");
        let original = large.as_ref().map(|url| url.replace("_600.", "_org."));

        Self {
            thumbnail: str_of(&image, "thumbnail"),
            small: str_of(&image, "small"),
            large,
            original,
        }
    }

    /// Deezer: flat `cover_*` fields.
    #[must_use]
    pub fn from_deezer(resp: &Value) -> Self {
        Self {
            thumbnail: str_of(resp, "cover_small"),
            small: str_of(resp, "cover_medium"),
            large: str_of(resp, "cover_big"),
            original: str_of(resp, "cover_xl"),
        }
    }

    /// Tidal: a cover UUID expanded into the image CDN URL scheme.
    #[must_use]
    pub fn from_tidal(resp: &Value) -> Self {
        let Some(uuid) = id_of(resp, "cover") else {
            return Self::default();
        };
        let path = uuid.replace('-', "/");
        let url = |size: &str| Some(format!("https://resources.tidal.com/images/{path}/{size}.jpg"));

        Self {
            thumbnail: url("160x160"),
            small: url("320x320"),
            large: url("640x640"),
            original: url("1280x1280"),
        }
    }

    /// SoundCloud: one `artwork_url` at `large` size, rewritable to others.
    #[must_use]
    pub fn from_soundcloud(resp: &Value) -> Self {
        let artwork = str_of(resp, "artwork_url")
            .or_else(|| str_of(resp.get("user").unwrap_or(&Value::Null), "avatar_url"));
        let Some(artwork) = artwork else {
            return Self::default();
        };

        Self {
            thumbnail: Some(artwork.clone()),
            small: Some(artwork.replace("large", "t300x300")),
            large: Some(artwork.replace("large", "t500x500")),
            original: Some(artwork.replace("large", "original")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn largest_prefers_original() {
        let covers = Covers {
            thumbnail: Some("t".into()),
            small: Some("s".into()),
            large: Some("l".into()),
            original: Some("o".into()),
        };
        assert_eq!(covers.largest(), Some("o"));
        assert_eq!(covers.for_embedding(), Some("l"));
    }

    #[test]
    fn tidal_uuid_expands_to_cdn_paths() {
        let covers = Covers::from_tidal(&json!({"cover": "aa-bb-cc"}));
        assert_eq!(
            covers.original.as_deref(),
            Some("https://resources.tidal.com/images/aa/bb/cc/1280x1280.jpg")
        );
    }

    #[test]
    fn missing_artwork_is_empty() {
        assert!(Covers::from_tidal(&json!({})).is_empty());
        assert!(Covers::from_soundcloud(&json!({})).is_empty());
    }
}
