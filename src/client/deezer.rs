//! Deezer reference adapter.
//!
//! Implements the full provider capability against two API surfaces:
//!
//! * The public REST API (`api.deezer.com`) for metadata, search and
//!   favorites.
//! * The gateway (`gw-light.php`) for session establishment, per-track
//!   stream facts (sizes, tokens, fallbacks) and contributor roles.
//!
//! # Authentication
//!
//! Login uses an ARL cookie: the gateway's `deezer.getUserData` call both
//! validates the cookie and returns the API token and license token used
//! by every later gateway and media request.
//!
//! # Media URLs
//!
//! Stream URLs come from `media.deezer.com` keyed by track token and are
//! encrypted with the Blowfish stripe scheme; the master key is taken
//! from configuration or extracted from the web player at login. On geo
//! errors the gateway-provided fallback track id is retried once.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use md5::{Digest, Md5};
use regex_lite::Regex;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{
    arl::Arl,
    config::SourceConfig,
    decrypt::{Decryptor, Key, KEY_LENGTH},
    error::{Error, Result},
    http,
    metadata::Quality,
};

use super::{
    downloadable::DeezerDownloadable, Client, Downloadable, FavoritesKind, MediaKind, Source,
};

/// Session state established by login.
#[derive(Default)]
struct GatewaySession {
    /// `checkForm` token, required by authenticated gateway calls.
    api_token: String,

    /// License token, required by media URL requests.
    license_token: String,

    /// Master decryption key.
    bf_key: Option<Key>,
}

/// Client for the Deezer API.
pub struct DeezerClient {
    http: http::Client,
    arl: Option<Arl>,
    bf_secret: Option<Key>,
    session: Mutex<GatewaySession>,
    logged_in: AtomicBool,
}

impl DeezerClient {
    /// Public REST API endpoint.
    const API_URL: &'static str = "https://api.deezer.com";

    /// Gateway API endpoint.
    const GATEWAY_URL: &'static str = "https://www.deezer.com/ajax/gw-light.php";

    /// Media URL endpoint.
    const MEDIA_URL: &'static str = "https://media.deezer.com/v1/get_url";

    /// Cookie domain for authentication.
    const COOKIE_ORIGIN: &'static str = "https://www.deezer.com";

    /// Web player page that links the app-web JavaScript holding the
    /// scattered master key.
    const WEB_PLAYER_URL: &'static str = "https://www.deezer.com/en/channels/explore/";

    /// MD5 checksum of the correct Blowfish master key.
    ///
    /// Used to verify that an extracted or configured key is valid.
    const BF_SECRET_MD5: &'static str = "7ebf40da848f4a0fb3cc56ddbe6c2d09";

    /// Quality tiers in ordinal order with their wire format names.
    const QUALITY_FORMATS: [(Quality, &'static str); 3] = [
        (Quality::Low, "MP3_128"),
        (Quality::High, "MP3_320"),
        (Quality::Lossless, "FLAC"),
    ];

    /// Creates the adapter from its configuration section.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` when the ARL is malformed or the HTTP
    /// client cannot be built.
    pub fn new(config: &SourceConfig, max_connections: usize) -> Result<Self> {
        let arl = config
            .arl
            .as_deref()
            .map(str::parse::<Arl>)
            .transpose()?;
        let bf_secret = config
            .bf_secret
            .as_deref()
            .map(str::parse::<Key>)
            .transpose()?;

        let cookie_jar = reqwest::cookie::Jar::default();
        if let Some(arl) = &arl {
            let origin = Self::cookie_origin();
            let cookie = format!("arl={arl}; Domain=deezer.com; Path=/; Secure; HttpOnly");
            cookie_jar.add_cookie_str(&cookie, &origin);
        }

        Ok(Self {
            http: http::Client::new(
                config.requests_per_minute,
                max_connections,
                Some(cookie_jar),
            )?,
            arl,
            bf_secret,
            session: Mutex::new(GatewaySession::default()),
            logged_in: AtomicBool::new(false),
        })
    }

    fn cookie_origin() -> reqwest::Url {
        reqwest::Url::parse(Self::COOKIE_ORIGIN).expect("invalid cookie origin")
    }

    /// Performs a gateway call with the current session token.
    async fn gateway_call(&self, method: &str, api_token: &str, body: Value) -> Result<Value> {
        let url = reqwest::Url::parse_with_params(
            Self::GATEWAY_URL,
            &[
                ("method", method),
                ("input", "3"),
                ("api_version", "1.0"),
                ("api_token", api_token),
            ],
        )?;

        let response = self
            .http
            .execute(self.http.post(url).json(&body))
            .await?;
        let payload: Value = serde_json::from_str(&response.text().await?)?;

        // The gateway signals success with an empty error array.
        let clean = payload
            .get("error")
            .is_none_or(|e| e.as_array().is_some_and(|errors| errors.is_empty()));
        if !clean {
            return Err(Error::not_streamable(format!(
                "gateway {method} failed: {}",
                payload["error"]
            )));
        }

        payload
            .get("results")
            .cloned()
            .ok_or_else(|| Error::parse(format!("gateway {method} returned no results")))
    }

    async fn gateway(&self, method: &str, body: Value) -> Result<Value> {
        let api_token = self.session.lock().await.api_token.clone();
        self.gateway_call(method, &api_token, body).await
    }

    /// Fetches a public API resource, mapping API-level errors to
    /// `NotStreamable`.
    async fn api_get(&self, path: &str) -> Result<Value> {
        let url = reqwest::Url::parse(&format!("{}{path}", Self::API_URL))?;
        let payload = self.http.execute_json(self.http.get(url)).await?;

        if let Some(error) = payload.get("error") {
            return Err(Error::not_streamable(format!("{path}: {error}")));
        }
        Ok(payload)
    }

    /// Extracts the master decryption key from the web player JavaScript.
    ///
    /// The key is scattered across two reversed hex fragments; they are
    /// reassembled by interleaving and verified against the known MD5.
    async fn fetch_blowfish_key(&self) -> Result<Key> {
        let player = self.get_text(Self::WEB_PLAYER_URL).await?;

        let re = Regex::new(r"https:\/\/.+\/app-web.*\.js").expect("valid regex");
        let url = re
            .find(&player)
            .ok_or_else(|| Error::parse("unable to find app-web source"))?;

        trace!("bootstrapping decryption key from {}", url.as_str());
        let source = self.get_text(url.as_str()).await?;

        let re = Regex::new(r"0x61%2C(0x[0-9a-f]{2}%2C){6}0x67").expect("valid regex");
        let a = re
            .find(&source)
            .ok_or_else(|| Error::parse("unable to find first half of secret key"))?;
        let re = Regex::new(r"0x31%2C(0x[0-9a-f]{2}%2C){6}0x34").expect("valid regex");
        let b = re
            .find(&source)
            .ok_or_else(|| Error::parse("unable to find second half of secret key"))?;

        let a = Self::convert_half(a.as_str())?;
        let b = Self::convert_half(b.as_str())?;

        let mut key = Vec::with_capacity(KEY_LENGTH);
        for i in 0..(KEY_LENGTH / 2) {
            key.push(a[i]);
            key.push(b[i]);
        }

        let key = String::from_utf8_lossy(&key).into_owned();
        let checksum = format!("{:x}", Md5::digest(&key));
        if checksum != Self::BF_SECRET_MD5 {
            return Err(Error::parse("extracted key failed verification"));
        }

        key.parse()
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.http.execute(self.http.get(url.parse()?)).await?;
        response.text().await.map_err(Into::into)
    }

    /// Converts a key fragment from `0x..%2C` notation to bytes.
    fn convert_half(half: &str) -> Result<Vec<u8>> {
        let bytes: Vec<u8> = half
            .split("%2C")
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .filter_map(|s| u8::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .collect();

        let len = bytes.len();
        if len != 8 {
            return Err(Error::parse(format!("half key has {len} valid characters")));
        }

        Ok(bytes)
    }

    /// Track payload enriched with the album, the album tracklist and
    /// gateway contributor roles.
    async fn get_track(&self, id: &str) -> Result<Value> {
        let mut track = self.api_get(&format!("/track/{id}")).await?;

        let album_id = track
            .get("album")
            .and_then(|album| album.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        if let Some(album_id) = album_id {
            let album_url = format!("/album/{album_id}");
            let album_tracks_url = format!("/album/{album_id}/tracks");
            let (album, album_tracks) = tokio::try_join!(
                self.api_get(&album_url),
                self.api_get(&album_tracks_url)
            )?;

            let mut album = album;
            let data = album_tracks.get("data").cloned().unwrap_or(Value::Null);
            album["track_total"] =
                json!(data.as_array().map(|tracks| tracks.len()).unwrap_or_default());
            album["tracks"] = data;
            track["album"] = album;
        }

        // Stream facts and contributor roles only exist on the gateway.
        if let Ok(gw_track) = self.gateway("song.getData", json!({"SNG_ID": id})).await {
            track["qualities"] = Self::qualities_of(&gw_track);
            if let Some(contributors) = gw_track.get("SNG_CONTRIBUTORS") {
                if let Some(composer) = contributors.get("composer") {
                    track["composer"] = composer.clone();
                }
                if let Some(author) = contributors.get("author") {
                    track["author"] = author.clone();
                }
            }
        }

        Ok(track)
    }

    /// `[MP3_128?, MP3_320?, FLAC?]` from the gateway file sizes; a null
    /// entry means the tier is unavailable.
    fn qualities_of(gw_track: &Value) -> Value {
        Value::Array(
            Self::QUALITY_FORMATS
                .iter()
                .map(|(_, format)| {
                    if Self::filesize(gw_track, format) > 0 {
                        json!(format)
                    } else {
                        Value::Null
                    }
                })
                .collect(),
        )
    }

    fn filesize(gw_track: &Value, format: &str) -> u64 {
        gw_track
            .get(format!("FILESIZE_{format}"))
            .map_or(0, |size| match size {
                Value::String(s) => s.parse().unwrap_or(0),
                Value::Number(n) => n.as_u64().unwrap_or(0),
                _ => 0,
            })
    }

    async fn get_album(&self, id: &str) -> Result<Value> {
        let album_url = format!("/album/{id}");
        let tracks_url = format!("/album/{id}/tracks");
        let (mut album, tracks) = tokio::try_join!(
            self.api_get(&album_url),
            self.api_get(&tracks_url)
        )?;
        let data = tracks.get("data").cloned().unwrap_or(Value::Null);
        album["track_total"] = json!(data.as_array().map(|tracks| tracks.len()).unwrap_or_default());
        album["tracks"] = data;
        Ok(album)
    }

    async fn get_playlist(&self, id: &str) -> Result<Value> {
        let playlist_url = format!("/playlist/{id}");
        let tracks_url = format!("/playlist/{id}/tracks");
        let (mut playlist, tracks) = tokio::try_join!(
            self.api_get(&playlist_url),
            self.api_get(&tracks_url)
        )?;
        let data = tracks.get("data").cloned().unwrap_or(Value::Null);
        playlist["track_total"] = json!(data.as_array().map(|tracks| tracks.len()).unwrap_or_default());
        playlist["tracks"] = data;
        Ok(playlist)
    }

    async fn get_artist(&self, id: &str) -> Result<Value> {
        let artist_url = format!("/artist/{id}");
        let albums_url = format!("/artist/{id}/albums");
        let (mut artist, albums) = tokio::try_join!(
            self.api_get(&artist_url),
            self.api_get(&albums_url)
        )?;
        artist["albums"] = albums.get("data").cloned().unwrap_or(Value::Null);
        Ok(artist)
    }

    /// Requests a stream URL for a track token at a wire format.
    async fn get_track_url(&self, track_token: &str, format: &str) -> Result<Option<String>> {
        let license_token = self.session.lock().await.license_token.clone();
        let body = json!({
            "license_token": license_token,
            "media": [{
                "type": "FULL",
                "formats": [{"cipher": "BF_CBC_STRIPE", "format": format}]
            }],
            "track_tokens": [track_token],
        });

        let url = reqwest::Url::parse(Self::MEDIA_URL)?;
        let payload = self
            .http
            .execute_json(self.http.post(url).json(&body))
            .await?;

        let media = payload
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|entry| entry.get("media"))
            .and_then(Value::as_array);

        if let Some(errors) = payload
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|entry| entry.get("errors"))
            .and_then(Value::as_array)
        {
            if let Some(error) = errors.first() {
                let code = error.get("code").and_then(Value::as_u64).unwrap_or(0);
                // 2002: wrong geolocation; surface it so the caller can
                // try the fallback track.
                if code == 2002 {
                    return Err(Error::not_streamable("track not available in your region"));
                }
                return Err(Error::not_streamable(format!("media request failed: {error}")));
            }
        }

        Ok(media
            .and_then(|media| media.first())
            .and_then(|medium| medium.get("sources"))
            .and_then(Value::as_array)
            .and_then(|sources| sources.first())
            .and_then(|source| source.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Inner downloadable fetch with a single geo-fallback retry.
    async fn downloadable_inner(
        &self,
        id: &str,
        quality: Quality,
        is_retry: bool,
    ) -> Result<Box<dyn Downloadable>> {
        let gw_track = self.gateway("song.getData", json!({"SNG_ID": id})).await?;

        let fallback_id = gw_track
            .pointer("/FALLBACK/SNG_ID")
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        // Deezer tops out at CD quality; hi-res requests map to FLAC.
        let mut quality = quality.min(Quality::Lossless);

        // Walk down the tiers until one has bytes behind it.
        while Self::filesize(&gw_track, Self::format_of(quality)) == 0 {
            match quality.lower() {
                Some(lower) => {
                    warn!(
                        "quality {quality} not available for track {id}, trying {lower}"
                    );
                    quality = lower;
                }
                None => {
                    return Err(Error::not_streamable(format!(
                        "no stream available for track {id} at any quality"
                    )))
                }
            }
        }

        let format = Self::format_of(quality);
        let size = Self::filesize(&gw_track, format);
        let track_token = gw_track
            .get("TRACK_TOKEN")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parse("gateway track has no token"))?;

        let url = match self.get_track_url(track_token, format).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                return Err(Error::not_streamable(format!(
                    "no media source for track {id}"
                )))
            }
            Err(e) => {
                // One retry on the gateway-provided fallback track.
                if !is_retry {
                    if let Some(fallback_id) = fallback_id {
                        info!("track {id} unavailable, retrying with fallback {fallback_id}");
                        return Box::pin(self.downloadable_inner(&fallback_id, quality, true))
                            .await;
                    }
                }
                return Err(e);
            }
        };

        let bf_key = self
            .session
            .lock()
            .await
            .bf_key
            .ok_or_else(|| Error::auth("no decryption key in session; login first"))?;

        let extension = if format == "FLAC" { "flac" } else { "mp3" };
        Ok(Box::new(DeezerDownloadable::new(
            self.http.unlimited.clone(),
            url.parse()?,
            extension,
            size,
            Decryptor::new(id, &bf_key),
        )))
    }

    fn format_of(quality: Quality) -> &'static str {
        Self::QUALITY_FORMATS
            .iter()
            .find(|(tier, _)| *tier == quality)
            .map_or("MP3_128", |(_, format)| *format)
    }
}

#[async_trait]
impl Client for DeezerClient {
    fn source(&self) -> Source {
        Source::Deezer
    }

    fn logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    async fn login(&self) -> Result<()> {
        if self.logged_in() {
            return Ok(());
        }

        if self.arl.is_none() {
            return Err(Error::missing_credentials("no arl configured for deezer"));
        }

        // `deezer.getUserData` both validates the cookie and returns the
        // tokens every later call needs.
        let user_data = self.gateway_call("deezer.getUserData", "", json!({})).await?;

        let user_id = user_data
            .pointer("/USER/USER_ID")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if user_id == 0 {
            return Err(Error::auth("arl rejected; it may have expired"));
        }

        let api_token = user_data
            .get("checkForm")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parse("user data has no api token"))?
            .to_string();
        let license_token = user_data
            .pointer("/USER/OPTIONS/license_token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let bf_key = match self.bf_secret {
            Some(key) => key,
            None => self.fetch_blowfish_key().await?,
        };

        let mut session = self.session.lock().await;
        session.api_token = api_token;
        session.license_token = license_token;
        session.bf_key = Some(bf_key);
        drop(session);

        self.logged_in.store(true, Ordering::Release);
        info!("logged in to deezer");
        Ok(())
    }

    async fn get_metadata(&self, id: &str, kind: MediaKind) -> Result<Value> {
        match kind {
            MediaKind::Track => self.get_track(id).await,
            MediaKind::Album => self.get_album(id).await,
            MediaKind::Playlist => self.get_playlist(id).await,
            MediaKind::Artist => self.get_artist(id).await,
            MediaKind::Label | MediaKind::Favorites => Err(Error::unsupported(format!(
                "media type {kind} not available on deezer"
            ))),
        }
    }

    async fn get_downloadable(&self, id: &str, quality: Quality) -> Result<Box<dyn Downloadable>> {
        self.downloadable_inner(id, quality, false).await
    }

    async fn search(&self, kind: MediaKind, query: &str, limit: usize) -> Result<Vec<Value>> {
        let path = match kind {
            MediaKind::Track => "track",
            MediaKind::Album => "album",
            MediaKind::Artist => "artist",
            MediaKind::Playlist => "playlist",
            _ => return Err(Error::unsupported(format!("cannot search {kind} on deezer"))),
        };

        let url = reqwest::Url::parse_with_params(
            &format!("{}/search/{path}", Self::API_URL),
            &[("q", query), ("limit", &limit.to_string())],
        )?;
        let page = self.http.execute_json(self.http.get(url)).await?;

        let total = page.get("total").and_then(Value::as_u64).unwrap_or(0);
        if total > 0 {
            Ok(vec![page])
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_user_favorites(&self, kind: FavoritesKind, user_id: &str) -> Result<Value> {
        let payload = self
            .api_get(&format!("/user/{user_id}/{kind}?limit=-1"))
            .await?;

        // Normalize to the uniform envelope.
        let items = payload.get("data").cloned().unwrap_or_else(|| json!([]));
        Ok(json!({ "items": items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualities_follow_gateway_file_sizes() {
        let gw_track = json!({
            "FILESIZE_MP3_128": "123",
            "FILESIZE_MP3_320": 0,
            "FILESIZE_FLAC": "456789",
        });
        assert_eq!(
            DeezerClient::qualities_of(&gw_track),
            json!(["MP3_128", null, "FLAC"])
        );
    }

    #[test]
    fn key_halves_are_reversed_and_parsed() {
        let half = DeezerClient::convert_half(
            "0x61%2C0x62%2C0x63%2C0x64%2C0x65%2C0x66%2C0x67%2C0x68",
        )
        .unwrap();
        assert_eq!(half, vec![0x68, 0x67, 0x66, 0x65, 0x64, 0x63, 0x62, 0x61]);
        assert!(DeezerClient::convert_half("0x61%2C0x62").is_err());
    }

    #[test]
    fn format_mapping_is_total() {
        assert_eq!(DeezerClient::format_of(Quality::Low), "MP3_128");
        assert_eq!(DeezerClient::format_of(Quality::High), "MP3_320");
        assert_eq!(DeezerClient::format_of(Quality::Lossless), "FLAC");
    }
}
