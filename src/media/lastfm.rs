//! Last.fm playlist resolution.
//!
//! Last.fm playlists carry no provider ids, only `(title, artist)` pairs
//! scraped from the playlist page. Each pair is resolved through the
//! primary provider's track search (falling back to a second provider
//! when configured) and downloaded as a single.

use std::sync::Arc;

use async_trait::async_trait;
use regex_lite::Regex;

use crate::{
    client::{Client, MediaKind},
    error::Result,
    metadata::SearchResults,
};

use super::{track::PendingSingle, Context, Media, Pending};

/// A deferred Last.fm playlist scrape.
pub struct PendingLastfmPlaylist {
    pub url: String,
    pub ctx: Context,

    /// Second provider tried for tracks the primary cannot find.
    pub fallback: Option<Arc<dyn Client>>,
}

#[async_trait]
impl Pending for PendingLastfmPlaylist {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let page = self
            .ctx
            .http
            .get(self.url.as_str())
            .send()
            .await?
            .text()
            .await?;

        let entries = scrape_entries(&page);
        if entries.is_empty() {
            error!("no tracks found in last.fm playlist {}", self.url);
            return Ok(None);
        }
        info!(
            "found {} tracks in last.fm playlist {}",
            entries.len(),
            self.url
        );

        Ok(Some(Box::new(LastfmPlaylist {
            entries,
            ctx: self.ctx.clone(),
            fallback: self.fallback.clone(),
            matched: 0,
        })))
    }
}

/// A scraped playlist being matched against providers.
struct LastfmPlaylist {
    entries: Vec<(String, String)>,
    ctx: Context,
    fallback: Option<Arc<dyn Client>>,
    matched: usize,
}

impl LastfmPlaylist {
    /// Top search hit for `artist title` on a provider.
    async fn search_track(client: &Arc<dyn Client>, title: &str, artist: &str) -> Option<String> {
        let query = format!("{artist} {title}");
        let pages = match client.search(MediaKind::Track, &query, 1).await {
            Ok(pages) => pages,
            Err(e) => {
                error!("search failed for {query:?}: {e}");
                return None;
            }
        };

        SearchResults::from_pages(client.source(), MediaKind::Track, &pages)
            .results
            .into_iter()
            .next()
            .map(|result| result.id)
    }
}

#[async_trait]
impl Media for LastfmPlaylist {
    async fn preprocess(&mut self) -> Result<()> {
        Ok(())
    }

    /// Matches each entry and feeds the hits through the global queue.
    async fn download(&mut self) -> Result<()> {
        let mut completions = Vec::new();

        for (title, artist) in &self.entries {
            let (id, ctx) =
                match Self::search_track(&self.ctx.client, title, artist).await {
                    Some(id) => (id, self.ctx.clone()),
                    None => match &self.fallback {
                        Some(fallback) => {
                            match Self::search_track(fallback, title, artist).await {
                                Some(id) => {
                                    let mut ctx = self.ctx.clone();
                                    ctx.client = Arc::clone(fallback);
                                    (id, ctx)
                                }
                                None => {
                                    warn!("no match for '{title}' by {artist}");
                                    continue;
                                }
                            }
                        }
                        None => {
                            warn!("no match for '{title}' by {artist}");
                            continue;
                        }
                    },
                };

            self.matched += 1;
            let source = ctx.client.source();
            let descriptor = format!("'{title}' by {artist} (last.fm match)");
            completions.push(self.ctx.queue.submit(
                Box::new(PendingSingle { id: id.clone(), ctx }),
                descriptor,
                source,
                id,
            ));
        }

        for completion in completions {
            let _ = completion.await;
        }
        Ok(())
    }

    async fn postprocess(&mut self) -> Result<()> {
        info!(
            "last.fm playlist finished: matched {}/{} tracks",
            self.matched,
            self.entries.len()
        );
        Ok(())
    }
}

/// `(title, artist)` pairs from a last.fm playlist page.
fn scrape_entries(page: &str) -> Vec<(String, String)> {
    let re = Regex::new(
        r#"(?s)class="chartlist-name".*?>\s*([^<]+?)\s*</a>.*?class="chartlist-artist".*?>\s*([^<]+?)\s*</a>"#,
    )
    .expect("valid regex");

    re.captures_iter(page)
        .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
        .filter(|(title, artist)| !title.is_empty() && !artist.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_title_artist_pairs_in_order() {
        let page = r#"
            <td class="chartlist-name"><a href="/x"> One More Time </a></td>
            <td class="chartlist-artist"><a href="/y">Daft Punk</a></td>
            <td class="chartlist-name"><a href="/x2">Jóga</a></td>
            <td class="chartlist-artist"><a href="/y2">Björk</a></td>
        "#;

        let entries = scrape_entries(page);
        assert_eq!(
            entries,
            vec![
                ("One More Time".to_string(), "Daft Punk".to_string()),
                ("Jóga".to_string(), "Björk".to_string()),
            ]
        );
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(scrape_entries("<html></html>").is_empty());
    }
}
