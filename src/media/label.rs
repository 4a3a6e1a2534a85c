//! Label media: a catalog of albums.
//!
//! Structurally an artist without the discography filters: albums are
//! resolved and downloaded in chunks, and the label is recorded complete
//! leniently once all of its albums have terminated.

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::{
    client::MediaKind,
    error::{ErrorKind, Result},
    metadata::util::str_of,
};

use super::{album::PendingAlbum, artist::album_ids, Context, Media, Pending};

/// Albums resolved concurrently per chunk.
const RESOLVE_CHUNK_SIZE: usize = 10;

/// A resolved label catalog.
pub struct Label {
    name: String,
    albums: Vec<PendingAlbum>,
    label_id: String,
    ctx: Context,
}

#[async_trait]
impl Media for Label {
    async fn preprocess(&mut self) -> Result<()> {
        Ok(())
    }

    async fn download(&mut self) -> Result<()> {
        let name = &self.name;
        for chunk in self.albums.chunks(RESOLVE_CHUNK_SIZE) {
            join_all(chunk.iter().map(|pending| async move {
                match pending.resolve_album().await {
                    Ok(Some(mut album)) => {
                        if let Err(e) = album.rip().await {
                            error!("error downloading album of label {}: {e}", name);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("error resolving album of label {}: {e}", name),
                }
            }))
            .await;
        }
        Ok(())
    }

    async fn postprocess(&mut self) -> Result<()> {
        if self.ctx.dry_run() || self.albums.is_empty() {
            return Ok(());
        }

        let source = self.ctx.client.source();
        self.ctx
            .ledger
            .mark_release_complete(source, MediaKind::Label, &self.label_id, self.albums.len())
            .await?;
        info!(
            "label {} processed ({} albums), marked as complete",
            self.label_id,
            self.albums.len()
        );
        Ok(())
    }
}

/// A deferred label fetch.
pub struct PendingLabel {
    pub id: String,
    pub ctx: Context,
}

#[async_trait]
impl Pending for PendingLabel {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        let resp = match self.ctx.client.get_metadata(&self.id, MediaKind::Label).await {
            Ok(resp) => resp,
            Err(e) if e.kind == ErrorKind::NotStreamable => {
                error!("error resolving label {}: {e}", self.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(name) = str_of(&resp, "name") else {
            error!("error resolving label {}: payload has no name", self.id);
            return Ok(None);
        };

        let album_ids = album_ids(&resp);
        if album_ids.is_empty() {
            warn!("label {name} ({}) has no albums", self.id);
            return Ok(None);
        }

        let albums = album_ids
            .into_iter()
            .map(|album_id| PendingAlbum {
                id: album_id,
                ctx: self.ctx.clone(),
            })
            .collect();

        Ok(Some(Box::new(Label {
            name,
            albums,
            label_id: self.id.clone(),
            ctx: self.ctx.clone(),
        })))
    }
}
