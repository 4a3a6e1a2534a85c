//! Byte transports behind the [`Downloadable`](super::Downloadable) trait.
//!
//! Two implementations:
//!
//! * [`HttpDownloadable`] - plain streaming HTTP transfer, used for
//!   unencrypted media URLs.
//! * [`DeezerDownloadable`] - streaming transfer with Blowfish stripe
//!   decryption applied block-by-block as bytes arrive.
//!
//! Both write through a buffered file handle and report cumulative byte
//! counts to the progress callback. On failure the partial file is
//! removed so a retry starts clean.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::{
    decrypt::{Decryptor, BLOCK_SIZE},
    error::{Error, Result},
};

use super::{Downloadable, ProgressCallback, Source};

/// Plain streaming HTTP transfer.
pub struct HttpDownloadable {
    client: reqwest::Client,
    url: Url,
    extension: String,
    source: Source,
    known_size: Option<u64>,
}

impl HttpDownloadable {
    /// Creates a transfer handle.
    ///
    /// `known_size` short-circuits `size()` when the provider already
    /// advertised the file size.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        url: Url,
        extension: impl Into<String>,
        source: Source,
        known_size: Option<u64>,
    ) -> Self {
        Self {
            client,
            url,
            extension: extension.into(),
            source,
            known_size,
        }
    }

    async fn content_length(&self) -> Result<u64> {
        if let Some(size) = self.known_size {
            return Ok(size);
        }
        let response = self.client.head(self.url.clone()).send().await?;
        response
            .content_length()
            .ok_or_else(|| Error::transport("no content length advertised"))
    }
}

#[async_trait]
impl Downloadable for HttpDownloadable {
    async fn size(&self) -> Result<u64> {
        self.content_length().await
    }

    async fn download(&self, path: &Path, callback: ProgressCallback) -> Result<()> {
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "download returned HTTP {}",
                response.status()
            )));
        }

        let result = write_stream(response, path, &callback, None).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn source(&self) -> Source {
        self.source
    }
}

/// Streaming transfer with Deezer stripe decryption.
pub struct DeezerDownloadable {
    client: reqwest::Client,
    url: Url,
    extension: String,
    size: u64,
    decryptor: Decryptor,
}

impl DeezerDownloadable {
    /// Creates a transfer handle for an encrypted Deezer stream.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        url: Url,
        extension: impl Into<String>,
        size: u64,
        decryptor: Decryptor,
    ) -> Self {
        Self {
            client,
            url,
            extension: extension.into(),
            size,
            decryptor,
        }
    }
}

#[async_trait]
impl Downloadable for DeezerDownloadable {
    async fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    async fn download(&self, path: &Path, callback: ProgressCallback) -> Result<()> {
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "download returned HTTP {}",
                response.status()
            )));
        }

        let result = write_stream(response, path, &callback, Some(&self.decryptor)).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn source(&self) -> Source {
        Source::Deezer
    }
}

/// Streams a response body to `path`.
///
/// With a decryptor, bytes are regrouped into 2KB stripe blocks and
/// decrypted in order; the trailing partial block passes through
/// unchanged, matching the wire format.
async fn write_stream(
    mut response: reqwest::Response,
    path: &Path,
    callback: &ProgressCallback,
    decryptor: Option<&Decryptor>,
) -> Result<()> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);

    let mut received: u64 = 0;
    let mut block_index: u64 = 0;
    let mut pending: Vec<u8> = Vec::with_capacity(BLOCK_SIZE);

    while let Some(chunk) = response.chunk().await? {
        received += chunk.len() as u64;

        match decryptor {
            None => writer.write_all(&chunk).await?,
            Some(decryptor) => {
                pending.extend_from_slice(&chunk);
                while pending.len() >= BLOCK_SIZE {
                    let mut block: Vec<u8> = pending.drain(..BLOCK_SIZE).collect();
                    decryptor.decrypt_block(block_index, &mut block)?;
                    block_index += 1;
                    writer.write_all(&block).await?;
                }
            }
        }

        callback(received);
    }

    // Trailing partial block is never encrypted.
    if !pending.is_empty() {
        writer.write_all(&pending).await?;
    }

    writer.flush().await?;
    Ok(())
}
