//! Single-image download with optional WebP transcoding.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use image::ImageFormat;
use reqwest::Client;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::error::TransferError;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opens a remote image as a stream of body chunks.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<ByteStream>;
}

#[derive(Debug, Clone)]
pub struct HttpImageSource {
    http: Client,
}

impl HttpImageSource {
    pub fn new() -> Self {
        let http = Client::builder()
            .user_agent("notion-hugo-sync/0.1")
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpImageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach image host")?;
        if !res.status().is_success() {
            return Err(anyhow!("image host returned {}", res.status()));
        }
        Ok(res
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed())
    }
}

/// Downloads an image to disk, optionally re-encoding it as WebP.
#[derive(Clone)]
pub struct ImageTransfer {
    source: Arc<dyn ImageSource>,
}

impl ImageTransfer {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        Self { source }
    }

    /// Fetch `url` into `dest`. When transcoding, the written file gets a
    /// `.webp` extension. Returns the written path once the file is closed,
    /// or `None` on any failure (logged, partial file removed).
    pub async fn download(&self, dest: &Path, transcode: bool, url: &str) -> Option<PathBuf> {
        let target = if transcode {
            dest.with_extension("webp")
        } else {
            dest.to_path_buf()
        };
        match self.write_to(&target, transcode, url).await {
            Ok(()) => {
                info!(path = %target.display(), "downloaded image");
                Some(target)
            }
            Err(err) => {
                error!(path = %target.display(), %err, "failed to download image");
                let _ = fs::remove_file(&target).await;
                None
            }
        }
    }

    async fn write_to(&self, target: &Path, transcode: bool, url: &str) -> Result<(), TransferError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut body = self.source.open(url).await.map_err(TransferError::Fetch)?;

        if transcode {
            let mut raw = Vec::new();
            while let Some(chunk) = body.next().await {
                raw.extend_from_slice(&chunk.map_err(TransferError::Fetch)?);
            }
            let encoded = tokio::task::spawn_blocking(move || transcode_webp(&raw)).await??;
            let mut file = fs::File::create(target).await?;
            file.write_all(&encoded).await?;
            file.flush().await?;
            file.sync_all().await?;
        } else {
            let mut file = fs::File::create(target).await?;
            while let Some(chunk) = body.next().await {
                file.write_all(&chunk.map_err(TransferError::Fetch)?).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

/// Decode any supported format and re-encode as (lossless) WebP.
pub fn transcode_webp(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgba = image::DynamicImage::ImageRgba8(decoded.to_rgba8());
    let mut out = Cursor::new(Vec::new());
    rgba.write_to(&mut out, ImageFormat::WebP)?;
    Ok(out.into_inner())
}

/// Content type by file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "svg" => "image/svg+xml",
        Some(ext) if ext == "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}
