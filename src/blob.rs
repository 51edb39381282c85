//! Durable blob storage (Vercel Blob).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::Config;

const BLOB_API_VERSION: &str = "7";
const LIST_LIMIT: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobAsset {
    pub pathname: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub public_access: bool,
    pub add_random_suffix: bool,
}

impl PutOptions {
    /// Public object stored under exactly the requested pathname.
    pub fn public(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            public_access: true,
            add_random_suffix: false,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Every object whose pathname starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobAsset>>;

    async fn put(&self, pathname: &str, body: Vec<u8>, opts: &PutOptions) -> Result<BlobAsset>;
}

#[derive(Clone)]
pub struct VercelBlobClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for VercelBlobClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VercelBlobClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    blobs: Vec<BlobAsset>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl VercelBlobClient {
    pub fn new(token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("notion-hugo-sync/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.blob.base_url).context("invalid blob.base_url")?;
        Ok(Self::new(cfg.blob.token.clone(), base_url))
    }

    pub fn build_list_request(&self, prefix: &str, cursor: Option<&str>) -> Result<reqwest::Request> {
        let mut query = vec![("prefix", prefix.to_string()), ("limit", LIST_LIMIT.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        self.http
            .get(self.base_url.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("x-api-version", BLOB_API_VERSION)
            .query(&query)
            .build()
            .context("failed to build blob list request")
    }

    pub fn build_put_request(
        &self,
        pathname: &str,
        body: Vec<u8>,
        opts: &PutOptions,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(pathname)
            .with_context(|| format!("invalid blob pathname: {}", pathname))?;
        let mut builder = self
            .http
            .put(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("x-api-version", BLOB_API_VERSION)
            .header("x-content-type", &opts.content_type)
            .header(
                "x-add-random-suffix",
                if opts.add_random_suffix { "1" } else { "0" },
            );
        if opts.public_access {
            builder = builder.header("x-vercel-blob-access", "public");
        }
        builder
            .body(body)
            .build()
            .context("failed to build blob put request")
    }

    async fn execute<T: serde::de::DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        debug!(method=%request.method(), url=%request.url(), "sending blob request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach blob store")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("blob store error {}: {}", status, body));
        }
        res.json::<T>().await.context("invalid blob store response")
    }
}

#[async_trait]
impl BlobStore for VercelBlobClient {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobAsset>> {
        let mut blobs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let request = self.build_list_request(prefix, cursor.as_deref())?;
            let page: ListPage = self.execute(request).await?;
            blobs.extend(page.blobs);
            match page.cursor.filter(|_| page.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(blobs)
    }

    async fn put(&self, pathname: &str, body: Vec<u8>, opts: &PutOptions) -> Result<BlobAsset> {
        let request = self.build_put_request(pathname, body, opts)?;
        self.execute(request)
            .await
            .with_context(|| format!("failed to upload {}", pathname))
    }
}
