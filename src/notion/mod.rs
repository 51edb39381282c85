use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

use crate::config::Config;

pub mod model;

pub use model::{Block, Page, PropertyItems, PropertyValue, User};

use model::ListResponse;

const NOTION_API_BASE: &str = "https://api.notion.com/";
const PAGE_SIZE: u32 = 100;

/// Read access to a Notion workspace.
///
/// Every paginated endpoint is drained before returning, so callers never see
/// cursors.
#[async_trait]
pub trait NotionSource: Send + Sync {
    async fn retrieve_page(&self, page_id: &str) -> Result<Page>;

    async fn query_database(&self, database_id: &str) -> Result<Vec<Page>>;

    async fn retrieve_property(&self, page_id: &str, property_id: &str) -> Result<PropertyItems>;

    async fn retrieve_user(&self, user_id: &str) -> Result<User>;

    async fn block_children(&self, block_id: &str) -> Result<Vec<Block>>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String) -> Self {
        let base_url = Url::parse(NOTION_API_BASE).expect("valid default Notion URL");
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("notion-hugo-sync/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            version,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.notion.token.clone(), cfg.notion.version.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid Notion endpoint: {}", path))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version)
    }

    pub fn build_get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Request> {
        let url = self.endpoint(path)?;
        self.authorized(self.http.get(url))
            .query(query)
            .build()
            .context("failed to build Notion request")
    }

    pub fn build_post(&self, path: &str, body: &Value) -> Result<reqwest::Request> {
        let url = self.endpoint(path)?;
        self.authorized(self.http.post(url))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build Notion request")
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        debug!(method=%request.method(), url=%request.url(), "sending notion request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Notion")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Notion: {}", body);
            return Err(anyhow!("received 429 from Notion: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("notion error {}: {}", status, body));
        }

        res.json::<T>().await.context("invalid Notion response JSON")
    }

    fn cursor_query(cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("page_size", PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            query.push(("start_cursor", cursor.to_string()));
        }
        query
    }
}

#[async_trait]
impl NotionSource for NotionClient {
    async fn retrieve_page(&self, page_id: &str) -> Result<Page> {
        let request = self.build_get(&format!("v1/pages/{}", page_id), &[])?;
        self.execute(request)
            .await
            .with_context(|| format!("failed to retrieve page {}", page_id))
    }

    async fn query_database(&self, database_id: &str) -> Result<Vec<Page>> {
        let path = format!("v1/databases/{}/query", database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let body = build_query_body(cursor.as_deref());
            let request = self.build_post(&path, &body)?;
            let list: ListResponse<Page> = self
                .execute(request)
                .await
                .with_context(|| format!("failed to query database {}", database_id))?;
            pages.extend(list.results);
            match list.next_cursor.filter(|_| list.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(pages)
    }

    async fn retrieve_property(&self, page_id: &str, property_id: &str) -> Result<PropertyItems> {
        let path = format!("v1/pages/{}/properties/{}", page_id, property_id);
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let request = self.build_get(&path, &Self::cursor_query(cursor.as_deref()))?;
            let payload: Value = self
                .execute(request)
                .await
                .with_context(|| format!("failed to retrieve property {} of {}", property_id, page_id))?;
            if payload.get("object").and_then(Value::as_str) == Some("property_item") {
                let value = serde_json::from_value(payload).context("invalid property item")?;
                return Ok(PropertyItems::Single(value));
            }
            let list: ListResponse<PropertyValue> =
                serde_json::from_value(payload).context("invalid property item list")?;
            items.extend(list.results);
            match list.next_cursor.filter(|_| list.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(PropertyItems::Paginated(items))
    }

    async fn retrieve_user(&self, user_id: &str) -> Result<User> {
        let request = self.build_get(&format!("v1/users/{}", user_id), &[])?;
        self.execute(request)
            .await
            .with_context(|| format!("failed to retrieve user {}", user_id))
    }

    async fn block_children(&self, block_id: &str) -> Result<Vec<Block>> {
        let path = format!("v1/blocks/{}/children", block_id);
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let request = self.build_get(&path, &Self::cursor_query(cursor.as_deref()))?;
            let list: ListResponse<Block> = self
                .execute(request)
                .await
                .with_context(|| format!("failed to list children of {}", block_id))?;
            blocks.extend(list.results);
            match list.next_cursor.filter(|_| list.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(blocks)
    }
}

pub fn build_query_body(cursor: Option<&str>) -> Value {
    match cursor {
        Some(cursor) => json!({ "page_size": PAGE_SIZE, "start_cursor": cursor }),
        None => json!({ "page_size": PAGE_SIZE }),
    }
}
