#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use notion_hugo_sync::blob::{BlobAsset, BlobStore, PutOptions};
use notion_hugo_sync::content::SiteScaffold;
use notion_hugo_sync::notion::{Block, NotionSource, Page, PropertyItems, User};
use notion_hugo_sync::transfer::{ByteStream, ImageSource};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory Notion workspace that counts every call.
#[derive(Clone, Default)]
pub struct FakeNotion {
    pub pages: Arc<Mutex<HashMap<String, Page>>>,
    pub databases: Arc<Mutex<HashMap<String, Vec<String>>>>,
    pub children: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    pub properties: Arc<Mutex<HashMap<(String, String), PropertyItems>>>,
    pub users: Arc<Mutex<HashMap<String, User>>>,
    pub failing_blocks: Arc<Mutex<HashSet<String>>>,
    pub failing_properties: Arc<Mutex<HashSet<(String, String)>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeNotion {
    pub async fn add_page(&self, page: Page, blocks: Vec<Value>) {
        self.children.lock().await.insert(page.id.clone(), blocks);
        self.pages.lock().await.insert(page.id.clone(), page);
    }

    pub async fn add_children(&self, block_id: &str, blocks: Vec<Value>) {
        self.children.lock().await.insert(block_id.to_string(), blocks);
    }

    pub async fn add_property(&self, page_id: &str, property_id: &str, items: PropertyItems) {
        self.properties
            .lock()
            .await
            .insert((page_id.to_string(), property_id.to_string()), items);
    }

    pub async fn add_user(&self, id: &str, name: Option<&str>) {
        self.users.lock().await.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                name: name.map(str::to_string),
            },
        );
    }

    pub async fn add_database(&self, database_id: &str, page_ids: &[&str]) {
        self.databases.lock().await.insert(
            database_id.to_string(),
            page_ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub async fn fail_blocks_of(&self, block_id: &str) {
        self.failing_blocks.lock().await.insert(block_id.to_string());
    }

    pub async fn fail_property(&self, page_id: &str, property_id: &str) {
        self.failing_properties
            .lock()
            .await
            .insert((page_id.to_string(), property_id.to_string()));
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn log(&self, call: String) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl NotionSource for FakeNotion {
    async fn retrieve_page(&self, page_id: &str) -> Result<Page> {
        self.log(format!("page:{}", page_id)).await;
        self.pages
            .lock()
            .await
            .get(page_id)
            .cloned()
            .ok_or_else(|| anyhow!("no page {}", page_id))
    }

    async fn query_database(&self, database_id: &str) -> Result<Vec<Page>> {
        self.log(format!("query:{}", database_id)).await;
        let ids = self
            .databases
            .lock()
            .await
            .get(database_id)
            .cloned()
            .ok_or_else(|| anyhow!("no database {}", database_id))?;
        let pages = self.pages.lock().await;
        Ok(ids.iter().filter_map(|id| pages.get(id).cloned()).collect())
    }

    async fn retrieve_property(&self, page_id: &str, property_id: &str) -> Result<PropertyItems> {
        self.log(format!("property:{}:{}", page_id, property_id)).await;
        let key = (page_id.to_string(), property_id.to_string());
        if self.failing_properties.lock().await.contains(&key) {
            return Err(anyhow!("property {} of {} unavailable", property_id, page_id));
        }
        Ok(self
            .properties
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or(PropertyItems::Paginated(Vec::new())))
    }

    async fn retrieve_user(&self, user_id: &str) -> Result<User> {
        self.log(format!("user:{}", user_id)).await;
        self.users
            .lock()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow!("no user {}", user_id))
    }

    async fn block_children(&self, block_id: &str) -> Result<Vec<Block>> {
        self.log(format!("children:{}", block_id)).await;
        if self.failing_blocks.lock().await.contains(block_id) {
            return Err(anyhow!("notion unavailable for {}", block_id));
        }
        let raw = self
            .children
            .lock()
            .await
            .get(block_id)
            .cloned()
            .unwrap_or_default();
        raw.into_iter()
            .map(|b| serde_json::from_value(b).map_err(anyhow::Error::from))
            .collect()
    }
}

/// Blob store backed by a vector; URLs are derived from the pathname.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    pub assets: Arc<Mutex<Vec<BlobAsset>>>,
    pub puts: Arc<Mutex<Vec<(String, Vec<u8>, PutOptions)>>>,
    pub lists: Arc<Mutex<Vec<String>>>,
    pub fail_put: Arc<Mutex<bool>>,
}

impl MemoryBlobStore {
    pub fn url_for(pathname: &str) -> String {
        format!("https://store.public.blob.example/{}", pathname)
    }

    pub async fn seed(&self, pathname: &str) -> String {
        let url = Self::url_for(pathname);
        self.assets.lock().await.push(BlobAsset {
            pathname: pathname.to_string(),
            url: url.clone(),
        });
        url
    }

    pub async fn puts(&self) -> Vec<(String, Vec<u8>, PutOptions)> {
        self.puts.lock().await.clone()
    }

    pub async fn list_calls(&self) -> Vec<String> {
        self.lists.lock().await.clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobAsset>> {
        self.lists.lock().await.push(prefix.to_string());
        Ok(self
            .assets
            .lock()
            .await
            .iter()
            .filter(|a| a.pathname.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put(&self, pathname: &str, body: Vec<u8>, opts: &PutOptions) -> Result<BlobAsset> {
        if *self.fail_put.lock().await {
            return Err(anyhow!("blob store rejected {}", pathname));
        }
        self.puts
            .lock()
            .await
            .push((pathname.to_string(), body, opts.clone()));
        let asset = BlobAsset {
            pathname: pathname.to_string(),
            url: Self::url_for(pathname),
        };
        self.assets.lock().await.push(asset.clone());
        Ok(asset)
    }
}

/// Serves fixed bodies by URL; URLs in `failing` error mid-stream.
#[derive(Clone, Default)]
pub struct FakeImages {
    pub bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub failing: Arc<Mutex<HashSet<String>>>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl FakeImages {
    pub async fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().await.insert(url.to_string(), body);
    }

    pub async fn fail(&self, url: &str) {
        self.failing.lock().await.insert(url.to_string());
    }

    pub async fn opened(&self) -> Vec<String> {
        self.opened.lock().await.clone()
    }
}

#[async_trait]
impl ImageSource for FakeImages {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        self.opened.lock().await.push(url.to_string());
        if self.failing.lock().await.contains(url) {
            let chunks: Vec<Result<Bytes>> = vec![
                Ok(Bytes::from_static(b"\x89PNG")),
                Err(anyhow!("connection reset")),
            ];
            return Ok(stream::iter(chunks).boxed());
        }
        let body = self
            .bodies
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {}", url))?;
        let mid = body.len() / 2;
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::copy_from_slice(&body[..mid])),
            Ok(Bytes::copy_from_slice(&body[mid..])),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

#[derive(Clone, Default)]
pub struct RecordingScaffold {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

#[async_trait]
impl SiteScaffold for RecordingScaffold {
    async fn scaffold(&self, rel: &str) -> Result<()> {
        self.calls.lock().await.push(rel.to_string());
        if self.fail {
            return Err(anyhow!("hugo new refused {}", rel));
        }
        Ok(())
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([20, 120, 220]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([240, 200, 10]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

pub fn page_json(id: &str, title: &str, last_edited: &str, properties: Value) -> Value {
    let mut props = properties;
    props["Name"] = json!({
        "id": "title",
        "type": "title",
        "title": [{ "type": "text", "plain_text": title }]
    });
    json!({
        "object": "page",
        "id": id,
        "created_time": "2024-01-01T00:00:00.000Z",
        "last_edited_time": last_edited,
        "last_edited_by": { "object": "user", "id": "u-1" },
        "cover": null,
        "properties": props
    })
}

pub fn page(id: &str, title: &str, last_edited: &str) -> Page {
    serde_json::from_value(page_json(id, title, last_edited, json!({}))).unwrap()
}

pub fn paragraph(id: &str, text: &str) -> Value {
    json!({
        "id": id,
        "type": "paragraph",
        "has_children": false,
        "paragraph": { "rich_text": [{ "type": "text", "plain_text": text }] }
    })
}

pub fn hosted_image(id: &str, url: &str, expiry: &str) -> Value {
    json!({
        "id": id,
        "type": "image",
        "has_children": false,
        "image": {
            "type": "file",
            "caption": [],
            "file": { "url": url, "expiry_time": expiry }
        }
    })
}
