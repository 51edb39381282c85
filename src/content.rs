//! Hugo content tree: file naming, prior-record lookup, scaffolding and writes.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::frontmatter::split_document;

/// URL/path-safe slug: whitespace and `/ \ ? # %` become `-`, runs of `-`
/// collapse, leading/trailing `-` are dropped.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.trim().chars() {
        let c = if c.is_whitespace() || matches!(c, '/' | '\\' | '?' | '#' | '%') {
            '-'
        } else {
            c
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let slug = out.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

/// `<slug>-<page id without dashes>.md`
pub fn content_file_name(title: &str, page_id: &str) -> String {
    format!("{}-{}.md", slugify(title), page_id.replace('-', ""))
}

/// Bookkeeping fields read back from a previously written content file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFileRecord {
    pub metadata: Option<Value>,
    pub expiry_time: Option<String>,
}

impl ContentFileRecord {
    pub fn last_edited_time(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("last_edited_time"))
            .and_then(Value::as_str)
    }
}

/// Parse the front matter of a content file. `None` when there is no
/// front matter block or it is not a YAML mapping.
pub fn parse_record(document: &str) -> Option<ContentFileRecord> {
    let (yaml, _) = split_document(document)?;
    let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
    let map = parsed.as_mapping()?;
    let metadata = map
        .get("NOTION_METADATA")
        .and_then(|v| serde_json::to_value(v).ok());
    let expiry_time = map
        .get("EXPIRY_TIME")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(ContentFileRecord {
        metadata,
        expiry_time,
    })
}

/// `<site>/<content_dir>` on disk.
#[derive(Debug, Clone)]
pub struct ContentTree {
    root: PathBuf,
}

impl ContentTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.content_root())
    }

    /// Path of `rel` (e.g. `posts/hello-abc.md`) under the content root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub async fn exists(&self, rel: &str) -> bool {
        fs::try_exists(self.path(rel)).await.unwrap_or(false)
    }

    /// Prior record for `rel`. Unreadable or malformed files count as absent.
    pub async fn read_record(&self, rel: &str) -> Option<ContentFileRecord> {
        let path = self.path(rel);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read content file");
                return None;
            }
        };
        let record = parse_record(&text);
        if record.is_none() {
            warn!(path = %path.display(), "content file has no parsable front matter");
        }
        record
    }

    /// Overwrite `rel` with `document`, creating parent directories.
    pub async fn write(&self, rel: &str, document: &str) -> Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create dir: {}", parent.display()))?;
        }
        fs::write(&path, document)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Site generator hook run before a content file is written.
#[async_trait]
pub trait SiteScaffold: Send + Sync {
    async fn scaffold(&self, rel: &str) -> Result<()>;
}

/// Runs `hugo new <rel>` inside the site directory.
#[derive(Debug, Clone)]
pub struct HugoScaffold {
    bin: String,
    site_dir: PathBuf,
}

impl HugoScaffold {
    pub fn new(bin: impl Into<String>, site_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            site_dir: site_dir.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.site.hugo_bin.clone(), PathBuf::from(&cfg.site.dir))
    }
}

#[async_trait]
impl SiteScaffold for HugoScaffold {
    async fn scaffold(&self, rel: &str) -> Result<()> {
        let output = Command::new(&self.bin)
            .arg("new")
            .arg(rel)
            .current_dir(&self.site_dir)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {} new {}", self.bin, rel))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} new exited with status {}: {}",
                self.bin,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        debug!(rel, "scaffolded content file");
        Ok(())
    }
}

/// No-op scaffold for sites without a generator binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScaffold;

#[async_trait]
impl SiteScaffold for NoScaffold {
    async fn scaffold(&self, _rel: &str) -> Result<()> {
        Ok(())
    }
}

/// `hugo new` scaffolding, or nothing when `site.hugo_bin` is empty.
pub fn scaffold_from_config(cfg: &Config) -> Arc<dyn SiteScaffold> {
    if cfg.site.hugo_bin.trim().is_empty() {
        Arc::new(NoScaffold)
    } else {
        Arc::new(HugoScaffold::from_config(cfg))
    }
}
