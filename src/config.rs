//! Configuration loader and validator for the Notion→Hugo sync.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub notion: Notion,
    pub blob: Blob,
    #[serde(default)]
    pub site: Site,
    #[serde(default)]
    pub formatter: Formatter,
    #[serde(default)]
    pub mounts: Mounts,
}

/// Notion API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notion {
    #[serde(default)]
    pub token: String,
    pub version: String,
}

/// Durable blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blob {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_blob_base_url")]
    pub base_url: String,
    /// Root of every uploaded pathname, e.g. `static/<slug>/<file>`.
    #[serde(default = "default_blob_prefix")]
    pub prefix: String,
    /// Substring identifying links into Notion's temporary object store.
    #[serde(default = "default_url_marker")]
    pub url_marker: String,
}

/// Hugo site layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub dir: String,
    pub content_dir: String,
    pub static_dir: String,
    /// Empty disables `hugo new` scaffolding.
    pub hugo_bin: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            dir: ".".into(),
            content_dir: "content".into(),
            static_dir: "static".into(),
            hugo_bin: "hugo".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Formatter {
    #[serde(default)]
    pub equation: Equation,
    #[serde(default)]
    pub images: Images,
}

/// Kept as a raw string: unknown styles are a warning, not a load failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Equation {
    pub style: String,
}

impl Default for Equation {
    fn default() -> Self {
        Self {
            style: "markdown".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Images {
    pub webp: bool,
}

impl Default for Images {
    fn default() -> Self {
        Self { webp: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mounts {
    #[serde(default)]
    pub databases: Vec<DatabaseMount>,
    #[serde(default)]
    pub pages: Vec<PageMount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseMount {
    pub database_id: String,
    pub target_folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMount {
    pub page_id: String,
    pub target_folder: String,
}

fn default_blob_base_url() -> String {
    "https://blob.vercel-storage.com/".into()
}

fn default_blob_prefix() -> String {
    "static".into()
}

fn default_url_marker() -> String {
    "amazonaws".into()
}

impl Config {
    /// Fill empty tokens from `NOTION_TOKEN` / `BLOB_READ_WRITE_TOKEN`.
    pub fn apply_env(&mut self) {
        if self.notion.token.trim().is_empty() {
            if let Ok(token) = std::env::var("NOTION_TOKEN") {
                self.notion.token = token;
            }
        }
        if self.blob.token.trim().is_empty() {
            if let Ok(token) = std::env::var("BLOB_READ_WRITE_TOKEN") {
                self.blob.token = token;
            }
        }
    }

    pub fn site_path(&self, rel: &str) -> PathBuf {
        Path::new(&self.site.dir).join(rel)
    }

    pub fn content_root(&self) -> PathBuf {
        self.site_path(&self.site.content_dir)
    }

    pub fn static_root(&self) -> PathBuf {
        self.site_path(&self.site.static_dir)
    }

    /// Ensure the content and static directories exist.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.content_root())?;
        fs::create_dir_all(self.static_root())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - Tokens missing from the file are taken from the environment.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.notion.token.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.token must be non-empty"));
    }
    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }

    if cfg.blob.token.trim().is_empty() {
        return Err(ConfigError::Invalid("blob.token must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.blob.base_url).is_err() {
        return Err(ConfigError::Invalid("blob.base_url must be a valid URL"));
    }
    if cfg.blob.prefix.trim().is_empty() || cfg.blob.prefix.contains('.') {
        return Err(ConfigError::Invalid(
            "blob.prefix must be non-empty and contain no '.'",
        ));
    }
    if cfg.blob.url_marker.trim().is_empty() {
        return Err(ConfigError::Invalid("blob.url_marker must be non-empty"));
    }

    if cfg.site.content_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("site.content_dir must be non-empty"));
    }
    if cfg.site.static_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("site.static_dir must be non-empty"));
    }

    for db in &cfg.mounts.databases {
        if db.database_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "mounts.databases[].database_id must be non-empty",
            ));
        }
    }
    for page in &cfg.mounts.pages {
        if page.page_id.trim().is_empty() {
            return Err(ConfigError::Invalid("mounts.pages[].page_id must be non-empty"));
        }
    }

    Ok(())
}

/// Returns a complete example configuration.
pub fn example() -> &'static str {
    r#"notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"

blob:
  token: "YOUR_BLOB_READ_WRITE_TOKEN"
  base_url: "https://blob.vercel-storage.com/"
  prefix: "static"
  url_marker: "amazonaws"

site:
  dir: "."
  content_dir: "content"
  static_dir: "static"
  hugo_bin: "hugo"

formatter:
  equation:
    style: "markdown"
  images:
    webp: true

mounts:
  databases:
    - database_id: "NOTION_DATABASE_ID"
      target_folder: "posts"
  pages:
    - page_id: "NOTION_PAGE_ID"
      target_folder: "."
"#
}
