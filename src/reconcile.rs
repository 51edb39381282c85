//! Migration of temporary image links to durable blob storage.
//!
//! A rendered document may reference Notion-hosted images through signed
//! URLs that expire. Each such link is resolved against the blob listing for
//! the page's slug; links with no stored counterpart are downloaded,
//! transcoded, uploaded and rewritten. Reconciling the same document twice
//! against the same listing performs no transfers the second time.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::blob::{BlobAsset, BlobStore, PutOptions};
use crate::config::Config;
use crate::error::SyncError;
use crate::transfer::{content_type_for, ImageTransfer};

static UNSAFE_STEM_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid stem regex"));

const HASH_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLink {
    pub display_text: String,
    pub remote_url: String,
    /// Byte range of `remote_url` inside the document.
    pub url_span: Range<usize>,
}

/// `[text](url)` where `url` contains `marker`. A match never crosses a
/// closing bracket, a closing paren or whitespace, so adjacent links stay
/// separate.
pub fn link_pattern(marker: &str) -> Regex {
    let pattern = format!(
        r"\[([^\]\n]*)\]\(([^)\s]*{}[^)\s]*)\)",
        regex::escape(marker)
    );
    Regex::new(&pattern).expect("valid link regex")
}

/// All temporary links in source order.
pub fn extract_image_links(pattern: &Regex, document: &str) -> Vec<ImageLink> {
    pattern
        .captures_iter(document)
        .filter_map(|caps| {
            let text = caps.get(1)?;
            let url = caps.get(2)?;
            Some(ImageLink {
                display_text: text.as_str().to_string(),
                remote_url: url.as_str().to_string(),
                url_span: url.range(),
            })
        })
        .collect()
}

/// Local/durable file name for `url`: `<stem>-<hash>.<ext>`.
///
/// The hash covers host and path only, so re-signed URLs for the same object
/// map to the same name while distinct objects sharing a base name do not
/// collide.
pub fn image_file_name(url: &str) -> String {
    let (host, path) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or_default().to_string(),
            parsed.path().to_string(),
        ),
        Err(_) => (String::new(), url.split(['?', '#']).next().unwrap_or(url).to_string()),
    };
    let segment = path.rsplit('/').next().unwrap_or_default();
    let (raw_stem, raw_ext) = match segment.rfind('.') {
        Some(i) if i > 0 => (&segment[..i], Some(&segment[i + 1..])),
        _ => (segment, None),
    };

    let stem = UNSAFE_STEM_CHARS.replace_all(raw_stem, "-");
    let stem = match stem.trim_matches('-') {
        "" => "image",
        s => s,
    };

    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    match raw_ext
        .map(str::to_ascii_lowercase)
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        Some(ext) => format!("{}-{}.{}", stem, &digest[..HASH_LEN], ext),
        None => format!("{}-{}", stem, &digest[..HASH_LEN]),
    }
}

/// Drop the extension of the final path segment, if any.
pub fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(i) if i > 0 => &path[..segment_start + i],
        _ => path,
    }
}

/// Stored asset whose pathname equals `stem_path` once extensions are
/// ignored.
pub fn find_migrated<'a>(listing: &'a [BlobAsset], stem_path: &str) -> Option<&'a BlobAsset> {
    listing
        .iter()
        .find(|asset| strip_extension(&asset.pathname) == stem_path)
}

/// Replace each span with its URL. Spans must be sorted and disjoint.
fn splice(document: &str, replacements: &[(Range<usize>, String)]) -> String {
    let mut out = String::with_capacity(document.len());
    let mut cursor = 0;
    for (span, url) in replacements {
        out.push_str(&document[cursor..span.start]);
        out.push_str(url);
        cursor = span.end;
    }
    out.push_str(&document[cursor..]);
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reused: usize,
    pub uploaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub document: String,
    pub report: ReconcileReport,
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Local side channel for downloaded images.
    pub static_root: PathBuf,
    pub blob_prefix: String,
    pub url_marker: String,
    pub transcode: bool,
}

impl ReconcileSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            static_root: cfg.static_root(),
            blob_prefix: cfg.blob.prefix.trim_matches('/').to_string(),
            url_marker: cfg.blob.url_marker.clone(),
            transcode: cfg.formatter.images.webp,
        }
    }
}

pub struct AssetReconciler {
    blobs: Arc<dyn BlobStore>,
    transfer: ImageTransfer,
    link_pattern: Regex,
    settings: ReconcileSettings,
}

impl AssetReconciler {
    pub fn new(blobs: Arc<dyn BlobStore>, transfer: ImageTransfer, settings: ReconcileSettings) -> Self {
        Self {
            blobs,
            transfer,
            link_pattern: link_pattern(&settings.url_marker),
            settings,
        }
    }

    /// Rewrite every temporary link in `document` to a durable URL.
    ///
    /// A failed image transfer leaves that link untouched. Listing, reading
    /// the produced file, or uploading it fails the whole page.
    #[instrument(skip_all, fields(slug = %slug))]
    pub async fn reconcile(&self, slug: &str, document: &str) -> Result<Reconciled, SyncError> {
        let links = extract_image_links(&self.link_pattern, document);
        let mut report = ReconcileReport::default();
        if links.is_empty() {
            return Ok(Reconciled {
                document: document.to_string(),
                report,
            });
        }

        let folder = format!("{}/{}/", self.settings.blob_prefix, slug);
        let mut listing = self
            .blobs
            .list(&folder)
            .await
            .map_err(|source| SyncError::Write {
                target: folder.clone(),
                source,
            })?;
        debug!(links = links.len(), stored = listing.len(), "reconciling image links");

        let mut replacements = Vec::with_capacity(links.len());
        for link in links {
            let name = image_file_name(&link.remote_url);
            let stem_path = format!("{}{}", folder, strip_extension(&name));
            if let Some(asset) = find_migrated(&listing, &stem_path) {
                debug!(url = %asset.url, "image already migrated");
                report.reused += 1;
                replacements.push((link.url_span, asset.url.clone()));
                continue;
            }

            let dest = self.settings.static_root.join(slug).join(&name);
            let Some(local) = self
                .transfer
                .download(&dest, self.settings.transcode, &link.remote_url)
                .await
            else {
                warn!(text = %link.display_text, "leaving image link unresolved");
                report.failed += 1;
                continue;
            };

            let file_name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(name);
            let pathname = format!("{}{}", folder, file_name);
            let asset = self.upload(&pathname, &local).await?;
            info!(pathname = %asset.pathname, url = %asset.url, "uploaded image");
            report.uploaded += 1;
            replacements.push((link.url_span, asset.url.clone()));
            listing.push(asset);
        }

        Ok(Reconciled {
            document: splice(document, &replacements),
            report,
        })
    }

    async fn upload(&self, pathname: &str, local: &std::path::Path) -> Result<BlobAsset, SyncError> {
        let write_error = |source| SyncError::Write {
            target: pathname.to_string(),
            source,
        };
        let body = fs::read(local)
            .await
            .with_context(|| format!("failed to read {}", local.display()))
            .map_err(write_error)?;
        self.blobs
            .put(pathname, body, &PutOptions::public(content_type_for(local)))
            .await
            .map_err(write_error)
    }
}
