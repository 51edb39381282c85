//! Page-level pipeline: decide, render, reconcile, scaffold, write.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::blob::VercelBlobClient;
use crate::config::{Config, Mounts};
use crate::content::{
    content_file_name, scaffold_from_config, slugify, ContentFileRecord, ContentTree, SiteScaffold,
};
use crate::error::SyncError;
use crate::notion::{NotionClient, NotionSource, Page};
use crate::reconcile::{AssetReconciler, ReconcileReport, ReconcileSettings};
use crate::render::PageRenderer;
use crate::transfer::{HttpImageSource, ImageTransfer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Prior file is current and references no expiring URL.
    Unchanged,
    /// No prior file, or the page was edited since it was written.
    Stale,
    /// Prior file embeds a signed URL; always re-rendered.
    ExpiringForced,
}

pub fn decide(prior: Option<&ContentFileRecord>, page: &Page) -> SyncDecision {
    match prior {
        None => SyncDecision::Stale,
        Some(record) if record.expiry_time.is_some() => SyncDecision::ExpiringForced,
        Some(record) if record.last_edited_time() != Some(page.last_edited_time.as_str()) => {
            SyncDecision::Stale
        }
        Some(_) => SyncDecision::Unchanged,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped {
        path: PathBuf,
    },
    Written {
        path: PathBuf,
        decision: SyncDecision,
        report: ReconcileReport,
    },
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// `(page or database id, error)`
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    fn record(&mut self, id: &str, result: Result<SyncOutcome, SyncError>) {
        match result {
            Ok(SyncOutcome::Skipped { path }) => self.skipped.push(path),
            Ok(SyncOutcome::Written { path, .. }) => self.written.push(path),
            Err(err) => self.failed.push((id.to_string(), format!("{:#}", err))),
        }
    }

    fn merge(&mut self, other: SyncReport) {
        self.written.extend(other.written);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

/// Content path relative to the content root. `""` and `"."` mean the root.
pub fn content_rel_path(folder: &str, file_name: &str) -> String {
    match folder.trim_matches('/') {
        "" | "." => file_name.to_string(),
        folder => format!("{}/{}", folder, file_name),
    }
}

pub struct Syncer {
    notion: Arc<dyn NotionSource>,
    renderer: PageRenderer,
    reconciler: AssetReconciler,
    tree: ContentTree,
    scaffold: Arc<dyn SiteScaffold>,
}

impl Syncer {
    pub fn new(
        notion: Arc<dyn NotionSource>,
        renderer: PageRenderer,
        reconciler: AssetReconciler,
        tree: ContentTree,
        scaffold: Arc<dyn SiteScaffold>,
    ) -> Self {
        Self {
            notion,
            renderer,
            reconciler,
            tree,
            scaffold,
        }
    }

    /// Production wiring: Notion API, Vercel Blob, HTTP image fetches, and
    /// `hugo new` unless `site.hugo_bin` is empty.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let blobs = Arc::new(VercelBlobClient::from_config(cfg)?);
        let transfer = ImageTransfer::new(Arc::new(HttpImageSource::new()));
        Ok(Self::new(
            Arc::new(NotionClient::from_config(cfg)),
            PageRenderer::from_config(cfg),
            AssetReconciler::new(blobs, transfer, ReconcileSettings::from_config(cfg)),
            ContentTree::from_config(cfg),
            scaffold_from_config(cfg),
        ))
    }

    /// Bring the content file for `page` under `folder` up to date.
    #[instrument(skip_all, fields(page_id = %page.id, folder = %folder))]
    pub async fn sync_page(&self, page: &Page, folder: &str) -> Result<SyncOutcome, SyncError> {
        let rel = content_rel_path(folder, &content_file_name(&page.title(), &page.id));
        let prior = self.tree.read_record(&rel).await;
        let decision = decide(prior.as_ref(), page);
        if decision == SyncDecision::Unchanged {
            info!(rel = %rel, "content up to date; skipping");
            return Ok(SyncOutcome::Skipped {
                path: self.tree.path(&rel),
            });
        }

        let rendered = self
            .renderer
            .render(self.notion.as_ref(), page)
            .await
            .map_err(SyncError::SourceFetch)?;
        let reconciled = self
            .reconciler
            .reconcile(&slugify(&rendered.title), &rendered.document)
            .await?;

        let created = !self.tree.exists(&rel).await;
        if let Err(err) = self.scaffold.scaffold(&rel).await {
            warn!(?err, rel = %rel, created, "scaffolding failed; writing anyway");
        }
        let path = self
            .tree
            .write(&rel, &reconciled.document)
            .await
            .map_err(|source| SyncError::Write {
                target: rel.clone(),
                source,
            })?;
        info!(
            path = %path.display(),
            ?decision,
            created,
            reused = reconciled.report.reused,
            uploaded = reconciled.report.uploaded,
            failed = reconciled.report.failed,
            "content written"
        );
        Ok(SyncOutcome::Written {
            path,
            decision,
            report: reconciled.report,
        })
    }

    /// Sync each page in order. A failing page is logged and recorded; the
    /// rest still run.
    pub async fn sync_pages(&self, pages: &[Page], folder: &str) -> SyncReport {
        let mut report = SyncReport::default();
        for page in pages {
            let result = self.sync_page(page, folder).await;
            if let Err(err) = &result {
                warn!(?err, page_id = %page.id, folder, "page sync failed");
            }
            report.record(&page.id, result);
        }
        report
    }

    /// Sync every configured database and standalone page.
    #[instrument(skip_all)]
    pub async fn sync_mounts(&self, mounts: &Mounts) -> SyncReport {
        let mut report = SyncReport::default();
        for mount in &mounts.databases {
            match self.notion.query_database(&mount.database_id).await {
                Ok(pages) => {
                    info!(database_id = %mount.database_id, pages = pages.len(), "syncing database");
                    report.merge(self.sync_pages(&pages, &mount.target_folder).await);
                }
                Err(err) => {
                    warn!(?err, database_id = %mount.database_id, "database query failed");
                    report
                        .failed
                        .push((mount.database_id.clone(), format!("{:#}", err)));
                }
            }
        }
        for mount in &mounts.pages {
            match self.notion.retrieve_page(&mount.page_id).await {
                Ok(page) => {
                    report.merge(self.sync_pages(std::slice::from_ref(&page), &mount.target_folder).await);
                }
                Err(err) => {
                    warn!(?err, page_id = %mount.page_id, "page retrieval failed");
                    report.failed.push((mount.page_id.clone(), format!("{:#}", err)));
                }
            }
        }
        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "sync finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(last_edited: &str) -> Page {
        serde_json::from_value(json!({
            "object": "page",
            "id": "p-1",
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": last_edited,
            "last_edited_by": { "object": "user", "id": "u-1" },
            "cover": null,
            "properties": {}
        }))
        .unwrap()
    }

    fn record(last_edited: &str, expiry: Option<&str>) -> ContentFileRecord {
        ContentFileRecord {
            metadata: Some(json!({ "last_edited_time": last_edited })),
            expiry_time: expiry.map(str::to_string),
        }
    }

    #[test]
    fn decision_table() {
        let p = page("t1");
        assert_eq!(decide(None, &p), SyncDecision::Stale);
        assert_eq!(decide(Some(&record("t1", None)), &p), SyncDecision::Unchanged);
        assert_eq!(decide(Some(&record("t0", None)), &p), SyncDecision::Stale);
        assert_eq!(
            decide(Some(&record("t1", Some("2099-01-01T00:00:00.000Z"))), &p),
            SyncDecision::ExpiringForced
        );
        assert_eq!(decide(Some(&ContentFileRecord::default()), &p), SyncDecision::Stale);
    }

    #[test]
    fn rel_path_handles_root_folders() {
        assert_eq!(content_rel_path(".", "a.md"), "a.md");
        assert_eq!(content_rel_path("", "a.md"), "a.md");
        assert_eq!(content_rel_path("/posts/", "a.md"), "posts/a.md");
        assert_eq!(content_rel_path("blog/tech", "a.md"), "blog/tech/a.md");
    }
}
