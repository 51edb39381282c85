use thiserror::Error;

/// Per-page failures. Either one aborts the page; the run moves on to the
/// next page.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Notion page, property, user or block retrieval failed.
    #[error("failed to fetch from Notion: {0:#}")]
    SourceFetch(#[source] anyhow::Error),
    /// Blob listing/upload or content file write failed.
    #[error("failed to write {target}: {source:#}")]
    Write {
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A single image download/transcode failure. Never escapes the transfer
/// stage; the affected link is left untouched.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to fetch image: {0:#}")]
    Fetch(anyhow::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to transcode image: {0}")]
    Transcode(#[from] image::ImageError),
    #[error("transcode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
