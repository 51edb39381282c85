//! Notion → Hugo content sync.
//!
//! Pages are rendered to front matter plus Markdown, their temporary image
//! links are migrated to durable blob storage, and the result is written into
//! a Hugo content tree. Unchanged pages are skipped without any API calls.

pub mod blob;
pub mod config;
pub mod content;
pub mod equation;
pub mod error;
pub mod frontmatter;
pub mod markdown;
pub mod notion;
pub mod reconcile;
pub mod render;
pub mod sync;
pub mod transfer;
