use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use notion_hugo_sync::config;
use notion_hugo_sync::content::content_file_name;
use notion_hugo_sync::notion::{NotionClient, NotionSource};
use notion_hugo_sync::render::PageRenderer;

/// Render a single Notion page and print the resulting Hugo document.
/// Images are not migrated and nothing is written.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Page ID to render
    #[arg(long)]
    page_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let client = NotionClient::from_config(&cfg);
    let renderer = PageRenderer::from_config(&cfg);

    let page = client.retrieve_page(&args.page_id).await?;
    let rendered = renderer.render(&client, &page).await?;
    eprintln!("File: {}", content_file_name(&rendered.title, &page.id));
    print!("{}", rendered.document);
    Ok(())
}
