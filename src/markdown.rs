//! Notion block tree → Markdown.
//!
//! [`MarkdownConverter::page_to_markdown`] walks the block tree depth-first and
//! keeps the result as a tree of [`MdBlock`]s so callers can inspect per-block
//! metadata (signed-URL expiry) before flattening it with
//! [`to_markdown_string`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::warn;

use crate::equation::EquationFormatter;
use crate::notion::model::RichText;
use crate::notion::{Block, NotionSource};

#[derive(Debug, Clone, PartialEq)]
pub struct MdBlock {
    pub kind: String,
    /// Markdown for the block itself, without its children.
    pub parent: String,
    pub children: Vec<MdBlock>,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl MdBlock {
    pub fn new(kind: &str, parent: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            parent: parent.into(),
            children: Vec::new(),
            expiry_time: None,
        }
    }
}

pub struct MarkdownConverter<'a> {
    source: &'a dyn NotionSource,
    equation: &'a EquationFormatter,
}

impl<'a> MarkdownConverter<'a> {
    pub fn new(source: &'a dyn NotionSource, equation: &'a EquationFormatter) -> Self {
        Self { source, equation }
    }

    pub async fn page_to_markdown(&self, page_id: &str) -> Result<Vec<MdBlock>> {
        self.children_of(page_id.to_string()).await
    }

    fn children_of(&self, block_id: String) -> BoxFuture<'_, Result<Vec<MdBlock>>> {
        async move {
            let blocks = self.source.block_children(&block_id).await?;
            let mut out = Vec::with_capacity(blocks.len());
            for block in blocks {
                let children = if block.has_children && descends_into(&block.kind) {
                    self.children_of(block.id.clone()).await?
                } else {
                    Vec::new()
                };
                out.push(MdBlock {
                    kind: block.kind.clone(),
                    parent: block_to_markdown(&block, self.equation),
                    children,
                    expiry_time: block_expiry(&block),
                });
            }
            Ok(out)
        }
        .boxed()
    }
}

/// Child pages and databases are synced on their own.
fn descends_into(kind: &str) -> bool {
    !matches!(kind, "child_page" | "child_database")
}

/// Expiry of a Notion-hosted file attached to the block, if any.
pub fn block_expiry(block: &Block) -> Option<DateTime<Utc>> {
    let raw = block
        .payload()
        .get("file")
        .and_then(|f| f.get("expiry_time"))
        .and_then(Value::as_str)?;
    parse_expiry(raw)
}

pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(err) => {
            warn!(expiry_time = raw, ?err, "ignoring unparseable expiry time");
            None
        }
    }
}

fn rich_text(value: &Value, key: &str) -> Vec<RichText> {
    value
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

pub fn rich_text_to_markdown(parts: &[RichText]) -> String {
    let mut out = String::new();
    for part in parts {
        if part.kind == "equation" {
            out.push_str(&format!("${}$", part.plain_text));
            continue;
        }
        let mut text = part.plain_text.clone();
        let a = &part.annotations;
        if a.code {
            text = format!("`{}`", text);
        }
        if a.bold {
            text = format!("**{}**", text);
        }
        if a.italic {
            text = format!("_{}_", text);
        }
        if a.strikethrough {
            text = format!("~~{}~~", text);
        }
        if let Some(href) = &part.href {
            text = format!("[{}]({})", text, href);
        }
        out.push_str(&text);
    }
    out
}

fn plain(parts: &[RichText]) -> String {
    parts.iter().map(|p| p.plain_text.as_str()).collect()
}

fn file_url(payload: &Value) -> Option<&str> {
    let kind = payload.get("type").and_then(Value::as_str)?;
    payload.get(kind)?.get("url")?.as_str()
}

/// Markdown for a single block, excluding its children.
pub fn block_to_markdown(block: &Block, equation: &EquationFormatter) -> String {
    let payload = block.payload();
    let text = || rich_text_to_markdown(&rich_text(payload, "rich_text"));
    match block.kind.as_str() {
        "paragraph" | "toggle" => text(),
        "heading_1" => format!("# {}", text()),
        "heading_2" => format!("## {}", text()),
        "heading_3" => format!("### {}", text()),
        "bulleted_list_item" => format!("- {}", text()),
        "numbered_list_item" => format!("1. {}", text()),
        "to_do" => {
            let checked = payload.get("checked").and_then(Value::as_bool).unwrap_or(false);
            format!("- [{}] {}", if checked { "x" } else { " " }, text())
        }
        "quote" => quote(&text()),
        "callout" => {
            let icon = payload
                .get("icon")
                .and_then(|i| i.get("emoji"))
                .and_then(Value::as_str)
                .map(|e| format!("{} ", e))
                .unwrap_or_default();
            quote(&format!("{}{}", icon, text()))
        }
        "code" => {
            let language = payload.get("language").and_then(Value::as_str).unwrap_or("");
            let language = if language == "plain text" { "text" } else { language };
            format!("```{}\n{}\n```", language, plain(&rich_text(payload, "rich_text")))
        }
        "divider" => "---".to_string(),
        "equation" => {
            let expression = payload.get("expression").and_then(Value::as_str).unwrap_or("");
            equation.format(expression)
        }
        "image" => {
            let caption = plain(&rich_text(payload, "caption"));
            let caption = if caption.is_empty() { "image".to_string() } else { caption };
            match file_url(payload) {
                Some(url) => format!("![{}]({})", caption, url),
                None => String::new(),
            }
        }
        "video" | "file" | "pdf" | "audio" => {
            let caption = plain(&rich_text(payload, "caption"));
            match file_url(payload) {
                Some(url) => {
                    let name = if caption.is_empty() { block.kind.clone() } else { caption };
                    format!("[{}]({})", name, url)
                }
                None => String::new(),
            }
        }
        "bookmark" | "embed" | "link_preview" => {
            match payload.get("url").and_then(Value::as_str) {
                Some(url) => {
                    let caption = plain(&rich_text(payload, "caption"));
                    let name = if caption.is_empty() { url.to_string() } else { caption };
                    format!("[{}]({})", name, url)
                }
                None => String::new(),
            }
        }
        "table_row" => {
            let cells: Vec<String> = payload
                .get("cells")
                .and_then(Value::as_array)
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| {
                            let parts: Vec<RichText> =
                                serde_json::from_value(cell.clone()).unwrap_or_default();
                            rich_text_to_markdown(&parts)
                        })
                        .collect()
                })
                .unwrap_or_default();
            format!("| {} |", cells.join(" | "))
        }
        _ => String::new(),
    }
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|l| format!("> {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_list(kind: &str) -> bool {
    matches!(kind, "bulleted_list_item" | "numbered_list_item" | "to_do")
}

fn indent(text: &str, level: usize) -> String {
    if level == 0 {
        return text.to_string();
    }
    let pad = "    ".repeat(level);
    text.lines()
        .map(|l| if l.is_empty() { String::new() } else { format!("{}{}", pad, l) })
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_markdown(table: &MdBlock) -> String {
    let mut rows = table.children.iter().map(|r| r.parent.clone());
    let Some(header) = rows.next() else {
        return String::new();
    };
    let columns = header.matches(" | ").count() + 1;
    let separator = format!("|{}", " --- |".repeat(columns));
    std::iter::once(header)
        .chain(std::iter::once(separator))
        .chain(rows)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_markdown_string(blocks: &[MdBlock]) -> String {
    render_level(blocks, 0)
}

fn render_level(blocks: &[MdBlock], level: usize) -> String {
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if block.kind == "table" {
            out.push_str(&indent(&table_markdown(block), level));
            out.push_str("\n\n");
            continue;
        }
        let next_is_list = blocks.get(i + 1).is_some_and(|n| is_list(&n.kind));
        if !block.parent.is_empty() {
            out.push_str(&indent(&block.parent, level));
            out.push_str(if is_list(&block.kind) && next_is_list { "\n" } else { "\n\n" });
        }
        if !block.children.is_empty() {
            let nested = match block.kind.as_str() {
                "column_list" | "column" | "synced_block" => level,
                _ => level + 1,
            };
            out.push_str(&render_level(&block.children, nested));
        }
    }
    out
}
