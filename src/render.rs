//! Page → front matter + Markdown.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::equation::EquationFormatter;
use crate::frontmatter::{render_document, FrontMatter};
use crate::markdown::{parse_expiry, to_markdown_string, MarkdownConverter, MdBlock};
use crate::notion::{NotionSource, Page, PropertyItems, PropertyValue};

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub title: String,
    pub front_matter: FrontMatter,
    pub document: String,
}

#[derive(Debug, Clone)]
pub struct PageRenderer {
    equation: EquationFormatter,
}

impl PageRenderer {
    pub fn new(equation: EquationFormatter) -> Self {
        Self { equation }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(EquationFormatter::from_style(&cfg.formatter.equation.style))
    }

    /// Render `page` into a document. Notion failures propagate unchanged.
    #[instrument(skip_all, fields(page_id = %page.id))]
    pub async fn render(&self, notion: &dyn NotionSource, page: &Page) -> Result<RenderedPage> {
        let converter = MarkdownConverter::new(notion, &self.equation);
        let blocks = converter.page_to_markdown(&page.id).await?;
        let mut nearest = nearest_expiry(&blocks);
        let body = to_markdown_string(&blocks);

        let title = page.title();
        let mut front_matter = FrontMatter::new();
        front_matter.insert("title", title.clone());
        front_matter.insert("date", page.created_time.clone());
        front_matter.insert("lastmod", page.last_edited_time.clone());
        front_matter.insert("draft", false);

        if let Some(cover) = &page.cover {
            if let Some(url) = cover.url() {
                front_matter.insert("featuredImage", url);
                nearest = min_expiry(nearest, cover.expiry_time().and_then(parse_expiry));
            }
        }

        for (name, property) in &page.properties {
            let items = notion.retrieve_property(&page.id, &property.id).await?;
            apply_property(&mut front_matter, name, items);
        }

        if !front_matter.contains_key("authors") {
            let user = notion.retrieve_user(&page.last_edited_by.id).await?;
            if let Some(name) = user.name.filter(|n| !n.is_empty()) {
                front_matter.insert("authors", vec![name]);
            }
        }

        front_matter.insert("NOTION_METADATA", page.raw.clone());
        front_matter.insert("UPDATE_TIME", format_time(Utc::now()));
        if let Some(expiry) = nearest {
            front_matter.insert("EXPIRY_TIME", format_time(expiry));
        }
        debug!(title = %title, expiry = ?nearest, "rendered page");

        let document = render_document(&front_matter, &self.equation.head_fragment(), &body);
        Ok(RenderedPage {
            title,
            front_matter,
            document,
        })
    }
}

pub fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn min_expiry(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Earliest expiry anywhere in the tree. Children are folded before their
/// parent's result is combined with its siblings.
pub fn nearest_expiry(blocks: &[MdBlock]) -> Option<DateTime<Utc>> {
    blocks.iter().fold(None, |acc, block| {
        let subtree = min_expiry(block.expiry_time, nearest_expiry(&block.children));
        min_expiry(acc, subtree)
    })
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

/// Fold one resolved property into the front matter. Empty values are
/// omitted; relation, title and unknown types are ignored.
pub fn apply_property(front_matter: &mut FrontMatter, name: &str, items: PropertyItems) {
    match items {
        PropertyItems::Single(value) => apply_value(front_matter, name, value),
        PropertyItems::Paginated(values) => {
            for value in values {
                apply_value(front_matter, name, value);
            }
        }
    }
}

fn apply_value(front_matter: &mut FrontMatter, name: &str, value: PropertyValue) {
    match value {
        PropertyValue::Checkbox { checkbox } => front_matter.insert(name, checkbox),
        PropertyValue::Select { select: option } | PropertyValue::Status { status: option } => {
            if let Some(option) = option.filter(|o| !o.name.is_empty()) {
                front_matter.insert(name, option.name);
            }
        }
        PropertyValue::MultiSelect { multi_select } => {
            let names: Vec<String> = multi_select.into_iter().map(|o| o.name).collect();
            front_matter.insert(name, names);
        }
        PropertyValue::Email { email: s }
        | PropertyValue::Url { url: s }
        | PropertyValue::PhoneNumber { phone_number: s } => {
            if let Some(s) = non_empty(s) {
                front_matter.insert(name, s);
            }
        }
        PropertyValue::Date { date } => {
            if let Some(start) = non_empty(date.and_then(|d| d.start)) {
                front_matter.insert(name, start);
            }
        }
        PropertyValue::Number { number: Some(n) } => front_matter.insert(name, number(n)),
        PropertyValue::Number { number: None } => {}
        PropertyValue::People { people } => {
            if !matches!(front_matter.get(name), Some(Value::Array(_))) {
                front_matter.insert(name, Value::Array(Vec::new()));
            }
            if let (Some(Value::Array(list)), Some(display)) = (front_matter.get_mut(name), people.name) {
                list.push(Value::String(display));
            }
        }
        PropertyValue::RichText { rich_text } => {
            if let Some(Value::String(acc)) = front_matter.get_mut(name) {
                acc.push_str(&rich_text.plain_text);
                return;
            }
            front_matter.insert(name, rich_text.plain_text);
        }
        PropertyValue::Ignored => {}
    }
}
