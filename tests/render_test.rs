mod common;

use common::{hosted_image, page_json, paragraph, FakeNotion};
use notion_hugo_sync::content::parse_record;
use notion_hugo_sync::equation::{EquationFormatter, PlainMathRenderer};
use notion_hugo_sync::notion::{Page, PropertyItems, PropertyValue};
use notion_hugo_sync::notion::model::{SelectOption, User};
use notion_hugo_sync::render::PageRenderer;
use serde_json::json;
use std::sync::Arc;

fn markdown_renderer() -> PageRenderer {
    PageRenderer::new(EquationFormatter::Markdown)
}

async fn seeded() -> (FakeNotion, Page) {
    let notion = FakeNotion::default();
    let page: Page = serde_json::from_value(page_json(
        "page-1",
        "Hello World",
        "2024-03-01T12:00:00.000Z",
        json!({
            "Tags": { "id": "tags", "type": "multi_select", "multi_select": [] },
            "Authors": { "id": "auth", "type": "people", "people": [] }
        }),
    ))
    .unwrap();
    notion
        .add_page(
            page.clone(),
            vec![
                paragraph("b1", "First paragraph"),
                json!({
                    "id": "b2", "type": "bulleted_list_item", "has_children": true,
                    "bulleted_list_item": { "rich_text": [{ "type": "text", "plain_text": "outer" }] }
                }),
            ],
        )
        .await;
    notion
        .add_children(
            "b2",
            vec![hosted_image(
                "b3",
                "https://s3.amazonaws.com/ws/9/nested.png?sig=1",
                "2024-03-02T08:30:00.000Z",
            )],
        )
        .await;
    notion
        .add_property(
            "page-1",
            "tags",
            PropertyItems::Single(PropertyValue::MultiSelect {
                multi_select: vec![SelectOption { name: "rust".into() }],
            }),
        )
        .await;
    notion.add_user("u-1", Some("Last Editor")).await;
    (notion, page)
}

#[tokio::test]
async fn renders_front_matter_body_and_nested_expiry() {
    let (notion, page) = seeded().await;
    let rendered = markdown_renderer().render(&notion, &page).await.unwrap();

    assert_eq!(rendered.title, "Hello World");
    let doc = &rendered.document;
    assert!(doc.starts_with("---\ntitle: \"Hello World\"\n"));
    assert!(doc.contains("date: \"2024-01-01T00:00:00.000Z\""));
    assert!(doc.contains("lastmod: \"2024-03-01T12:00:00.000Z\""));
    assert!(doc.contains("draft: false"));
    assert!(doc.contains("Tags:\n  - \"rust\""));
    assert!(doc.contains("authors:\n  - \"Last Editor\""));
    assert!(doc.contains("EXPIRY_TIME: \"2024-03-02T08:30:00.000Z\""));
    assert!(doc.contains("First paragraph"));
    assert!(doc.contains("- outer"));
    assert!(doc.contains("![image](https://s3.amazonaws.com/ws/9/nested.png?sig=1)"));
    // No people items came back, so the key is omitted.
    assert_eq!(rendered.front_matter.get("Authors"), None);

    let record = parse_record(doc).unwrap();
    assert_eq!(record.last_edited_time(), Some("2024-03-01T12:00:00.000Z"));
    assert_eq!(record.expiry_time.as_deref(), Some("2024-03-02T08:30:00.000Z"));
}

#[tokio::test]
async fn cover_expiry_participates_in_minimum() {
    let notion = FakeNotion::default();
    let mut raw = page_json("page-2", "Cover", "2024-03-01T12:00:00.000Z", json!({}));
    raw["cover"] = json!({
        "type": "file",
        "file": { "url": "https://s3.amazonaws.com/ws/c.png", "expiry_time": "2024-03-01T13:00:00.000Z" }
    });
    let page: Page = serde_json::from_value(raw).unwrap();
    notion
        .add_page(
            page.clone(),
            vec![hosted_image("i", "https://s3.amazonaws.com/ws/i.png", "2024-03-05T00:00:00.000Z")],
        )
        .await;
    notion.add_user("u-1", None).await;

    let rendered = markdown_renderer().render(&notion, &page).await.unwrap();
    assert_eq!(
        rendered.front_matter.get("featuredImage"),
        Some(&json!("https://s3.amazonaws.com/ws/c.png"))
    );
    assert_eq!(
        rendered.front_matter.get("EXPIRY_TIME"),
        Some(&json!("2024-03-01T13:00:00.000Z"))
    );
    assert!(!rendered.front_matter.contains_key("authors"));
}

#[tokio::test]
async fn no_signed_urls_means_no_expiry() {
    let notion = FakeNotion::default();
    let page: Page =
        serde_json::from_value(page_json("page-3", "Plain", "2024-03-01T12:00:00.000Z", json!({})))
            .unwrap();
    notion.add_page(page.clone(), vec![paragraph("p", "text")]).await;
    notion.add_user("u-1", Some("A")).await;

    let rendered = markdown_renderer().render(&notion, &page).await.unwrap();
    assert!(!rendered.front_matter.contains_key("EXPIRY_TIME"));
    assert!(rendered.front_matter.contains_key("UPDATE_TIME"));
    assert_eq!(
        rendered.front_matter.get("NOTION_METADATA").and_then(|m| m.get("id")),
        Some(&json!("page-3"))
    );
}

#[tokio::test]
async fn explicit_authors_skip_user_lookup() {
    let (notion, page) = seeded().await;
    notion
        .add_property(
            "page-1",
            "auth",
            PropertyItems::Paginated(vec![PropertyValue::People {
                people: User { id: "u-2".into(), name: Some("Ada".into()) },
            }]),
        )
        .await;
    let mut page = page;
    let raw_auth = page.properties.remove("Authors").unwrap();
    page.properties.insert("authors".into(), raw_auth);

    let rendered = markdown_renderer().render(&notion, &page).await.unwrap();
    assert_eq!(rendered.front_matter.get("authors"), Some(&json!(["Ada"])));
    assert!(!notion.calls().await.iter().any(|c| c.starts_with("user:")));
}

#[tokio::test]
async fn html_equations_inject_stylesheet() {
    let notion = FakeNotion::default();
    let page: Page =
        serde_json::from_value(page_json("page-4", "Math", "2024-03-01T12:00:00.000Z", json!({})))
            .unwrap();
    notion
        .add_page(
            page.clone(),
            vec![json!({
                "id": "e", "type": "equation", "has_children": false,
                "equation": { "expression": "a<b" }
            })],
        )
        .await;
    notion.add_user("u-1", Some("A")).await;

    let renderer = PageRenderer::new(EquationFormatter::with_renderer(
        "html",
        Arc::new(PlainMathRenderer),
    ));
    let rendered = renderer.render(&notion, &page).await.unwrap();
    let (_, rest) = rendered.document.split_once("\n---\n").unwrap();
    assert!(rest.starts_with("<link rel=\"stylesheet\""));
    assert!(rest.contains("a&lt;b"));
}

#[tokio::test]
async fn source_failures_propagate() {
    let (notion, page) = seeded().await;
    notion.fail_blocks_of("b2").await;
    assert!(markdown_renderer().render(&notion, &page).await.is_err());
}

#[tokio::test]
async fn property_fetch_failure_propagates() {
    let (notion, page) = seeded().await;
    notion.fail_property("page-1", "tags").await;
    let err = markdown_renderer().render(&notion, &page).await.unwrap_err();
    assert!(format!("{:#}", err).contains("tags"));
}

#[tokio::test]
async fn default_author_lookup_failure_propagates() {
    let notion = FakeNotion::default();
    let page: Page =
        serde_json::from_value(page_json("page-5", "Orphan", "2024-03-01T12:00:00.000Z", json!({})))
            .unwrap();
    notion.add_page(page.clone(), vec![paragraph("p", "text")]).await;

    assert!(markdown_renderer().render(&notion, &page).await.is_err());
    assert!(notion.calls().await.contains(&"user:u-1".to_string()));
}
