use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A Notion page. `raw` keeps the full API object for the `NOTION_METADATA`
/// snapshot; the typed fields are what the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: String,
    pub created_time: String,
    pub last_edited_time: String,
    pub last_edited_by: UserRef,
    pub cover: Option<FileObject>,
    pub properties: BTreeMap<String, PropertyRef>,
    pub raw: Value,
}

#[derive(Deserialize)]
struct PageFields {
    id: String,
    created_time: String,
    last_edited_time: String,
    last_edited_by: UserRef,
    #[serde(default)]
    cover: Option<FileObject>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyRef>,
}

impl<'de> Deserialize<'de> for Page {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let fields: PageFields = serde_json::from_value(raw.clone()).map_err(D::Error::custom)?;
        Ok(Page {
            id: fields.id,
            created_time: fields.created_time,
            last_edited_time: fields.last_edited_time,
            last_edited_by: fields.last_edited_by,
            cover: fields.cover,
            properties: fields.properties,
            raw,
        })
    }
}

impl Page {
    /// Plain text of the page's `title`-typed property.
    pub fn title(&self) -> String {
        self.properties
            .values()
            .find(|p| p.kind == "title")
            .and_then(|p| p.value.get("title"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
}

/// Property entry as embedded in a page object.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PropertyRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

/// File reference used for covers and file-backed blocks. Notion-hosted
/// files carry a signed URL with an expiry time.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileObject {
    External { external: ExternalFile },
    File { file: HostedFile },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    pub url: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostedFile {
    pub url: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

impl FileObject {
    pub fn url(&self) -> Option<&str> {
        match self {
            FileObject::External { external } => Some(&external.url),
            FileObject::File { file } => Some(&file.url),
            FileObject::Unsupported => None,
        }
    }

    pub fn expiry_time(&self) -> Option<&str> {
        match self {
            FileObject::File { file } => file.expiry_time.as_deref(),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DateValue {
    pub start: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RichText {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
}

/// A property item as returned by the page-property endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Checkbox { checkbox: bool },
    Select { select: Option<SelectOption> },
    MultiSelect { multi_select: Vec<SelectOption> },
    Status { status: Option<SelectOption> },
    Email { email: Option<String> },
    Url { url: Option<String> },
    PhoneNumber { phone_number: Option<String> },
    Date { date: Option<DateValue> },
    Number { number: Option<f64> },
    People { people: User },
    RichText { rich_text: RichText },
    #[serde(other)]
    Ignored,
}

/// Resolved value of one page property: either a single item or every item
/// of a paginated list (people, rich text, relation, title).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyItems {
    Single(PropertyValue),
    Paginated(Vec<PropertyValue>),
}

/// A raw content block. The payload lives under the key named by `kind`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Block {
    pub fn payload(&self) -> &Value {
        self.body.get(&self.kind).unwrap_or(&Value::Null)
    }
}

#[derive(Deserialize, Debug)]
pub struct ListResponse<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}
