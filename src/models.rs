use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Field widget kinds the migration knows how to carry over
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Link,
    /// Value is the id of another node
    NodeReference,
    /// Value is a file id
    Image,
    Other(String),
}

impl FieldKind {
    pub fn from_widget(widget: &str) -> Self {
        match widget {
            "text" => FieldKind::Text,
            "number" => FieldKind::Number,
            "date" => FieldKind::Date,
            "link" => FieldKind::Link,
            "nodereference" => FieldKind::NodeReference,
            "image" => FieldKind::Image,
            other => FieldKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Link => "link",
            FieldKind::NodeReference => "nodereference",
            FieldKind::Image => "image",
            FieldKind::Other(name) => name,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Name without the `field_` prefix
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub name: String,
    pub fields: Vec<Field>,
}

impl ContentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }
}

/// One value of one field on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    /// Owning node
    pub node_id: String,
    /// Position among the values of the same field on the same node
    pub delta: String,
    pub field: Field,
    pub value: Option<String>,
    /// Secondary values, e.g. a link title
    pub extra: BTreeMap<String, String>,
}

impl FieldValue {
    pub fn new(
        node_id: impl Into<String>,
        delta: impl Into<String>,
        field: Field,
        value: Option<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            delta: delta.into(),
            field,
            value,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Same value bound to another node
    pub fn rekeyed(&self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub node_type: String,
    pub uid: String,
    pub created: String,
    pub changed: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub body_format: Option<String>,
    /// Alias path of this node, e.g. `thing/42`
    pub alias: Option<String>,
    pub reads: Option<String>,
    pub last_read: Option<String>,
    pub tags: Vec<Tag>,
    pub values: Vec<FieldValue>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        uid: impl Into<String>,
        created: impl Into<String>,
        changed: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            uid: uid.into(),
            created: created.into(),
            changed: changed.into(),
            title: title.into(),
            summary: None,
            body: None,
            body_format: None,
            alias: None,
            reads: None,
            last_read: None,
            tags: Vec::new(),
            values: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: String,
    pub uid: String,
    pub path: String,
    pub mime_type: String,
    pub size: String,
}

/// URL rewrite rule from an internal path to a readable one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub id: String,
    /// Internal path, e.g. `node/42`
    pub path: String,
    pub alias: String,
}

impl Alias {
    pub fn new(id: impl Into<String>, path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            alias: alias.into(),
        }
    }
}

/// Everything one run extracts, renumbers and generates from
#[derive(Debug, Default, Clone)]
pub struct ContentGraph {
    pub tags: FxHashMap<String, Tag>,
    pub types: FxHashMap<String, ContentType>,
    pub nodes: FxHashMap<String, Node>,
    /// Field name to its values across all nodes
    pub values: FxHashMap<String, Vec<FieldValue>>,
    pub files: FxHashMap<String, File>,
    /// Node id to the file id of its primary image
    pub image_map: FxHashMap<String, String>,
    pub aliases: FxHashMap<String, Alias>,
}

impl ContentGraph {
    pub fn value_count(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    pub fn field_count(&self) -> usize {
        self.types.values().map(|t| t.fields.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_kind_parses_known_widgets() {
        assert_eq!(FieldKind::from_widget("nodereference"), FieldKind::NodeReference);
        assert_eq!(FieldKind::from_widget("link"), FieldKind::Link);
        assert_eq!(
            FieldKind::from_widget("optionwidgets"),
            FieldKind::Other("optionwidgets".to_string())
        );
        assert_eq!(FieldKind::from_widget("optionwidgets").as_str(), "optionwidgets");
    }

    #[test]
    fn rekeyed_value_keeps_payload() {
        let value = FieldValue::new(
            "10",
            "1",
            Field::new("website", FieldKind::Link),
            Some("https://example.org".to_string()),
        )
        .with_extra("title", "Example");

        let moved = value.rekeyed("3");
        assert_eq!(moved.node_id, "3");
        assert_eq!(moved.delta, "1");
        assert_eq!(moved.value.as_deref(), Some("https://example.org"));
        assert_eq!(moved.extra("title"), Some("Example"));
    }

    #[test]
    fn graph_counts_values_and_fields() {
        let mut graph = ContentGraph::default();
        let field = Field::new("rating", FieldKind::Number);
        let mut story = ContentType::new("story");
        story.fields.push(field.clone());
        graph.types.insert("story".to_string(), story);
        graph.values.insert(
            "rating".to_string(),
            vec![
                FieldValue::new("1", "0", field.clone(), Some("4".to_string())),
                FieldValue::new("2", "0", field, Some("5".to_string())),
            ],
        );

        assert_eq!(graph.field_count(), 1);
        assert_eq!(graph.value_count(), 2);
    }
}
