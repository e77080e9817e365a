//! Projection of the renumbered content graph into the target table layout.

use crate::anomaly::{AnomalyKind, AnomalyReport};
use crate::config::{target_format, LANG_CODE};
use crate::models::{
    Alias, ContentGraph, ContentType, Field, FieldKind, FieldValue, File, Node, Tag,
};
use crate::renumber::{compare_ids, sorted_ids};
use anyhow::{bail, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};
use uuid::Uuid;

const PICTURE_TYPE: &str = "picture";
const TAG_VOCABULARY: &str = "tags";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Number,
    Text,
    /// Text that may carry markup and stray control characters
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Cell values in column order; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone)]
pub struct GeneratedTable {
    pub database: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl GeneratedTable {
    pub fn new(database: &str, name: &str, columns: Vec<Column>) -> Self {
        Self {
            database: database.to_string(),
            name: name.to_string(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "Row for {} has {} values, expected {}",
                self.name,
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell of `row` in the named column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }
}

type Getter<'a, T> = Box<dyn Fn(&T) -> Option<String> + 'a>;

/// Column definitions plus how to read each one from an entity
struct Columns<'a, T> {
    specs: Vec<(Column, Getter<'a, T>)>,
}

impl<'a, T> Columns<'a, T> {
    fn new() -> Self {
        Self { specs: Vec::new() }
    }

    fn add(
        mut self,
        name: &str,
        kind: ColumnKind,
        value: impl Fn(&T) -> Option<String> + 'a,
    ) -> Self {
        self.specs.push((
            Column {
                name: name.to_string(),
                kind,
            },
            Box::new(value),
        ));
        self
    }

    fn number(self, name: &str, value: impl Fn(&T) -> Option<String> + 'a) -> Self {
        self.add(name, ColumnKind::Number, value)
    }

    fn text(self, name: &str, value: impl Fn(&T) -> Option<String> + 'a) -> Self {
        self.add(name, ColumnKind::Text, value)
    }

    fn html(self, name: &str, value: impl Fn(&T) -> Option<String> + 'a) -> Self {
        self.add(name, ColumnKind::Html, value)
    }
}

fn val(s: &str) -> Option<String> {
    Some(s.to_string())
}

fn uuid() -> Option<String> {
    Some(Uuid::new_v4().to_string())
}

/// Values ordered by an entity map's numeric ids
fn ordered<V>(map: &FxHashMap<String, V>) -> Vec<&V> {
    sorted_ids(map.keys())
        .iter()
        .filter_map(|id| map.get(id))
        .collect()
}

/// Target bundle name for a source node type
pub fn map_node_type(node_type: &str) -> &str {
    match node_type {
        "story" => "article",
        "image" => PICTURE_TYPE,
        other => other,
    }
}

/// Field tables whose name ends in `_scor` get the missing `e`.
pub fn output_field_name(name: &str) -> String {
    if name.ends_with("_scor") {
        format!("{}e", name)
    } else {
        name.to_string()
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// `public://` plus the path without its first segment (the old site directory).
fn file_uri(path: &str) -> String {
    let rest = path.split_once('/').map(|(_, rest)| rest).unwrap_or(path);
    format!("public://{}", rest)
}

struct TagLink<'g> {
    node: &'g Node,
    tag: &'g Tag,
    delta: usize,
}

struct FileUse<'g> {
    node: &'g Node,
    file: &'g File,
}

pub struct Generator {
    database: String,
    prefix: String,
}

impl Generator {
    pub fn new(database: &str, prefix: &str) -> Self {
        Self {
            database: database.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Builds every target table, in insertion order.
    pub fn generate(
        &self,
        graph: &ContentGraph,
        report: &mut AnomalyReport,
    ) -> Result<Vec<GeneratedTable>> {
        let (picture_type, pictures) = self.prepare_pictures(graph, report);

        let mut tables = Vec::new();
        self.add_tags(graph, &mut tables)?;
        self.add_nodes(graph, &mut tables)?;
        self.add_node_tags(graph, &mut tables)?;
        self.add_counts(graph, &mut tables)?;
        self.add_aliases(graph, &mut tables)?;
        self.add_files(graph, &mut tables, report)?;
        self.add_values(graph, picture_type, pictures, &mut tables, report)?;

        info!(
            tables = tables.len(),
            rows = tables.iter().map(|t| t.rows.len()).sum::<usize>(),
            "Target tables generated"
        );
        Ok(tables)
    }

    fn build<'e, T: 'e>(
        &self,
        name: &str,
        entities: impl IntoIterator<Item = &'e T>,
        columns: Columns<'_, T>,
    ) -> Result<GeneratedTable> {
        let name = format!("{}{}", self.prefix, name);
        let (defs, getters): (Vec<Column>, Vec<Getter<'_, T>>) = columns.specs.into_iter().unzip();
        let mut table = GeneratedTable::new(&self.database, &name, defs);
        for entity in entities {
            table.push_row(getters.iter().map(|get| get(entity)).collect())?;
        }
        debug!(table = %table.name, rows = table.rows.len(), "Table generated");
        Ok(table)
    }

    /// Turns the image map into values of a synthetic `picture` image field.
    fn prepare_pictures(
        &self,
        graph: &ContentGraph,
        report: &mut AnomalyReport,
    ) -> (ContentType, Vec<FieldValue>) {
        let field = Field::new(PICTURE_TYPE, FieldKind::Image);
        let mut picture = ContentType::new(PICTURE_TYPE);
        picture.fields.push(field.clone());

        let mut pictures = Vec::with_capacity(graph.image_map.len());
        for node_id in sorted_ids(graph.image_map.keys()) {
            let Some(file_id) = graph.image_map.get(&node_id) else {
                continue;
            };
            match graph.nodes.get(&node_id) {
                Some(node) => pictures.push(
                    FieldValue::new(node_id.as_str(), "0", field.clone(), Some(file_id.clone()))
                        .with_extra("title", node.title.as_str()),
                ),
                None => report.record(AnomalyKind::UnknownNode, node_id.as_str(), "image map"),
            }
        }
        (picture, pictures)
    }

    fn add_tags(&self, graph: &ContentGraph, tables: &mut Vec<GeneratedTable>) -> Result<()> {
        let tags = ordered(&graph.tags);

        let columns = Columns::<Tag>::new()
            .number("tid", |t| val(&t.id))
            .number("revision_id", |t| val(&t.id))
            .text("vid", |_| val(TAG_VOCABULARY))
            .text("uuid", |_| uuid())
            .text("langcode", |_| val(LANG_CODE));
        tables.push(self.build("taxonomy_term_data", tags.iter().copied(), columns)?);

        let columns = Columns::<Tag>::new()
            .number("tid", |t| val(&t.id))
            .number("revision_id", |t| val(&t.id))
            .text("langcode", |_| val(LANG_CODE))
            .number("revision_user", |_| None)
            .number("revision_created", |_| val("0"))
            .number("revision_log_message", |_| None)
            .number("revision_default", |_| val("1"));
        tables.push(self.build("taxonomy_term_revision", tags.iter().copied(), columns)?);

        let columns = Columns::<Tag>::new()
            .number("tid", |t| val(&t.id))
            .number("revision_id", |t| val(&t.id))
            .text("vid", |_| val(TAG_VOCABULARY))
            .text("langcode", |_| val(LANG_CODE))
            .number("status", |_| val("1"))
            .text("name", |t| val(&t.name))
            .text("description__value", |t| t.description.clone())
            .text("description__format", |_| None)
            .number("weight", |_| val("1"))
            .number("changed", |_| val("0"))
            .number("default_langcode", |_| val("1"))
            .number("revision_translation_affected", |_| val("1"));
        tables.push(self.build("taxonomy_term_field_data", tags.iter().copied(), columns)?);

        let columns = Columns::<Tag>::new()
            .number("tid", |t| val(&t.id))
            .number("revision_id", |t| val(&t.id))
            .text("langcode", |_| val(LANG_CODE))
            .number("status", |_| val("1"))
            .text("name", |t| val(&t.name))
            .text("description__value", |t| t.description.clone())
            .text("description__format", |_| None)
            .number("changed", |_| val("0"))
            .number("default_langcode", |_| val("1"));
        tables.push(self.build("taxonomy_term_field_revision", tags.iter().copied(), columns)?);

        for name in ["taxonomy_term__parent", "taxonomy_term_revision__parent"] {
            let columns = Columns::<Tag>::new()
                .text("bundle", |_| val(TAG_VOCABULARY))
                .number("deleted", |_| val("0"))
                .number("entity_id", |t| val(&t.id))
                .number("revision_id", |t| val(&t.id))
                .text("langcode", |_| val(LANG_CODE))
                .number("delta", |_| val("0"))
                .number("parent_target_id", |_| val("0"));
            tables.push(self.build(name, tags.iter().copied(), columns)?);
        }
        Ok(())
    }

    fn add_nodes(&self, graph: &ContentGraph, tables: &mut Vec<GeneratedTable>) -> Result<()> {
        let nodes = ordered(&graph.nodes);

        let columns = Columns::<Node>::new()
            .number("nid", |n| val(&n.id))
            .number("vid", |n| val(&n.id))
            .text("type", |n| val(map_node_type(&n.node_type)))
            .text("uuid", |_| uuid())
            .text("langcode", |_| val(LANG_CODE));
        tables.push(self.build("node", nodes.iter().copied(), columns)?);

        let columns = Columns::<Node>::new()
            .number("nid", |n| val(&n.id))
            .number("vid", |n| val(&n.id))
            .text("langcode", |_| val(LANG_CODE))
            .number("revision_uid", |n| val(&n.uid))
            .number("revision_timestamp", |n| val(&n.created))
            .number("revision_log", |_| None)
            .number("revision_default", |_| val("1"));
        tables.push(self.build("node_revision", nodes.iter().copied(), columns)?);

        for name in ["node_field_data", "node_field_revision"] {
            let mut columns = Columns::<Node>::new()
                .number("nid", |n| val(&n.id))
                .number("vid", |n| val(&n.id));
            if name == "node_field_data" {
                columns = columns.text("type", |n| val(map_node_type(&n.node_type)));
            }
            let columns = columns
                .text("langcode", |_| val(LANG_CODE))
                .number("status", |_| val("1"))
                .number("uid", |n| val(&n.uid))
                .html("title", |n| val(&n.title))
                .number("created", |n| val(&n.created))
                .number("changed", |n| val(&n.changed))
                .number("promote", |_| val("1"))
                .number("sticky", |_| val("0"))
                .number("default_langcode", |_| val("1"))
                .number("revision_translation_affected", |_| val("1"));
            tables.push(self.build(name, nodes.iter().copied(), columns)?);
        }

        for name in ["node__body", "node_revision__body"] {
            let columns = Columns::<Node>::new()
                .text("bundle", |n| val(map_node_type(&n.node_type)))
                .number("deleted", |_| val("0"))
                .number("entity_id", |n| val(&n.id))
                .number("revision_id", |n| val(&n.id))
                .text("langcode", |_| val(LANG_CODE))
                .number("delta", |_| val("0"))
                .html("body_value", |n| n.body.clone())
                .html("body_summary", |n| n.summary.clone())
                .text("body_format", |n| {
                    n.body_format.as_deref().and_then(target_format).map(str::to_string)
                });
            tables.push(self.build(name, nodes.iter().copied(), columns)?);
        }
        Ok(())
    }

    fn add_node_tags(&self, graph: &ContentGraph, tables: &mut Vec<GeneratedTable>) -> Result<()> {
        let links: Vec<TagLink<'_>> = ordered(&graph.nodes)
            .into_iter()
            .flat_map(|node| {
                node.tags
                    .iter()
                    .enumerate()
                    .map(move |(delta, tag)| TagLink { node, tag, delta })
            })
            .collect();

        let columns = Columns::<TagLink<'_>>::new()
            .number("nid", |l| val(&l.node.id))
            .number("tid", |l| val(&l.tag.id))
            .number("status", |_| val("1"))
            .number("sticky", |_| val("0"))
            .number("created", |l| val(&l.node.created));
        tables.push(self.build("taxonomy_index", links.iter(), columns)?);

        let columns = Columns::<TagLink<'_>>::new()
            .text("bundle", |l| val(map_node_type(&l.node.node_type)))
            .number("deleted", |_| val("0"))
            .number("entity_id", |l| val(&l.node.id))
            .number("revision_id", |l| val(&l.node.id))
            .text("langcode", |_| val(LANG_CODE))
            .number("delta", |l| Some(l.delta.to_string()))
            .number("field_tags_target_id", |l| val(&l.tag.id));
        tables.push(self.build("node__field_tags", links.iter(), columns)?);
        Ok(())
    }

    fn add_counts(&self, graph: &ContentGraph, tables: &mut Vec<GeneratedTable>) -> Result<()> {
        let columns = Columns::<Node>::new()
            .number("nid", |n| val(&n.id))
            .number("totalcount", |n| val(n.reads.as_deref().unwrap_or("0")))
            .number("daycount", |_| val("0"))
            .number("timestamp", |n| val(n.last_read.as_deref().unwrap_or("0")));
        tables.push(self.build("node_counter", ordered(&graph.nodes), columns)?);
        Ok(())
    }

    /// Target paths carry a leading `/` that the source paths lack.
    fn add_aliases(&self, graph: &ContentGraph, tables: &mut Vec<GeneratedTable>) -> Result<()> {
        let aliases = ordered(&graph.aliases);

        let columns = Columns::<Alias>::new()
            .number("id", |a| val(&a.id))
            .number("revision_id", |a| val(&a.id))
            .text("uuid", |_| uuid())
            .text("langcode", |_| val(LANG_CODE))
            .text("path", |a| Some(format!("/{}", a.path)))
            .text("alias", |a| Some(format!("/{}", a.alias)))
            .number("status", |_| val("1"));
        tables.push(self.build("path_alias", aliases.iter().copied(), columns)?);

        let columns = Columns::<Alias>::new()
            .number("id", |a| val(&a.id))
            .number("revision_id", |a| val(&a.id))
            .text("langcode", |_| val(LANG_CODE))
            .text("path", |a| Some(format!("/{}", a.path)))
            .text("alias", |a| Some(format!("/{}", a.alias)))
            .number("status", |_| val("1"))
            .number("revision_default", |_| val("1"));
        tables.push(self.build("path_alias_revision", aliases.iter().copied(), columns)?);
        Ok(())
    }

    fn add_files(
        &self,
        graph: &ContentGraph,
        tables: &mut Vec<GeneratedTable>,
        report: &mut AnomalyReport,
    ) -> Result<()> {
        let columns = Columns::<File>::new()
            .number("fid", |f| val(&f.id))
            .text("uuid", |_| uuid())
            .text("langcode", |_| val(LANG_CODE))
            .number("uid", |f| val(&f.uid))
            .text("filename", |f| val(file_name(&f.path)))
            .text("uri", |f| Some(file_uri(&f.path)))
            .text("filemime", |f| val(&f.mime_type))
            .number("filesize", |f| val(&f.size))
            .number("status", |_| val("1"))
            .number("created", |_| val("0"))
            .number("changed", |_| val("0"));
        tables.push(self.build("file_managed", ordered(&graph.files), columns)?);

        let mut uses = Vec::with_capacity(graph.image_map.len());
        for node_id in sorted_ids(graph.image_map.keys()) {
            let Some(file_id) = graph.image_map.get(&node_id) else {
                continue;
            };
            match (graph.nodes.get(&node_id), graph.files.get(file_id)) {
                (Some(node), Some(file)) => uses.push(FileUse { node, file }),
                (None, _) => report.record(AnomalyKind::UnknownNode, node_id.as_str(), "file usage"),
                (_, None) => report.record(
                    AnomalyKind::UnknownFile,
                    file_id.as_str(),
                    format!("file usage of node {}", node_id),
                ),
            }
        }

        let columns = Columns::<FileUse<'_>>::new()
            .number("fid", |u| val(&u.file.id))
            .text("module", |_| val("file"))
            .text("type", |_| val("node"))
            .number("id", |u| val(&u.node.id))
            .number("count", |_| val("1"));
        tables.push(self.build("file_usage", uses.iter(), columns)?);
        Ok(())
    }

    /// One `node__field_<name>` table per distinct field name. The image-map
    /// `picture` table comes first and owns its name.
    fn add_values(
        &self,
        graph: &ContentGraph,
        picture_type: ContentType,
        pictures: Vec<FieldValue>,
        tables: &mut Vec<GeneratedTable>,
        report: &mut AnomalyReport,
    ) -> Result<()> {
        for field in &picture_type.fields {
            tables.push(self.field_table(graph, &picture_type, field, &pictures, report)?);
        }

        let mut types: Vec<&ContentType> = graph
            .types
            .values()
            .filter(|t| t.name != PICTURE_TYPE)
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));

        let mut seen = FxHashSet::default();
        for content_type in types {
            for field in &content_type.fields {
                if field.name == PICTURE_TYPE {
                    report.record(
                        AnomalyKind::FieldNameClash,
                        field.name.as_str(),
                        format!("field of type {} collides with the image field", content_type.name),
                    );
                    continue;
                }
                if !seen.insert(field.name.as_str()) {
                    continue;
                }
                let values = graph.values.get(&field.name).map(Vec::as_slice).unwrap_or_default();
                tables.push(self.field_table(graph, content_type, field, values, report)?);
            }
        }
        Ok(())
    }

    fn field_table(
        &self,
        graph: &ContentGraph,
        content_type: &ContentType,
        field: &Field,
        values: &[FieldValue],
        report: &mut AnomalyReport,
    ) -> Result<GeneratedTable> {
        let mut values: Vec<&FieldValue> = values.iter().collect();
        values.sort_by(|a, b| {
            compare_ids(&a.node_id, &b.node_id).then_with(|| compare_ids(&a.delta, &b.delta))
        });

        let columns = self.value_columns(graph, content_type, field, report);
        let name = format!("node__field_{}", output_field_name(&field.name));
        self.build(&name, values, columns)
    }

    fn value_columns<'g>(
        &self,
        graph: &'g ContentGraph,
        content_type: &'g ContentType,
        field: &Field,
        report: &mut AnomalyReport,
    ) -> Columns<'g, FieldValue> {
        let bundle = move |v: &FieldValue| {
            let node_type = graph
                .nodes
                .get(&v.node_id)
                .map(|n| n.node_type.as_str())
                .unwrap_or(content_type.name.as_str());
            val(map_node_type(node_type))
        };
        let columns = Columns::<FieldValue>::new()
            .text("bundle", bundle)
            .number("deleted", |_| val("0"))
            .number("entity_id", |v| val(&v.node_id))
            .number("revision_id", |v| val(&v.node_id))
            .text("langcode", |_| val(LANG_CODE))
            .number("delta", |v| val(&v.delta));

        let prefix = format!("field_{}_", output_field_name(&field.name));
        let column = |suffix: &str| format!("{}{}", prefix, suffix);
        let value = |v: &FieldValue| v.value.clone();
        let title = |v: &FieldValue| v.extra("title").map(str::to_string);

        match &field.kind {
            FieldKind::Link => columns
                .html(&column("uri"), value)
                .html(&column("title"), title)
                .text(&column("options"), |_| val("a:0:{}")),
            FieldKind::Image => columns
                .number(&column("target_id"), value)
                .html(&column("alt"), title)
                .html(&column("title"), title)
                .number(&column("width"), |_| None)
                .number(&column("height"), |_| None),
            FieldKind::Number => columns.number(&column("value"), value),
            FieldKind::Date => columns.text(&column("value"), value),
            FieldKind::Text => columns.html(&column("value"), value),
            FieldKind::NodeReference => columns.number(&column("target_id"), value),
            FieldKind::Other(kind) => {
                report.record(
                    AnomalyKind::UnknownFieldType,
                    field.name.as_str(),
                    format!("field type {}", kind),
                );
                columns.text(&column("value"), value)
            }
        }
    }
}
