use crate::anomaly::{AnomalyKind, AnomalyReport};
use crate::config::{
    target_format, DEFAULT_BODY_FORMAT, NODE_PATH_PREFIX, ORIGINAL_IMAGE_SIZE, SUMMARY_BREAK,
};
use crate::models::{
    Alias, ContentGraph, ContentType, Field, FieldKind, FieldValue, File, Node, Tag,
};
use crate::store::{RawRow, RawTable, TableStore};
use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

/// Projects the raw source tables into a [`ContentGraph`].
pub struct Extractor<'a> {
    store: &'a TableStore,
    prefix: String,
}

impl<'a> Extractor<'a> {
    pub fn new(store: &'a TableStore, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
        }
    }

    /// Runs every extraction step. Fails only when a table or required column is missing.
    pub fn extract_graph(&self, report: &mut AnomalyReport) -> Result<ContentGraph> {
        let tags = self.tags()?;
        info!(tags = tags.len(), "Tags extracted");

        let mut nodes = self.nodes(&tags, report)?;
        info!(nodes = nodes.len(), "Nodes extracted");

        let types = self.content_types(report)?;
        info!(
            types = types.len(),
            fields = types.values().map(|t| t.fields.len()).sum::<usize>(),
            "Content types extracted"
        );

        let aliases = self.aliases()?;
        info!(aliases = aliases.len(), "Aliases extracted");

        let values = self.field_values(&types, &mut nodes, report)?;
        info!(
            values = values.values().map(Vec::len).sum::<usize>(),
            "Field values extracted"
        );

        let files = self.files()?;
        info!(files = files.len(), "Files extracted");

        let image_map = self.image_map(&files, &nodes, report)?;
        info!(images = image_map.len(), "Image map extracted");

        Ok(ContentGraph {
            tags,
            types,
            nodes,
            values,
            files,
            image_map,
            aliases,
        })
    }

    pub fn tags(&self) -> Result<FxHashMap<String, Tag>> {
        let table = self.table("taxonomy_term_data")?;
        let mut tags = FxHashMap::default();
        for row in &table.rows {
            let tag = Tag {
                id: required(table, row, "tid")?,
                name: required(table, row, "name")?,
                description: row.owned("description"),
            };
            tags.insert(tag.id.clone(), tag);
        }
        Ok(tags)
    }

    pub fn content_types(&self, report: &mut AnomalyReport) -> Result<FxHashMap<String, ContentType>> {
        let table = self.table("node_type")?;
        let mut types = FxHashMap::default();
        for row in &table.rows {
            let name = required(table, row, "type")?;
            types.insert(name.clone(), ContentType::new(name));
        }

        let table = self.table("content_node_field_instance")?;
        for row in &table.rows {
            let type_name = required(table, row, "type_name")?;
            let Some(content_type) = types.get_mut(&type_name) else {
                report.record(AnomalyKind::UnknownContentType, type_name, table.name.as_str());
                continue;
            };
            let field_name = required(table, row, "field_name")?;
            let widget = required(table, row, "widget_module")?;
            content_type.fields.push(Field::new(
                strip_field_prefix(&field_name),
                FieldKind::from_widget(&widget),
            ));
        }
        Ok(types)
    }

    pub fn nodes(
        &self,
        tags: &FxHashMap<String, Tag>,
        report: &mut AnomalyReport,
    ) -> Result<FxHashMap<String, Node>> {
        let table = self.table("node")?;
        let mut nodes = FxHashMap::default();
        for row in &table.rows {
            let node = Node::new(
                required(table, row, "nid")?,
                required(table, row, "type")?,
                required(table, row, "uid")?,
                required(table, row, "created")?,
                required(table, row, "changed")?,
                required(table, row, "title")?,
            );
            nodes.insert(node.id.clone(), node);
        }

        self.add_content(&mut nodes, report)?;
        self.add_counts(&mut nodes, report)?;
        self.add_aliases(&mut nodes, report)?;
        self.add_tags(&mut nodes, tags, report)?;
        Ok(nodes)
    }

    fn add_content(&self, nodes: &mut FxHashMap<String, Node>, report: &mut AnomalyReport) -> Result<()> {
        let table = self.table("field_data_body")?;
        for row in &table.rows {
            let nid = required(table, row, "entity_id")?;
            let Some(node) = nodes.get_mut(&nid) else {
                report.record(AnomalyKind::UnknownNode, nid, table.name.as_str());
                continue;
            };

            let (summary, body) = match row.get("body_value") {
                Some(body) => match split_summary(body) {
                    Some((summary, body)) => (Some(summary), Some(body)),
                    None => (row.owned("summary_value"), Some(body.to_string())),
                },
                None => {
                    report.record(AnomalyKind::NullBody, nid.as_str(), table.name.as_str());
                    (row.owned("summary_value"), None)
                }
            };

            let format = row.get("body_format").unwrap_or(DEFAULT_BODY_FORMAT);
            if target_format(format).is_none() {
                report.record(
                    AnomalyKind::UnknownBodyFormat,
                    nid.as_str(),
                    format!("format \"{}\" in {}", format, table.name),
                );
            }

            node.summary = summary;
            node.body = body;
            node.body_format = Some(format.to_string());
        }
        Ok(())
    }

    fn add_counts(&self, nodes: &mut FxHashMap<String, Node>, report: &mut AnomalyReport) -> Result<()> {
        let table = self.table("node_counter")?;
        for row in &table.rows {
            let nid = required(table, row, "nid")?;
            match nodes.get_mut(&nid) {
                Some(node) => {
                    node.reads = row.owned("totalcount");
                    node.last_read = row.owned("timestamp");
                }
                None => report.record(AnomalyKind::UnknownNode, nid, table.name.as_str()),
            }
        }
        Ok(())
    }

    fn add_aliases(&self, nodes: &mut FxHashMap<String, Node>, report: &mut AnomalyReport) -> Result<()> {
        let table = self.table("url_alias")?;
        for row in &table.rows {
            let source = required(table, row, "source")?;
            let Some(nid) = source
                .strip_prefix(NODE_PATH_PREFIX)
                .and_then(|rest| rest.strip_prefix('/'))
            else {
                continue;
            };
            match nodes.get_mut(nid) {
                Some(node) => node.alias = row.owned("alias"),
                None => report.record(
                    AnomalyKind::UnknownNode,
                    nid,
                    format!("alias source in {}", table.name),
                ),
            }
        }
        Ok(())
    }

    fn add_tags(
        &self,
        nodes: &mut FxHashMap<String, Node>,
        tags: &FxHashMap<String, Tag>,
        report: &mut AnomalyReport,
    ) -> Result<()> {
        let table = self.table("taxonomy_index")?;
        for row in &table.rows {
            let nid = required(table, row, "nid")?;
            let tid = required(table, row, "tid")?;
            let Some(node) = nodes.get_mut(&nid) else {
                report.record(AnomalyKind::UnknownNode, nid, table.name.as_str());
                continue;
            };
            match tags.get(&tid) {
                Some(tag) => node.tags.push(tag.clone()),
                None => report.record(
                    AnomalyKind::UnknownTag,
                    tid,
                    format!("node {} in {}", nid, table.name),
                ),
            }
        }
        Ok(())
    }

    /// Reads `field_data_field_<name>` for each field. Values are attached to their
    /// node as well as returned per field name.
    pub fn field_values(
        &self,
        types: &FxHashMap<String, ContentType>,
        nodes: &mut FxHashMap<String, Node>,
        report: &mut AnomalyReport,
    ) -> Result<FxHashMap<String, Vec<FieldValue>>> {
        let mut names: Vec<&String> = types.keys().collect();
        names.sort();

        let mut values: FxHashMap<String, Vec<FieldValue>> = FxHashMap::default();
        for type_name in names {
            for field in &types[type_name].fields {
                if values.contains_key(&field.name) {
                    continue;
                }
                let table = self.table(&format!("field_data_field_{}", field.name))?;
                let mut seen = FxHashSet::default();
                let mut field_values = Vec::with_capacity(table.rows.len());

                for row in &table.rows {
                    let value = field_value(table, field, row)?;
                    let Some(node) = nodes.get_mut(&value.node_id) else {
                        report.record(
                            AnomalyKind::UnknownNode,
                            value.node_id.as_str(),
                            format!("value in {}", table.name),
                        );
                        continue;
                    };
                    if !seen.insert((value.node_id.clone(), value.delta.clone())) {
                        report.record(
                            AnomalyKind::DuplicateDelta,
                            value.node_id.as_str(),
                            format!("delta {} in {}", value.delta, table.name),
                        );
                        continue;
                    }
                    node.values.push(value.clone());
                    field_values.push(value);
                }

                values.insert(field.name.clone(), field_values);
            }
        }
        Ok(values)
    }

    pub fn aliases(&self) -> Result<FxHashMap<String, Alias>> {
        let table = self.table("url_alias")?;
        let mut aliases = FxHashMap::default();
        for row in &table.rows {
            let alias = Alias::new(
                required(table, row, "pid")?,
                required(table, row, "source")?,
                required(table, row, "alias")?,
            );
            aliases.insert(alias.id.clone(), alias);
        }
        Ok(aliases)
    }

    /// Full-size files only; thumbnails and previews are skipped.
    pub fn files(&self) -> Result<FxHashMap<String, File>> {
        let table = self.table("files")?;
        let mut files = FxHashMap::default();
        for row in table
            .rows
            .iter()
            .filter(|row| row.get("filename") == Some(ORIGINAL_IMAGE_SIZE))
        {
            let file = File {
                id: required(table, row, "fid")?,
                uid: required(table, row, "uid")?,
                path: required(table, row, "filepath")?,
                mime_type: required(table, row, "filemime")?,
                size: required(table, row, "filesize")?,
            };
            files.insert(file.id.clone(), file);
        }
        Ok(files)
    }

    pub fn image_map(
        &self,
        files: &FxHashMap<String, File>,
        nodes: &FxHashMap<String, Node>,
        report: &mut AnomalyReport,
    ) -> Result<FxHashMap<String, String>> {
        let table = self.table("image")?;
        let mut image_map = FxHashMap::default();
        for row in table
            .rows
            .iter()
            .filter(|row| row.get("image_size") == Some(ORIGINAL_IMAGE_SIZE))
        {
            let nid = required(table, row, "nid")?;
            let fid = required(table, row, "fid")?;
            if !nodes.contains_key(&nid) {
                report.record(AnomalyKind::UnknownNode, nid, format!("image in {}", table.name));
            } else if !files.contains_key(&fid) {
                report.record(AnomalyKind::UnknownFile, fid, format!("image of node {} in {}", nid, table.name));
            } else {
                image_map.insert(nid, fid);
            }
        }
        Ok(image_map)
    }

    fn table(&self, name: &str) -> Result<&'a RawTable> {
        let name = format!("{}{}", self.prefix, name);
        Ok(self.store.table(&name)?)
    }
}

fn required(table: &RawTable, row: &RawRow, column: &str) -> Result<String> {
    row.require(column)
        .map(str::to_string)
        .with_context(|| format!("Malformed row in {}", table.name))
}

fn strip_field_prefix(name: &str) -> &str {
    name.strip_prefix("field_").unwrap_or(name)
}

/// Splits an old-school `summary<!--break-->body`, trimming one CRLF on each side.
fn split_summary(body: &str) -> Option<(String, String)> {
    let (summary, body) = body.split_once(SUMMARY_BREAK)?;
    let summary = summary.strip_suffix("\r\n").unwrap_or(summary);
    let body = body.strip_prefix("\r\n").unwrap_or(body);
    Some((summary.to_string(), body.to_string()))
}

fn field_value(table: &RawTable, field: &Field, row: &RawRow) -> Result<FieldValue> {
    let key = match field.kind {
        FieldKind::Link => "url",
        FieldKind::NodeReference => "nid",
        _ => "value",
    };
    let prefix = format!("field_{}_", field.name);
    let mut value = FieldValue::new(
        required(table, row, "entity_id")?,
        required(table, row, "delta")?,
        field.clone(),
        row.owned(&format!("{}{}", prefix, key)),
    );
    if field.kind == FieldKind::Link {
        if let Some(title) = row.get(&format!("{}title", prefix)) {
            value = value.with_extra("title", title);
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RawTable;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs.iter().copied().collect()
    }

    fn table(name: &str, rows: Vec<RawRow>) -> RawTable {
        RawTable::new(format!("uhm_{}", name), rows)
    }

    /// Minimal dump with every table the extractor reads.
    fn base_tables() -> Vec<RawTable> {
        vec![
            table(
                "taxonomy_term_data",
                vec![row(&[("tid", "1"), ("name", "Rust"), ("description", "Systems")])],
            ),
            table("node_type", vec![row(&[("type", "story")])]),
            table(
                "content_node_field_instance",
                vec![
                    row(&[("type_name", "story"), ("field_name", "field_website"), ("widget_module", "link")]),
                    row(&[("type_name", "story"), ("field_name", "field_related"), ("widget_module", "nodereference")]),
                    row(&[("type_name", "blog"), ("field_name", "field_mood"), ("widget_module", "text")]),
                ],
            ),
            table(
                "node",
                vec![
                    row(&[("nid", "10"), ("type", "story"), ("uid", "1"), ("created", "100"), ("changed", "200"), ("title", "Ten")]),
                    row(&[("nid", "20"), ("type", "story"), ("uid", "1"), ("created", "300"), ("changed", "400"), ("title", "Twenty")]),
                ],
            ),
            table(
                "field_data_body",
                vec![
                    row(&[("entity_id", "10"), ("body_value", "Teaser\r\n<!--break-->\r\nRest"), ("body_format", "1")]),
                    row(&[("entity_id", "20"), ("body_value", "Plain"), ("summary_value", "Short"), ("body_format", "7")]),
                    row(&[("entity_id", "30"), ("body_value", "Lost")]),
                ],
            ),
            table(
                "node_counter",
                vec![row(&[("nid", "10"), ("totalcount", "5"), ("timestamp", "999")])],
            ),
            table(
                "url_alias",
                vec![
                    row(&[("pid", "1"), ("source", "node/10"), ("alias", "thing/10")]),
                    row(&[("pid", "2"), ("source", "taxonomy/term/1"), ("alias", "tags/rust")]),
                    row(&[("pid", "3"), ("source", "node/55"), ("alias", "gone")]),
                ],
            ),
            table(
                "taxonomy_index",
                vec![
                    row(&[("nid", "10"), ("tid", "1")]),
                    row(&[("nid", "20"), ("tid", "9")]),
                ],
            ),
            table(
                "field_data_field_website",
                vec![
                    row(&[("entity_id", "10"), ("delta", "0"), ("field_website_url", "https://example.org"), ("field_website_title", "Example")]),
                    row(&[("entity_id", "10"), ("delta", "0"), ("field_website_url", "https://dup.example.org")]),
                ],
            ),
            table(
                "field_data_field_related",
                vec![
                    row(&[("entity_id", "20"), ("delta", "0"), ("field_related_nid", "10")]),
                    row(&[("entity_id", "99"), ("delta", "0"), ("field_related_nid", "10")]),
                ],
            ),
            table(
                "files",
                vec![
                    row(&[("fid", "5"), ("uid", "1"), ("filename", "_original"), ("filepath", "uhm/images/a.jpg"), ("filemime", "image/jpeg"), ("filesize", "100")]),
                    row(&[("fid", "6"), ("uid", "1"), ("filename", "thumbnail"), ("filepath", "uhm/images/a.thumb.jpg"), ("filemime", "image/jpeg"), ("filesize", "10")]),
                ],
            ),
            table(
                "image",
                vec![
                    row(&[("nid", "20"), ("fid", "5"), ("image_size", "_original")]),
                    row(&[("nid", "20"), ("fid", "6"), ("image_size", "thumbnail")]),
                    row(&[("nid", "10"), ("fid", "77"), ("image_size", "_original")]),
                ],
            ),
        ]
    }

    fn extract() -> (ContentGraph, AnomalyReport) {
        let store = TableStore::from_tables(base_tables());
        let mut report = AnomalyReport::new();
        let graph = Extractor::new(&store, "uhm_").extract_graph(&mut report).unwrap();
        (graph, report)
    }

    #[test]
    fn summary_break_splits_body() {
        let (graph, _) = extract();
        let node = &graph.nodes["10"];
        assert_eq!(node.summary.as_deref(), Some("Teaser"));
        assert_eq!(node.body.as_deref(), Some("Rest"));
        assert_eq!(node.body_format.as_deref(), Some("1"));
    }

    #[test]
    fn summary_column_used_without_break() {
        let (graph, report) = extract();
        let node = &graph.nodes["20"];
        assert_eq!(node.summary.as_deref(), Some("Short"));
        assert_eq!(node.body.as_deref(), Some("Plain"));
        assert_eq!(report.count(AnomalyKind::UnknownBodyFormat), 1);
    }

    #[test]
    fn counts_aliases_and_tags_attach_to_nodes() {
        let (graph, report) = extract();
        let node = &graph.nodes["10"];
        assert_eq!(node.reads.as_deref(), Some("5"));
        assert_eq!(node.last_read.as_deref(), Some("999"));
        assert_eq!(node.alias.as_deref(), Some("thing/10"));
        assert_eq!(node.tags.len(), 1);
        assert_eq!(node.tags[0].name, "Rust");
        assert!(graph.nodes["20"].tags.is_empty());
        assert_eq!(report.count(AnomalyKind::UnknownTag), 1);
    }

    #[test]
    fn field_prefix_is_stripped_and_kind_parsed() {
        let (graph, report) = extract();
        let story = &graph.types["story"];
        assert_eq!(story.fields.len(), 2);
        assert_eq!(story.fields[0], Field::new("website", FieldKind::Link));
        assert_eq!(story.fields[1].kind, FieldKind::NodeReference);
        assert_eq!(report.count(AnomalyKind::UnknownContentType), 1);
    }

    #[test]
    fn link_values_carry_title() {
        let (graph, report) = extract();
        let website = &graph.values["website"];
        assert_eq!(website.len(), 1);
        assert_eq!(website[0].value.as_deref(), Some("https://example.org"));
        assert_eq!(website[0].extra("title"), Some("Example"));
        assert_eq!(report.count(AnomalyKind::DuplicateDelta), 1);
    }

    #[test]
    fn values_attach_to_owning_nodes_only() {
        let (graph, _) = extract();
        let related = &graph.values["related"];
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].value.as_deref(), Some("10"));
        assert_eq!(graph.nodes["20"].values, *related);
        assert!(graph.nodes["10"].values.iter().all(|v| v.node_id == "10"));
    }

    #[test]
    fn only_original_files_and_known_images_are_kept() {
        let (graph, report) = extract();
        assert_eq!(graph.files.len(), 1);
        assert!(graph.files.contains_key("5"));
        assert_eq!(graph.image_map.len(), 1);
        assert_eq!(graph.image_map.get("20").map(String::as_str), Some("5"));
        assert_eq!(report.count(AnomalyKind::UnknownFile), 1);
    }

    #[test]
    fn unknown_nodes_are_reported_per_table() {
        let (_, report) = extract();
        let unknown: Vec<_> = report.of_kind(AnomalyKind::UnknownNode).collect();
        // body row for 30, alias source node/55, value owner 99
        assert_eq!(unknown.len(), 3);
        assert!(unknown.iter().any(|a| a.id == "30" && a.context == "uhm_field_data_body"));
        assert!(unknown.iter().any(|a| a.id == "55"));
        assert!(unknown.iter().any(|a| a.id == "99"));
    }

    #[test]
    fn all_aliases_are_extracted() {
        let (graph, _) = extract();
        assert_eq!(graph.aliases.len(), 3);
        assert_eq!(graph.aliases["2"].path, "taxonomy/term/1");
    }

    #[test]
    fn missing_table_is_fatal() {
        let mut tables = base_tables();
        tables.retain(|t| t.name != "uhm_node_counter");
        let store = TableStore::from_tables(tables);
        let mut report = AnomalyReport::new();

        let err = Extractor::new(&store, "uhm_")
            .extract_graph(&mut report)
            .unwrap_err();
        assert!(err.to_string().contains("uhm_node_counter"));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let mut tables = base_tables();
        tables.push(table("taxonomy_term_data", vec![row(&[("name", "No id")])]));
        let store = TableStore::from_tables(tables);

        let err = Extractor::new(&store, "uhm_").tags().unwrap_err();
        assert!(format!("{:#}", err).contains("tid"));
    }

    #[test]
    fn split_summary_trims_one_crlf() {
        assert_eq!(
            split_summary("A\r\n\r\n<!--break-->\r\nB"),
            Some(("A\r\n".to_string(), "B".to_string()))
        );
        assert_eq!(split_summary("no break"), None);
    }
}
