//! Renumbering of nodes, files and aliases into a new contiguous id space.
//!
//! Each pass sorts the old ids by numeric value, hands out sequential new ids in that
//! order and rewrites every reference to the renumbered entities:
//!
//! - node ids inside field values of node-reference fields
//! - node ids used as image-map keys, file ids used as image-map values
//! - `node/<id>` alias sources and `<link prefix>/<id>` alias targets
//! - `<a href="/<link prefix>/<id>"` links inside summaries and bodies
//!
//! A reference that cannot be resolved is recorded in the [`AnomalyReport`] and left
//! as it was.

use crate::anomaly::{AnomalyKind, AnomalyReport};
use crate::config::{
    ABSOLUTE_LINK_MARKER, FIRST_RENUMBERED_ID, INTERNAL_LINK_MARKER, INTERNAL_ROOT_LINK_MARKER,
    NODE_PATH_PREFIX,
};
use crate::models::{Alias, ContentGraph, FieldKind, FieldValue, File, Node};
use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Old id to new id within one id space
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdMap {
    map: FxHashMap<String, String>,
}

impl IdMap {
    /// Assigns `start, start + 1, ...` to `ids` in the given order. Fails when the
    /// range does not fit in a `u64`.
    pub fn sequential(ids: &[String], start: u64) -> Result<Self> {
        let count = u64::try_from(ids.len()).context("Too many ids to renumber")?;
        if start.checked_add(count).is_none() {
            bail!("Cannot assign {} ids starting at {}: range exceeds u64", count, start);
        }

        let mut map = FxHashMap::with_capacity_and_hasher(ids.len(), Default::default());
        let mut buf = itoa::Buffer::new();
        for (offset, id) in (0..count).zip(ids) {
            map.insert(id.clone(), buf.format(start + offset).to_string());
        }
        Ok(Self { map })
    }

    pub fn get(&self, old_id: &str) -> Option<&str> {
        self.map.get(old_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for IdMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// The three mappings produced by [`Renumberer::renumber_content`]
#[derive(Debug, Default, Clone)]
pub struct IdMaps {
    pub nodes: IdMap,
    pub files: IdMap,
    pub aliases: IdMap,
}

/// Orders decimal ids by value. Ids that are not numbers sort after all numeric ids.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Ids in numeric order; "9" comes before "100".
pub fn sorted_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().cloned().collect();
    ids.sort_by(|a, b| compare_ids(a, b));
    ids
}

/// Rewrites `<prefix>/<id>` through `map`. Other shapes pass through untouched.
pub fn convert_path(map: &IdMap, path: &str, prefix: &str, report: &mut AnomalyReport) -> String {
    let Some(old_id) = path
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
    else {
        return path.to_string();
    };

    match map.get(old_id) {
        Some(new_id) => format!("{}/{}", prefix, new_id),
        None => {
            report.record(AnomalyKind::UnresolvedPath, old_id, format!("path {}", path));
            path.to_string()
        }
    }
}

pub struct Renumberer {
    link_prefix: String,
    link_regex: Regex,
}

impl Renumberer {
    pub fn new(link_prefix: &str) -> Result<Self> {
        let pattern = format!(
            r#"{}{}/([^"]*)""#,
            regex::escape(ABSOLUTE_LINK_MARKER),
            regex::escape(link_prefix)
        );
        let link_regex = Regex::new(&pattern)
            .with_context(|| format!("Invalid link prefix: {}", link_prefix))?;
        Ok(Self {
            link_prefix: link_prefix.to_string(),
            link_regex,
        })
    }

    /// Renumbers nodes, then files, then aliases. An id range that overflows fails
    /// before anything is modified.
    pub fn renumber_content(
        &self,
        start_node: u64,
        graph: &mut ContentGraph,
        report: &mut AnomalyReport,
    ) -> Result<IdMaps> {
        let nodes = self.renumber_nodes(
            start_node,
            &mut graph.nodes,
            &mut graph.values,
            &mut graph.image_map,
            report,
        )?;
        let files = self.renumber_files(&mut graph.files, &mut graph.image_map, report)?;
        let aliases = self.renumber_aliases(&mut graph.aliases, &nodes, report)?;

        info!(
            nodes = nodes.len(),
            files = files.len(),
            aliases = aliases.len(),
            anomalies = report.len(),
            "Renumbering complete"
        );

        Ok(IdMaps {
            nodes,
            files,
            aliases,
        })
    }

    /// Gives nodes new ids from `start_id` and re-keys their field values and the
    /// image map. Returns the node mapping.
    pub fn renumber_nodes(
        &self,
        start_id: u64,
        nodes: &mut FxHashMap<String, Node>,
        values: &mut FxHashMap<String, Vec<FieldValue>>,
        image_map: &mut FxHashMap<String, String>,
        report: &mut AnomalyReport,
    ) -> Result<IdMap> {
        let ids = sorted_ids(nodes.keys());
        let node_map = IdMap::sequential(&ids, start_id)?;

        let mut renumbered = FxHashMap::with_capacity_and_hasher(nodes.len(), Default::default());
        for old_id in &ids {
            let (Some(node), Some(new_id)) = (nodes.remove(old_id), node_map.get(old_id)) else {
                continue;
            };
            let node = self.renumber_node(node, new_id, &node_map, report);
            renumbered.insert(new_id.to_string(), node);
        }
        *nodes = renumbered;

        renumber_values(values, &node_map, report);
        renumber_image_map(image_map, &node_map, report);

        debug!(nodes = node_map.len(), start_id, "Nodes renumbered");
        Ok(node_map)
    }

    fn renumber_node(
        &self,
        node: Node,
        new_id: &str,
        node_map: &IdMap,
        report: &mut AnomalyReport,
    ) -> Node {
        let alias = node
            .alias
            .as_deref()
            .map(|alias| convert_path(node_map, alias, &self.link_prefix, report));
        let summary = node.summary.as_deref().map(|text| {
            self.rewrite_links(node_map, text, &format!("summary of node {}", node.id), report)
        });
        let body = node.body.as_deref().map(|text| {
            self.rewrite_links(node_map, text, &format!("body of node {}", node.id), report)
        });
        // Unresolved references are reported once, by the per-field pass.
        let values = node
            .values
            .iter()
            .map(|value| rekey_value(value, new_id, node_map).0)
            .collect();

        Node {
            id: new_id.to_string(),
            alias,
            summary,
            body,
            values,
            ..node
        }
    }

    /// Gives files new ids from 1 and points the image map at them.
    pub fn renumber_files(
        &self,
        files: &mut FxHashMap<String, File>,
        image_map: &mut FxHashMap<String, String>,
        report: &mut AnomalyReport,
    ) -> Result<IdMap> {
        let mut nodes_by_file: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for node_id in sorted_ids(image_map.keys()) {
            if let Some(file_id) = image_map.get(&node_id) {
                nodes_by_file.entry(file_id.clone()).or_default().push(node_id);
            }
        }

        let ids = sorted_ids(files.keys());
        let file_map = IdMap::sequential(&ids, FIRST_RENUMBERED_ID)?;

        let mut renumbered = FxHashMap::with_capacity_and_hasher(files.len(), Default::default());
        let mut new_image_map =
            FxHashMap::with_capacity_and_hasher(image_map.len(), Default::default());
        for old_id in &ids {
            let (Some(file), Some(new_id)) = (files.remove(old_id), file_map.get(old_id)) else {
                continue;
            };
            match nodes_by_file.remove(old_id) {
                Some(node_ids) => {
                    for node_id in node_ids {
                        new_image_map.insert(node_id, new_id.to_string());
                    }
                }
                None => report.record(AnomalyKind::OrphanFile, old_id.as_str(), "files"),
            }
            renumbered.insert(
                new_id.to_string(),
                File {
                    id: new_id.to_string(),
                    ..file
                },
            );
        }

        for file_id in sorted_ids(nodes_by_file.keys()) {
            let node_ids = nodes_by_file.get(&file_id).map(|n| n.join(", ")).unwrap_or_default();
            report.record(
                AnomalyKind::UnknownFile,
                file_id.as_str(),
                format!("image map entry of node {}", node_ids),
            );
        }

        *files = renumbered;
        *image_map = new_image_map;

        debug!(files = file_map.len(), images = image_map.len(), "Files renumbered");
        Ok(file_map)
    }

    /// Gives aliases new ids from 1 and rewrites both of their paths.
    pub fn renumber_aliases(
        &self,
        aliases: &mut FxHashMap<String, Alias>,
        node_map: &IdMap,
        report: &mut AnomalyReport,
    ) -> Result<IdMap> {
        let ids = sorted_ids(aliases.keys());
        let alias_map = IdMap::sequential(&ids, FIRST_RENUMBERED_ID)?;

        let mut renumbered = FxHashMap::with_capacity_and_hasher(aliases.len(), Default::default());
        for old_id in &ids {
            let (Some(alias), Some(new_id)) = (aliases.remove(old_id), alias_map.get(old_id))
            else {
                continue;
            };
            let path = convert_path(node_map, &alias.path, NODE_PATH_PREFIX, report);
            let target = convert_path(node_map, &alias.alias, &self.link_prefix, report);
            renumbered.insert(new_id.to_string(), Alias::new(new_id, path, target));
        }
        *aliases = renumbered;

        debug!(aliases = alias_map.len(), "Aliases renumbered");
        Ok(alias_map)
    }

    /// Rewrites content links to renumbered nodes. Text without links comes back as is.
    pub fn renumber_paths(&self, node_map: &IdMap, text: &str, report: &mut AnomalyReport) -> String {
        self.rewrite_links(node_map, text, "text", report)
    }

    fn rewrite_links(
        &self,
        node_map: &IdMap,
        text: &str,
        context: &str,
        report: &mut AnomalyReport,
    ) -> String {
        let text = text
            .replace(INTERNAL_ROOT_LINK_MARKER, ABSOLUTE_LINK_MARKER)
            .replace(INTERNAL_LINK_MARKER, ABSOLUTE_LINK_MARKER);

        let rewritten = self.link_regex.replace_all(&text, |caps: &Captures| {
            let old_id = &caps[1];
            match node_map.get(old_id) {
                Some(new_id) => {
                    format!("{}{}/{}\"", ABSOLUTE_LINK_MARKER, self.link_prefix, new_id)
                }
                None => {
                    report.record(AnomalyKind::UnresolvedLink, old_id, context);
                    caps[0].to_string()
                }
            }
        });
        rewritten.into_owned()
    }
}

/// Binds `value` to `owner`. Node-reference payloads go through `node_map` too; the
/// flag is false when the payload had no new id and was kept as it was.
fn rekey_value(value: &FieldValue, owner: &str, node_map: &IdMap) -> (FieldValue, bool) {
    let mut rekeyed = value.rekeyed(owner);
    if value.field.kind != FieldKind::NodeReference {
        return (rekeyed, true);
    }
    match value.value.as_deref() {
        None => (rekeyed, true),
        Some(target) => match node_map.get(target) {
            Some(new_target) => {
                rekeyed.value = Some(new_target.to_string());
                (rekeyed, true)
            }
            None => (rekeyed, false),
        },
    }
}

fn renumber_values(
    values: &mut FxHashMap<String, Vec<FieldValue>>,
    node_map: &IdMap,
    report: &mut AnomalyReport,
) {
    let mut names: Vec<String> = values.keys().cloned().collect();
    names.sort();

    for name in names {
        let Some(field_values) = values.get_mut(&name) else {
            continue;
        };
        let mut renumbered = Vec::with_capacity(field_values.len());
        for value in field_values.iter() {
            let Some(owner) = node_map.get(&value.node_id) else {
                report.record(
                    AnomalyKind::UnknownNode,
                    value.node_id.as_str(),
                    format!("owner of field {} value {}", name, value.delta),
                );
                continue;
            };
            let (rekeyed, resolved) = rekey_value(value, owner, node_map);
            if !resolved {
                report.record(
                    AnomalyKind::UnknownNodeReference,
                    value.value.clone().unwrap_or_default(),
                    format!("field {} of node {}", name, value.node_id),
                );
            }
            renumbered.push(rekeyed);
        }
        *field_values = renumbered;
    }
}

fn renumber_image_map(
    image_map: &mut FxHashMap<String, String>,
    node_map: &IdMap,
    report: &mut AnomalyReport,
) {
    let mut renumbered = FxHashMap::with_capacity_and_hasher(image_map.len(), Default::default());
    for old_id in sorted_ids(image_map.keys()) {
        let Some(file_id) = image_map.get(&old_id) else {
            continue;
        };
        match node_map.get(&old_id) {
            Some(new_id) => {
                renumbered.insert(new_id.to_string(), file_id.clone());
            }
            None => report.record(AnomalyKind::UnmappedImageNode, old_id.as_str(), "image map"),
        }
    }
    *image_map = renumbered;
}
