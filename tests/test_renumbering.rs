//! Identity-preservation properties of a full renumbering pass over a built graph.

use rustc_hash::FxHashSet;
use theseus::anomaly::{AnomalyKind, AnomalyReport};
use theseus::models::{Alias, ContentGraph, Field, FieldKind, FieldValue, File, Node};
use theseus::renumber::{IdMap, IdMaps, Renumberer};

const OLD_IDS: &[&str] = &["9", "100", "2", "57", "1000", "31"];

fn graph() -> ContentGraph {
    let mut graph = ContentGraph::default();
    let related = Field::new("related", FieldKind::NodeReference);

    for (i, id) in OLD_IDS.iter().enumerate() {
        let next = OLD_IDS[(i + 1) % OLD_IDS.len()];
        let value = FieldValue::new(*id, "0", related.clone(), Some(next.to_string()));

        let mut node = Node::new(*id, "story", "1", "0", "0", format!("Node {}", id));
        node.body = Some(format!("Next: <a href=\"/thing/{}\">{}</a>", next, next));
        node.values.push(value.clone());
        graph.nodes.insert(id.to_string(), node);
        graph.values.entry("related".to_string()).or_default().push(value);

        graph.aliases.insert(
            format!("{}", i + 40),
            Alias::new(format!("{}", i + 40), format!("node/{}", id), format!("thing/{}", id)),
        );
    }

    for (fid, nid) in [("70", "100"), ("8", "2")] {
        graph.files.insert(
            fid.to_string(),
            File {
                id: fid.to_string(),
                uid: "1".to_string(),
                path: format!("uhm/images/{}.jpg", fid),
                mime_type: "image/jpeg".to_string(),
                size: "1".to_string(),
            },
        );
        graph.image_map.insert(nid.to_string(), fid.to_string());
    }
    graph
}

fn renumber(graph: &mut ContentGraph) -> (IdMaps, AnomalyReport) {
    let mut report = AnomalyReport::new();
    let renumberer = Renumberer::new("thing").unwrap();
    let maps = renumberer.renumber_content(3, graph, &mut report).unwrap();
    (maps, report)
}

fn inverse(map: &IdMap) -> IdMap {
    map.iter().map(|(old, new)| (new, old)).collect()
}

#[test]
fn node_map_is_bijective_and_order_preserving() {
    let mut graph = graph();
    let (maps, report) = renumber(&mut graph);

    assert!(report.is_empty());
    let new_ids: FxHashSet<&str> = maps.nodes.iter().map(|(_, new)| new).collect();
    assert_eq!(new_ids.len(), OLD_IDS.len());
    for expected in 3..3 + OLD_IDS.len() {
        assert!(new_ids.contains(expected.to_string().as_str()));
    }

    let mut pairs: Vec<(u64, u64)> = maps
        .nodes
        .iter()
        .map(|(old, new)| (old.parse().unwrap(), new.parse().unwrap()))
        .collect();
    pairs.sort();
    assert!(pairs.windows(2).all(|w| w[0].1 < w[1].1));
    assert_eq!(maps.nodes.get("2"), Some("3"));
    assert_eq!(maps.nodes.get("9"), Some("4"));
    assert_eq!(maps.nodes.get("100"), Some("7"));
}

#[test]
fn every_reference_still_points_at_the_same_node() {
    let original = graph();
    let mut graph = original.clone();
    let (maps, _) = renumber(&mut graph);
    let back = inverse(&maps.nodes);

    for value in &graph.values["related"] {
        let old_owner = back.get(&value.node_id).unwrap();
        let old_target = back.get(value.value.as_deref().unwrap()).unwrap();
        let before = original.values["related"]
            .iter()
            .find(|v| v.node_id == old_owner)
            .unwrap();
        assert_eq!(before.value.as_deref(), Some(old_target));
    }

    for node in graph.nodes.values() {
        let old_id = back.get(&node.id).unwrap();
        assert_eq!(node.title, format!("Node {}", old_id));
        assert_eq!(node.values.len(), 1);
        assert_eq!(node.values[0].node_id, node.id);
    }
}

#[test]
fn body_links_and_aliases_follow_the_mapping() {
    let mut graph = graph();
    let (maps, _) = renumber(&mut graph);

    let last = maps.nodes.get("31").unwrap();
    assert_eq!(
        graph.nodes[last].body.as_deref(),
        Some("Next: <a href=\"/thing/4\">9</a>")
    );

    for alias in graph.aliases.values() {
        let id = alias.path.strip_prefix("node/").unwrap();
        assert!(graph.nodes.contains_key(id));
        assert_eq!(alias.alias, format!("thing/{}", id));
    }
}

#[test]
fn image_map_points_at_renumbered_files() {
    let mut graph = graph();
    let (maps, report) = renumber(&mut graph);

    assert_eq!(maps.files.get("8"), Some("1"));
    assert_eq!(maps.files.get("70"), Some("2"));
    let node_100 = maps.nodes.get("100").unwrap();
    let node_2 = maps.nodes.get("2").unwrap();
    assert_eq!(graph.image_map.get(node_100).map(String::as_str), Some("2"));
    assert_eq!(graph.image_map.get(node_2).map(String::as_str), Some("1"));
    assert_eq!(report.count(AnomalyKind::OrphanFile), 0);
}

#[test]
fn dangling_reference_is_reported_exactly_once() {
    let mut graph = graph();
    if let Some(values) = graph.values.get_mut("related") {
        values[0].value = Some("4242".to_string());
    }
    if let Some(node) = graph.nodes.get_mut("9") {
        node.values = vec![FieldValue::new(
            "9",
            "0",
            Field::new("related", FieldKind::NodeReference),
            Some("4242".to_string()),
        )];
    }
    let (_, report) = renumber(&mut graph);

    assert_eq!(report.count(AnomalyKind::UnknownNodeReference), 1);
    assert_eq!(report.len(), 1);
}
