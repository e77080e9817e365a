use crate::models::ContentGraph;
use crate::store::TableStore;

/// Entity counts for the end-of-run summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub tables: usize,
    pub tags: usize,
    pub nodes: usize,
    pub types: usize,
    pub fields: usize,
    pub aliases: usize,
    pub values: usize,
    pub files: usize,
    pub images: usize,
}

impl GraphStats {
    pub fn collect(store: &TableStore, graph: &ContentGraph) -> Self {
        Self {
            tables: store.len(),
            tags: graph.tags.len(),
            nodes: graph.nodes.len(),
            types: graph.types.len(),
            fields: graph.field_count(),
            aliases: graph.aliases.len(),
            values: graph.value_count(),
            files: graph.files.len(),
            images: graph.image_map.len(),
        }
    }

    /// Label and count pairs in display order
    pub fn entries(&self) -> [(&'static str, usize); 9] {
        [
            ("Tables", self.tables),
            ("Tags", self.tags),
            ("Nodes", self.nodes),
            ("Content types", self.types),
            ("Fields", self.fields),
            ("Aliases", self.aliases),
            ("Values", self.values),
            ("Files", self.files),
            ("Images", self.images),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alias, Tag};
    use crate::store::RawTable;

    #[test]
    fn collect_counts_graph_entities() {
        let store = TableStore::from_tables(vec![
            RawTable::new("uhm_node", Vec::new()),
            RawTable::new("uhm_files", Vec::new()),
        ]);
        let mut graph = ContentGraph::default();
        graph.tags.insert(
            "1".to_string(),
            Tag {
                id: "1".to_string(),
                name: "Rust".to_string(),
                description: None,
            },
        );
        graph
            .aliases
            .insert("1".to_string(), Alias::new("1", "node/1", "thing/1"));
        graph.image_map.insert("1".to_string(), "4".to_string());

        let stats = GraphStats::collect(&store, &graph);
        assert_eq!(stats.tables, 2);
        assert_eq!(stats.tags, 1);
        assert_eq!(stats.aliases, 1);
        assert_eq!(stats.images, 1);
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.entries()[0], ("Tables", 2));
    }
}
