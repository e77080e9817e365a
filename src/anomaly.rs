use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Non-fatal data inconsistencies found while extracting or renumbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnomalyKind {
    /// A row points at a node that is not in the dump
    UnknownNode,
    /// A tag mapping names a tag that is not in the dump
    UnknownTag,
    /// An image row or image-map entry names a file that is not in the dump
    UnknownFile,
    /// A field instance names a content type that is not in the dump
    UnknownContentType,
    UnknownBodyFormat,
    NullBody,
    /// Two values of one field on one node share a delta
    DuplicateDelta,
    UnknownFieldType,
    /// A content field named like the generated image field
    FieldNameClash,
    /// Several aliases share one source path
    DuplicateAlias,
    /// A node-reference field value holds a node id with no new id
    UnknownNodeReference,
    /// An image-map key has no new node id
    UnmappedImageNode,
    /// A file that no node uses as its image
    OrphanFile,
    /// A `<prefix>/<id>` path whose id has no new id
    UnresolvedPath,
    /// An in-content link whose id has no new id
    UnresolvedLink,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::UnknownNode => "unknown_node",
            AnomalyKind::UnknownTag => "unknown_tag",
            AnomalyKind::UnknownFile => "unknown_file",
            AnomalyKind::UnknownContentType => "unknown_content_type",
            AnomalyKind::UnknownBodyFormat => "unknown_body_format",
            AnomalyKind::NullBody => "null_body",
            AnomalyKind::DuplicateDelta => "duplicate_delta",
            AnomalyKind::UnknownFieldType => "unknown_field_type",
            AnomalyKind::FieldNameClash => "field_name_clash",
            AnomalyKind::DuplicateAlias => "duplicate_alias",
            AnomalyKind::UnknownNodeReference => "unknown_node_reference",
            AnomalyKind::UnmappedImageNode => "unmapped_image_node",
            AnomalyKind::OrphanFile => "orphan_file",
            AnomalyKind::UnresolvedPath => "unresolved_path",
            AnomalyKind::UnresolvedLink => "unresolved_link",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// The offending id (node, file, tag, alias or link target)
    pub id: String,
    /// Where it was found, including the source table when there is one
    pub context: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.id, self.context)
    }
}

/// Every anomaly of one run, in discovery order
#[derive(Debug, Default)]
pub struct AnomalyReport {
    anomalies: Vec<Anomaly>,
}

impl AnomalyReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs the anomaly and keeps it for the summary.
    pub fn record(&mut self, kind: AnomalyKind, id: impl Into<String>, context: impl Into<String>) {
        let anomaly = Anomaly {
            kind,
            id: id.into(),
            context: context.into(),
        };
        warn!(
            kind = anomaly.kind.as_str(),
            id = %anomaly.id,
            context = %anomaly.context,
            "Data anomaly"
        );
        self.anomalies.push(anomaly);
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    pub fn of_kind(&self, kind: AnomalyKind) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter().filter(move |a| a.kind == kind)
    }

    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Per-kind totals, ordered by kind
    pub fn counts(&self) -> BTreeMap<AnomalyKind, usize> {
        let mut counts = BTreeMap::new();
        for anomaly in &self.anomalies {
            *counts.entry(anomaly.kind).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_report_is_empty() {
        let report = AnomalyReport::new();
        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
        assert!(report.counts().is_empty());
    }

    #[test]
    fn record_keeps_order_and_context() {
        let mut report = AnomalyReport::new();
        report.record(AnomalyKind::OrphanFile, "7", "uhm_files");
        report.record(AnomalyKind::UnknownNode, "42", "uhm_node_counter");

        let all: Vec<_> = report.iter().collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, AnomalyKind::OrphanFile);
        assert_eq!(all[0].id, "7");
        assert_eq!(all[1].context, "uhm_node_counter");
    }

    #[test]
    fn counts_group_by_kind() {
        let mut report = AnomalyReport::new();
        report.record(AnomalyKind::UnresolvedLink, "1", "body of node 3");
        report.record(AnomalyKind::UnresolvedLink, "2", "body of node 4");
        report.record(AnomalyKind::DuplicateAlias, "9", "node/5");

        assert_eq!(report.count(AnomalyKind::UnresolvedLink), 2);
        assert_eq!(report.count(AnomalyKind::DuplicateAlias), 1);
        assert_eq!(report.count(AnomalyKind::OrphanFile), 0);

        let counts = report.counts();
        assert_eq!(counts.get(&AnomalyKind::UnresolvedLink), Some(&2));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn display_names_kind_id_and_context() {
        let anomaly = Anomaly {
            kind: AnomalyKind::UnknownNodeReference,
            id: "12".to_string(),
            context: "field related of node 4".to_string(),
        };
        assert_eq!(
            anomaly.to_string(),
            "unknown_node_reference 12 (field related of node 4)"
        );
    }
}
