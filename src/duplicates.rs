use crate::anomaly::{AnomalyKind, AnomalyReport};
use crate::models::Alias;
use crate::renumber::compare_ids;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;

/// Aliases that share one source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub path: String,
    /// Alias ids in numeric order
    pub alias_ids: Vec<String>,
}

impl fmt::Display for DuplicateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- aliases {}", self.path, self.alias_ids.join(", "))
    }
}

/// Groups aliases by source path and keeps groups with more than one member.
pub fn find_duplicate_aliases(aliases: &FxHashMap<String, Alias>) -> Vec<DuplicateGroup> {
    let mut by_path: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for alias in aliases.values() {
        by_path.entry(alias.path.as_str()).or_default().push(alias.id.clone());
    }

    by_path
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(path, mut ids)| {
            ids.sort_by(|a, b| compare_ids(a, b));
            DuplicateGroup {
                path: path.to_string(),
                alias_ids: ids,
            }
        })
        .collect()
}

/// Records one anomaly per group. Resolving them is left to the operator.
pub fn report_duplicates(groups: &[DuplicateGroup], report: &mut AnomalyReport) {
    for group in groups {
        report.record(
            AnomalyKind::DuplicateAlias,
            group.path.as_str(),
            format!("aliases {}", group.alias_ids.join(", ")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases(entries: &[(&str, &str, &str)]) -> FxHashMap<String, Alias> {
        entries
            .iter()
            .map(|(id, path, alias)| (id.to_string(), Alias::new(*id, *path, *alias)))
            .collect()
    }

    #[test]
    fn unique_paths_have_no_groups() {
        let aliases = aliases(&[("1", "node/1", "a"), ("2", "node/2", "b")]);
        assert!(find_duplicate_aliases(&aliases).is_empty());
    }

    #[test]
    fn shared_path_forms_one_group() {
        let aliases = aliases(&[
            ("10", "node/5", "thing/5"),
            ("2", "node/5", "old-name"),
            ("3", "node/6", "other"),
        ]);
        let groups = find_duplicate_aliases(&aliases);

        assert_eq!(
            groups,
            vec![DuplicateGroup {
                path: "node/5".to_string(),
                alias_ids: vec!["2".to_string(), "10".to_string()],
            }]
        );
    }

    #[test]
    fn each_alias_is_in_at_most_one_group() {
        let aliases = aliases(&[
            ("1", "node/1", "a"),
            ("2", "node/1", "b"),
            ("3", "node/2", "c"),
            ("4", "node/2", "d"),
            ("5", "node/2", "e"),
            ("6", "node/3", "f"),
        ]);
        let groups = find_duplicate_aliases(&aliases);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].path, "node/1");
        assert_eq!(groups[1].alias_ids, vec!["3", "4", "5"]);

        let mut seen: Vec<&String> = groups.iter().flat_map(|g| g.alias_ids.iter()).collect();
        let total = seen.len();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), total);
    }

    #[test]
    fn groups_are_reported_as_anomalies() {
        let aliases = aliases(&[("1", "node/1", "a"), ("2", "node/1", "b")]);
        let groups = find_duplicate_aliases(&aliases);
        let mut report = AnomalyReport::new();

        report_duplicates(&groups, &mut report);

        assert_eq!(report.count(AnomalyKind::DuplicateAlias), 1);
        assert_eq!(groups[0].to_string(), "node/1 <- aliases 1, 2");
    }
}
