//! End-to-end migration: extract, check aliases, renumber, generate.

use crate::anomaly::AnomalyReport;
use crate::config::MigrationConfig;
use crate::duplicates::{find_duplicate_aliases, report_duplicates, DuplicateGroup};
use crate::extract::Extractor;
use crate::generate::{GeneratedTable, Generator};
use crate::models::ContentGraph;
use crate::renumber::{IdMaps, Renumberer};
use crate::stats::GraphStats;
use crate::store::TableStore;
use anyhow::{Context, Result};
use tracing::info;

/// Result of one run
#[derive(Debug)]
pub struct Migration {
    /// Graph after renumbering
    pub graph: ContentGraph,
    pub maps: IdMaps,
    pub duplicates: Vec<DuplicateGroup>,
    /// Empty when the run stopped before generation
    pub tables: Vec<GeneratedTable>,
    pub stats: GraphStats,
    pub anomalies: AnomalyReport,
}

/// Extracts and renumbers without generating target tables.
pub fn check(store: &TableStore, config: &MigrationConfig) -> Result<Migration> {
    let mut anomalies = AnomalyReport::new();

    let mut graph = Extractor::new(store, &config.source_prefix)
        .extract_graph(&mut anomalies)
        .context("Extraction failed")?;
    let stats = GraphStats::collect(store, &graph);

    let duplicates = find_duplicate_aliases(&graph.aliases);
    report_duplicates(&duplicates, &mut anomalies);

    let renumberer = Renumberer::new(&config.link_prefix)?;
    let maps = renumberer
        .renumber_content(config.start_node, &mut graph, &mut anomalies)
        .context("Renumbering failed")?;

    Ok(Migration {
        graph,
        maps,
        duplicates,
        tables: Vec::new(),
        stats,
        anomalies,
    })
}

/// Runs the whole migration and returns the target tables with the run's anomalies.
pub fn run(store: &TableStore, config: &MigrationConfig) -> Result<Migration> {
    let mut migration = check(store, config)?;

    let generator = Generator::new(&config.database, &config.target_prefix);
    migration.tables = generator
        .generate(&migration.graph, &mut migration.anomalies)
        .context("Table generation failed")?;

    info!(
        tables = migration.tables.len(),
        anomalies = migration.anomalies.len(),
        "Migration complete"
    );
    Ok(migration)
}
