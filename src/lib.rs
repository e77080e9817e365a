//! Theseus: content-site table migration with identity-preserving renumbering
//!
//! This crate migrates the tables of an exported content site into a new schema.
//! Every entity gets a fresh, dense id while every reference between entities
//! keeps pointing at the same thing:
//!
//! 1. **Load** -- Read a JSON table dump into memory, keyed by table name
//! 2. **Extract** -- Build the content graph: tags, content types, nodes, field
//!    values, files, the image map, and URL aliases
//! 3. **Duplicate check** -- Group aliases that claim the same source path
//! 4. **Renumber** -- Assign new node, file, and alias ids in numeric order and
//!    rewrite node references, image links, alias paths, and in-body links
//! 5. **Generate** -- Project the graph into the target table layout
//! 6. **Emit** -- Write one SQL transaction of `INSERT` statements, or CSV files
//!
//! Problems in the source data never stop a run. They are collected in an
//! [`anomaly::AnomalyReport`] and logged as `tracing` warnings. Only an unreadable
//! dump, a missing table, or a missing required column is fatal.
//!
//! # Key Modules
//!
//! - [`store`] -- JSON table dump loading
//! - [`extract`] -- Content graph extraction from source tables
//! - [`duplicates`] -- Detection of aliases sharing one path
//! - [`renumber`] -- Id maps and reference rewriting
//! - [`generate`] -- Target table generation
//! - [`sql`] -- `INSERT` statement emission
//! - [`export`] -- Per-table CSV export
//! - [`pipeline`] -- The stages above in order
//! - [`anomaly`] -- Recoverable data problems
//! - [`models`] -- Core data types (Node, FieldValue, ContentGraph)
//! - [`stats`] -- Entity counts for the run summary
//! - [`config`] -- Defaults and fixed markers
//!
//! # Example Usage
//!
//! ```bash
//! # Migrate a dump to SQL, renumbering nodes from 3
//! theseus migrate -i uhm_dump.json -o migration.sql
//!
//! # Write one CSV file per target table instead
//! theseus migrate -i uhm_dump.json -o tables/ --format csv
//!
//! # Report anomalies without writing anything
//! theseus check -i uhm_dump.json -v
//! ```

pub mod anomaly;
pub mod config;
pub mod duplicates;
pub mod export;
pub mod extract;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod renumber;
pub mod sql;
pub mod stats;
pub mod store;
