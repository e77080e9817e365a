use crate::generate::GeneratedTable;
use anyhow::{Context, Result};
use csv::Writer;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

/// Marker for NULL cells, as `LOAD DATA INFILE` reads it
pub const CSV_NULL: &str = "\\N";

/// Writes one `<table>.csv` per table into `dir`. Returns the number of files written.
pub fn write_csv_tables(tables: &[GeneratedTable], dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Unable to create output directory: {}", dir.display()))?;

    for table in tables {
        let path = dir.join(format!("{}.csv", table.name));
        let file = File::create(&path)
            .with_context(|| format!("Unable to create {}", path.display()))?;
        let mut writer = Writer::from_writer(BufWriter::with_capacity(256 * 1024, file));

        writer.write_record(table.columns.iter().map(|c| c.name.as_str()))?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or(CSV_NULL)))?;
        }
        writer.flush()?;
        debug!(table = %table.name, rows = table.rows.len(), "CSV written");
    }
    Ok(tables.len())
}
