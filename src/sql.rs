use crate::generate::{ColumnKind, GeneratedTable};
use anyhow::{Context, Result};
use std::io::Write;
use tracing::warn;

const HEADER: &[&str] = &[
    "SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";",
    "SET AUTOCOMMIT = 0;",
    "START TRANSACTION;",
    "SET time_zone = \"+00:00\";",
];
const FOOTER: &str = "COMMIT;";

/// Left-to-right mark, common in pasted titles
const LRM: char = '\u{200E}';

/// Writes all tables as one transaction of `INSERT` statements.
pub fn write_sql<W: Write>(tables: &[GeneratedTable], out: &mut W) -> Result<()> {
    for line in HEADER {
        writeln!(out, "{}", line)?;
    }
    writeln!(out)?;

    for table in tables {
        write_table(table, out).with_context(|| format!("Unable to write table {}", table.name))?;
    }

    writeln!(out, "{}", FOOTER)?;
    out.flush()?;
    Ok(())
}

fn write_table<W: Write>(table: &GeneratedTable, out: &mut W) -> Result<()> {
    if table.rows.is_empty() {
        warn!(table = %table.name, "No rows to insert");
        writeln!(out)?;
        return Ok(());
    }

    let columns: Vec<String> = table.columns.iter().map(|c| format!("`{}`", c.name)).collect();
    writeln!(out, "INSERT INTO `{}` ({}) VALUES", table.name, columns.join(", "))?;

    for (i, row) in table.rows.iter().enumerate() {
        let values: Vec<String> = table
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| format_value(column.kind, value.as_deref()))
            .collect();
        let end = if i + 1 == table.rows.len() { ";" } else { "," };
        writeln!(out, "({}){}", values.join(", "), end)?;
    }
    writeln!(out)?;
    Ok(())
}

/// SQL literal for one cell
pub fn format_value(kind: ColumnKind, value: Option<&str>) -> String {
    let Some(value) = value else {
        return "NULL".to_string();
    };
    match kind {
        ColumnKind::Number => value.to_string(),
        ColumnKind::Text => quote(value),
        ColumnKind::Html => quote(&value.replace(LRM, "")),
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}
