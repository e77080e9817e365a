use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use theseus::config::{
    MigrationConfig, DEFAULT_DATABASE, DEFAULT_LINK_PREFIX, DEFAULT_SOURCE_PREFIX,
    DEFAULT_START_NODE, DEFAULT_TARGET_PREFIX,
};
use theseus::pipeline::{self, Migration};
use theseus::store::TableStore;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "theseus")]
#[command(about = "Migrate content-site tables to a new schema with renumbered ids")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full migration and write the target tables
    Migrate(MigrateArgs),
    /// Extract and renumber only, then report anomalies
    Check(SourceArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Path to the JSON table dump
    #[arg(short, long)]
    input: String,

    /// First id given to renumbered nodes
    #[arg(long, default_value_t = DEFAULT_START_NODE)]
    start_node: u64,

    /// Table name prefix of the source site
    #[arg(long, default_value = DEFAULT_SOURCE_PREFIX)]
    source_prefix: String,

    /// Path prefix of in-body links to rewrite
    #[arg(long, default_value = DEFAULT_LINK_PREFIX)]
    link_prefix: String,
}

#[derive(Args)]
struct MigrateArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output file for SQL, or directory for CSV (SQL defaults to stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Sql)]
    format: OutputFormat,

    /// Table name prefix of the target site
    #[arg(long, default_value = DEFAULT_TARGET_PREFIX)]
    target_prefix: String,

    /// Target database name
    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Sql,
    Csv,
}

impl SourceArgs {
    fn config(&self) -> MigrationConfig {
        MigrationConfig {
            start_node: self.start_node,
            source_prefix: self.source_prefix.clone(),
            link_prefix: self.link_prefix.clone(),
            ..MigrationConfig::default()
        }
    }
}

fn load(input: &str) -> Result<TableStore> {
    let start = Instant::now();
    let store = TableStore::load(input)?;
    info!(
        tables = store.len(),
        duration_secs = start.elapsed().as_secs_f64(),
        "Dump loaded"
    );
    Ok(store)
}

enum Destination {
    Stdout,
    SqlFile(String),
    CsvDir(String),
}

fn run_migrate(args: MigrateArgs) -> Result<()> {
    let destination = match (args.format, args.output) {
        (OutputFormat::Sql, None) => Destination::Stdout,
        (OutputFormat::Sql, Some(path)) => Destination::SqlFile(path),
        (OutputFormat::Csv, Some(dir)) => Destination::CsvDir(dir),
        (OutputFormat::Csv, None) => bail!("CSV output needs an output directory (-o)"),
    };

    let config = MigrationConfig {
        target_prefix: args.target_prefix,
        database: args.database,
        ..args.source.config()
    };
    let store = load(&args.source.input)?;
    let start = Instant::now();
    let migration = pipeline::run(&store, &config)?;

    match destination {
        Destination::Stdout => {
            let stdout = io::stdout();
            theseus::sql::write_sql(&migration.tables, &mut BufWriter::new(stdout.lock()))?;
        }
        Destination::SqlFile(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Unable to create output file: {}", path))?;
            theseus::sql::write_sql(&migration.tables, &mut BufWriter::new(file))?;
            info!(path = %path, "SQL written");
        }
        Destination::CsvDir(dir) => {
            let written = theseus::export::write_csv_tables(&migration.tables, Path::new(&dir))?;
            info!(files = written, dir = %dir, "CSV export complete");
        }
    }

    print_summary(&migration, start.elapsed().as_secs_f64());
    Ok(())
}

fn run_check(args: SourceArgs) -> Result<()> {
    let store = load(&args.input)?;
    let start = Instant::now();
    let migration = pipeline::check(&store, &args.config())?;

    for group in &migration.duplicates {
        eprintln!("Duplicate alias: {}", group);
    }
    print_summary(&migration, start.elapsed().as_secs_f64());
    Ok(())
}

/// Summary goes to stderr, stdout may carry the SQL.
fn print_summary(migration: &Migration, duration_secs: f64) {
    eprintln!();
    eprintln!("=== Summary ===");
    eprintln!("Migration time:     {:.2}s", duration_secs);
    eprintln!();
    for (label, count) in migration.stats.entries() {
        eprintln!("{:<20}{}", format!("{}:", label), count);
    }
    eprintln!("{:<20}{}", "Generated tables:", migration.tables.len());
    eprintln!("{:<20}{}", "Duplicate aliases:", migration.duplicates.len());
    eprintln!("{:<20}{}", "Anomalies:", migration.anomalies.len());
    for (kind, count) in migration.anomalies.counts() {
        eprintln!("  {:<18}{}", format!("{}:", kind), count);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let result = match cli.command {
        Commands::Migrate(args) => run_migrate(args),
        Commands::Check(args) => run_check(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
