use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use payroll_insight::db::{audit_trail, find_import, list_imports, record_import};
use payroll_insight::export::{detail_rows, summary_table, write_json, write_rows, RecordRow};
use payroll_insight::{
    aggregation::parse_dimensions, concat_records, detect_outliers, employee_totals,
    format_duration, load_filter_options, load_override_map, load_records, overview, parse_many,
    pivot_by_category, save_override_map, setup_database, simulate, summarize,
    unmapped_roles, upsert_records, AreaResolver, Config, CsvRenderer, EventRecord, ExportInput,
    JsonRenderer, OverrideKind, OverrideMap, PayrollParser, RecordFilter, ScenarioParams,
    TableRenderer,
};

/// Payroll event export analysis
#[derive(Debug, Parser)]
#[command(name = "payroll-insight", version, about = "Parse payroll event exports, assign areas and simulate compensation scenarios")]
struct Cli {
    /// JSON configuration file (defaults to $PAYROLL_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse export files and store their records
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Re-import files already seen
        #[arg(long)]
        force: bool,
    },
    /// Parse one file without storing it
    Parse {
        file: PathBuf,
        /// List every skipped line
        #[arg(long)]
        show_skipped: bool,
    },
    /// List stored entities and periods
    Filters,
    /// Grouped totals
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
        /// Comma separated: entity, period, area, role, employee, event_type
        #[arg(long, default_value = "area")]
        by: String,
    },
    /// Employees above an hours threshold
    Outliers {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Hours and amounts per event category
    Pivot {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Cash payout vs time-off scenario
    Simulate {
        #[command(flatten)]
        filter: FilterArgs,
        /// Target area (repeatable)
        #[arg(long = "area", required = true)]
        areas: Vec<String>,
        #[arg(long, default_value_t = 0.0)]
        min_hours: f64,
        /// Share paid in cash, 0-100
        #[arg(long)]
        cash_pct: f64,
        #[arg(long, default_value_t = 1)]
        installments: u32,
        /// Months the time off is spread over
        #[arg(long, default_value_t = 1)]
        months: u32,
    },
    /// Role title → area map
    Roles {
        #[command(subcommand)]
        action: MapAction,
    },
    /// Employee name → area exceptions
    Exceptions {
        #[command(subcommand)]
        action: MapAction,
    },
    /// Role titles without an area
    Unmapped {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Write record base, area summary and top records to files
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
        /// Format of the area summary table
        #[arg(long, value_enum, default_value_t = TableFormat::Csv)]
        format: TableFormat,
    },
    /// Imported files
    History,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TableFormat {
    Csv,
    Json,
}

impl TableFormat {
    fn renderer(self) -> Box<dyn TableRenderer> {
        match self {
            TableFormat::Csv => Box::new(CsvRenderer),
            TableFormat::Json => Box::new(JsonRenderer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum MapAction {
    Show,
    Set { key: String, area: String },
    Unset { key: String },
    /// Replace the whole map with a JSON document
    Load { file: PathBuf },
}

#[derive(Debug, Clone, Args)]
struct FilterArgs {
    /// Entity to include (repeatable, default all)
    #[arg(long = "entity")]
    entities: Vec<String>,
    /// Period to include (repeatable, default all)
    #[arg(long = "period")]
    periods: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    debug!("Using database {}", config.database_path.display());

    let conn = Connection::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    setup_database(&conn)?;

    match cli.command {
        Command::Import { files, force } => run_import(&conn, &config, &files, force),
        Command::Parse { file, show_skipped } => run_parse(&config, &file, show_skipped),
        Command::Filters => run_filters(&conn),
        Command::Summary { filter, by } => run_summary(&conn, &filter, &by),
        Command::Outliers { filter, threshold } => {
            run_outliers(&conn, &filter, threshold.unwrap_or(config.outlier_threshold_hours))
        }
        Command::Pivot { filter } => run_pivot(&conn, &filter),
        Command::Simulate {
            filter,
            areas,
            min_hours,
            cash_pct,
            installments,
            months,
        } => {
            let params = ScenarioParams {
                target_areas: areas.into_iter().collect(),
                min_hours,
                cash_percentage: cash_pct,
                cash_installments: installments,
                time_off_months: months,
            };
            run_simulate(&conn, &filter, &params)
        }
        Command::Roles { action } => run_map_action(&conn, OverrideKind::Roles, action),
        Command::Exceptions { action } => run_map_action(&conn, OverrideKind::Exceptions, action),
        Command::Unmapped { filter } => run_unmapped(&conn, &filter),
        Command::Export {
            filter,
            out_dir,
            format,
        } => run_export(
            &conn,
            &filter,
            out_dir.as_deref().unwrap_or(&config.export_dir),
            format,
        ),
        Command::History => run_history(&conn),
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("payroll_insight={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_import(conn: &Connection, config: &Config, files: &[PathBuf], force: bool) -> Result<()> {
    let mut inputs = Vec::new();
    for path in files {
        let input = ExportInput::from_path(path)?;
        if !force {
            if let Some(previous) = find_import(conn, &input.fingerprint())? {
                warn!(
                    "{} already imported as {} on {}, skipping (use --force)",
                    input.file_name, previous.file_name, previous.imported_at
                );
                continue;
            }
        }
        inputs.push(input);
    }

    let outcomes = parse_many(&inputs, config.cache_capacity);
    let mut total_affected = 0;

    for (input, outcome) in inputs.iter().zip(&outcomes) {
        let affected = upsert_records(conn, &outcome.records)?;
        record_import(conn, &input.fingerprint(), &input.file_name, outcome.records.len(), affected)?;
        total_affected += affected;

        println!(
            "✓ {}: {} / {} → {} records ({} stored or changed, {} lines skipped)",
            outcome.file_name,
            outcome.metadata.source_entity,
            outcome.metadata.reporting_period,
            outcome.records.len(),
            affected,
            outcome.skipped.len()
        );
    }

    let roles = load_override_map(conn, OverrideKind::Roles)?;
    let missing = unmapped_roles(&concat_records(&outcomes), &roles);
    if !missing.is_empty() {
        warn!("{} role titles have no area mapping yet", missing.len());
    }

    info!("Import finished: {} files, {} rows affected", outcomes.len(), total_affected);
    Ok(())
}

fn run_parse(config: &Config, file: &Path, show_skipped: bool) -> Result<()> {
    let mut parser = PayrollParser::new(config.cache_capacity);
    let outcome = parser.parse_file(file)?;

    println!("File:      {}", outcome.file_name);
    println!("Encoding:  {:?}", outcome.encoding);
    println!("Entity:    {}", outcome.metadata.source_entity);
    println!("Period:    {}", outcome.metadata.reporting_period);
    println!("Records:   {}", outcome.records.len());
    for (reason, count) in outcome.skip_summary() {
        println!("Skipped:   {:<16} {}", reason, count);
    }

    if show_skipped {
        for skipped in &outcome.skipped {
            println!("  line {:>5}: {:?}", skipped.line_number, skipped.reason);
        }
    }

    for record in &outcome.records {
        println!(
            "{:<8} {:<32} {:<28} {:>8} {:>12.2}  {}",
            record.employee_id,
            record.employee_name,
            record.role_title,
            record.original_reference,
            record.amount,
            record.event_type.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn run_filters(conn: &Connection) -> Result<()> {
    let (entities, periods) = load_filter_options(conn)?;
    println!("Entities ({}):", entities.len());
    for entity in entities {
        println!("  {}", entity);
    }
    println!("Periods ({}):", periods.len());
    for period in periods {
        println!("  {}", period);
    }
    Ok(())
}

/// Load records for the filter (all known values when a side is omitted) and resolve areas
fn load_resolved(conn: &Connection, args: &FilterArgs) -> Result<Vec<EventRecord>> {
    let (all_entities, all_periods) = load_filter_options(conn)?;
    let entities = if args.entities.is_empty() { all_entities } else { args.entities.clone() };
    let periods = if args.periods.is_empty() { all_periods } else { args.periods.clone() };

    let records = load_records(conn, &RecordFilter::new(entities, periods))?;
    if records.is_empty() {
        warn!("No data available for the selected filters");
    }

    let resolver = AreaResolver::new(
        load_override_map(conn, OverrideKind::Roles)?,
        load_override_map(conn, OverrideKind::Exceptions)?,
    );
    debug!(
        "Resolving areas with {} role mappings and {} exceptions",
        resolver.role_count(),
        resolver.exception_count()
    );
    Ok(resolver.resolve_all(&records))
}

fn run_summary(conn: &Connection, filter: &FilterArgs, by: &str) -> Result<()> {
    let dimensions = parse_dimensions(by)?;
    let records = load_resolved(conn, filter)?;

    let metrics = overview(&records);
    println!(
        "Total R$ {:.2} | {} hours | {} employees | avg R$ {:.2} per employee",
        metrics.total_amount,
        format_duration(metrics.total_hours),
        metrics.distinct_employees,
        metrics.average_amount_per_employee
    );

    let table = summary_table(&dimensions, &summarize(&records, &dimensions));
    println!("{}", table.headers.join(" | "));
    for row in &table.rows {
        println!("{}", row.join(" | "));
    }
    Ok(())
}

fn run_outliers(conn: &Connection, filter: &FilterArgs, threshold: f64) -> Result<()> {
    let records = load_resolved(conn, filter)?;
    let outliers = detect_outliers(&employee_totals(&records), threshold);

    println!("{} employees above {} hours", outliers.len(), format_duration(threshold));
    for total in outliers {
        println!(
            "{:>8}  {:<32} {:<20} {:<20} R$ {:>12.2}",
            format_duration(total.hours),
            total.employee_name,
            total.area,
            total.source_entity,
            total.amount
        );
    }
    Ok(())
}

fn run_pivot(conn: &Connection, filter: &FilterArgs) -> Result<()> {
    let records = load_resolved(conn, filter)?;
    println!(
        "{:<32} {:<16} {:>10} {:>12} {:>10} {:>12} {:>10} {:>12} {:>12}",
        "employee", "area", "HE60 h", "HE60 R$", "DSR h", "DSR R$", "other h", "other R$", "total R$"
    );
    for row in pivot_by_category(&records) {
        println!(
            "{:<32} {:<16} {:>10} {:>12.2} {:>10} {:>12.2} {:>10} {:>12.2} {:>12.2}",
            row.employee_name,
            row.area,
            format_duration(row.overtime60_hours),
            row.overtime60_amount,
            format_duration(row.dsr_hours),
            row.dsr_amount,
            format_duration(row.other_hours),
            row.other_amount,
            row.total_amount
        );
    }
    Ok(())
}

fn run_simulate(conn: &Connection, filter: &FilterArgs, params: &ScenarioParams) -> Result<()> {
    let records = load_resolved(conn, filter)?;
    let result = simulate(&employee_totals(&records), params)?;

    for e in &result.employees {
        println!(
            "{:<32} {:<16} cash R$ {:>10.2} ({:>9.2}/month)  time off {:>6.2} days ({:.2}/month)",
            e.employee_name, e.area, e.cash_amount, e.monthly_cash, e.time_off_days, e.days_per_month
        );
    }
    println!(
        "\nEmployees: {} | Cash R$ {:.2} | Monthly cash R$ {:.2} | Time off {:.2} days",
        result.totals.employees,
        result.totals.cash_amount,
        result.totals.monthly_cash,
        result.totals.time_off_days
    );
    Ok(())
}

fn run_map_action(conn: &Connection, kind: OverrideKind, action: MapAction) -> Result<()> {
    let current = load_override_map(conn, kind)?;

    let updated = match action {
        MapAction::Show => {
            println!("{} map ({} entries)", kind, current.len());
            for (key, area) in current.iter() {
                println!("  {:<40} → {}", key, area);
            }
            return Ok(());
        }
        MapAction::Set { key, area } => {
            let mut update = OverrideMap::new();
            update.insert(key, area);
            current.merged_with(&update)
        }
        MapAction::Unset { key } => {
            let mut update = OverrideMap::new();
            update.insert(key, "");
            current.merged_with(&update)
        }
        MapAction::Load { file } => OverrideMap::from_json_file(&file)
            .with_context(|| format!("Failed to load {}", file.display()))?,
    };

    save_override_map(conn, kind, &updated)?;
    println!("✓ {} map saved ({} entries)", kind, updated.len());
    Ok(())
}

fn run_unmapped(conn: &Connection, filter: &FilterArgs) -> Result<()> {
    let records = load_resolved(conn, filter)?;
    let roles = load_override_map(conn, OverrideKind::Roles)?;
    for role in unmapped_roles(&records, &roles) {
        println!("{}", role);
    }
    Ok(())
}

fn run_export(
    conn: &Connection,
    filter: &FilterArgs,
    out_dir: &Path,
    format: TableFormat,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let records = load_resolved(conn, filter)?;

    let rows: Vec<RecordRow> = records.iter().map(RecordRow::from).collect();
    write_rows(&out_dir.join("records.csv"), &rows)?;

    let dimensions = parse_dimensions("entity,area")?;
    let table = summary_table(&dimensions, &summarize(&records, &dimensions));
    let renderer = format.renderer();
    renderer.render(&table, &out_dir.join(format!("area_summary.{}", renderer.extension())))?;

    write_rows(&out_dir.join("top_records.csv"), &detail_rows(&records, 50))?;
    write_json(&out_dir.join("overview.json"), &overview(&records))?;

    println!("✓ Exported {} records to {}", records.len(), out_dir.display());
    Ok(())
}

fn run_history(conn: &Connection) -> Result<()> {
    for import in list_imports(conn)? {
        println!(
            "{}  {:<40} {:>6} records  {}",
            import.imported_at,
            import.file_name,
            import.record_count,
            &import.fingerprint[..12.min(import.fingerprint.len())]
        );
    }

    println!("\nRecent changes:");
    for entry in audit_trail(conn, None, 20)? {
        println!(
            "{}  {:<20} {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action.name(),
            entry.action.subject()
        );
    }
    Ok(())
}
