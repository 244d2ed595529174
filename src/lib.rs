// Payroll Insight - Core Library
// Parses payroll event exports, assigns organizational areas and derives
// summaries and compensation scenarios. Used by the CLI, the API server and tests.

pub mod error;
pub mod config;
pub mod numeric;        // Currency / duration normalization
pub mod metadata;       // Company + period headers
pub mod parser;         // Record parser
pub mod ingest;         // Multi-file parse
pub mod areas;          // Area resolver + override maps
pub mod aggregation;    // Summaries, outliers, category pivot
pub mod simulation;     // Cash vs time-off scenarios
pub mod export;         // Table rendering
pub mod db;             // Persistence gateway (SQLite)

// Re-export commonly used types
pub use error::{Error, Result};
pub use config::Config;
pub use numeric::{format_duration, parse_currency, parse_duration, NumericCache};
pub use metadata::{extract_metadata, Metadata};
pub use parser::{
    decode_bytes, parse_records, EventRecord, ParseOutcome, PayrollParser, SkipReason,
    SkippedLine, SourceEncoding,
};
pub use ingest::{concat_records, parse_many, ExportInput};
pub use areas::{
    resolve_areas, unmapped_roles, AreaResolver, AreaSource, OverrideKind, OverrideMap,
    UNDEFINED_AREA,
};
pub use aggregation::{
    detect_outliers, employee_totals, overview, pivot_by_category, summarize, CategoryPivotRow,
    Dimension, EmployeeTotal, EventCategory, GroupSummary, Overview,
};
pub use simulation::{simulate, ScenarioParams, SimulationResult, SimulationTotals};
pub use export::{CsvRenderer, JsonRenderer, Table, TableRenderer};
pub use db::{
    load_filter_options, load_override_map, load_records, save_override_map, setup_database,
    storage_key, upsert_records, RecordFilter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
