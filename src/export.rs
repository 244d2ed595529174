// 📤 Report Export
// Renders derived tables to files. Chart, PDF and spreadsheet rendering live
// outside this crate; anything that can take a Table can implement the trait.

use crate::aggregation::{Dimension, GroupSummary};
use crate::error::Result;
use crate::numeric::format_duration;
use crate::parser::EventRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

// ============================================================================
// TABLE
// ============================================================================

/// Plain string table: header row + data rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Render a grouped summary with one column per dimension
pub fn summary_table(dimensions: &[Dimension], groups: &[GroupSummary]) -> Table {
    let mut headers: Vec<String> = dimensions.iter().map(|d| d.name().to_string()).collect();
    headers.extend(
        [
            "hours",
            "hours_hhmm",
            "amount",
            "records",
            "employees",
            "avg_amount_per_employee",
        ]
        .iter()
        .map(|h| h.to_string()),
    );

    let rows = groups
        .iter()
        .map(|g| {
            let mut row = g.key.clone();
            row.push(format!("{:.2}", g.hours));
            row.push(format_duration(g.hours));
            row.push(format!("{:.2}", g.amount));
            row.push(g.record_count.to_string());
            row.push(g.distinct_employees.to_string());
            row.push(format!("{:.2}", g.average_amount_per_employee));
            row
        })
        .collect();

    Table { headers, rows }
}

// ============================================================================
// ROW SHAPES
// ============================================================================

/// Flat, CSV-friendly copy of an area-resolved record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub source_entity: String,
    pub reporting_period: String,
    pub employee_id: String,
    pub employee_name: String,
    pub role_title: String,
    pub area: String,
    pub event_type: String,
    pub original_reference: String,
    pub hours_decimal: f64,
    pub amount: f64,
    pub source_file: String,
}

impl From<&EventRecord> for RecordRow {
    fn from(r: &EventRecord) -> Self {
        RecordRow {
            source_entity: r.source_entity.clone(),
            reporting_period: r.reporting_period.clone(),
            employee_id: r.employee_id.clone(),
            employee_name: r.employee_name.clone(),
            role_title: r.role_title.clone(),
            area: r.area_or_undefined().to_string(),
            event_type: r.event_type.clone().unwrap_or_default(),
            original_reference: r.original_reference.clone(),
            hours_decimal: r.hours_decimal,
            amount: r.amount,
            source_file: r.source_file.clone(),
        }
    }
}

/// Row of the "top records" detail listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub employee_name: String,
    pub role_title: String,
    pub source_entity: String,
    pub amount: f64,
}

/// The `limit` records with the largest amounts
pub fn detail_rows(records: &[EventRecord], limit: usize) -> Vec<DetailRow> {
    let mut sorted: Vec<&EventRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.amount.total_cmp(&a.amount));

    sorted
        .into_iter()
        .take(limit)
        .map(|r| DetailRow {
            employee_name: r.employee_name.clone(),
            role_title: r.role_title.clone(),
            source_entity: r.source_entity.clone(),
            amount: r.amount,
        })
        .collect()
}

// ============================================================================
// WRITERS
// ============================================================================

/// Write flat serializable rows as CSV with a header row
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Something that can turn a table into a file
pub trait TableRenderer {
    fn render(&self, table: &Table, path: &Path) -> Result<()>;

    /// File extension produced by this renderer
    fn extension(&self) -> &str;
}

pub struct CsvRenderer;

impl TableRenderer for CsvRenderer {
    fn render(&self, table: &Table, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn extension(&self) -> &str {
        "csv"
    }
}

pub struct JsonRenderer;

impl TableRenderer for JsonRenderer {
    fn render(&self, table: &Table, path: &Path) -> Result<()> {
        write_json(path, table)
    }

    fn extension(&self) -> &str {
        "json"
    }
}

// ============================================================================
// TESTS
// ============================================================================
