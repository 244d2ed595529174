// 🗄️ Persistence Gateway - SQLite + WAL
// Stores parsed event records under their natural business key, the two
// override-map documents, a log of imported files and an audit trail.

use crate::areas::{OverrideKind, OverrideMap};
use crate::error::{Error, Result};
use crate::parser::EventRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

// ============================================================================
// STORAGE KEY
// ============================================================================

/// `{entity}_{period}_{employee id}_{event type}`
///
/// "/" in the period becomes "-", and the event type keeps only alphanumeric
/// characters. Records without an event section use an empty event component.
pub fn storage_key(record: &EventRecord) -> String {
    let period = record.reporting_period.replace('/', "-");
    let event: String = record
        .event_type
        .as_deref()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    format!(
        "{}_{}_{}_{}",
        record.source_entity, period, record.employee_id, event
    )
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// A change worth keeping in the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    FileImported {
        fingerprint: String,
        file_name: String,
        records: usize,
        affected: usize,
    },
    OverrideMapSaved {
        map: OverrideKind,
        entries: usize,
    },
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::FileImported { .. } => "file_imported",
            AuditAction::OverrideMapSaved { .. } => "override_map_saved",
        }
    }

    /// Lookup key: the file fingerprint, or the map name
    pub fn subject(&self) -> String {
        match self {
            AuditAction::FileImported { fingerprint, .. } => fingerprint.clone(),
            AuditAction::OverrideMapSaved { map, .. } => map.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub recorded_at: DateTime<Utc>,
    pub action: AuditAction,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payroll_events (
            storage_key TEXT PRIMARY KEY,
            source_entity TEXT NOT NULL,
            reporting_period TEXT NOT NULL,
            employee_id TEXT NOT NULL,
            employee_name TEXT NOT NULL,
            role_title TEXT NOT NULL,
            original_reference TEXT NOT NULL,
            hours_decimal REAL NOT NULL,
            amount REAL NOT NULL,
            event_type TEXT,
            source_file TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Override-map documents, one row per map
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parameters (
            name TEXT PRIMARY KEY,
            map TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS imports (
            fingerprint TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only; `detail` holds the serialized AuditAction
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            recorded_at TEXT NOT NULL,
            action TEXT NOT NULL,
            subject TEXT NOT NULL,
            detail TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_filter
         ON payroll_events(source_entity, reporting_period)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_log(subject)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// RECORDS
// ============================================================================

/// Insert new records or update stored ones sharing the storage key
///
/// Returns how many rows were inserted or actually changed; re-upserting
/// identical records returns 0.
pub fn upsert_records(conn: &Connection, records: &[EventRecord]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut affected = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO payroll_events (
                storage_key, source_entity, reporting_period, employee_id, employee_name,
                role_title, original_reference, hours_decimal, amount, event_type,
                source_file, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(storage_key) DO UPDATE SET
                employee_name = excluded.employee_name,
                role_title = excluded.role_title,
                original_reference = excluded.original_reference,
                hours_decimal = excluded.hours_decimal,
                amount = excluded.amount,
                source_file = excluded.source_file,
                updated_at = excluded.updated_at
            WHERE payroll_events.employee_name IS NOT excluded.employee_name
               OR payroll_events.role_title IS NOT excluded.role_title
               OR payroll_events.original_reference IS NOT excluded.original_reference
               OR payroll_events.hours_decimal IS NOT excluded.hours_decimal
               OR payroll_events.amount IS NOT excluded.amount
               OR payroll_events.source_file IS NOT excluded.source_file",
        )?;

        for record in records {
            affected += stmt.execute(params![
                storage_key(record),
                record.source_entity,
                record.reporting_period,
                record.employee_id,
                record.employee_name,
                record.role_title,
                record.original_reference,
                record.hours_decimal,
                record.amount,
                record.event_type,
                record.source_file,
                now,
            ])?;
        }
    }

    tx.commit()?;
    info!(
        "Upserted {} records ({} inserted or changed)",
        records.len(),
        affected
    );
    Ok(affected)
}

/// Entity/period selection for `load_records`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub entities: BTreeSet<String>,
    pub periods: BTreeSet<String>,
}

impl RecordFilter {
    pub fn new<E, P>(entities: E, periods: P) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        RecordFilter {
            entities: entities.into_iter().map(Into::into).collect(),
            periods: periods.into_iter().map(Into::into).collect(),
        }
    }

    /// Blank names cannot match anything stored and signal a caller bug
    pub fn validate(&self) -> Result<()> {
        if self.entities.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::invalid_filter("entity names must not be blank"));
        }
        if self.periods.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::invalid_filter("periods must not be blank"));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() || self.periods.is_empty()
    }
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Records whose entity AND period are selected
///
/// An empty entity or period set selects nothing.
pub fn load_records(conn: &Connection, filter: &RecordFilter) -> Result<Vec<EventRecord>> {
    filter.validate()?;
    if filter.is_empty() {
        debug!("Empty filter, no records loaded");
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT source_entity, reporting_period, employee_id, employee_name, role_title,
                original_reference, hours_decimal, amount, event_type, source_file
         FROM payroll_events
         WHERE source_entity IN ({}) AND reporting_period IN ({})
         ORDER BY source_entity, reporting_period, rowid",
        placeholders(1, filter.entities.len()),
        placeholders(1 + filter.entities.len(), filter.periods.len()),
    );

    let mut stmt = conn.prepare(&sql)?;
    let values = filter.entities.iter().chain(filter.periods.iter());

    let records = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(EventRecord {
                source_entity: row.get(0)?,
                reporting_period: row.get(1)?,
                employee_id: row.get(2)?,
                employee_name: row.get(3)?,
                role_title: row.get(4)?,
                original_reference: row.get(5)?,
                hours_decimal: row.get(6)?,
                amount: row.get(7)?,
                event_type: row.get(8)?,
                source_file: row.get(9)?,
                area: None,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    debug!("Loaded {} records", records.len());
    Ok(records)
}

/// Sorted distinct (entities, periods) present in storage
pub fn load_filter_options(conn: &Connection) -> Result<(Vec<String>, Vec<String>)> {
    let distinct = |column: &str| -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {0} FROM payroll_events ORDER BY {0}",
            column
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(values)
    };

    Ok((distinct("source_entity")?, distinct("reporting_period")?))
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM payroll_events", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// OVERRIDE MAPS
// ============================================================================

/// Load a whole override map; a map never saved is empty
pub fn load_override_map(conn: &Connection, kind: OverrideKind) -> Result<OverrideMap> {
    let json: Option<String> = conn
        .query_row(
            "SELECT map FROM parameters WHERE name = ?1",
            params![kind.document_id()],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(OverrideMap::new()),
    }
}

/// Replace a whole override map
///
/// Exceptions with a blank area are dropped before storing.
pub fn save_override_map(conn: &Connection, kind: OverrideKind, map: &OverrideMap) -> Result<()> {
    let stored = match kind {
        OverrideKind::Exceptions => map.without_empty(),
        OverrideKind::Roles => map.clone(),
    };
    let json = serde_json::to_string(&stored)?;

    conn.execute(
        "INSERT INTO parameters (name, map, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET map = excluded.map, updated_at = excluded.updated_at",
        params![kind.document_id(), json, Utc::now().to_rfc3339()],
    )?;

    record_audit(
        conn,
        AuditAction::OverrideMapSaved {
            map: kind,
            entries: stored.len(),
        },
    )?;

    info!("Saved {} map with {} entries", kind, stored.len());
    Ok(())
}

// ============================================================================
// IMPORT LOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub fingerprint: String,
    pub file_name: String,
    pub record_count: i64,
    pub imported_at: String,
}

pub fn find_import(conn: &Connection, fingerprint: &str) -> Result<Option<ImportRecord>> {
    let found = conn
        .query_row(
            "SELECT fingerprint, file_name, record_count, imported_at
             FROM imports WHERE fingerprint = ?1",
            params![fingerprint],
            |row| {
                Ok(ImportRecord {
                    fingerprint: row.get(0)?,
                    file_name: row.get(1)?,
                    record_count: row.get(2)?,
                    imported_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

/// Remember an imported file and log the import in the audit trail
pub fn record_import(
    conn: &Connection,
    fingerprint: &str,
    file_name: &str,
    record_count: usize,
    affected: usize,
) -> Result<()> {
    conn.execute(
        "INSERT INTO imports (fingerprint, file_name, record_count, imported_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(fingerprint) DO UPDATE SET
            file_name = excluded.file_name,
            record_count = excluded.record_count,
            imported_at = excluded.imported_at",
        params![fingerprint, file_name, record_count as i64, Utc::now().to_rfc3339()],
    )?;

    record_audit(
        conn,
        AuditAction::FileImported {
            fingerprint: fingerprint.to_string(),
            file_name: file_name.to_string(),
            records: record_count,
            affected,
        },
    )?;
    Ok(())
}

pub fn list_imports(conn: &Connection) -> Result<Vec<ImportRecord>> {
    let mut stmt = conn.prepare(
        "SELECT fingerprint, file_name, record_count, imported_at
         FROM imports ORDER BY imported_at DESC",
    )?;

    let imports = stmt
        .query_map([], |row| {
            Ok(ImportRecord {
                fingerprint: row.get(0)?,
                file_name: row.get(1)?,
                record_count: row.get(2)?,
                imported_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(imports)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

pub fn record_audit(conn: &Connection, action: AuditAction) -> Result<AuditEntry> {
    let entry = AuditEntry {
        entry_id: uuid::Uuid::new_v4().to_string(),
        recorded_at: Utc::now(),
        action,
    };

    conn.execute(
        "INSERT INTO audit_log (entry_id, recorded_at, action, subject, detail)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.entry_id,
            entry.recorded_at.to_rfc3339(),
            entry.action.name(),
            entry.action.subject(),
            serde_json::to_string(&entry.action)?,
        ],
    )?;

    debug!("Audit: {} {}", entry.action.name(), entry.action.subject());
    Ok(entry)
}

fn conversion_error(column: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Latest `limit` audit entries, newest first, optionally for one subject
pub fn audit_trail(conn: &Connection, subject: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, recorded_at, detail
         FROM audit_log
         WHERE ?1 IS NULL OR subject = ?1
         ORDER BY seq DESC
         LIMIT ?2",
    )?;

    let entries = stmt
        .query_map(params![subject, limit as i64], |row| {
            let recorded_at: String = row.get(1)?;
            let detail: String = row.get(2)?;

            Ok(AuditEntry {
                entry_id: row.get(0)?,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .map_err(|e| conversion_error(1, e))?
                    .with_timezone(&Utc),
                action: serde_json::from_str(&detail).map_err(|e| conversion_error(2, e))?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ============================================================================
// TESTS
// ============================================================================
