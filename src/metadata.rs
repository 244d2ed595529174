// 🏢 Metadata Extractor
// Recovers the company name and the reporting period from the report headers
// printed at the top of every payroll export.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How many leading lines are scanned for header values
pub const HEADER_SCAN_LINES: usize = 20;

pub const UNKNOWN_ENTITY: &str = "Unknown Entity";
pub const UNKNOWN_PERIOD: &str = "N/A";

/// File-level metadata attached to every record parsed from that file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source_entity: String,
    pub reporting_period: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata::new(UNKNOWN_ENTITY, UNKNOWN_PERIOD)
    }
}

impl Metadata {
    pub fn new(source_entity: impl Into<String>, reporting_period: impl Into<String>) -> Self {
        Metadata {
            source_entity: source_entity.into(),
            reporting_period: reporting_period.into(),
        }
    }

    /// True when neither header was found
    pub fn is_default(&self) -> bool {
        self.source_entity == UNKNOWN_ENTITY && self.reporting_period == UNKNOWN_PERIOD
    }
}

/// Scan the first `HEADER_SCAN_LINES` lines for company and period headers
///
/// Later matches overwrite earlier ones. Values not found keep their defaults.
pub fn extract_metadata<S: AsRef<str>>(lines: &[S]) -> Metadata {
    let mut metadata = Metadata::default();
    let mut found_entity = false;
    let mut found_period = false;

    for line in lines.iter().take(HEADER_SCAN_LINES) {
        let line = line.as_ref();

        if let Some(entity) = company_header(line) {
            debug!("Company header found: {}", entity);
            metadata.source_entity = entity;
            found_entity = true;
        }

        if let Some(period) = period_header(line) {
            debug!("Period header found: {}", period);
            metadata.reporting_period = period;
            found_period = true;
        }
    }

    if !found_entity && !found_period {
        warn!(
            "No company or period header in the first {} lines, using defaults",
            HEADER_SCAN_LINES
        );
    }

    metadata
}

/// "0012 - ACME LTDA;...;Pág: 1" → "ACME LTDA"
fn company_header(line: &str) -> Option<String> {
    let is_header = line.contains(" - ")
        && line.contains(';')
        && (line.contains("Pág:") || line.contains("Pag:"));
    if !is_header {
        return None;
    }

    let first_field = strip_quotes(line.split(';').next().unwrap_or(""));
    let name = match first_field.split_once(" - ") {
        Some((_, rest)) => rest,
        None => first_field.as_str(),
    };

    Some(name.trim().to_string())
}

/// "Período: 01/2024 à 31/01/2024" → "01/2024"
fn period_header(line: &str) -> Option<String> {
    if !line.contains("Período:") {
        return None;
    }

    let colon = line.find(':')?;
    let after_colon = &line[colon + 1..];
    let value = match after_colon.find('à') {
        Some(end) => &after_colon[..end],
        None => after_colon,
    };

    Some(strip_quotes(value).trim().to_string())
}

pub(crate) fn strip_quotes(text: &str) -> String {
    text.replace('"', "")
}

// ============================================================================
// TESTS
// ============================================================================
