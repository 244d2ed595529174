// 🏗️ Record Parser
// Line-oriented sweep over a payroll event export ("Relatório de Eventos").
//
// File shape (semicolon separated, loosely formatted):
//   "0012 - ACME LTDA";;;;"Pág: 1"          <- company header
//   "Período: 01/2024 à 31/01/2024"         <- period header
//   "Evento: 0150 - HORAS EXTRAS 60%"        <- opens an event section
//   0001;Jane Doe;ANALISTA;...;8:00;1.500,00 <- data line
//   ____________________                    <- separator
//   Total do evento;;;;;12:00;2.250,00       <- footer

use crate::error::{Error, Result};
use crate::metadata::{extract_metadata, strip_quotes, Metadata};
use crate::numeric::{parse_currency, parse_duration, NumericCache};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, trace};

/// Default capacity of each per-parser numeric cache
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Data lines need at least this many `;` separated fields
pub const MIN_DATA_FIELDS: usize = 6;

const EVENT_MARKER: &str = "Evento:";

// ============================================================================
// CORE TYPES
// ============================================================================

/// One employee line inside an event section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub source_entity: String,
    pub reporting_period: String,
    pub employee_id: String,
    pub employee_name: String,
    pub role_title: String,
    /// Duration text as printed in the export ("8:00")
    pub original_reference: String,
    pub hours_decimal: f64,
    pub amount: f64,
    pub event_type: Option<String>,
    pub source_file: String,

    /// Filled in by the area resolver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

impl EventRecord {
    /// Builder pattern: attach the event section the line belongs to
    pub fn with_event_type(mut self, event_type: Option<String>) -> Self {
        self.event_type = event_type;
        self
    }

    /// Builder pattern: attach the resolved area
    pub fn with_area(mut self, area: String) -> Self {
        self.area = Some(area);
        self
    }

    /// Area name, or "Undefined" for records that were never resolved
    pub fn area_or_undefined(&self) -> &str {
        self.area.as_deref().unwrap_or(crate::areas::UNDEFINED_AREA)
    }
}

/// Which decode path produced the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

/// Why a line did not produce a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Blank,
    /// Line starting with "_"
    Separator,
    /// Line containing "Total"
    Footer,
    TooFewFields { found: usize },
    NonNumericId,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Blank => "blank",
            SkipReason::Separator => "separator",
            SkipReason::Footer => "footer",
            SkipReason::TooFewFields { .. } => "too_few_fields",
            SkipReason::NonNumericId => "non_numeric_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    /// 1-based line number in the decoded file
    pub line_number: usize,
    pub reason: SkipReason,
}

/// Everything one parse call produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub file_name: String,
    pub encoding: SourceEncoding,
    pub metadata: Metadata,
    pub records: Vec<EventRecord>,
    pub skipped: Vec<SkippedLine>,
}

impl ParseOutcome {
    /// Count of skipped lines per reason label
    pub fn skip_summary(&self) -> BTreeMap<&'static str, usize> {
        let mut summary = BTreeMap::new();
        for skipped in &self.skipped {
            *summary.entry(skipped.reason.label()).or_insert(0) += 1;
        }
        summary
    }
}

// ============================================================================
// SECTION STATE
// ============================================================================

/// Parser state: before the first "Evento:" line, or inside an event section
#[derive(Debug, Clone, PartialEq, Eq)]
enum SectionState {
    Scanning,
    InEventSection(String),
}

impl SectionState {
    fn event_type(&self) -> Option<String> {
        match self {
            SectionState::Scanning => None,
            SectionState::InEventSection(event) => Some(event.clone()),
        }
    }
}

/// Where the role title was read from
///
/// Exports normally carry the role four fields from the end. One export
/// variant drops the role and leaves a numeric code in that slot; for those
/// lines the role is the third field instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleSlot {
    FourthFromEnd,
    ThirdFieldFallback,
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

fn clean_field(field: &str) -> String {
    strip_quotes(field).trim().to_string()
}

fn locate_role(fields: &[&str]) -> (RoleSlot, String) {
    let trailing = clean_field(fields[fields.len() - 4]);
    if is_numeric(&trailing) {
        (RoleSlot::ThirdFieldFallback, clean_field(fields[2]))
    } else {
        (RoleSlot::FourthFromEnd, trailing)
    }
}

/// Blank, separator and footer lines, checked before anything else on the line.
/// A footer wins over an event marker: `Evento: 0900 - Total Geral` is a footer.
fn layout_skip(line: &str) -> Option<SkipReason> {
    if line.trim().is_empty() {
        Some(SkipReason::Blank)
    } else if line.trim_start().starts_with('_') {
        Some(SkipReason::Separator)
    } else if line.contains("Total") {
        Some(SkipReason::Footer)
    } else {
        None
    }
}

/// "Evento: 0150 - HORAS EXTRAS 60%" → Some("0150 - HORAS EXTRAS 60%")
fn event_marker(line: &str) -> Option<String> {
    let unquoted = line.trim().trim_start_matches('"');
    if !unquoted.starts_with(EVENT_MARKER) {
        return None;
    }

    let value = strip_quotes(&unquoted[EVENT_MARKER.len()..]);
    Some(value.trim().trim_end_matches(';').trim().to_string())
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode export bytes: UTF-8 first, Latin-1 when that fails
///
/// Latin-1 maps every byte to a char, so this never fails.
pub fn decode_bytes(bytes: &[u8]) -> (Cow<'_, str>, SourceEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (
            Cow::Borrowed(text.strip_prefix('\u{feff}').unwrap_or(text)),
            SourceEncoding::Utf8,
        ),
        Err(_) => (
            Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
            SourceEncoding::Latin1,
        ),
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Stateful payroll export parser
///
/// Holds only value caches between calls; section state is reset for every file.
#[derive(Debug, Clone)]
pub struct PayrollParser {
    currency_cache: NumericCache,
    duration_cache: NumericCache,
}

impl PayrollParser {
    pub fn new(cache_capacity: usize) -> Self {
        PayrollParser {
            currency_cache: NumericCache::new(cache_capacity),
            duration_cache: NumericCache::new(cache_capacity),
        }
    }

    /// Read and parse an export from disk
    pub fn parse_file(&mut self, file_path: &Path) -> Result<ParseOutcome> {
        let bytes = std::fs::read(file_path).map_err(|source| Error::FileRead {
            path: file_path.to_path_buf(),
            source,
        })?;

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        Ok(self.parse_bytes(&bytes, &file_name))
    }

    /// Parse raw export bytes
    pub fn parse_bytes(&mut self, bytes: &[u8], file_name: &str) -> ParseOutcome {
        let (text, encoding) = decode_bytes(bytes);
        if encoding == SourceEncoding::Latin1 {
            debug!("{} is not valid UTF-8, decoded as Latin-1", file_name);
        }

        let lines: Vec<&str> = text.lines().collect();
        let metadata = extract_metadata(&lines);

        let mut state = SectionState::Scanning;
        let mut records = Vec::new();
        let mut skipped = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let line_number = idx + 1;

            if let Some(reason) = layout_skip(line) {
                trace!("Line {} skipped: {:?}", line_number, reason);
                skipped.push(SkippedLine { line_number, reason });
                continue;
            }

            if let Some(event) = event_marker(line) {
                trace!("Line {}: entering event section '{}'", line_number, event);
                state = SectionState::InEventSection(event);
                continue;
            }

            match self.parse_line(line, &metadata, file_name) {
                Ok(record) => records.push(record.with_event_type(state.event_type())),
                Err(reason) => {
                    trace!("Line {} skipped: {:?}", line_number, reason);
                    skipped.push(SkippedLine { line_number, reason });
                }
            }
        }

        info!(
            "Parsed {} records from {} ({} lines skipped)",
            records.len(),
            file_name,
            skipped.len()
        );

        ParseOutcome {
            file_name: file_name.to_string(),
            encoding,
            metadata,
            records,
            skipped,
        }
    }

    /// Turn one content line (not layout, not a marker) into a record, or say why not
    fn parse_line(
        &mut self,
        line: &str,
        metadata: &Metadata,
        file_name: &str,
    ) -> std::result::Result<EventRecord, SkipReason> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() < MIN_DATA_FIELDS {
            return Err(SkipReason::TooFewFields {
                found: fields.len(),
            });
        }

        let employee_id = clean_field(fields[0]);
        if !is_numeric(&employee_id) {
            return Err(SkipReason::NonNumericId);
        }

        let (slot, role_title) = locate_role(&fields);
        if slot == RoleSlot::ThirdFieldFallback {
            trace!("Role for employee {} taken from third field", employee_id);
        }

        let original_reference = clean_field(fields[fields.len() - 2]);
        let amount_text = clean_field(fields[fields.len() - 1]);

        let hours_decimal = self
            .duration_cache
            .get_or_insert_with(&original_reference, parse_duration);
        let amount = self
            .currency_cache
            .get_or_insert_with(&amount_text, parse_currency);

        Ok(EventRecord {
            source_entity: metadata.source_entity.clone(),
            reporting_period: metadata.reporting_period.clone(),
            employee_id,
            employee_name: clean_field(fields[1]),
            role_title,
            original_reference,
            hours_decimal,
            amount,
            event_type: None,
            source_file: file_name.to_string(),
            area: None,
        })
    }
}

impl Default for PayrollParser {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Parse export bytes with a fresh parser, returning only the records
pub fn parse_records(bytes: &[u8], file_name: &str) -> Vec<EventRecord> {
    PayrollParser::default().parse_bytes(bytes, file_name).records
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\"0012 - ACME COMERCIO LTDA\";;;;;\"Pág: 1\"
\"Período: 01/2024 à 31/01/2024\";;;;;
\"Evento: 0150 - HORAS EXTRAS 60%\";;;;;
0001;Jane Doe;ANALISTA FISCAL;12;;8:00;1.500,00
0002;John Roe;AUXILIAR ADM;12;;2:30;312,50
____________________________________
Total do evento;;;;;10:30;1.812,50

\"Evento: 0200 - DSR SOBRE HORAS EXTRAS\";;;;;
0001;Jane Doe;ANALISTA FISCAL;12;;0:00;250,00
";

    #[test]
    fn test_single_data_line() {
        let records = parse_records(b"0001;Jane Doe;...;junk;;8:00;1.500,00", "x.csv");

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.employee_id, "0001");
        assert_eq!(r.employee_name, "Jane Doe");
        assert_eq!(r.role_title, "junk");
        assert_eq!(r.original_reference, "8:00");
        assert_eq!(r.hours_decimal, 8.0);
        assert_eq!(r.amount, 1500.0);
        assert_eq!(r.event_type, None);
        assert_eq!(r.source_entity, "Unknown Entity");
        assert_eq!(r.reporting_period, "N/A");
        assert_eq!(r.source_file, "x.csv");
    }

    #[test]
    fn test_sample_export() {
        let outcome = PayrollParser::default().parse_bytes(SAMPLE.as_bytes(), "acme_jan.csv");

        assert_eq!(outcome.encoding, SourceEncoding::Utf8);
        assert_eq!(outcome.metadata.source_entity, "ACME COMERCIO LTDA");
        assert_eq!(outcome.metadata.reporting_period, "01/2024");
        assert_eq!(outcome.records.len(), 3);

        let first = &outcome.records[0];
        assert_eq!(first.role_title, "ANALISTA FISCAL");
        assert_eq!(first.event_type.as_deref(), Some("0150 - HORAS EXTRAS 60%"));
        assert_eq!(first.source_entity, "ACME COMERCIO LTDA");

        assert_eq!(outcome.records[1].hours_decimal, 2.5);
        assert_eq!(outcome.records[1].amount, 312.5);

        let last = &outcome.records[2];
        assert_eq!(last.event_type.as_deref(), Some("0200 - DSR SOBRE HORAS EXTRAS"));
        assert_eq!(last.hours_decimal, 0.0);
        assert_eq!(last.amount, 250.0);
    }

    #[test]
    fn test_skip_reasons_are_recorded() {
        let outcome = PayrollParser::default().parse_bytes(SAMPLE.as_bytes(), "acme_jan.csv");
        let summary = outcome.skip_summary();

        assert_eq!(summary.get("separator"), Some(&1));
        assert_eq!(summary.get("footer"), Some(&1));
        assert_eq!(summary.get("blank"), Some(&1));
        // company + period header lines
        assert_eq!(summary.get("non_numeric_id"), Some(&2));

        let footer = outcome
            .skipped
            .iter()
            .find(|s| s.reason == SkipReason::Footer)
            .map(|s| s.line_number);
        assert_eq!(footer, Some(7));
    }

    #[test]
    fn test_non_numeric_or_short_lines_never_produce_records() {
        assert!(parse_records(b"ABC1;Jane;x;y;;8:00;1,00", "x.csv").is_empty());
        assert!(parse_records(b";Jane;x;y;;8:00;1,00", "x.csv").is_empty());
        assert!(parse_records(b"0001;Jane;x;8:00;1,00", "x.csv").is_empty());

        let outcome = PayrollParser::default().parse_bytes(b"0001;Jane;x;8:00;1,00", "x.csv");
        assert_eq!(outcome.skipped[0].reason, SkipReason::TooFewFields { found: 5 });
    }

    #[test]
    fn test_role_fallback_when_slot_is_numeric() {
        let records = parse_records(b"0003;Ana Lima;MOTORISTA;X;4410;Y;1:00;10,00", "x.csv");
        assert_eq!(records[0].role_title, "MOTORISTA");

        let records = parse_records(b"0003;Ana Lima;MOTORISTA;X;VENDEDOR;Y;1:00;10,00", "x.csv");
        assert_eq!(records[0].role_title, "VENDEDOR");
    }

    #[test]
    fn test_quoted_fields_are_cleaned() {
        let records = parse_records(
            b"\"0004\";\" Maria Souza \";\"x\";\"GERENTE\";\"\";\"10:15hs\";\"2.000,10\"",
            "x.csv",
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].employee_id, "0004");
        assert_eq!(records[0].employee_name, "Maria Souza");
        assert_eq!(records[0].role_title, "GERENTE");
        assert_eq!(records[0].hours_decimal, 10.25);
        assert_eq!(records[0].amount, 2000.10);
    }

    #[test]
    fn test_unparsable_numbers_keep_the_record() {
        let records = parse_records(b"0005;Rui;x;CAIXA;;??;abc", "x.csv");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hours_decimal, 0.0);
        assert_eq!(records[0].amount, 0.0);
    }

    #[test]
    fn test_latin1_fallback() {
        let mut bytes = b"0012 - PADARIA S\xc3O JOS\xc9;;;;;P\xe1g: 1\n".to_vec();
        bytes.extend_from_slice(b"Per\xedodo: 03/2024 \xe0 31/03/2024\n");
        bytes.extend_from_slice(b"0001;Jo\xe3o;x;PADEIRO;;1:00;10,00\n");

        let outcome = PayrollParser::default().parse_bytes(&bytes, "latin1.csv");

        assert_eq!(outcome.encoding, SourceEncoding::Latin1);
        assert_eq!(outcome.metadata.source_entity, "PADARIA SÃO JOSÉ");
        assert_eq!(outcome.metadata.reporting_period, "03/2024");
        assert_eq!(outcome.records[0].employee_name, "João");
    }

    #[test]
    fn test_event_marker_variants() {
        assert_eq!(event_marker("Evento: HE 50%"), Some("HE 50%".to_string()));
        assert_eq!(
            event_marker("\"Evento: 0150 - HE 60%\";;;"),
            Some("0150 - HE 60%".to_string())
        );
        assert_eq!(event_marker("0001;Evento: x"), None);
    }

    #[test]
    fn test_footer_marker_keeps_current_event() {
        let outcome = PayrollParser::default().parse_bytes(
            b"Evento: 0150 - HE 60%\nEvento: 0900 - Total Geral\n0001;A;x;R;;1:00;1,00\n",
            "x.csv",
        );

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].event_type.as_deref(), Some("0150 - HE 60%"));
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].line_number, 2);
        assert_eq!(outcome.skipped[0].reason, SkipReason::Footer);
    }

    #[test]
    fn test_layout_skip_order() {
        assert_eq!(layout_skip("   "), Some(SkipReason::Blank));
        assert_eq!(layout_skip("  ____ Total"), Some(SkipReason::Separator));
        assert_eq!(layout_skip("\"Evento: Total\";;"), Some(SkipReason::Footer));
        assert_eq!(layout_skip("Evento: HE 60%"), None);
    }

    #[test]
    fn test_event_state_resets_between_calls() {
        let mut parser = PayrollParser::default();
        parser.parse_bytes(b"Evento: HE 60%\n0001;A;x;R;;1:00;1,00\n", "a.csv");
        let second = parser.parse_bytes(b"0001;A;x;R;;1:00;1,00\n", "b.csv");

        assert_eq!(second.records[0].event_type, None);
    }

    #[test]
    fn test_parsing_is_repeatable() {
        let first = parse_records(SAMPLE.as_bytes(), "a.csv");
        let second = parse_records(SAMPLE.as_bytes(), "a.csv");
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input() {
        let outcome = PayrollParser::default().parse_bytes(b"", "empty.csv");
        assert!(outcome.records.is_empty());
        assert!(outcome.skipped.is_empty());
        assert!(outcome.metadata.is_default());
    }

    #[test]
    fn test_parse_file_missing_names_file() {
        let err = PayrollParser::default()
            .parse_file(Path::new("does/not/exist.csv"))
            .unwrap_err();
        assert!(err.to_string().contains("exist.csv"));
    }
}
