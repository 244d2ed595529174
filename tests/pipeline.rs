// End-to-end: export files → parser → storage → areas → reports

use payroll_insight::aggregation::parse_dimensions;
use payroll_insight::db::verify_count;
use payroll_insight::export::{detail_rows, summary_table, write_rows, RecordRow};
use payroll_insight::{
    concat_records, detect_outliers, employee_totals, load_filter_options, load_override_map,
    load_records, overview, parse_many, pivot_by_category, resolve_areas, save_override_map,
    setup_database, simulate, summarize, unmapped_roles, upsert_records, CsvRenderer,
    EventRecord, ExportInput, OverrideKind, OverrideMap, PayrollParser, RecordFilter,
    ScenarioParams, SkipReason, SourceEncoding, TableRenderer,
};
use rusqlite::Connection;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn inputs() -> Vec<ExportInput> {
    vec![
        ExportInput::from_path(&fixture("acme_2024_01.csv")).unwrap(),
        ExportInput::from_path(&fixture("beta_2024_02.csv")).unwrap(),
    ]
}

fn role_map() -> OverrideMap {
    [
        ("ANALISTA FISCAL", "Fiscal"),
        ("AUXILIAR ADM", "Administrativo"),
        ("OPERADOR", "Operações"),
        ("SUPERVISOR", "Operações"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn exception_map() -> OverrideMap {
    let mut map = OverrideMap::new();
    map.insert("John Roe", "Fiscal");
    map
}

/// Database with both fixtures imported and both maps saved
fn seeded_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();

    let records = concat_records(&parse_many(&inputs(), 256));
    upsert_records(&conn, &records).unwrap();
    save_override_map(&conn, OverrideKind::Roles, &role_map()).unwrap();
    save_override_map(&conn, OverrideKind::Exceptions, &exception_map()).unwrap();
    conn
}

fn load_all(conn: &Connection) -> Vec<EventRecord> {
    let (entities, periods) = load_filter_options(conn).unwrap();
    let records = load_records(conn, &RecordFilter::new(entities, periods)).unwrap();
    let roles = load_override_map(conn, OverrideKind::Roles).unwrap();
    let exceptions = load_override_map(conn, OverrideKind::Exceptions).unwrap();
    resolve_areas(&records, &roles, &exceptions)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_utf8_export_is_parsed() {
    let mut parser = PayrollParser::default();
    let outcome = parser.parse_file(&fixture("acme_2024_01.csv")).unwrap();

    assert_eq!(outcome.encoding, SourceEncoding::Utf8);
    assert_eq!(outcome.metadata.source_entity, "ACME COMERCIO LTDA");
    assert_eq!(outcome.metadata.reporting_period, "01/2024");
    assert_eq!(outcome.records.len(), 5);

    let overtime: Vec<_> = outcome
        .records
        .iter()
        .filter(|r| r.event_type.as_deref() == Some("0150 - HORAS EXTRAS 60%"))
        .collect();
    assert_eq!(overtime.len(), 3);
    assert_eq!(overtime[2].employee_name, "Maria Silva");
    assert_eq!(overtime[2].hours_decimal, 45.0);
    assert_eq!(overtime[2].amount, 4500.0);

    let count = |wanted: SkipReason| outcome.skipped.iter().filter(|s| s.reason == wanted).count();
    assert_eq!(count(SkipReason::Separator), 2);
    assert_eq!(count(SkipReason::Footer), 2);
    assert_eq!(count(SkipReason::Blank), 1);
}

#[test]
fn test_latin1_export_is_parsed() {
    let mut parser = PayrollParser::default();
    let outcome = parser.parse_file(&fixture("beta_2024_02.csv")).unwrap();

    assert_eq!(outcome.encoding, SourceEncoding::Latin1);
    assert_eq!(outcome.metadata.source_entity, "BETA INDÚSTRIA S.A.");
    assert_eq!(outcome.metadata.reporting_period, "02/2024");
    assert_eq!(outcome.records.len(), 2);

    let jose = &outcome.records[0];
    assert_eq!(jose.employee_name, "José Araújo");
    assert_eq!(jose.role_title, "SUPERVISOR");
    assert_eq!(jose.hours_decimal, 10.25);
    assert_eq!(jose.amount, 2050.0);

    let ana = &outcome.records[1];
    assert_eq!(ana.role_title, "COORDENADORA");
    assert_eq!(ana.original_reference, "1:45");
}

#[test]
fn test_reimport_changes_nothing() {
    let conn = seeded_db();
    assert_eq!(verify_count(&conn).unwrap(), 7);

    let records = concat_records(&parse_many(&inputs(), 256));
    assert_eq!(upsert_records(&conn, &records).unwrap(), 0);
    assert_eq!(verify_count(&conn).unwrap(), 7);
}

#[test]
fn test_filter_options_and_selection() {
    let conn = seeded_db();
    let (entities, periods) = load_filter_options(&conn).unwrap();
    assert_eq!(entities, vec!["ACME COMERCIO LTDA", "BETA INDÚSTRIA S.A."]);
    assert_eq!(periods, vec!["01/2024", "02/2024"]);

    let acme_only = RecordFilter::new(["ACME COMERCIO LTDA"], periods.clone());
    assert_eq!(load_records(&conn, &acme_only).unwrap().len(), 5);

    let mismatched = RecordFilter::new(["ACME COMERCIO LTDA"], ["02/2024"]);
    assert!(load_records(&conn, &mismatched).unwrap().is_empty());
}

#[test]
fn test_areas_and_area_summary() {
    let conn = seeded_db();
    let records = load_all(&conn);

    let john = records.iter().find(|r| r.employee_name == "John Roe").unwrap();
    assert_eq!(john.area.as_deref(), Some("Fiscal"));

    let roles = load_override_map(&conn, OverrideKind::Roles).unwrap();
    assert_eq!(unmapped_roles(&records, &roles), vec!["COORDENADORA"]);

    let dimensions = parse_dimensions("area").unwrap();
    let groups = summarize(&records, &dimensions);
    let keys: Vec<&str> = groups.iter().map(|g| g.key[0].as_str()).collect();
    assert_eq!(keys, vec!["Fiscal", "Operações", "Undefined"]);

    let fiscal = &groups[0];
    assert!(close(fiscal.amount, 2062.5));
    assert!(close(fiscal.hours, 10.5));
    assert_eq!(fiscal.record_count, 3);
    assert_eq!(fiscal.distinct_employees, 2);

    let operations = &groups[1];
    assert!(close(operations.amount, 7300.0));
    assert_eq!(operations.distinct_employees, 2);

    let totals = overview(&records);
    assert!(close(totals.total_amount, 9742.5));
    assert_eq!(totals.distinct_employees, 5);
}

#[test]
fn test_outliers_and_pivot() {
    let records = load_all(&seeded_db());

    let outliers = detect_outliers(&employee_totals(&records), 40.0);
    assert_eq!(outliers.len(), 1);
    assert_eq!(outliers[0].employee_name, "Maria Silva");
    assert!(close(outliers[0].hours, 45.0));

    let pivot = pivot_by_category(&records);
    let maria = pivot.iter().find(|r| r.employee_name == "Maria Silva").unwrap();
    assert!(close(maria.overtime60_amount, 4500.0));
    assert!(close(maria.dsr_amount, 750.0));
    assert!(close(maria.other_amount, 0.0));
    assert!(close(maria.total_amount, 5250.0));
}

#[test]
fn test_simulation_over_stored_records() {
    let records = load_all(&seeded_db());
    let params = ScenarioParams {
        target_areas: ["Operações".to_string()].into_iter().collect(),
        min_hours: 10.0,
        cash_percentage: 50.0,
        cash_installments: 2,
        time_off_months: 3,
    };

    let result = simulate(&employee_totals(&records), &params).unwrap();
    assert_eq!(result.totals.employees, 2);
    assert!(close(result.totals.cash_amount, 3650.0));
    assert!(close(result.totals.monthly_cash, 1825.0));
    assert!(close(result.totals.time_off_days, 3.453125));

    let maria = result
        .employees
        .iter()
        .find(|e| e.employee_name == "Maria Silva")
        .unwrap();
    assert!(close(maria.time_off_days, 2.8125));
    assert!(close(maria.days_per_month, 0.9375));
}

#[test]
fn test_reports_written_to_directory() {
    let records = load_all(&seeded_db());
    let dir = tempfile::tempdir().unwrap();

    let rows: Vec<RecordRow> = records.iter().map(RecordRow::from).collect();
    let written = write_rows(&dir.path().join("records.csv"), &rows).unwrap();
    assert_eq!(written, 7);

    let dimensions = parse_dimensions("entity,area").unwrap();
    let table = summary_table(&dimensions, &summarize(&records, &dimensions));
    CsvRenderer
        .render(&table, &dir.path().join("area_summary.csv"))
        .unwrap();

    write_rows(&dir.path().join("top.csv"), &detail_rows(&records, 3)).unwrap();

    let summary = std::fs::read_to_string(dir.path().join("area_summary.csv")).unwrap();
    assert!(summary.lines().next().unwrap().starts_with("entity,area,"));
    assert!(summary.contains("BETA INDÚSTRIA S.A.,Undefined"));

    let top = std::fs::read_to_string(dir.path().join("top.csv")).unwrap();
    assert_eq!(top.lines().count(), 4);
    assert!(top.lines().nth(1).unwrap().starts_with("Maria Silva,OPERADOR"));
}
