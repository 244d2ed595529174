// 📊 Aggregation Engine
// Grouped summaries, headline metrics, outlier detection and the
// event-category pivot over area-resolved records.

use crate::error::{Error, Result};
use crate::parser::EventRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

// ============================================================================
// DIMENSIONS
// ============================================================================

/// Columns records can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Entity,
    Period,
    Area,
    Role,
    Employee,
    EventType,
}

impl Dimension {
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Entity => "entity",
            Dimension::Period => "period",
            Dimension::Area => "area",
            Dimension::Role => "role",
            Dimension::Employee => "employee",
            Dimension::EventType => "event_type",
        }
    }

    fn value_of(&self, record: &EventRecord) -> String {
        match self {
            Dimension::Entity => record.source_entity.clone(),
            Dimension::Period => record.reporting_period.clone(),
            Dimension::Area => record.area_or_undefined().to_string(),
            Dimension::Role => record.role_title.clone(),
            Dimension::Employee => record.employee_name.clone(),
            Dimension::EventType => record.event_type.clone().unwrap_or_default(),
        }
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "entity" => Ok(Dimension::Entity),
            "period" => Ok(Dimension::Period),
            "area" => Ok(Dimension::Area),
            "role" => Ok(Dimension::Role),
            "employee" => Ok(Dimension::Employee),
            "event_type" | "event" => Ok(Dimension::EventType),
            other => Err(Error::invalid_filter(format!("unknown dimension '{}'", other))),
        }
    }
}

/// Parse "area,role" into dimensions
pub fn parse_dimensions(text: &str) -> Result<Vec<Dimension>> {
    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(Dimension::from_str)
        .collect()
}

/// Employees are identified by entity + employee id
fn employee_key(record: &EventRecord) -> (String, String) {
    (record.source_entity.clone(), record.employee_id.clone())
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// One value per requested dimension, same order
    pub key: Vec<String>,
    pub hours: f64,
    pub amount: f64,
    pub record_count: usize,
    pub distinct_employees: usize,
    pub average_amount_per_employee: f64,
}

#[derive(Default)]
struct GroupAccumulator {
    hours: f64,
    amount: f64,
    record_count: usize,
    employees: BTreeSet<(String, String)>,
}

impl GroupAccumulator {
    fn add(&mut self, record: &EventRecord) {
        self.hours += record.hours_decimal;
        self.amount += record.amount;
        self.record_count += 1;
        self.employees.insert(employee_key(record));
    }
}

/// Sum hours/amount per combination of `dimensions`, sorted by key
///
/// An empty dimension list yields a single grand-total group (or nothing for
/// empty input).
pub fn summarize(records: &[EventRecord], dimensions: &[Dimension]) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<Vec<String>, GroupAccumulator> = BTreeMap::new();

    for record in records {
        let key = dimensions.iter().map(|d| d.value_of(record)).collect();
        groups.entry(key).or_default().add(record);
    }

    groups
        .into_iter()
        .map(|(key, acc)| GroupSummary {
            key,
            hours: acc.hours,
            amount: acc.amount,
            record_count: acc.record_count,
            distinct_employees: acc.employees.len(),
            average_amount_per_employee: ratio(acc.amount, acc.employees.len()),
        })
        .collect()
}

/// Headline metrics for a record set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_amount: f64,
    pub total_hours: f64,
    pub record_count: usize,
    pub distinct_employees: usize,
    pub average_amount_per_employee: f64,
}

pub fn overview(records: &[EventRecord]) -> Overview {
    let mut acc = GroupAccumulator::default();
    for record in records {
        acc.add(record);
    }

    Overview {
        total_amount: acc.amount,
        total_hours: acc.hours,
        record_count: acc.record_count,
        distinct_employees: acc.employees.len(),
        average_amount_per_employee: ratio(acc.amount, acc.employees.len()),
    }
}

// ============================================================================
// EMPLOYEE TOTALS + OUTLIERS
// ============================================================================

/// Per-employee balance across every event in the record set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeTotal {
    pub source_entity: String,
    pub area: String,
    pub employee_id: String,
    pub employee_name: String,
    pub role_title: String,
    pub hours: f64,
    pub amount: f64,
}

/// Aggregate records per (entity, area, employee, role)
pub fn employee_totals(records: &[EventRecord]) -> Vec<EmployeeTotal> {
    let mut totals: BTreeMap<(String, String, String, String, String), (f64, f64)> =
        BTreeMap::new();

    for record in records {
        let key = (
            record.source_entity.clone(),
            record.area_or_undefined().to_string(),
            record.employee_id.clone(),
            record.employee_name.clone(),
            record.role_title.clone(),
        );
        let entry = totals.entry(key).or_insert((0.0, 0.0));
        entry.0 += record.hours_decimal;
        entry.1 += record.amount;
    }

    totals
        .into_iter()
        .map(
            |((source_entity, area, employee_id, employee_name, role_title), (hours, amount))| {
                EmployeeTotal {
                    source_entity,
                    area,
                    employee_id,
                    employee_name,
                    role_title,
                    hours,
                    amount,
                }
            },
        )
        .collect()
}

/// Employees whose total hours exceed `threshold`, most hours first
pub fn detect_outliers(totals: &[EmployeeTotal], threshold: f64) -> Vec<EmployeeTotal> {
    let mut outliers: Vec<EmployeeTotal> = totals
        .iter()
        .filter(|t| t.hours > threshold)
        .cloned()
        .collect();

    outliers.sort_by(|a, b| {
        b.hours
            .total_cmp(&a.hours)
            .then_with(|| a.employee_name.cmp(&b.employee_name))
    });
    outliers
}

// ============================================================================
// EVENT CATEGORY PIVOT
// ============================================================================

/// Closed set of event categories used by the pivot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Overtime paid at +60%
    Overtime60,
    /// Paid weekly rest (DSR) reflex
    Dsr,
    Other,
}

impl EventCategory {
    /// Case-insensitive substring match; "60%" is checked before "DSR"
    pub fn classify(event_type: Option<&str>) -> Self {
        let lowered = event_type.unwrap_or("").to_lowercase();
        if lowered.contains("60%") {
            EventCategory::Overtime60
        } else if lowered.contains("dsr") {
            EventCategory::Dsr
        } else {
            EventCategory::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventCategory::Overtime60 => "HE 60%",
            EventCategory::Dsr => "DSR",
            EventCategory::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPivotRow {
    pub source_entity: String,
    pub area: String,
    pub employee_name: String,
    pub role_title: String,
    pub overtime60_hours: f64,
    pub overtime60_amount: f64,
    pub dsr_hours: f64,
    pub dsr_amount: f64,
    pub other_hours: f64,
    pub other_amount: f64,
    /// Sum of every category amount column
    pub total_amount: f64,
}

impl CategoryPivotRow {
    fn empty(key: (String, String, String, String)) -> Self {
        let (source_entity, area, employee_name, role_title) = key;
        CategoryPivotRow {
            source_entity,
            area,
            employee_name,
            role_title,
            overtime60_hours: 0.0,
            overtime60_amount: 0.0,
            dsr_hours: 0.0,
            dsr_amount: 0.0,
            other_hours: 0.0,
            other_amount: 0.0,
            total_amount: 0.0,
        }
    }

    fn add(&mut self, category: EventCategory, hours: f64, amount: f64) {
        match category {
            EventCategory::Overtime60 => {
                self.overtime60_hours += hours;
                self.overtime60_amount += amount;
            }
            EventCategory::Dsr => {
                self.dsr_hours += hours;
                self.dsr_amount += amount;
            }
            EventCategory::Other => {
                self.other_hours += hours;
                self.other_amount += amount;
            }
        }
        self.total_amount = self.overtime60_amount + self.dsr_amount + self.other_amount;
    }
}

/// Pivot hours/amount per (entity, area, employee, role) × event category
pub fn pivot_by_category(records: &[EventRecord]) -> Vec<CategoryPivotRow> {
    let mut rows: BTreeMap<(String, String, String, String), CategoryPivotRow> = BTreeMap::new();

    for record in records {
        let key = (
            record.source_entity.clone(),
            record.area_or_undefined().to_string(),
            record.employee_name.clone(),
            record.role_title.clone(),
        );
        let category = EventCategory::classify(record.event_type.as_deref());
        rows.entry(key.clone())
            .or_insert_with(|| CategoryPivotRow::empty(key))
            .add(category, record.hours_decimal, record.amount);
    }

    rows.into_values().collect()
}

// ============================================================================
// TESTS
// ============================================================================
