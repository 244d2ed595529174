// 🏷️ Area Resolver - Overrides as Data
// Two persisted maps decide the organizational area of each record:
//   1. person exceptions (employee name → area), non-empty value wins
//   2. role defaults (role title → area)
//   3. otherwise "Undefined"

use crate::error::{Error, Result};
use crate::parser::EventRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const UNDEFINED_AREA: &str = "Undefined";

// ============================================================================
// OVERRIDE MAPS
// ============================================================================

/// Which of the two persisted maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    /// role title → area
    Roles,
    /// employee name → area
    Exceptions,
}

impl OverrideKind {
    pub fn name(&self) -> &'static str {
        match self {
            OverrideKind::Roles => "roles",
            OverrideKind::Exceptions => "exceptions",
        }
    }

    /// Document id used by the persistence gateway
    pub fn document_id(&self) -> &'static str {
        match self {
            OverrideKind::Roles => "role_area_map",
            OverrideKind::Exceptions => "person_area_exceptions",
        }
    }
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OverrideKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roles" => Ok(OverrideKind::Roles),
            "exceptions" => Ok(OverrideKind::Exceptions),
            other => Err(Error::UnknownOverrideMap {
                name: other.to_string(),
            }),
        }
    }
}

/// key → area document (RoleAreaMap or PersonAreaExceptionMap)
///
/// Saved and loaded as a whole; partial edits go through `merged_with`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideMap(BTreeMap<String, String>);

impl OverrideMap {
    pub fn new() -> Self {
        OverrideMap(BTreeMap::new())
    }

    /// Load a `{"key": "area"}` JSON document from disk
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, area: impl Into<String>) {
        self.0.insert(key.into(), area.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Copy with blank-area entries dropped
    pub fn without_empty(&self) -> Self {
        OverrideMap(
            self.0
                .iter()
                .filter(|(_, area)| !area.trim().is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Apply `updates` on top of this map; an empty area removes the key
    pub fn merged_with(&self, updates: &OverrideMap) -> Self {
        let mut merged = self.clone();
        for (key, area) in updates.iter() {
            if area.trim().is_empty() {
                merged.0.remove(key);
            } else {
                merged.0.insert(key.clone(), area.clone());
            }
        }
        merged
    }
}

impl FromIterator<(String, String)> for OverrideMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        OverrideMap(iter.into_iter().collect())
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Which rule produced the area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaSource {
    PersonException,
    RoleDefault,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaResolution {
    pub area: String,
    pub source: AreaSource,
}

pub struct AreaResolver {
    roles: OverrideMap,
    exceptions: OverrideMap,
}

impl AreaResolver {
    pub fn new(roles: OverrideMap, exceptions: OverrideMap) -> Self {
        AreaResolver {
            roles,
            exceptions: exceptions.without_empty(),
        }
    }

    /// Resolve one (employee name, role title) pair
    pub fn resolve(&self, employee_name: &str, role_title: &str) -> AreaResolution {
        if let Some(area) = self.exceptions.get(employee_name) {
            return AreaResolution {
                area: area.to_string(),
                source: AreaSource::PersonException,
            };
        }

        if let Some(area) = self.roles.get(role_title) {
            return AreaResolution {
                area: area.to_string(),
                source: AreaSource::RoleDefault,
            };
        }

        AreaResolution {
            area: UNDEFINED_AREA.to_string(),
            source: AreaSource::Undefined,
        }
    }

    /// Enrich a batch of records with their area
    pub fn resolve_all(&self, records: &[EventRecord]) -> Vec<EventRecord> {
        records
            .iter()
            .map(|record| {
                let resolution = self.resolve(&record.employee_name, &record.role_title);
                record.clone().with_area(resolution.area)
            })
            .collect()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn exception_count(&self) -> usize {
        self.exceptions.len()
    }
}

/// Enrich `records` with areas from the two override maps
pub fn resolve_areas(
    records: &[EventRecord],
    roles: &OverrideMap,
    exceptions: &OverrideMap,
) -> Vec<EventRecord> {
    AreaResolver::new(roles.clone(), exceptions.clone()).resolve_all(records)
}

/// Distinct role titles in `records` with no entry in the roles map
pub fn unmapped_roles(records: &[EventRecord], roles: &OverrideMap) -> Vec<String> {
    records
        .iter()
        .filter(|r| roles.get(&r.role_title).is_none())
        .map(|r| r.role_title.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, role: &str) -> EventRecord {
        EventRecord {
            source_entity: "ACME".to_string(),
            reporting_period: "01/2024".to_string(),
            employee_id: "0001".to_string(),
            employee_name: name.to_string(),
            role_title: role.to_string(),
            original_reference: "1:00".to_string(),
            hours_decimal: 1.0,
            amount: 10.0,
            event_type: None,
            source_file: "test.csv".to_string(),
            area: None,
        }
    }

    fn maps() -> (OverrideMap, OverrideMap) {
        let mut roles = OverrideMap::new();
        roles.insert("ANALISTA FISCAL", "Finance");
        roles.insert("MOTORISTA", "Logistics");

        let mut exceptions = OverrideMap::new();
        exceptions.insert("Jane Doe", "Board");
        exceptions.insert("Blank Person", "");

        (roles, exceptions)
    }

    #[test]
    fn test_person_exception_wins_over_role() {
        let (roles, exceptions) = maps();
        let out = resolve_areas(&[record("Jane Doe", "ANALISTA FISCAL")], &roles, &exceptions);
        assert_eq!(out[0].area.as_deref(), Some("Board"));
    }

    #[test]
    fn test_role_default_applies() {
        let (roles, exceptions) = maps();
        let out = resolve_areas(&[record("John Roe", "MOTORISTA")], &roles, &exceptions);
        assert_eq!(out[0].area.as_deref(), Some("Logistics"));
    }

    #[test]
    fn test_no_match_is_undefined() {
        let (roles, exceptions) = maps();
        let out = resolve_areas(&[record("John Roe", "PILOTO")], &roles, &exceptions);
        assert_eq!(out[0].area.as_deref(), Some(UNDEFINED_AREA));
    }

    #[test]
    fn test_empty_exception_falls_through_to_role() {
        let (roles, exceptions) = maps();
        let resolver = AreaResolver::new(roles, exceptions);
        let resolution = resolver.resolve("Blank Person", "MOTORISTA");

        assert_eq!(resolution.area, "Logistics");
        assert_eq!(resolution.source, AreaSource::RoleDefault);
        assert_eq!(resolver.role_count(), 2);
        assert_eq!(resolver.exception_count(), 1);
    }

    #[test]
    fn test_empty_input() {
        let (roles, exceptions) = maps();
        assert!(resolve_areas(&[], &roles, &exceptions).is_empty());
    }

    #[test]
    fn test_merge_and_removal() {
        let (_, exceptions) = maps();
        let mut updates = OverrideMap::new();
        updates.insert("Jane Doe", "");
        updates.insert("Ana Lima", "Sales");

        let merged = exceptions.merged_with(&updates);
        assert_eq!(merged.get("Jane Doe"), None);
        assert_eq!(merged.get("Ana Lima"), Some("Sales"));
    }

    #[test]
    fn test_unmapped_roles_sorted_distinct() {
        let (roles, _) = maps();
        let records = vec![
            record("A", "PILOTO"),
            record("B", "MOTORISTA"),
            record("C", "CAIXA"),
            record("D", "PILOTO"),
        ];
        assert_eq!(unmapped_roles(&records, &roles), vec!["CAIXA", "PILOTO"]);
    }

    #[test]
    fn test_override_kind_parsing() {
        assert_eq!("roles".parse::<OverrideKind>().unwrap(), OverrideKind::Roles);
        assert_eq!(
            "exceptions".parse::<OverrideKind>().unwrap(),
            OverrideKind::Exceptions
        );
        assert!("areas".parse::<OverrideKind>().is_err());
    }

    #[test]
    fn test_override_map_json_shape() {
        let (roles, _) = maps();
        let json = serde_json::to_string(&roles).unwrap();
        assert_eq!(json, r#"{"ANALISTA FISCAL":"Finance","MOTORISTA":"Logistics"}"#);
    }
}
