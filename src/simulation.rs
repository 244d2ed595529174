// 🧮 Compensation Simulation
// What-if split of accumulated overtime balances into a cash payout (paid in
// installments) and time off (diluted over months).
//
// For each selected employee:
//   cash_amount     = amount × p / 100
//   monthly_cash    = cash_amount / cash_installments
//   time_off_hours  = hours × (100 - p) / 100
//   time_off_days   = time_off_hours / 8
//   days_per_month  = time_off_days / time_off_months

use crate::aggregation::EmployeeTotal;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Hours in one time-off day
pub const WORKDAY_HOURS: f64 = 8.0;

// ============================================================================
// SCENARIO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Areas included in the scenario; empty selects nobody
    pub target_areas: BTreeSet<String>,
    /// Employees below this many hours are left out
    pub min_hours: f64,
    /// Share of the balance paid in cash, 0..=100
    pub cash_percentage: f64,
    /// Number of cash installments (≥ 1)
    pub cash_installments: u32,
    /// Months the time off is spread over (≥ 1)
    pub time_off_months: u32,
}

impl ScenarioParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.cash_percentage) {
            return Err(Error::invalid_scenario(format!(
                "cash percentage must be within 0..=100, got {}",
                self.cash_percentage
            )));
        }
        if self.cash_installments < 1 {
            return Err(Error::invalid_scenario("cash installments must be at least 1"));
        }
        if self.time_off_months < 1 {
            return Err(Error::invalid_scenario("time-off months must be at least 1"));
        }
        if !self.min_hours.is_finite() {
            return Err(Error::invalid_scenario("minimum hours must be a finite number"));
        }
        Ok(())
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeProjection {
    pub source_entity: String,
    pub area: String,
    pub employee_name: String,
    pub role_title: String,
    pub hours: f64,
    pub amount: f64,
    pub cash_amount: f64,
    pub monthly_cash: f64,
    pub time_off_hours: f64,
    pub time_off_days: f64,
    pub days_per_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTotals {
    pub employees: usize,
    pub cash_amount: f64,
    pub monthly_cash: f64,
    pub time_off_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub params: ScenarioParams,
    pub employees: Vec<EmployeeProjection>,
    pub totals: SimulationTotals,
}

// ============================================================================
// ENGINE
// ============================================================================

fn project(total: &EmployeeTotal, params: &ScenarioParams) -> EmployeeProjection {
    let cash_share = params.cash_percentage / 100.0;
    let cash_amount = total.amount * cash_share;
    let time_off_hours = total.hours * (100.0 - params.cash_percentage) / 100.0;
    let time_off_days = time_off_hours / WORKDAY_HOURS;

    EmployeeProjection {
        source_entity: total.source_entity.clone(),
        area: total.area.clone(),
        employee_name: total.employee_name.clone(),
        role_title: total.role_title.clone(),
        hours: total.hours,
        amount: total.amount,
        cash_amount,
        monthly_cash: cash_amount / params.cash_installments as f64,
        time_off_hours,
        time_off_days,
        days_per_month: time_off_days / params.time_off_months as f64,
    }
}

/// Run a scenario over per-employee balances
///
/// No matching employee is a valid, all-zero result.
pub fn simulate(totals: &[EmployeeTotal], params: &ScenarioParams) -> Result<SimulationResult> {
    params.validate()?;

    let employees: Vec<EmployeeProjection> = totals
        .iter()
        .filter(|t| params.target_areas.contains(&t.area) && t.hours >= params.min_hours)
        .map(|t| project(t, params))
        .collect();

    let totals = SimulationTotals {
        employees: employees.len(),
        cash_amount: employees.iter().map(|e| e.cash_amount).sum(),
        monthly_cash: employees.iter().map(|e| e.monthly_cash).sum(),
        time_off_days: employees.iter().map(|e| e.time_off_days).sum(),
    };

    debug!(
        "Simulation over {} employees: cash {:.2}, time off {:.2} days",
        totals.employees,
        totals.cash_amount,
        totals.time_off_days
    );

    Ok(SimulationResult {
        params: params.clone(),
        employees,
        totals,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn total(name: &str, area: &str, hours: f64, amount: f64) -> EmployeeTotal {
        EmployeeTotal {
            source_entity: "ACME".to_string(),
            area: area.to_string(),
            employee_id: name.to_lowercase(),
            employee_name: name.to_string(),
            role_title: "ANALISTA".to_string(),
            hours,
            amount,
        }
    }

    fn params(areas: &[&str], min_hours: f64, pct: f64) -> ScenarioParams {
        ScenarioParams {
            target_areas: areas.iter().map(|a| a.to_string()).collect(),
            min_hours,
            cash_percentage: pct,
            cash_installments: 2,
            time_off_months: 4,
        }
    }

    #[test]
    fn test_projection_values() {
        let totals = vec![total("Jane", "Finance", 40.0, 2000.0)];
        let result = simulate(&totals, &params(&["Finance"], 0.0, 25.0)).unwrap();

        let jane = &result.employees[0];
        assert_eq!(jane.cash_amount, 500.0);
        assert_eq!(jane.monthly_cash, 250.0);
        assert_eq!(jane.time_off_hours, 30.0);
        assert_eq!(jane.time_off_days, 3.75);
        assert_eq!(jane.days_per_month, 0.9375);
    }

    #[test]
    fn test_filters_by_area_and_min_hours() {
        let totals = vec![
            total("Jane", "Finance", 40.0, 2000.0),
            total("John", "Finance", 5.0, 100.0),
            total("Ana", "Sales", 80.0, 4000.0),
        ];
        let result = simulate(&totals, &params(&["Finance"], 10.0, 50.0)).unwrap();

        assert_eq!(result.totals.employees, 1);
        assert_eq!(result.employees[0].employee_name, "Jane");
        assert_eq!(result.totals.cash_amount, 1000.0);
        assert_eq!(result.totals.monthly_cash, 500.0);
        assert_eq!(result.totals.time_off_days, 2.5);
    }

    #[test]
    fn test_split_partitions_the_balance() {
        let totals = vec![
            total("A", "Ops", 13.7, 987.65),
            total("B", "Ops", 0.5, 12.34),
            total("C", "Ops", 211.0, 15000.0),
        ];
        for pct in [0.0, 12.5, 33.3, 50.0, 99.9, 100.0] {
            let result = simulate(&totals, &params(&["Ops"], 0.0, pct)).unwrap();
            for e in &result.employees {
                let split = e.cash_amount / e.amount + e.time_off_hours / e.hours;
                assert!((split - 1.0).abs() < 1e-9, "pct {} split {}", pct, split);
            }
        }
    }

    #[test]
    fn test_no_match_is_zero_result() {
        let totals = vec![total("Jane", "Finance", 40.0, 2000.0)];
        let result = simulate(&totals, &params(&["Sales"], 0.0, 50.0)).unwrap();

        assert!(result.employees.is_empty());
        assert_eq!(result.totals.employees, 0);
        assert_eq!(result.totals.cash_amount, 0.0);

        assert!(simulate(&[], &params(&["Sales"], 0.0, 50.0)).unwrap().employees.is_empty());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(simulate(&[], &params(&["A"], 0.0, 120.0)).is_err());
        assert!(simulate(&[], &params(&["A"], 0.0, -1.0)).is_err());

        let mut bad = params(&["A"], 0.0, 50.0);
        bad.cash_installments = 0;
        assert!(bad.validate().is_err());

        let mut bad = params(&["A"], 0.0, 50.0);
        bad.time_off_months = 0;
        assert!(matches!(bad.validate(), Err(Error::InvalidScenario { .. })));
    }
}
