use crate::domain::attendance::AttendanceSummary;
use crate::domain::component::Rule;
use crate::domain::money::Money;
use crate::domain::period::PayPeriod;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which resolution tier produced a component line.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RuleTier {
    Override,
    DivisionDepartment,
    Department,
    Global,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AttendancePenalty {
    AbsentLop,
    LeaveLop,
    LateEarly,
    Permission,
}

/// Where a record line came from.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineSource {
    Basic,
    Incentive,
    Overtime { hours: Decimal, rate: Money },
    Component {
        component_id: String,
        tier: RuleTier,
        rule: Rule,
    },
    Attendance {
        penalty: AttendancePenalty,
        days: Decimal,
    },
    Loan { loan_id: String },
    Advance { loan_id: String },
    Arrears { arrear_id: String },
    /// Rounds net pay up to the next whole unit.
    RoundOff,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayLine {
    pub code: String,
    pub name: String,
    pub amount: Money,
    pub source: LineSource,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Calculated,
    /// Computed, but needs a human look before it can be paid (negative net).
    NeedsReview,
}

/// One employee's payroll for one period, line-itemized.
///
/// Carries no timestamps or generated ids: recomputing from the same inputs
/// yields an equal value and equal serialized bytes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayrollRecord {
    pub employee_id: String,
    pub period: PayPeriod,
    pub catalog_version: u64,
    pub attendance: AttendanceSummary,
    pub per_day_rate: Money,
    pub earnings: Vec<PayLine>,
    pub deductions: Vec<PayLine>,
    /// Loan EMI and salary advance lines.
    pub recoveries: Vec<PayLine>,
    /// The round-off line, when net pay was not already whole.
    #[serde(default)]
    pub adjustments: Vec<PayLine>,
    /// Includes `arrears`.
    pub gross: Money,
    #[serde(default)]
    pub arrears: Money,
    /// Sum of `deductions`. Recoveries are totalled separately below.
    pub total_deductions: Money,
    pub loan_emi: Money,
    pub advance_deduction: Money,
    #[serde(default)]
    pub round_off: Money,
    pub net: Money,
    pub status: RecordStatus,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl PayrollRecord {
    pub fn key(&self) -> (String, PayPeriod) {
        (self.employee_id.clone(), self.period)
    }

    pub fn needs_review(&self) -> bool {
        self.status == RecordStatus::NeedsReview
    }

    pub fn line(&self, code: &str) -> Option<&PayLine> {
        self.earnings
            .iter()
            .chain(self.deductions.iter())
            .chain(self.recoveries.iter())
            .chain(self.adjustments.iter())
            .find(|line| line.code == code)
    }
}
