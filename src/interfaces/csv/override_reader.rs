use crate::application::service::OverrideRequest;
use crate::domain::component::{Category, PercentageBase, RawRule, RuleType};
use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One spreadsheet row. Rule fields stay loose here; shape checks happen in
/// the service, on the same path as a direct edit.
#[derive(Debug, Deserialize)]
struct OverrideRow {
    employee_id: String,
    component_id: String,
    category: Option<Category>,
    #[serde(rename = "type")]
    rule_type: Option<RuleType>,
    amount: Option<Decimal>,
    percentage: Option<Decimal>,
    percentage_base: Option<PercentageBase>,
    min_amount: Option<Decimal>,
    max_amount: Option<Decimal>,
    prorate_by_attendance: Option<bool>,
}

impl From<OverrideRow> for OverrideRequest {
    fn from(row: OverrideRow) -> Self {
        OverrideRequest {
            employee_id: row.employee_id,
            component_id: row.component_id,
            category: row.category,
            rule: RawRule {
                rule_type: row.rule_type,
                amount: row.amount,
                percentage: row.percentage,
                percentage_base: row.percentage_base,
                min_amount: row.min_amount,
                max_amount: row.max_amount,
                prorate_by_attendance: row.prorate_by_attendance.unwrap_or(false),
            },
        }
    }
}

/// Reads a bulk override import.
pub struct OverrideReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OverrideReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader(source),
        }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<OverrideRequest>> {
        self.reader
            .into_deserialize::<OverrideRow>()
            .map(|result| result.map(OverrideRequest::from).map_err(PayrollError::from))
    }
}
