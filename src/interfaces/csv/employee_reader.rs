use crate::domain::employee::{Employee, PaymentDetails};
use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One directory row. Overrides are not part of the directory feed; they
/// come in through the override import.
#[derive(Debug, Deserialize)]
struct EmployeeRow {
    id: String,
    name: String,
    division: Option<String>,
    department: Option<String>,
    designation: Option<String>,
    base_salary: Option<Decimal>,
    bank_name: Option<String>,
    account_number: Option<String>,
    is_active: Option<bool>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        let payment = match (row.bank_name, row.account_number) {
            (bank_name, Some(account_number)) => Some(PaymentDetails {
                bank_name: bank_name.unwrap_or_default(),
                account_number,
            }),
            (_, None) => None,
        };
        Employee {
            division: row.division,
            department: row.department,
            designation: row.designation,
            base_salary: row.base_salary,
            payment,
            is_active: row.is_active.unwrap_or(true),
            ..Employee::new(row.id, row.name)
        }
    }
}

/// Reads the employee directory export.
pub struct EmployeeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EmployeeReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader(source),
        }
    }

    pub fn employees(self) -> impl Iterator<Item = Result<Employee>> {
        self.reader
            .into_deserialize::<EmployeeRow>()
            .map(|result| result.map(Employee::from).map_err(PayrollError::from))
    }
}
