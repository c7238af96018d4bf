use crate::domain::attendance::{LoanInstallment, LoanKind};
use crate::domain::money::Money;
use crate::domain::period::PayPeriod;
use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One installment due from one employee in one period.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct LoanRow {
    pub employee_id: String,
    pub period: PayPeriod,
    pub loan_id: String,
    pub kind: LoanKind,
    pub amount: Decimal,
}

impl LoanRow {
    pub fn installment(&self) -> LoanInstallment {
        LoanInstallment {
            loan_id: self.loan_id.clone(),
            kind: self.kind,
            amount: Money::new(self.amount),
        }
    }
}

/// Reads the loan/advance ledger export.
pub struct LoanReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LoanReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader(source),
        }
    }

    pub fn rows(self) -> impl Iterator<Item = Result<LoanRow>> {
        self.reader
            .into_deserialize::<LoanRow>()
            .map(|result| -> Result<LoanRow> {
                let row = result?;
                if row.amount < Decimal::ZERO {
                    return Err(PayrollError::ValidationError(format!(
                        "installment {} has a negative amount",
                        row.loan_id
                    )));
                }
                Ok(row)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_parses_kinds() {
        let data = "employee_id, period, loan_id, kind, amount\n\
                    E1, 2026-04, L-1, loan, 1500\n\
                    E1, 2026-04, A-7, salary_advance, 2000\n\
                    E2, 2026-04, L-2, mortgage, 10";
        let rows: Vec<Result<LoanRow>> = LoanReader::new(data.as_bytes()).rows().collect();

        let loan = rows[0].as_ref().unwrap();
        assert_eq!(loan.installment().amount, Money::new(dec!(1500)));
        assert_eq!(rows[1].as_ref().unwrap().kind, LoanKind::SalaryAdvance);
        assert!(rows[2].is_err());
    }

    #[test]
    fn test_reader_rejects_negative_amount() {
        let data = "employee_id, period, loan_id, kind, amount\nE1, 2026-04, L-1, loan, -5";
        let rows: Vec<Result<LoanRow>> = LoanReader::new(data.as_bytes()).rows().collect();

        assert!(matches!(rows[0], Err(PayrollError::ValidationError(_))));
    }
}
