use crate::domain::attendance::PendingArrear;
use crate::domain::money::Money;
use crate::domain::period::PayPeriod;
use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// An arrear to be paid out to one employee in one period.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ArrearRow {
    pub employee_id: String,
    pub period: PayPeriod,
    pub arrear_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ArrearRow {
    pub fn arrear(&self) -> PendingArrear {
        PendingArrear {
            arrear_id: self.arrear_id.clone(),
            amount: Money::new(self.amount),
            reason: self.reason.clone().filter(|reason| !reason.is_empty()),
        }
    }
}

pub struct ArrearsReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ArrearsReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader(source),
        }
    }

    pub fn rows(self) -> impl Iterator<Item = Result<ArrearRow>> {
        self.reader
            .into_deserialize::<ArrearRow>()
            .map(|result| -> Result<ArrearRow> {
                let row = result?;
                if row.amount <= Decimal::ZERO {
                    return Err(PayrollError::ValidationError(format!(
                        "arrear {} must have a positive amount",
                        row.arrear_id
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
    fn test_reader_keeps_optional_reason() {
        let data = "employee_id, period, arrear_id, amount, reason\n\
                    E1, 2026-04, AR-1, 1250.50, Revision\n\
                    E2, 2026-04, AR-2, 300,\n\
                    E3, 2026-04, AR-3, 0, Void";
        let rows: Vec<Result<ArrearRow>> = ArrearsReader::new(data.as_bytes()).rows().collect();

        let first = rows[0].as_ref().unwrap().arrear();
        assert_eq!(first.amount, Money::new(dec!(1250.50)));
        assert_eq!(first.reason.as_deref(), Some("Revision"));
        assert_eq!(rows[1].as_ref().unwrap().arrear().reason, None);
        assert!(matches!(rows[2], Err(PayrollError::ValidationError(_))));
    }
}
