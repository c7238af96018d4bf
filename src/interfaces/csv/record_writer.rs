use crate::domain::record::{PayrollRecord, RecordStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One register line. Amounts are written as plain decimals.
#[derive(Debug, Serialize)]
struct RegisterRow<'a> {
    employee_id: &'a str,
    period: String,
    gross: String,
    arrears: String,
    deductions: String,
    loan_emi: String,
    advance: String,
    round_off: String,
    net: String,
    status: RecordStatus,
}

impl<'a> From<&'a PayrollRecord> for RegisterRow<'a> {
    fn from(record: &'a PayrollRecord) -> Self {
        RegisterRow {
            employee_id: &record.employee_id,
            period: record.period.to_string(),
            gross: record.gross.to_string(),
            arrears: record.arrears.to_string(),
            deductions: record.total_deductions.to_string(),
            loan_emi: record.loan_emi.to_string(),
            advance: record.advance_deduction.to_string(),
            round_off: record.round_off.to_string(),
            net: record.net.to_string(),
            status: record.status,
        }
    }
}

/// Writes the payroll register (one row per record) as CSV.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(sink),
        }
    }

    pub fn write_records<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a PayrollRecord>,
    ) -> Result<()> {
        for record in records {
            self.writer.serialize(RegisterRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attendance::AttendanceSummary;
    use crate::domain::money::Money;
    use crate::domain::period::PayPeriod;
    use rust_decimal_macros::dec;

    #[test]
    fn test_register_output() {
        let period: PayPeriod = "2026-04".parse().unwrap();
        let record = PayrollRecord {
            employee_id: "E1".into(),
            period,
            catalog_version: 1,
            attendance: AttendanceSummary::zeroed("E1", period),
            per_day_rate: Money::new(dec!(1000)),
            earnings: Vec::new(),
            deductions: Vec::new(),
            recoveries: Vec::new(),
            adjustments: Vec::new(),
            gross: Money::new(dec!(33173.33)),
            arrears: Money::ZERO,
            total_deductions: Money::new(dec!(2000.00)),
            loan_emi: Money::new(dec!(1500)),
            advance_deduction: Money::ZERO,
            round_off: Money::new(dec!(0.67)),
            net: Money::new(dec!(29674)),
            status: RecordStatus::Calculated,
            warnings: Vec::new(),
        };

        let mut buffer = Vec::new();
        RecordWriter::new(&mut buffer).write_records([&record]).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert_eq!(
            output,
            "employee_id,period,gross,arrears,deductions,loan_emi,advance,round_off,net,status\n\
             E1,2026-04,33173.33,0,2000,1500,0,0.67,29674,calculated\n"
        );
    }
}
