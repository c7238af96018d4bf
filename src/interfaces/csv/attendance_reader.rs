use crate::domain::attendance::AttendanceSummary;
use crate::error::{PayrollError, Result};
use std::io::Read;

/// Reads period attendance aggregates, one row per employee and period.
///
/// Columns are the `AttendanceSummary` field names. Only `employee_id`,
/// `period` and `total_days` are required; missing count columns read as 0.
pub struct AttendanceReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AttendanceReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader(source),
        }
    }

    pub fn summaries(self) -> impl Iterator<Item = Result<AttendanceSummary>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PayrollError::from))
    }
}
