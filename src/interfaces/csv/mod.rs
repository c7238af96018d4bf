//! CSV adapters for the directory, attendance, loan and arrears feeds, the
//! override import and the payroll register.
//!
//! Every reader trims whitespace and tolerates ragged rows, and yields one
//! `Result` per row so a bad line never hides the rest of the file.

use std::io::Read;

pub mod arrears_reader;
pub mod attendance_reader;
pub mod employee_reader;
pub mod loan_reader;
pub mod override_reader;
pub mod record_writer;

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}
