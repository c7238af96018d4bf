use crate::error::PayrollError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of periods a single batch may span.
pub const MAX_BATCH_PERIODS: usize = 12;

/// A calendar month payroll period, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayPeriod {
    year: i32,
    month: u32,
}

impl PayPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, PayrollError> {
        if !(1..=12).contains(&month) {
            return Err(PayrollError::ValidationError(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(PayrollError::ValidationError(format!(
                "year {year} is out of range"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days(&self) -> u32 {
        let first = self.first_day();
        let next = self.next().first_day();
        (next - first).num_days() as u32
    }

    pub fn first_day(&self) -> NaiveDate {
        // Validated in the constructor.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PayPeriod {
    type Err = PayrollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PayrollError::ValidationError(format!("invalid period '{s}', expected YYYY-MM"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for PayPeriod {
    type Error = PayrollError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PayPeriod> for String {
    fn from(period: PayPeriod) -> Self {
        period.to_string()
    }
}

impl From<NaiveDate> for PayPeriod {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// What a batch covers: an inclusive period range plus an optional
/// division/department filter on the employee directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchScope {
    pub start: PayPeriod,
    pub end: PayPeriod,
    pub division: Option<String>,
    pub department: Option<String>,
}

impl BatchScope {
    pub fn single(period: PayPeriod) -> Self {
        Self {
            start: period,
            end: period,
            division: None,
            department: None,
        }
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = Some(division.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn validate(&self) -> Result<(), PayrollError> {
        if self.start > self.end {
            return Err(PayrollError::ValidationError(format!(
                "scope start {} is after end {}",
                self.start, self.end
            )));
        }
        if self.periods().len() > MAX_BATCH_PERIODS {
            return Err(PayrollError::ValidationError(format!(
                "a batch may span at most {MAX_BATCH_PERIODS} periods"
            )));
        }
        Ok(())
    }

    /// All periods in the range, oldest first.
    pub fn periods(&self) -> Vec<PayPeriod> {
        let mut periods = Vec::new();
        let mut current = self.start;
        while current <= self.end && periods.len() <= MAX_BATCH_PERIODS {
            periods.push(current);
            current = current.next();
        }
        periods
    }

    pub fn contains(&self, period: PayPeriod) -> bool {
        self.start <= period && period <= self.end
    }

    /// Whether an employee in `division`/`department` falls inside the filter.
    pub fn includes(&self, division: Option<&str>, department: Option<&str>) -> bool {
        let division_ok = self
            .division
            .as_deref()
            .is_none_or(|wanted| division == Some(wanted));
        let department_ok = self
            .department
            .as_deref()
            .is_none_or(|wanted| department == Some(wanted));
        division_ok && department_ok
    }
}

impl fmt::Display for BatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)?;
        } else {
            write!(f, "{}..{}", self.start, self.end)?;
        }
        if let Some(division) = &self.division {
            write!(f, " division={division}")?;
        }
        if let Some(department) = &self.department {
            write!(f, " department={department}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse_and_display() {
        let period: PayPeriod = "2026-02".parse().unwrap();
        assert_eq!(period.year(), 2026);
        assert_eq!(period.month(), 2);
        assert_eq!(period.to_string(), "2026-02");
        assert!("2026-13".parse::<PayPeriod>().is_err());
        assert!("202602".parse::<PayPeriod>().is_err());
    }

    #[test]
    fn test_period_days() {
        assert_eq!("2026-02".parse::<PayPeriod>().unwrap().days(), 28);
        assert_eq!("2024-02".parse::<PayPeriod>().unwrap().days(), 29);
        assert_eq!("2026-12".parse::<PayPeriod>().unwrap().days(), 31);
    }

    #[test]
    fn test_scope_periods_cross_year() {
        let scope = BatchScope {
            start: "2025-11".parse().unwrap(),
            end: "2026-02".parse().unwrap(),
            division: None,
            department: None,
        };
        let periods: Vec<String> = scope.periods().iter().map(|p| p.to_string()).collect();
        assert_eq!(periods, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
        assert!(scope.validate().is_ok());
    }

    #[test]
    fn test_scope_validation() {
        let reversed = BatchScope {
            start: "2026-03".parse().unwrap(),
            end: "2026-01".parse().unwrap(),
            division: None,
            department: None,
        };
        assert!(matches!(reversed.validate(), Err(PayrollError::ValidationError(_))));

        let too_long = BatchScope {
            start: "2025-01".parse().unwrap(),
            end: "2026-06".parse().unwrap(),
            division: None,
            department: None,
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_scope_filter() {
        let scope = BatchScope::single("2026-01".parse().unwrap()).with_department("Sales");
        assert!(scope.includes(Some("North"), Some("Sales")));
        assert!(scope.includes(None, Some("Sales")));
        assert!(!scope.includes(Some("North"), Some("Ops")));
        assert!(!scope.includes(None, None));
    }
}
