use crate::domain::money::Money;
use crate::domain::period::PayPeriod;
use crate::error::PayrollError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Period attendance aggregate for one employee, produced upstream by the
/// attendance pipeline. Day counts may be fractional (half days).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AttendanceSummary {
    pub employee_id: String,
    pub period: PayPeriod,
    pub total_days: u32,
    #[serde(default)]
    pub payable_shifts: Decimal,
    #[serde(default)]
    pub present_days: Decimal,
    #[serde(default)]
    pub paid_leave_days: Decimal,
    #[serde(default)]
    pub od_days: Decimal,
    #[serde(default)]
    pub weekly_offs: Decimal,
    #[serde(default)]
    pub holidays: Decimal,
    #[serde(default)]
    pub ot_hours: Decimal,
    #[serde(default)]
    pub leave_deduction_days: Decimal,
    #[serde(default)]
    pub late_count: u32,
    #[serde(default)]
    pub early_out_count: u32,
    #[serde(default)]
    pub permission_count: u32,
}

impl AttendanceSummary {
    /// The all-zero aggregate used when a caller opts into zero-defaulting.
    pub fn zeroed(employee_id: impl Into<String>, period: PayPeriod) -> Self {
        Self {
            employee_id: employee_id.into(),
            period,
            total_days: period.days(),
            payable_shifts: Decimal::ZERO,
            present_days: Decimal::ZERO,
            paid_leave_days: Decimal::ZERO,
            od_days: Decimal::ZERO,
            weekly_offs: Decimal::ZERO,
            holidays: Decimal::ZERO,
            ot_hours: Decimal::ZERO,
            leave_deduction_days: Decimal::ZERO,
            late_count: 0,
            early_out_count: 0,
            permission_count: 0,
        }
    }

    /// Days that count towards prorated fixed components.
    pub fn payable_days(&self) -> Decimal {
        self.present_days + self.paid_leave_days + self.od_days
    }

    /// Rejects aggregates no calculation can use: a zero day count or a
    /// negative count anywhere.
    pub fn validate(&self) -> Result<(), PayrollError> {
        if self.total_days == 0 {
            return Err(PayrollError::ValidationError(
                "total_days must be positive".to_string(),
            ));
        }
        let counts = [
            ("payable_shifts", self.payable_shifts),
            ("present_days", self.present_days),
            ("paid_leave_days", self.paid_leave_days),
            ("od_days", self.od_days),
            ("weekly_offs", self.weekly_offs),
            ("holidays", self.holidays),
            ("ot_hours", self.ot_hours),
            ("leave_deduction_days", self.leave_deduction_days),
        ];
        if let Some((field, value)) = counts
            .iter()
            .find(|(_, value)| *value < Decimal::ZERO)
        {
            return Err(PayrollError::ValidationError(format!(
                "{field} must not be negative, got {value}"
            )));
        }
        Ok(())
    }

    /// Days neither worked nor otherwise accounted for.
    pub fn absent_days(&self) -> Decimal {
        let accounted = self.present_days
            + self.weekly_offs
            + self.holidays
            + self.paid_leave_days
            + self.od_days;
        (Decimal::from(self.total_days) - accounted).max(Decimal::ZERO)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LoanKind {
    Loan,
    SalaryAdvance,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LoanInstallment {
    pub loan_id: String,
    pub kind: LoanKind,
    pub amount: Money,
}

/// What the loan ledger wants recovered from one employee in one period.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct LoanSchedule {
    pub installments: Vec<LoanInstallment>,
}

impl LoanSchedule {
    pub fn total_emi(&self) -> Money {
        self.total_of(LoanKind::Loan)
    }

    pub fn total_advance(&self) -> Money {
        self.total_of(LoanKind::SalaryAdvance)
    }

    fn total_of(&self, kind: LoanKind) -> Money {
        self.installments
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.amount)
            .sum()
    }
}

/// An approved arrear still owed to an employee, settled through payroll.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PendingArrear {
    pub arrear_id: String,
    pub amount: Money,
    #[serde(default)]
    pub reason: Option<String>,
}
