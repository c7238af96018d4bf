use crate::application::resolver::{AmountBasis, compute_amount, resolve};
use crate::config::{CountMode, CountPolicy, DayUnit, PolicyConfig};
use crate::domain::attendance::{AttendanceSummary, LoanKind, LoanSchedule, PendingArrear};
use crate::domain::catalog::CatalogSnapshot;
use crate::domain::component::Category;
use crate::domain::employee::Employee;
use crate::domain::money::{Money, round2};
use crate::domain::period::PayPeriod;
use crate::domain::ports::{ArrearsLedgerRef, AttendanceStoreRef, EmployeeDirectoryRef, LoanLedgerRef};
use crate::domain::record::{AttendancePenalty, LineSource, PayLine, PayrollRecord, RecordStatus};
use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalculationOptions {
    /// Treat missing attendance as an all-zero month instead of failing.
    pub zero_default_attendance: bool,
}

/// Computes one employee's payroll for one period.
///
/// The catalog snapshot is passed to every call rather than held, so a
/// batch can pin one version for all of its members.
#[derive(Clone)]
pub struct PayrollEngine {
    directory: EmployeeDirectoryRef,
    attendance: AttendanceStoreRef,
    loans: LoanLedgerRef,
    arrears: ArrearsLedgerRef,
    policy: PolicyConfig,
}

impl PayrollEngine {
    pub fn new(
        directory: EmployeeDirectoryRef,
        attendance: AttendanceStoreRef,
        loans: LoanLedgerRef,
        arrears: ArrearsLedgerRef,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            directory,
            attendance,
            loans,
            arrears,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub async fn calculate(
        &self,
        catalog: &CatalogSnapshot,
        employee_id: &str,
        period: PayPeriod,
        options: CalculationOptions,
    ) -> Result<PayrollRecord> {
        let employee = self
            .directory
            .get(employee_id)
            .await?
            .ok_or_else(|| PayrollError::NotFoundError(format!("employee {employee_id}")))?;

        let attendance = match self.attendance.get(employee_id, period).await? {
            Some(summary) => summary,
            None if options.zero_default_attendance => {
                AttendanceSummary::zeroed(employee_id, period)
            }
            None => {
                return Err(PayrollError::DataIncompleteError(format!(
                    "no attendance for {employee_id} in {period}"
                )));
            }
        };

        let loans = self.loans.schedule(employee_id, period).await?;
        let arrears = self.arrears.pending(employee_id, period).await?;

        let record = compute(
            catalog,
            &self.policy,
            &employee,
            period,
            &attendance,
            &loans,
            &arrears,
        )?;
        for warning in &record.warnings {
            warn!(employee_id, %period, warning = %warning, "calculation warning");
        }
        Ok(record)
    }
}

/// The calculation proper, free of I/O.
pub fn compute(
    catalog: &CatalogSnapshot,
    policy: &PolicyConfig,
    employee: &Employee,
    period: PayPeriod,
    attendance: &AttendanceSummary,
    loans: &LoanSchedule,
    arrears: &[PendingArrear],
) -> Result<PayrollRecord> {
    let base_salary = employee
        .base_salary
        .filter(|salary| *salary > Decimal::ZERO)
        .ok_or_else(|| {
            PayrollError::DataIncompleteError(format!("no base salary for {}", employee.id))
        })?;
    if attendance.total_days == 0 {
        return Err(PayrollError::DataIncompleteError(format!(
            "attendance for {} in {period} has no day count",
            employee.id
        )));
    }

    let total_days = Decimal::from(attendance.total_days);
    let per_day = base_salary / total_days;
    let mut warnings = Vec::new();
    let mut earnings = Vec::new();

    // Basic pay, with days beyond the month paid as incentive.
    let raw_paid = attendance.payable_shifts
        + attendance.paid_leave_days
        + attendance.weekly_offs
        + attendance.holidays;
    let (paid_days, extra_days) = if raw_paid > total_days {
        (total_days, raw_paid - total_days)
    } else {
        (raw_paid, Decimal::ZERO)
    };
    let basic = Money::new(round2(paid_days * per_day));
    earnings.push(PayLine {
        code: "BASIC".to_string(),
        name: "Basic pay".to_string(),
        amount: basic,
        source: LineSource::Basic,
    });
    if extra_days > Decimal::ZERO {
        earnings.push(PayLine {
            code: "INCENTIVE".to_string(),
            name: "Extra days incentive".to_string(),
            amount: Money::new(round2(extra_days * per_day)),
            source: LineSource::Incentive,
        });
    }

    let overtime = &policy.overtime;
    let mut ot_pay = Money::ZERO;
    if attendance.ot_hours > Decimal::ZERO
        && overtime.pay_per_hour > Decimal::ZERO
        && attendance.ot_hours >= overtime.min_hours
    {
        ot_pay = Money::new(round2(attendance.ot_hours * overtime.pay_per_hour));
        earnings.push(PayLine {
            code: "OT".to_string(),
            name: "Overtime".to_string(),
            amount: ot_pay,
            source: LineSource::Overtime {
                hours: attendance.ot_hours,
                rate: Money::new(overtime.pay_per_hour),
            },
        });
    }

    let mut basis = AmountBasis {
        basic,
        gross: basic + ot_pay,
        payable_days: attendance.payable_days(),
        total_days,
    };
    let allowances = component_lines(catalog, employee, Category::Allowance, &basis, &mut warnings);
    earnings.extend(allowances);
    let mut gross: Money = earnings.iter().map(|line| line.amount).sum();

    basis.gross = gross;
    let mut deductions = component_lines(catalog, employee, Category::Deduction, &basis, &mut warnings);
    deductions.extend(attendance_lines(policy, attendance, per_day));
    let total_deductions: Money = deductions.iter().map(|line| line.amount).sum();

    // Arrears join gross only after deductions were sized on regular pay.
    let arrear_lines: Vec<PayLine> = arrears
        .iter()
        .filter(|arrear| arrear.amount > Money::ZERO)
        .map(|arrear| PayLine {
            code: "ARREARS".to_string(),
            name: arrear
                .reason
                .clone()
                .unwrap_or_else(|| "Arrears".to_string()),
            amount: arrear.amount.rounded(),
            source: LineSource::Arrears {
                arrear_id: arrear.arrear_id.clone(),
            },
        })
        .collect();
    let arrears_total: Money = arrear_lines.iter().map(|line| line.amount).sum();
    earnings.extend(arrear_lines);
    gross += arrears_total;

    let recoveries: Vec<PayLine> = loans
        .installments
        .iter()
        .map(|installment| {
            let (code, name, source) = match installment.kind {
                LoanKind::Loan => (
                    "LOAN_EMI",
                    "Loan EMI",
                    LineSource::Loan {
                        loan_id: installment.loan_id.clone(),
                    },
                ),
                LoanKind::SalaryAdvance => (
                    "ADVANCE",
                    "Salary advance recovery",
                    LineSource::Advance {
                        loan_id: installment.loan_id.clone(),
                    },
                ),
            };
            PayLine {
                code: code.to_string(),
                name: name.to_string(),
                amount: installment.amount.rounded(),
                source,
            }
        })
        .collect();
    let loan_emi = loans.total_emi().rounded();
    let advance_deduction = loans.total_advance().rounded();

    for ov in &employee.overrides {
        if catalog.get(&ov.component_id).is_none() {
            warnings.push(format!(
                "override for {} ignored: component not in catalog",
                ov.component_id
            ));
        }
    }

    let exact_net = gross - total_deductions - loan_emi - advance_deduction;
    let net = Money::new(exact_net.value().ceil());
    let round_off = net - exact_net;
    let mut adjustments = Vec::new();
    if round_off > Money::ZERO {
        adjustments.push(PayLine {
            code: "ROUND_OFF".to_string(),
            name: "Round off".to_string(),
            amount: round_off,
            source: LineSource::RoundOff,
        });
    }
    let status = if exact_net.is_negative() {
        warnings.push(format!("net pay is negative: {exact_net}"));
        RecordStatus::NeedsReview
    } else {
        RecordStatus::Calculated
    };

    debug!(
        employee_id = %employee.id,
        %period,
        %gross,
        %total_deductions,
        %net,
        "payroll computed"
    );

    Ok(PayrollRecord {
        employee_id: employee.id.clone(),
        period,
        catalog_version: catalog.version(),
        attendance: attendance.clone(),
        per_day_rate: Money::new(round2(per_day)),
        earnings,
        deductions,
        recoveries,
        adjustments,
        gross,
        arrears: arrears_total,
        total_deductions,
        loan_emi,
        advance_deduction,
        round_off,
        net,
        status,
        warnings,
    })
}

fn component_lines(
    catalog: &CatalogSnapshot,
    employee: &Employee,
    category: Category,
    basis: &AmountBasis,
    warnings: &mut Vec<String>,
) -> Vec<PayLine> {
    let mut lines = Vec::new();
    for component in catalog.by_category(category) {
        let resolution = resolve(component, employee);
        warnings.extend(resolution.warnings);
        let Some(effective) = resolution.rule else {
            continue;
        };
        lines.push(PayLine {
            code: component.id.clone(),
            name: component.name.clone(),
            amount: compute_amount(&effective.rule, basis),
            source: LineSource::Component {
                component_id: component.id.clone(),
                tier: effective.tier,
                rule: effective.rule,
            },
        });
    }
    lines
}

fn attendance_lines(policy: &PolicyConfig, attendance: &AttendanceSummary, per_day: Decimal) -> Vec<PayLine> {
    let mut lines = Vec::new();
    let mut push = |code: &str, name: &str, penalty: AttendancePenalty, days: Decimal| {
        let amount = Money::new(round2(days * per_day));
        if amount > Money::ZERO {
            lines.push(PayLine {
                code: code.to_string(),
                name: name.to_string(),
                amount,
                source: LineSource::Attendance { penalty, days },
            });
        }
    };

    let absent = &policy.absent;
    if absent.enabled {
        let chargeable = (attendance.absent_days() - absent.free_days).max(Decimal::ZERO);
        let extra_per_absent = (absent.lop_days_per_absent - Decimal::ONE).max(Decimal::ZERO);
        push(
            "ABSENT_LOP",
            "Absence loss of pay",
            AttendancePenalty::AbsentLop,
            chargeable * extra_per_absent,
        );
    }

    push(
        "LEAVE_LOP",
        "Unpaid leave",
        AttendancePenalty::LeaveLop,
        attendance.leave_deduction_days,
    );

    let late_early = attendance.late_count + attendance.early_out_count;
    push(
        "LATE_EARLY",
        "Late-in / early-out",
        AttendancePenalty::LateEarly,
        threshold_days(&policy.late_early, late_early, per_day),
    );
    push(
        "PERMISSION",
        "Permissions",
        AttendancePenalty::Permission,
        threshold_days(&policy.permission, attendance.permission_count, per_day),
    );

    lines
}

/// Days charged for `count` occurrences under a threshold policy.
pub fn threshold_days(policy: &CountPolicy, count: u32, per_day: Decimal) -> Decimal {
    if !policy.is_enabled() || count < policy.threshold {
        return Decimal::ZERO;
    }
    let multiplier = Decimal::from(count / policy.threshold);
    let fraction = match policy.mode {
        CountMode::Floor => Decimal::ZERO,
        CountMode::Proportional => {
            Decimal::from(count % policy.threshold) / Decimal::from(policy.threshold)
        }
    };
    let units = multiplier + fraction;

    let days = match policy.unit {
        DayUnit::HalfDay => units * Decimal::new(5, 1),
        DayUnit::FullDay => units,
        DayUnit::CustomAmount if policy.custom_amount > Decimal::ZERO && per_day > Decimal::ZERO => {
            units * policy.custom_amount / per_day
        }
        DayUnit::CustomAmount => Decimal::ZERO,
    };
    round2(days)
}
