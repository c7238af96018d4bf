use crate::domain::money::Money;
use crate::domain::period::{BatchScope, PayPeriod};
use crate::domain::record::PayrollRecord;
use crate::error::PayrollError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    Calculating,
    PendingApproval,
    Approved,
    Frozen,
    Completed,
    Failed,
}

impl BatchStatus {
    /// The legal edges of the batch lifecycle.
    pub fn can_transition(self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, to),
            (Draft, Calculating)
                | (Calculating, PendingApproval)
                | (Calculating, Failed)
                | (PendingApproval, Approved)
                | (PendingApproval, Draft)
                | (PendingApproval, Calculating)
                | (Approved, Frozen)
                | (Approved, Draft)
                | (Approved, Calculating)
                | (Frozen, Completed)
                | (Frozen, Calculating)
                | (Failed, Calculating)
        )
    }

    /// States whose records may not change without a recalculation grant.
    pub fn is_locked(self) -> bool {
        matches!(
            self,
            BatchStatus::Approved | BatchStatus::Frozen | BatchStatus::Completed
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Draft => "draft",
            BatchStatus::Calculating => "calculating",
            BatchStatus::PendingApproval => "pending_approval",
            BatchStatus::Approved => "approved",
            BatchStatus::Frozen => "frozen",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct BatchTotals {
    pub employees: usize,
    pub gross: Money,
    #[serde(default)]
    pub arrears: Money,
    pub deductions: Money,
    pub net: Money,
}

impl BatchTotals {
    pub fn from_records(records: &[PayrollRecord]) -> Self {
        let mut employees: Vec<&str> = records.iter().map(|r| r.employee_id.as_str()).collect();
        employees.sort_unstable();
        employees.dedup();
        Self {
            employees: employees.len(),
            gross: records.iter().map(|r| r.gross).sum(),
            arrears: records.iter().map(|r| r.arrears).sum(),
            deductions: records
                .iter()
                .map(|r| r.total_deductions + r.loan_emi + r.advance_deduction)
                .sum(),
            net: records.iter().map(|r| r.net).sum(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Freeze,
    Recalculation,
    Rollback,
}

/// An immutable copy of a batch's records and status at one point in time.
/// Addressed by its index in `PayrollBatch::history`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct HistoryEntry {
    pub id: usize,
    pub reason: SnapshotReason,
    pub note: Option<String>,
    pub actor: String,
    pub taken_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub records: Vec<PayrollRecord>,
    pub totals: BatchTotals,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub catalog_version: Option<u64>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frozen_by: Option<String>,
    #[serde(default)]
    pub frozen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct StatusChange {
    pub from: BatchStatus,
    pub to: BatchStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Two-person control over recalculating a locked batch. Requester and
/// granter are separate fields so "granter != requester" can be enforced.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct RecalculationControl {
    pub requested_by: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub granted_by: Option<String>,
    pub granted_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RecalculationControl {
    pub fn is_requested(&self) -> bool {
        self.requested_by.is_some()
    }

    pub fn has_live_grant(&self, now: DateTime<Utc>) -> bool {
        self.granted_by.is_some() && self.expires_at.is_none_or(|expiry| now <= expiry)
    }

    pub fn request(&mut self, requester: &str, reason: &str, now: DateTime<Utc>) {
        *self = Self {
            requested_by: Some(requester.to_string()),
            requested_at: Some(now),
            reason: Some(reason.to_string()),
            ..Default::default()
        };
    }

    pub fn grant(&mut self, approver: &str, now: DateTime<Utc>, ttl: Duration) -> Result<(), PayrollError> {
        let requester = self.requested_by.as_deref().ok_or_else(|| {
            PayrollError::StateConflictError("no recalculation has been requested".to_string())
        })?;
        if requester == approver {
            return Err(PayrollError::StateConflictError(
                "recalculation must be granted by someone other than the requester".to_string(),
            ));
        }
        self.granted_by = Some(approver.to_string());
        self.granted_at = Some(now);
        self.expires_at = Some(now + ttl);
        Ok(())
    }

    /// Fails unless a grant exists and has not expired.
    pub fn ensure_live_grant(&self, now: DateTime<Utc>) -> Result<(), PayrollError> {
        if self.has_live_grant(now) {
            return Ok(());
        }
        let message = if self.granted_by.is_some() {
            "recalculation grant has expired"
        } else {
            "recalculation has not been granted"
        };
        Err(PayrollError::StateConflictError(message.to_string()))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    NegativeNet,
    MissingPaymentDetails,
    DuplicateMember,
    MissingRecord,
    RecordWarning,
}

impl IssueKind {
    pub fn is_blocking(self) -> bool {
        !matches!(self, IssueKind::RecordWarning)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub employee_id: String,
    pub period: Option<PayPeriod>,
    pub message: String,
}

/// Read-only findings about a batch. Approval requires no blocking issues.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ValidationReport {
    pub batch_id: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn blocking(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| issue.kind.is_blocking())
    }

    pub fn is_clean(&self) -> bool {
        self.blocking().next().is_none()
    }

    /// One line per blocking issue, for error messages.
    pub fn summary(&self) -> String {
        self.blocking()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A scoped, stateful collection of payroll records.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayrollBatch {
    pub id: String,
    pub scope: BatchScope,
    pub status: BatchStatus,
    /// Employee ids in scope when the batch was last calculated.
    pub members: Vec<String>,
    pub records: Vec<PayrollRecord>,
    pub totals: BatchTotals,
    pub catalog_version: Option<u64>,
    pub history: Vec<HistoryEntry>,
    pub status_log: Vec<StatusChange>,
    pub recalculation: RecalculationControl,
    pub failure: Option<String>,
    pub last_job: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub frozen_by: Option<String>,
    pub frozen_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PayrollBatch {
    pub fn new(scope: BatchScope, created_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope,
            status: BatchStatus::Draft,
            members: Vec::new(),
            records: Vec::new(),
            totals: BatchTotals::default(),
            catalog_version: None,
            history: Vec::new(),
            status_log: Vec::new(),
            recalculation: RecalculationControl::default(),
            failure: None,
            last_job: None,
            created_by: created_by.to_string(),
            created_at: now,
            approved_by: None,
            approved_at: None,
            frozen_by: None,
            frozen_at: None,
            completed_by: None,
            completed_at: None,
        }
    }

    /// Moves to `to` if the edge is legal, logging the change.
    pub fn transition(
        &mut self,
        to: BatchStatus,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), PayrollError> {
        if !self.status.can_transition(to) {
            return Err(PayrollError::StateConflictError(format!(
                "cannot move batch from {} to {}",
                self.status, to
            )));
        }
        self.status_log.push(StatusChange {
            from: self.status,
            to,
            actor: actor.to_string(),
            at: now,
            reason: reason.map(str::to_string),
        });
        self.status = to;
        Ok(())
    }

    /// Appends an immutable copy of the current state and returns its id.
    pub fn snapshot(
        &mut self,
        reason: SnapshotReason,
        note: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let id = self.history.len();
        self.history.push(HistoryEntry {
            id,
            reason,
            note: note.map(str::to_string),
            actor: actor.to_string(),
            taken_at: now,
            status: self.status,
            records: self.records.clone(),
            totals: self.totals,
            members: self.members.clone(),
            catalog_version: self.catalog_version,
            approved_by: self.approved_by.clone(),
            approved_at: self.approved_at,
            frozen_by: self.frozen_by.clone(),
            frozen_at: self.frozen_at,
        });
        id
    }

    /// Replaces all records wholesale and refreshes totals.
    pub fn replace_records(&mut self, mut records: Vec<PayrollRecord>) {
        records.sort_by(|a, b| (&a.employee_id, a.period).cmp(&(&b.employee_id, b.period)));
        self.totals = BatchTotals::from_records(&records);
        self.records = records;
    }

    /// Copies history entry `history_id` into the current slot, including
    /// membership, catalog version and approval stamps. The pre-rollback
    /// state is appended to history first; no entry is mutated.
    pub fn rollback_to(
        &mut self,
        history_id: usize,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PayrollError> {
        let entry = self.history.get(history_id).cloned().ok_or_else(|| {
            PayrollError::NotFoundError(format!(
                "history entry {history_id} in batch {}",
                self.id
            ))
        })?;
        let note = format!("rollback to {history_id}");
        self.snapshot(SnapshotReason::Rollback, Some(&note), actor, now);
        self.status_log.push(StatusChange {
            from: self.status,
            to: entry.status,
            actor: actor.to_string(),
            at: now,
            reason: Some(note),
        });
        self.status = entry.status;
        self.records = entry.records;
        self.totals = entry.totals;
        self.members = entry.members;
        self.catalog_version = entry.catalog_version;
        self.approved_by = entry.approved_by;
        self.approved_at = entry.approved_at;
        self.frozen_by = entry.frozen_by;
        self.frozen_at = entry.frozen_at;
        self.recalculation.clear();
        Ok(())
    }

    pub fn record(&self, employee_id: &str, period: PayPeriod) -> Option<&PayrollRecord> {
        self.records
            .iter()
            .find(|r| r.employee_id == employee_id && r.period == period)
    }
}
