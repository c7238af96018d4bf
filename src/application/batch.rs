use crate::domain::batch::{
    BatchStatus, IssueKind, PayrollBatch, SnapshotReason, ValidationIssue, ValidationReport,
};
use crate::domain::job::BulkOutcome;
use crate::domain::period::{BatchScope, PayPeriod};
use crate::domain::ports::{BatchStoreRef, EmployeeDirectoryRef, Notification, NotifierRef};
use crate::domain::record::PayrollRecord;
use crate::error::{PayrollError, Result};
use chrono::{Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns every batch state change.
///
/// Mutations are read-modify-write against the batch store and are
/// serialised by one async mutex.
#[derive(Clone)]
pub struct BatchManager {
    batches: BatchStoreRef,
    directory: EmployeeDirectoryRef,
    notifier: NotifierRef,
    grant_ttl: Duration,
    guard: Arc<Mutex<()>>,
}

impl BatchManager {
    pub fn new(
        batches: BatchStoreRef,
        directory: EmployeeDirectoryRef,
        notifier: NotifierRef,
        grant_ttl: Duration,
    ) -> Self {
        Self {
            batches,
            directory,
            notifier,
            grant_ttl,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, batch_id: &str) -> Result<PayrollBatch> {
        self.batches
            .get(batch_id)
            .await?
            .ok_or_else(|| PayrollError::NotFoundError(format!("batch {batch_id}")))
    }

    pub async fn all(&self) -> Result<Vec<PayrollBatch>> {
        self.batches.all().await
    }

    /// Creates a batch and moves it straight to `calculating`. The caller
    /// enqueues the calculation job.
    pub async fn create(&self, scope: BatchScope, actor: &str) -> Result<PayrollBatch> {
        scope.validate()?;
        let _guard = self.guard.lock().await;

        if self.batches.all().await?.iter().any(|b| b.scope == scope) {
            return Err(PayrollError::StateConflictError(format!(
                "a batch for {scope} already exists"
            )));
        }

        let now = Utc::now();
        let mut batch = PayrollBatch::new(scope, actor, now);
        batch.transition(BatchStatus::Calculating, actor, Some("created"), now)?;
        self.batches.store(batch.clone()).await?;
        info!(batch_id = %batch.id, scope = %batch.scope, actor, "Batch created");
        Ok(batch)
    }

    pub async fn attach_job(&self, batch_id: &str, job_id: &str) -> Result<PayrollBatch> {
        self.update(batch_id, |batch| {
            batch.last_job = Some(job_id.to_string());
            Ok(())
        })
        .await
    }

    /// Active employees the scope selects, ordered by id.
    pub async fn members(&self, scope: &BatchScope) -> Result<Vec<String>> {
        let mut members: Vec<String> = self
            .directory
            .list()
            .await?
            .into_iter()
            .filter(|e| e.is_active)
            .filter(|e| scope.includes(e.division.as_deref(), e.department.as_deref()))
            .map(|e| e.id)
            .collect();
        members.sort();
        members.dedup();
        Ok(members)
    }

    /// Commits the result of a calculation job and hands the batch to review.
    pub async fn finish_calculation(
        &self,
        batch_id: &str,
        members: Vec<String>,
        records: Vec<PayrollRecord>,
        catalog_version: u64,
        failed_items: usize,
        actor: &str,
    ) -> Result<PayrollBatch> {
        let batch = self
            .update(batch_id, |batch| {
                if batch.status != BatchStatus::Calculating {
                    return Err(PayrollError::StateConflictError(format!(
                        "batch is {}, not calculating",
                        batch.status
                    )));
                }
                batch.members = members;
                batch.replace_records(records);
                batch.catalog_version = Some(catalog_version);
                batch.failure = None;
                let note = (failed_items > 0).then(|| format!("{failed_items} item(s) failed"));
                batch.transition(BatchStatus::PendingApproval, actor, note.as_deref(), Utc::now())
            })
            .await?;
        info!(
            batch_id,
            records = batch.records.len(),
            failed_items,
            "Batch calculated"
        );
        self.notify(Notification::BatchReady {
            batch_id: batch_id.to_string(),
        })
        .await;
        Ok(batch)
    }

    /// Marks a `calculating` batch failed. Other states are left alone.
    pub async fn fail(&self, batch_id: &str, reason: &str) -> Result<()> {
        let result = self
            .update(batch_id, |batch| {
                if batch.status != BatchStatus::Calculating {
                    return Ok(());
                }
                batch.failure = Some(reason.to_string());
                batch.transition(BatchStatus::Failed, "system", Some(reason), Utc::now())
            })
            .await?;
        if result.status == BatchStatus::Failed {
            warn!(batch_id, reason, "Batch failed");
            self.notify(Notification::BatchFailed {
                batch_id: batch_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
        }
        Ok(())
    }

    pub async fn validate(&self, batch_id: &str) -> Result<ValidationReport> {
        let batch = self.get(batch_id).await?;
        self.validate_batch(&batch).await
    }

    async fn validate_batch(&self, batch: &PayrollBatch) -> Result<ValidationReport> {
        let mut issues = Vec::new();

        let mut seen: HashMap<(&str, PayPeriod), usize> = HashMap::new();
        for record in &batch.records {
            *seen.entry((record.employee_id.as_str(), record.period)).or_default() += 1;
        }
        let mut duplicates: Vec<_> = seen.iter().filter(|(_, count)| **count > 1).collect();
        duplicates.sort();
        for ((employee_id, period), count) in duplicates {
            issues.push(ValidationIssue {
                kind: IssueKind::DuplicateMember,
                employee_id: employee_id.to_string(),
                period: Some(*period),
                message: format!("{employee_id} has {count} records for {period}"),
            });
        }

        let mut members = BTreeSet::new();
        for member in &batch.members {
            if !members.insert(member.as_str()) {
                issues.push(ValidationIssue {
                    kind: IssueKind::DuplicateMember,
                    employee_id: member.clone(),
                    period: None,
                    message: format!("{member} is listed more than once"),
                });
            }
        }
        for member in &members {
            for period in batch.scope.periods() {
                if !seen.contains_key(&(*member, period)) {
                    issues.push(ValidationIssue {
                        kind: IssueKind::MissingRecord,
                        employee_id: member.to_string(),
                        period: Some(period),
                        message: format!("{member} has no record for {period}"),
                    });
                }
            }
        }

        for record in &batch.records {
            if record.net.is_negative() {
                issues.push(ValidationIssue {
                    kind: IssueKind::NegativeNet,
                    employee_id: record.employee_id.clone(),
                    period: Some(record.period),
                    message: format!(
                        "{} has negative net pay {} for {}",
                        record.employee_id, record.net, record.period
                    ),
                });
            }
            for warning in &record.warnings {
                issues.push(ValidationIssue {
                    kind: IssueKind::RecordWarning,
                    employee_id: record.employee_id.clone(),
                    period: Some(record.period),
                    message: warning.clone(),
                });
            }
        }

        let paid: BTreeSet<&str> = batch.records.iter().map(|r| r.employee_id.as_str()).collect();
        for employee_id in paid {
            let employee = self.directory.get(employee_id).await?;
            let has_payment = employee
                .and_then(|e| e.payment)
                .is_some_and(|p| !p.account_number.trim().is_empty());
            if !has_payment {
                issues.push(ValidationIssue {
                    kind: IssueKind::MissingPaymentDetails,
                    employee_id: employee_id.to_string(),
                    period: None,
                    message: format!("{employee_id} has no payment details"),
                });
            }
        }

        Ok(ValidationReport {
            batch_id: batch.id.clone(),
            issues,
        })
    }

    pub async fn approve(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        let _guard = self.guard.lock().await;
        let mut batch = self.get(batch_id).await?;
        match batch.status {
            BatchStatus::PendingApproval => {}
            BatchStatus::Approved => {
                return Err(PayrollError::StateConflictError("already approved".to_string()));
            }
            other => {
                return Err(PayrollError::StateConflictError(format!(
                    "cannot approve a {other} batch"
                )));
            }
        }

        let report = self.validate_batch(&batch).await?;
        if !report.is_clean() {
            return Err(PayrollError::ValidationError(format!(
                "batch has blocking issues: {}",
                report.summary()
            )));
        }

        let now = Utc::now();
        batch.transition(BatchStatus::Approved, actor, None, now)?;
        batch.approved_by = Some(actor.to_string());
        batch.approved_at = Some(now);
        batch.recalculation.clear();
        self.batches.store(batch.clone()).await?;
        drop(_guard);

        info!(batch_id, actor, "Batch approved");
        self.notify(Notification::BatchApproved {
            batch_id: batch_id.to_string(),
        })
        .await;
        Ok(batch)
    }

    /// Approves each batch independently; one failure never stops the rest.
    pub async fn bulk_approve(&self, batch_ids: &[String], actor: &str) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for id in batch_ids {
            match self.approve(id, actor).await {
                Ok(_) => outcome.succeed(id.clone()),
                Err(e) => outcome.fail(id.clone(), e.reason()),
            }
        }
        outcome
    }

    pub async fn bulk_reject(&self, batch_ids: &[String], actor: &str, reason: &str) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for id in batch_ids {
            match self.reject(id, actor, reason).await {
                Ok(_) => outcome.succeed(id.clone()),
                Err(e) => outcome.fail(id.clone(), e.reason()),
            }
        }
        outcome
    }

    /// Snapshots the approved state into history, then freezes.
    pub async fn freeze(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        let batch = self
            .update(batch_id, |batch| {
                if batch.status != BatchStatus::Approved {
                    return Err(PayrollError::StateConflictError(format!(
                        "cannot freeze a {} batch",
                        batch.status
                    )));
                }
                let now = Utc::now();
                batch.snapshot(SnapshotReason::Freeze, None, actor, now);
                batch.transition(BatchStatus::Frozen, actor, None, now)?;
                batch.frozen_by = Some(actor.to_string());
                batch.frozen_at = Some(now);
                Ok(())
            })
            .await?;
        info!(batch_id, actor, "Batch frozen");
        Ok(batch)
    }

    pub async fn complete(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        let batch = self
            .update(batch_id, |batch| {
                let now = Utc::now();
                batch.transition(BatchStatus::Completed, actor, None, now)?;
                batch.completed_by = Some(actor.to_string());
                batch.completed_at = Some(now);
                batch.recalculation.clear();
                Ok(())
            })
            .await?;
        info!(batch_id, actor, "Batch completed");
        self.notify(Notification::BatchCompleted {
            batch_id: batch_id.to_string(),
        })
        .await;
        Ok(batch)
    }

    /// Sends a pending or approved batch back to draft.
    pub async fn reject(&self, batch_id: &str, actor: &str, reason: &str) -> Result<PayrollBatch> {
        let batch = self
            .update(batch_id, |batch| {
                if !matches!(
                    batch.status,
                    BatchStatus::PendingApproval | BatchStatus::Approved
                ) {
                    return Err(PayrollError::StateConflictError(format!(
                        "cannot reject a {} batch",
                        batch.status
                    )));
                }
                batch.transition(BatchStatus::Draft, actor, Some(reason), Utc::now())?;
                batch.approved_by = None;
                batch.approved_at = None;
                batch.recalculation.clear();
                Ok(())
            })
            .await?;
        info!(batch_id, actor, reason, "Batch sent back to draft");
        Ok(batch)
    }

    pub async fn delete(&self, batch_id: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let batch = self.get(batch_id).await?;
        if batch.status == BatchStatus::Calculating {
            return Err(PayrollError::StateConflictError(
                "cannot delete a batch while it is calculating".to_string(),
            ));
        }
        self.batches.delete(batch_id).await?;
        info!(batch_id, "Batch deleted");
        Ok(())
    }

    pub async fn request_recalculation(
        &self,
        batch_id: &str,
        requester: &str,
        reason: &str,
    ) -> Result<PayrollBatch> {
        if reason.trim().is_empty() {
            return Err(PayrollError::ValidationError(
                "a recalculation request needs a reason".to_string(),
            ));
        }
        let batch = self
            .update(batch_id, |batch| {
                ensure_lockable(batch, "request recalculation of")?;
                batch.recalculation.request(requester, reason, Utc::now());
                Ok(())
            })
            .await?;
        info!(batch_id, requester, reason, "Recalculation requested");
        Ok(batch)
    }

    pub async fn grant_recalculation(&self, batch_id: &str, approver: &str) -> Result<PayrollBatch> {
        let ttl = self.grant_ttl;
        let batch = self
            .update(batch_id, |batch| {
                ensure_lockable(batch, "grant recalculation of")?;
                batch.recalculation.grant(approver, Utc::now(), ttl)
            })
            .await?;
        info!(batch_id, approver, "Recalculation granted");
        Ok(batch)
    }

    /// Checks recalculation is allowed, snapshots the current state, consumes
    /// any grant and moves the batch to `calculating`.
    pub async fn begin_recalculation(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        let batch = self
            .update(batch_id, |batch| {
                let now = Utc::now();
                match batch.status {
                    BatchStatus::Calculating | BatchStatus::Completed => {
                        return Err(PayrollError::StateConflictError(format!(
                            "cannot recalculate a {} batch",
                            batch.status
                        )));
                    }
                    BatchStatus::Approved | BatchStatus::Frozen => {
                        batch.recalculation.ensure_live_grant(now)?;
                    }
                    BatchStatus::Draft | BatchStatus::PendingApproval | BatchStatus::Failed => {}
                }
                let note = batch.recalculation.reason.clone();
                batch.snapshot(SnapshotReason::Recalculation, note.as_deref(), actor, now);
                batch.recalculation.clear();
                batch.failure = None;
                batch.transition(BatchStatus::Calculating, actor, note.as_deref(), now)
            })
            .await?;
        info!(batch_id, actor, "Recalculation started");
        Ok(batch)
    }

    /// Restores a history entry. Leaving an approved or frozen state takes
    /// the same live grant as recalculation, and consumes it.
    pub async fn rollback(&self, batch_id: &str, history_id: usize, actor: &str) -> Result<PayrollBatch> {
        let batch = self
            .update(batch_id, |batch| {
                let now = Utc::now();
                match batch.status {
                    BatchStatus::Calculating | BatchStatus::Completed => {
                        return Err(PayrollError::StateConflictError(format!(
                            "cannot roll back a {} batch",
                            batch.status
                        )));
                    }
                    BatchStatus::Approved | BatchStatus::Frozen => {
                        batch.recalculation.ensure_live_grant(now)?;
                    }
                    BatchStatus::Draft | BatchStatus::PendingApproval | BatchStatus::Failed => {}
                }
                batch.rollback_to(history_id, actor, now)
            })
            .await?;
        info!(batch_id, history_id, actor, status = %batch.status, "Batch rolled back");
        Ok(batch)
    }

    /// Refuses a direct calculation that would touch a locked batch.
    pub async fn ensure_unlocked(&self, employee_id: &str, period: PayPeriod) -> Result<()> {
        let now = Utc::now();
        let locked = self.batches.all().await?.into_iter().find(|b| {
            b.status.is_locked()
                && b.scope.contains(period)
                && b.members.iter().any(|m| m == employee_id)
                && !b.recalculation.has_live_grant(now)
        });
        match locked {
            Some(batch) => Err(PayrollError::StateConflictError(format!(
                "{employee_id} for {period} is locked by {} batch {}",
                batch.status, batch.id
            ))),
            None => Ok(()),
        }
    }

    async fn update<F>(&self, batch_id: &str, edit: F) -> Result<PayrollBatch>
    where
        F: FnOnce(&mut PayrollBatch) -> Result<()>,
    {
        let _guard = self.guard.lock().await;
        let mut batch = self.get(batch_id).await?;
        edit(&mut batch)?;
        self.batches.store(batch.clone()).await?;
        Ok(batch)
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification.clone()).await {
            warn!(error = %e, ?notification, "Notification failed");
        }
    }
}

fn ensure_lockable(batch: &PayrollBatch, action: &str) -> Result<()> {
    if matches!(batch.status, BatchStatus::Approved | BatchStatus::Frozen) {
        Ok(())
    } else {
        Err(PayrollError::StateConflictError(format!(
            "cannot {action} a {} batch",
            batch.status
        )))
    }
}
