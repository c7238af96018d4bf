//! The operation surface of the payroll core.
//!
//! `PayrollService` wires the catalog, the engine, the batch manager and the
//! worker pool together. Synchronous transitions return directly; anything
//! batch-sized goes through the pool and hands back a `JobHandle`.

use crate::application::batch::BatchManager;
use crate::application::catalog::PayComponentCatalog;
use crate::application::engine::{CalculationOptions, PayrollEngine};
use crate::application::executor::{PayrollJobExecutor, mirror_records};
use crate::application::jobs::{JobHandle, WorkerPool};
use crate::application::resolver::{Resolution, resolve};
use crate::config::PayrollConfig;
use crate::domain::attendance::AttendanceSummary;
use crate::domain::batch::{PayrollBatch, ValidationReport};
use crate::domain::catalog::CatalogSnapshot;
use crate::domain::component::{Category, PayComponent, Rule, RawRule};
use crate::domain::employee::{Employee, EmployeeComponentOverride};
use crate::domain::job::{BulkOutcome, JobKind};
use crate::domain::period::{BatchScope, PayPeriod};
use crate::domain::ports::{
    ArrearsLedgerRef, AttendanceStoreRef, BatchStoreRef, EmployeeDirectoryRef, LoanLedgerRef,
    Notification, NotifierRef, RecordStoreRef,
};
use crate::domain::record::PayrollRecord;
use crate::error::{PayrollError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// The stores and services the core consumes.
#[derive(Clone)]
pub struct Ports {
    pub directory: EmployeeDirectoryRef,
    pub attendance: AttendanceStoreRef,
    pub loans: LoanLedgerRef,
    pub arrears: ArrearsLedgerRef,
    pub records: RecordStoreRef,
    pub batches: BatchStoreRef,
    pub notifier: NotifierRef,
}

/// One override to write, as it arrives from an import.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRequest {
    pub employee_id: String,
    pub component_id: String,
    /// When given, must agree with the catalog's category for the component.
    pub category: Option<Category>,
    pub rule: RawRule,
}

pub struct PayrollService {
    catalog: PayComponentCatalog,
    engine: PayrollEngine,
    batches: BatchManager,
    directory: EmployeeDirectoryRef,
    records: RecordStoreRef,
    notifier: NotifierRef,
    pool: WorkerPool,
}

impl PayrollService {
    /// Builds the service and starts its worker pool. Must be called inside a
    /// tokio runtime.
    pub fn start(
        config: &PayrollConfig,
        catalog: CatalogSnapshot,
        ports: Ports,
        options: CalculationOptions,
    ) -> Self {
        let catalog = PayComponentCatalog::new(catalog);
        let engine = PayrollEngine::new(
            ports.directory.clone(),
            ports.attendance.clone(),
            ports.loans.clone(),
            ports.arrears.clone(),
            config.policy,
        );
        let batches = BatchManager::new(
            ports.batches.clone(),
            ports.directory.clone(),
            ports.notifier.clone(),
            config.grant_ttl,
        );
        let executor = PayrollJobExecutor::new(
            engine.clone(),
            catalog.clone(),
            batches.clone(),
            ports.records.clone(),
            ports.attendance.clone(),
            ports.notifier.clone(),
            options,
            config.workers.item_concurrency,
        );
        let pool = WorkerPool::start(config.workers.clone(), Arc::new(executor));

        Self {
            catalog,
            engine,
            batches,
            directory: ports.directory,
            records: ports.records,
            notifier: ports.notifier,
            pool,
        }
    }

    pub fn catalog(&self) -> &PayComponentCatalog {
        &self.catalog
    }

    pub async fn resolve_component(
        &self,
        component_id: &str,
        employee_id: &str,
    ) -> Result<Resolution> {
        let snapshot = self.catalog.snapshot().await;
        let component = snapshot
            .get(component_id)
            .ok_or_else(|| PayrollError::NotFoundError(format!("component {component_id}")))?;
        let employee = self.employee(employee_id).await?;
        Ok(resolve(component, &employee))
    }

    /// Calculates and stores one record on the request path.
    pub async fn calculate_payroll(
        &self,
        employee_id: &str,
        period: PayPeriod,
        options: CalculationOptions,
    ) -> Result<PayrollRecord> {
        self.batches.ensure_unlocked(employee_id, period).await?;
        let snapshot = self.catalog.snapshot().await;
        let record = self
            .engine
            .calculate(&snapshot, employee_id, period, options)
            .await?;
        self.records.store(record.clone()).await?;
        info!(employee_id, %period, net = %record.net, "Payroll calculated");

        if let Err(e) = self
            .notifier
            .notify(Notification::RecordCalculated {
                employee_id: employee_id.to_string(),
                period,
            })
            .await
        {
            warn!(employee_id, %period, error = %e, "Notification failed");
        }
        Ok(record)
    }

    pub async fn enqueue_calculation(
        &self,
        employee_id: &str,
        period: PayPeriod,
        actor: &str,
    ) -> Result<JobHandle> {
        self.pool
            .enqueue(JobKind::CalculateEmployee {
                employee_id: employee_id.to_string(),
                period,
                actor: actor.to_string(),
            })
            .await
    }

    /// Creates the batch and queues its calculation.
    pub async fn create_batch(
        &self,
        scope: BatchScope,
        actor: &str,
    ) -> Result<(PayrollBatch, JobHandle)> {
        let batch = self.batches.create(scope, actor).await?;
        let kind = JobKind::CalculateBatch {
            batch_id: batch.id.clone(),
            actor: actor.to_string(),
        };
        self.start_batch_job(&batch.id, kind).await
    }

    pub async fn batch(&self, batch_id: &str) -> Result<PayrollBatch> {
        self.batches.get(batch_id).await
    }

    pub async fn batches(&self) -> Result<Vec<PayrollBatch>> {
        self.batches.all().await
    }

    pub async fn approve_batch(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        self.batches.approve(batch_id, actor).await
    }

    pub async fn freeze_batch(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        self.batches.freeze(batch_id, actor).await
    }

    pub async fn complete_batch(&self, batch_id: &str, actor: &str) -> Result<PayrollBatch> {
        self.batches.complete(batch_id, actor).await
    }

    pub async fn reject_batch(
        &self,
        batch_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<PayrollBatch> {
        self.batches.reject(batch_id, actor, reason).await
    }

    pub async fn delete_batch(&self, batch_id: &str) -> Result<()> {
        self.batches.delete(batch_id).await
    }

    pub async fn request_recalculation(
        &self,
        batch_id: &str,
        requester: &str,
        reason: &str,
    ) -> Result<PayrollBatch> {
        self.batches
            .request_recalculation(batch_id, requester, reason)
            .await
    }

    pub async fn grant_recalculation(&self, batch_id: &str, approver: &str) -> Result<PayrollBatch> {
        self.batches.grant_recalculation(batch_id, approver).await
    }

    /// Checks the grant, snapshots the batch and queues the recalculation.
    pub async fn recalculate_batch(&self, batch_id: &str, actor: &str) -> Result<JobHandle> {
        self.batches.begin_recalculation(batch_id, actor).await?;
        let kind = JobKind::RecalculateBatch {
            batch_id: batch_id.to_string(),
            actor: actor.to_string(),
        };
        let (_, handle) = self.start_batch_job(batch_id, kind).await?;
        Ok(handle)
    }

    /// Restores a history entry and re-mirrors its records, so direct record
    /// reads agree with the batch again.
    pub async fn rollback_batch(
        &self,
        batch_id: &str,
        history_id: usize,
        actor: &str,
    ) -> Result<PayrollBatch> {
        let batch = self.batches.rollback(batch_id, history_id, actor).await?;
        mirror_records(&self.records, &batch).await;
        Ok(batch)
    }

    pub async fn validate_batch(&self, batch_id: &str) -> Result<ValidationReport> {
        self.batches.validate(batch_id).await
    }

    pub async fn bulk_approve(&self, batch_ids: &[String], actor: &str) -> BulkOutcome {
        self.batches.bulk_approve(batch_ids, actor).await
    }

    pub async fn bulk_reject(&self, batch_ids: &[String], actor: &str, reason: &str) -> BulkOutcome {
        self.batches.bulk_reject(batch_ids, actor, reason).await
    }

    /// Queued variant of `bulk_approve`; the outcome is on the job report.
    pub async fn enqueue_bulk_approve(&self, batch_ids: Vec<String>, actor: &str) -> Result<JobHandle> {
        self.pool
            .enqueue(JobKind::BulkApprove {
                batch_ids,
                actor: actor.to_string(),
            })
            .await
    }

    pub async fn enqueue_bulk_reject(
        &self,
        batch_ids: Vec<String>,
        actor: &str,
        reason: &str,
    ) -> Result<JobHandle> {
        self.pool
            .enqueue(JobKind::BulkReject {
                batch_ids,
                actor: actor.to_string(),
                reason: reason.to_string(),
            })
            .await
    }

    pub async fn ingest_attendance(&self, summaries: Vec<AttendanceSummary>) -> Result<JobHandle> {
        self.pool
            .enqueue(JobKind::IngestAttendance { summaries })
            .await
    }

    /// Validates a rule and stores it as the employee's override for one
    /// component.
    pub async fn set_override(
        &self,
        employee_id: &str,
        component_id: &str,
        rule: RawRule,
    ) -> Result<Employee> {
        self.write_override(OverrideRequest {
            employee_id: employee_id.to_string(),
            component_id: component_id.to_string(),
            category: None,
            rule,
        })
        .await
    }

    /// Applies each row through `set_override`'s validation. Rows are keyed
    /// `employee_id/component_id` in the outcome.
    pub async fn import_overrides(&self, rows: Vec<OverrideRequest>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for row in rows {
            let id = format!("{}/{}", row.employee_id, row.component_id);
            match self.write_override(row).await {
                Ok(_) => outcome.succeed(id),
                Err(e) => outcome.fail(id, e.reason()),
            }
        }
        info!(
            accepted = outcome.succeeded.len(),
            rejected = outcome.failed.len(),
            "Overrides imported"
        );
        outcome
    }

    pub async fn upsert_component(&self, component: PayComponent) -> Result<u64> {
        self.catalog.upsert(component).await
    }

    pub async fn deactivate_component(&self, component_id: &str) -> Result<u64> {
        self.catalog.deactivate(component_id).await
    }

    pub async fn job(&self, job_id: &str) -> Option<JobHandle> {
        self.pool.job(job_id).await
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    async fn write_override(&self, request: OverrideRequest) -> Result<Employee> {
        let snapshot = self.catalog.snapshot().await;
        let component = snapshot.get(&request.component_id).ok_or_else(|| {
            PayrollError::NotFoundError(format!("component {}", request.component_id))
        })?;
        if let Some(category) = request.category
            && category != component.category
        {
            return Err(PayrollError::ValidationError(format!(
                "{} is a {}, not a {category}",
                component.id, component.category
            )));
        }
        let rule = Rule::try_from(request.rule)?;

        let mut employee = self.employee(&request.employee_id).await?;
        employee.set_override(EmployeeComponentOverride::new(
            component.id.clone(),
            component.category,
            rule,
        ));
        self.directory.store(employee.clone()).await?;
        info!(
            employee_id = %employee.id,
            component_id = %component.id,
            "Override stored"
        );
        Ok(employee)
    }

    async fn employee(&self, employee_id: &str) -> Result<Employee> {
        self.directory
            .get(employee_id)
            .await?
            .ok_or_else(|| PayrollError::NotFoundError(format!("employee {employee_id}")))
    }

    async fn start_batch_job(
        &self,
        batch_id: &str,
        kind: JobKind,
    ) -> Result<(PayrollBatch, JobHandle)> {
        let handle = match self.pool.enqueue(kind).await {
            Ok(handle) => handle,
            Err(e) => {
                self.batches.fail(batch_id, &e.reason()).await?;
                return Err(e);
            }
        };
        let batch = self.batches.attach_job(batch_id, handle.id()).await?;
        Ok((batch, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{PercentageBase, RuleType, ScopedRule};
    use crate::domain::job::JobStatus;
    use crate::infrastructure::in_memory::{
        InMemoryArrearsLedger, InMemoryAttendanceStore, InMemoryBatchStore, InMemoryEmployeeDirectory,
        InMemoryLoanLedger, InMemoryRecordStore, LoggingNotifier,
    };
    use crate::application::resolver::EffectiveRule;
    use crate::domain::record::RuleTier;
    use rust_decimal_macros::dec;

    async fn service() -> PayrollService {
        let directory = InMemoryEmployeeDirectory::new();
        let mut asha = Employee::new("E1", "Asha");
        asha.department = Some("Sales".into());
        asha.base_salary = Some(dec!(20000));
        directory.insert(asha).await;

        let catalog = CatalogSnapshot::new(vec![
            PayComponent::new("HRA", "House Rent", Category::Allowance)
                .with_global(Rule::percentage(dec!(10), PercentageBase::Basic).unwrap())
                .with_scoped(ScopedRule::department("Sales", Rule::fixed(dec!(2000)).unwrap())),
        ])
        .unwrap();

        PayrollService::start(
            &PayrollConfig::default(),
            catalog,
            Ports {
                directory: Arc::new(directory),
                attendance: Arc::new(InMemoryAttendanceStore::new()),
                loans: Arc::new(InMemoryLoanLedger::new()),
                arrears: Arc::new(InMemoryArrearsLedger::new()),
                records: Arc::new(InMemoryRecordStore::new()),
                batches: Arc::new(InMemoryBatchStore::new()),
                notifier: Arc::new(LoggingNotifier),
            },
            CalculationOptions::default(),
        )
    }

    fn fixed(amount: rust_decimal::Decimal) -> RawRule {
        RawRule {
            rule_type: Some(RuleType::Fixed),
            amount: Some(amount),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_component_uses_department_rule() {
        let service = service().await;
        let resolution = service.resolve_component("HRA", "E1").await.unwrap();

        assert_eq!(
            resolution.rule,
            Some(EffectiveRule {
                rule: Rule::fixed(dec!(2000)).unwrap(),
                tier: RuleTier::Department,
            })
        );
        assert!(matches!(
            service.resolve_component("DA", "E1").await,
            Err(PayrollError::NotFoundError(_))
        ));
    }

    #[tokio::test]
    async fn test_set_override_wins_resolution() {
        let service = service().await;
        service.set_override("E1", "HRA", fixed(dec!(3500))).await.unwrap();

        let resolution = service.resolve_component("HRA", "E1").await.unwrap();
        let effective = resolution.rule.unwrap();
        assert_eq!(effective.tier, RuleTier::Override);
        assert_eq!(effective.rule, Rule::fixed(dec!(3500)).unwrap());
    }

    #[tokio::test]
    async fn test_import_overrides_reports_each_row() {
        let service = service().await;
        let rows = vec![
            OverrideRequest {
                employee_id: "E1".into(),
                component_id: "HRA".into(),
                category: Some(Category::Allowance),
                rule: fixed(dec!(2500)),
            },
            OverrideRequest {
                employee_id: "E1".into(),
                component_id: "HRA".into(),
                category: Some(Category::Deduction),
                rule: fixed(dec!(2500)),
            },
            OverrideRequest {
                employee_id: "E1".into(),
                component_id: "HRA".into(),
                category: None,
                rule: RawRule {
                    rule_type: Some(RuleType::Fixed),
                    amount: Some(dec!(100)),
                    percentage: Some(dec!(5)),
                    ..Default::default()
                },
            },
            OverrideRequest {
                employee_id: "E404".into(),
                component_id: "HRA".into(),
                category: None,
                rule: fixed(dec!(1)),
            },
        ];

        let outcome = service.import_overrides(rows).await;
        assert_eq!(outcome.succeeded, vec!["E1/HRA"]);
        assert_eq!(outcome.failed.len(), 3);
        assert_eq!(outcome.failed[2].reason, "employee E404");
    }

    #[tokio::test]
    async fn test_ingest_then_calculate() {
        let service = service().await;
        let period: PayPeriod = "2026-06".parse().unwrap();
        let summary = AttendanceSummary {
            payable_shifts: dec!(30),
            present_days: dec!(30),
            ..AttendanceSummary::zeroed("E1", period)
        };
        let report = service
            .ingest_attendance(vec![summary])
            .await
            .unwrap()
            .wait()
            .await;
        assert_eq!(report.status, JobStatus::Completed);

        let first = service
            .calculate_payroll("E1", period, CalculationOptions::default())
            .await
            .unwrap();
        let second = service
            .calculate_payroll("E1", period, CalculationOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.gross.value(), dec!(22000));
    }
}
