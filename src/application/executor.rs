use crate::application::batch::BatchManager;
use crate::application::catalog::PayComponentCatalog;
use crate::application::engine::{CalculationOptions, PayrollEngine};
use crate::application::jobs::{JobContext, JobExecutor};
use crate::domain::attendance::AttendanceSummary;
use crate::domain::batch::{BatchStatus, PayrollBatch};
use crate::domain::job::JobKind;
use crate::domain::period::PayPeriod;
use crate::domain::ports::{AttendanceStoreRef, Notification, NotifierRef, RecordStoreRef};
use crate::domain::record::PayrollRecord;
use crate::error::{PayrollError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

/// Runs payroll jobs against the engine, the batch manager and the stores.
pub struct PayrollJobExecutor {
    engine: PayrollEngine,
    catalog: PayComponentCatalog,
    batches: BatchManager,
    records: RecordStoreRef,
    attendance: AttendanceStoreRef,
    notifier: NotifierRef,
    options: CalculationOptions,
    item_concurrency: usize,
}

impl PayrollJobExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: PayrollEngine,
        catalog: PayComponentCatalog,
        batches: BatchManager,
        records: RecordStoreRef,
        attendance: AttendanceStoreRef,
        notifier: NotifierRef,
        options: CalculationOptions,
        item_concurrency: usize,
    ) -> Self {
        Self {
            engine,
            catalog,
            batches,
            records,
            attendance,
            notifier,
            options,
            item_concurrency: item_concurrency.max(1),
        }
    }

    /// Calculates every member for every period of the batch scope, then
    /// commits all records in one status write.
    async fn calculate_batch(
        &self,
        batch_id: &str,
        actor: &str,
        recalculation: bool,
        ctx: &JobContext,
    ) -> Result<()> {
        let batch = self.batches.get(batch_id).await?;
        if batch.status != BatchStatus::Calculating {
            return Err(PayrollError::StateConflictError(format!(
                "batch is {}, not calculating",
                batch.status
            )));
        }

        let members = if recalculation && !batch.members.is_empty() {
            batch.members.clone()
        } else {
            self.batches.members(&batch.scope).await?
        };
        if members.is_empty() {
            return Err(PayrollError::DataIncompleteError(format!(
                "no employees in scope {}",
                batch.scope
            )));
        }

        let catalog = self.catalog.snapshot().await;
        let periods = batch.scope.periods();
        let items: Vec<(String, PayPeriod)> = members
            .iter()
            .flat_map(|member| periods.iter().map(move |period| (member.clone(), *period)))
            .collect();
        ctx.set_total(items.len());
        info!(
            job_id = ctx.id(),
            batch_id,
            items = items.len(),
            catalog_version = catalog.version(),
            "Calculating batch"
        );

        let results: Vec<Option<PayrollRecord>> = stream::iter(items)
            .map(|(employee_id, period)| {
                let catalog = catalog.clone();
                async move {
                    if ctx.is_cancelled() {
                        return None;
                    }
                    let item = format!("{employee_id}/{period}");
                    match self
                        .engine
                        .calculate(&catalog, &employee_id, period, self.options)
                        .await
                    {
                        Ok(record) => {
                            ctx.item_succeeded(item);
                            Some(record)
                        }
                        Err(e) => {
                            warn!(job_id = ctx.id(), item = %item, error = %e, "Item failed");
                            ctx.item_failed(item, e.reason());
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.item_concurrency)
            .collect()
            .await;

        if ctx.is_cancelled() {
            return Ok(());
        }

        let records: Vec<PayrollRecord> = results.into_iter().flatten().collect();
        let failed = ctx.progress().failed;
        let batch = self
            .batches
            .finish_calculation(
                batch_id,
                members,
                records,
                catalog.version(),
                failed,
                actor,
            )
            .await?;

        mirror_records(&self.records, &batch).await;
        Ok(())
    }

    async fn calculate_employee(
        &self,
        employee_id: &str,
        period: PayPeriod,
        ctx: &JobContext,
    ) -> Result<()> {
        ctx.set_total(1);
        self.batches.ensure_unlocked(employee_id, period).await?;
        let catalog = self.catalog.snapshot().await;
        let record = self
            .engine
            .calculate(&catalog, employee_id, period, self.options)
            .await?;
        self.records.store(record).await?;
        ctx.item_succeeded(format!("{employee_id}/{period}"));

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
        Ok(())
    }

    async fn ingest(&self, summaries: &[AttendanceSummary], ctx: &JobContext) -> Result<()> {
        ctx.set_total(summaries.len());
        for summary in summaries {
            if ctx.is_cancelled() {
                break;
            }
            let item = format!("{}/{}", summary.employee_id, summary.period);
            if let Err(e) = summary.validate() {
                ctx.item_failed(item, e.reason());
                continue;
            }
            match self.attendance.store(summary.clone()).await {
                Ok(()) => ctx.item_succeeded(item),
                Err(e) => ctx.item_failed(item, e.reason()),
            }
        }
        Ok(())
    }
}

/// Copies a batch's records into the record store so per-employee reads
/// agree with the batch. Failures are logged, not returned.
pub(crate) async fn mirror_records(records: &RecordStoreRef, batch: &PayrollBatch) {
    for record in &batch.records {
        if let Err(e) = records.store(record.clone()).await {
            warn!(
                batch_id = %batch.id,
                employee_id = %record.employee_id,
                error = %e,
                "Failed to mirror record"
            );
        }
    }
}

#[async_trait]
impl JobExecutor for PayrollJobExecutor {
    async fn execute(&self, job: &JobKind, ctx: &JobContext) -> Result<()> {
        debug!(job_id = ctx.id(), kind = job.label(), "Executing job");
        match job {
            JobKind::CalculateEmployee {
                employee_id,
                period,
                ..
            } => self.calculate_employee(employee_id, *period, ctx).await,
            JobKind::CalculateBatch { batch_id, actor } => {
                self.calculate_batch(batch_id, actor, false, ctx).await
            }
            JobKind::RecalculateBatch { batch_id, actor } => {
                self.calculate_batch(batch_id, actor, true, ctx).await
            }
            JobKind::BulkApprove { batch_ids, actor } => {
                ctx.set_total(batch_ids.len());
                for id in batch_ids {
                    if ctx.is_cancelled() {
                        break;
                    }
                    match self.batches.approve(id, actor).await {
                        Ok(_) => ctx.item_succeeded(id.clone()),
                        Err(e) => ctx.item_failed(id.clone(), e.reason()),
                    }
                }
                Ok(())
            }
            JobKind::BulkReject {
                batch_ids,
                actor,
                reason,
            } => {
                ctx.set_total(batch_ids.len());
                for id in batch_ids {
                    if ctx.is_cancelled() {
                        break;
                    }
                    match self.batches.reject(id, actor, reason).await {
                        Ok(_) => ctx.item_succeeded(id.clone()),
                        Err(e) => ctx.item_failed(id.clone(), e.reason()),
                    }
                }
                Ok(())
            }
            JobKind::IngestAttendance { summaries } => self.ingest(summaries, ctx).await,
        }
    }

    async fn abandon(&self, job: &JobKind, reason: &str) {
        if let Some(batch_id) = job.batch_id()
            && let Err(e) = self.batches.fail(batch_id, reason).await
        {
            error!(batch_id, error = %e, "Failed to mark batch failed");
        }
    }
}
