//! Background job execution.
//!
//! Jobs go through a bounded `mpsc` queue to a single distributor task that
//! spawns one task per job. A semaphore caps how many run at once. Every job
//! publishes its `JobReport` on a `watch` channel so callers can poll or wait
//! without blocking the worker.

use crate::config::WorkerConfig;
use crate::domain::job::{ItemFailure, JobKind, JobProgress, JobReport, JobStatus};
use crate::error::{PayrollError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Executes the work a `JobKind` describes.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs one attempt. Item-level failures go to `ctx`; an `Err` here is a
    /// job-level failure and is retried when transient.
    async fn execute(&self, job: &JobKind, ctx: &JobContext) -> Result<()>;

    /// Called once when a job ends failed or cancelled.
    async fn abandon(&self, job: &JobKind, reason: &str);
}

/// The executor's view of a running job: progress counters and cancellation.
#[derive(Clone)]
pub struct JobContext {
    id: String,
    report: Arc<watch::Sender<JobReport>>,
    cancel: CancellationToken,
    total: Arc<AtomicUsize>,
    processed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl JobContext {
    fn new(id: String, report: watch::Sender<JobReport>, cancel: CancellationToken) -> Self {
        Self {
            id,
            report: Arc::new(report),
            cancel,
            total: Arc::new(AtomicUsize::new(0)),
            processed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.publish(|_| {});
    }

    pub fn item_succeeded(&self, item: impl Into<String>) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        let item = item.into();
        self.publish(|report| report.succeeded.push(item));
    }

    pub fn item_failed(&self, item: impl Into<String>, reason: impl Into<String>) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
        let failure = ItemFailure {
            id: item.into(),
            reason: reason.into(),
        };
        self.publish(|report| report.errors.push(failure));
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress::new(
            self.processed.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }

    fn publish(&self, edit: impl FnOnce(&mut JobReport)) {
        let progress = self.progress();
        self.report.send_modify(|report| {
            edit(report);
            report.progress = progress;
        });
    }

    fn begin_attempt(&self, attempt: u32) {
        self.total.store(0, Ordering::SeqCst);
        self.processed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.report.send_modify(|report| {
            report.status = JobStatus::Running;
            report.attempts = attempt;
            report.started_at.get_or_insert_with(Utc::now);
            report.progress = JobProgress::default();
            report.errors.clear();
            report.succeeded.clear();
        });
    }

    fn finish(&self, status: JobStatus, error: Option<String>) {
        let progress = self.progress();
        self.report.send_modify(|report| {
            report.status = status;
            report.error = error;
            report.finished_at = Some(Utc::now());
            if status == JobStatus::Completed {
                report.progress = progress;
            }
        });
    }
}

/// Caller-side handle on a queued or running job.
#[derive(Clone, Debug)]
pub struct JobHandle {
    id: String,
    report: watch::Receiver<JobReport>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> JobReport {
        self.report.borrow().clone()
    }

    /// Resolves once the job is completed, failed or cancelled.
    pub async fn wait(&self) -> JobReport {
        let mut report = self.report.clone();
        let terminal = report
            .wait_for(|r| r.status.is_terminal())
            .await
            .map(|r| r.clone());
        match terminal {
            Ok(terminal) => terminal,
            Err(_) => report.borrow().clone(),
        }
    }

    /// Drops the job if it has not started; stops a running job before its
    /// next item.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

struct QueuedJob {
    kind: JobKind,
    ctx: JobContext,
}

pub struct WorkerPool {
    sender: mpsc::Sender<QueuedJob>,
    jobs: Arc<RwLock<HashMap<String, JobHandle>>>,
    retention: Duration,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawns the distributor. Must be called inside a tokio runtime.
    pub fn start(config: WorkerConfig, executor: Arc<dyn JobExecutor>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<QueuedJob>(config.queue_size.max(1));
        let shutdown = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(config.worker_count.max(1)));
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base: config.retry_base,
        };

        info!(
            worker_count = config.worker_count,
            queue_size = config.queue_size,
            "Starting worker pool"
        );

        let stop = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        info!("Job distributor shutting down");
                        receiver.close();
                        while let Ok(job) = receiver.try_recv() {
                            cancel_unstarted(executor.as_ref(), job).await;
                        }
                        break;
                    }
                    job = receiver.recv() => {
                        let Some(job) = job else {
                            info!("Channel closed, job distributor exiting");
                            break;
                        };
                        let semaphore = semaphore.clone();
                        let executor = executor.clone();
                        tokio::spawn(async move {
                            let permit = tokio::select! {
                                _ = job.ctx.cancel.cancelled() => None,
                                permit = semaphore.acquire_owned() => permit.ok(),
                            };
                            match permit {
                                Some(_permit) => run_job(executor.as_ref(), job, retry).await,
                                None => cancel_unstarted(executor.as_ref(), job).await,
                            }
                        });
                    }
                }
            }
        });

        Self {
            sender,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention: config.job_retention,
            shutdown,
        }
    }

    pub async fn enqueue(&self, kind: JobKind) -> Result<JobHandle> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = watch::channel(JobReport::queued(id.clone(), &kind, Utc::now()));
        let cancel = self.shutdown.child_token();
        let handle = JobHandle {
            id: id.clone(),
            report: rx,
            cancel: cancel.clone(),
        };

        info!(job_id = %id, kind = kind.label(), "Job queued");
        {
            let mut jobs = self.jobs.write().await;
            prune_finished(&mut jobs, self.retention);
            jobs.insert(id.clone(), handle.clone());
        }
        let ctx = JobContext::new(id.clone(), tx, cancel);
        if self.sender.send(QueuedJob { kind, ctx }).await.is_err() {
            self.jobs.write().await.remove(&id);
            return Err(PayrollError::internal("job queue is closed"));
        }
        Ok(handle)
    }

    /// A queued, running or recently finished job. Finished jobs are
    /// forgotten once they are older than the configured retention.
    pub async fn job(&self, id: &str) -> Option<JobHandle> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Stops the distributor and cancels every job it handed out, including
    /// any still waiting in the queue.
    pub fn shutdown(&self) {
        info!("Initiating worker pool shutdown");
        self.shutdown.cancel();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Drops handles whose job finished at least `retention` ago.
fn prune_finished(jobs: &mut HashMap<String, JobHandle>, retention: Duration) {
    let now = Utc::now();
    jobs.retain(|_, handle| {
        let report = handle.report.borrow();
        let expired = report.status.is_terminal()
            && report
                .finished_at
                .is_some_and(|at| (now - at).to_std().is_ok_and(|age| age >= retention));
        !expired
    });
}

#[derive(Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
}

async fn cancel_unstarted(executor: &dyn JobExecutor, job: QueuedJob) {
    info!(job_id = %job.ctx.id, kind = job.kind.label(), "Job cancelled before start");
    job.ctx.finish(JobStatus::Cancelled, Some("cancelled".to_string()));
    executor.abandon(&job.kind, "job cancelled before it started").await;
}

async fn run_job(executor: &dyn JobExecutor, job: QueuedJob, retry: RetryPolicy) {
    let QueuedJob { kind, ctx } = job;
    if ctx.is_cancelled() {
        ctx.finish(JobStatus::Cancelled, Some("cancelled".to_string()));
        executor.abandon(&kind, "job cancelled before it started").await;
        return;
    }

    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(retry.base)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None)
        .build();
    let mut attempt = 0;

    loop {
        attempt += 1;
        ctx.begin_attempt(attempt);
        info!(job_id = %ctx.id, kind = kind.label(), attempt, "Job started");

        match executor.execute(&kind, &ctx).await {
            Ok(()) if ctx.is_cancelled() => {
                let progress = ctx.progress();
                info!(
                    job_id = %ctx.id,
                    processed = progress.processed,
                    total = progress.total,
                    "Job cancelled while running"
                );
                ctx.finish(JobStatus::Cancelled, Some("cancelled".to_string()));
                executor.abandon(&kind, "job cancelled while running").await;
                return;
            }
            Ok(()) => {
                let progress = ctx.progress();
                info!(
                    job_id = %ctx.id,
                    processed = progress.processed,
                    failed = progress.failed,
                    "Job completed"
                );
                ctx.finish(JobStatus::Completed, None);
                return;
            }
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                let delay = backoff.next_backoff().unwrap_or(retry.base);
                warn!(
                    job_id = %ctx.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Job attempt failed, retrying"
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        ctx.finish(JobStatus::Cancelled, Some("cancelled".to_string()));
                        executor.abandon(&kind, "job cancelled during retry").await;
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                error!(job_id = %ctx.id, attempt, error = %e, "Job failed");
                let reason = e.reason();
                ctx.finish(JobStatus::Failed, Some(reason.clone()));
                executor.abandon(&kind, &reason).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Fails the first `transient_failures` attempts with an I/O error, then
    /// processes `items` items, failing the ones listed in `bad_items`.
    #[derive(Default)]
    struct ScriptedExecutor {
        transient_failures: AtomicUsize,
        permanent_failure: bool,
        items: usize,
        bad_items: Vec<usize>,
        gate: Option<Arc<Notify>>,
        abandoned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobExecutor for ScriptedExecutor {
        async fn execute(&self, _job: &JobKind, ctx: &JobContext) -> Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.permanent_failure {
                return Err(PayrollError::StateConflictError("batch is frozen".into()));
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PayrollError::IoError(std::io::Error::other("store offline")));
            }
            ctx.set_total(self.items);
            for item in 0..self.items {
                if ctx.is_cancelled() {
                    break;
                }
                if self.bad_items.contains(&item) {
                    ctx.item_failed(item.to_string(), "no attendance");
                } else {
                    ctx.item_succeeded(item.to_string());
                }
            }
            Ok(())
        }

        async fn abandon(&self, _job: &JobKind, reason: &str) {
            self.abandoned.lock().unwrap().push(reason.to_string());
        }
    }

    fn config(workers: usize) -> WorkerConfig {
        WorkerConfig {
            worker_count: workers,
            queue_size: 16,
            max_attempts: 3,
            retry_base: Duration::from_millis(1),
            item_concurrency: 4,
            job_retention: Duration::from_secs(3600),
        }
    }

    fn job() -> JobKind {
        JobKind::BulkApprove {
            batch_ids: vec!["b1".into()],
            actor: "alice".into(),
        }
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort_job() {
        let executor = Arc::new(ScriptedExecutor {
            items: 10,
            bad_items: vec![3, 7],
            ..Default::default()
        });
        let pool = WorkerPool::start(config(2), executor);
        let report = pool.enqueue(job()).await.unwrap().wait().await;

        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.progress.processed, 10);
        assert_eq!(report.progress.failed, 2);
        assert_eq!(report.progress.percentage, 100);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.succeeded.len(), 8);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let executor = Arc::new(ScriptedExecutor {
            transient_failures: AtomicUsize::new(2),
            items: 1,
            ..Default::default()
        });
        let pool = WorkerPool::start(config(1), executor);
        let report = pool.enqueue(job()).await.unwrap().wait().await;

        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let executor = Arc::new(ScriptedExecutor {
            transient_failures: AtomicUsize::new(5),
            ..Default::default()
        });
        let pool = WorkerPool::start(config(1), executor.clone());
        let report = pool.enqueue(job()).await.unwrap().wait().await;

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.attempts, 3);
        assert_eq!(executor.abandoned.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_domain_errors_fail_without_retry() {
        let executor = Arc::new(ScriptedExecutor {
            permanent_failure: true,
            ..Default::default()
        });
        let pool = WorkerPool::start(config(1), executor.clone());
        let report = pool.enqueue(job()).await.unwrap().wait().await;

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.error.as_deref(), Some("batch is frozen"));
        assert_eq!(
            *executor.abandoned.lock().unwrap(),
            vec!["batch is frozen".to_string()]
        );
    }

    #[tokio::test]
    async fn test_queued_job_can_be_cancelled() {
        let gate = Arc::new(Notify::new());
        let executor = Arc::new(ScriptedExecutor {
            items: 1,
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let pool = WorkerPool::start(config(1), executor.clone());

        let first = pool.enqueue(job()).await.unwrap();
        let mut running = first.report.clone();
        running
            .wait_for(|r| r.status == JobStatus::Running)
            .await
            .unwrap();
        let second = pool.enqueue(job()).await.unwrap();
        second.cancel();
        let cancelled = second.wait().await;
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.attempts, 0);

        gate.notify_one();
        assert_eq!(first.wait().await.status, JobStatus::Completed);
        assert!(pool.job(first.id()).await.is_some());
        assert_eq!(executor.abandoned.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_forgotten_after_retention() {
        let executor = Arc::new(ScriptedExecutor {
            items: 1,
            ..Default::default()
        });
        let pool = WorkerPool::start(
            WorkerConfig {
                job_retention: Duration::ZERO,
                ..config(1)
            },
            executor,
        );

        let first = pool.enqueue(job()).await.unwrap();
        assert_eq!(first.wait().await.status, JobStatus::Completed);
        assert!(pool.job(first.id()).await.is_some());

        let second = pool.enqueue(job()).await.unwrap();
        assert!(pool.job(first.id()).await.is_none());
        assert!(pool.job(second.id()).await.is_some());
        assert_eq!(first.snapshot().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_jobs_still_in_queue() {
        let gate = Arc::new(Notify::new());
        let executor = Arc::new(ScriptedExecutor {
            items: 1,
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let pool = WorkerPool::start(config(1), executor.clone());

        let first = pool.enqueue(job()).await.unwrap();
        let mut running = first.report.clone();
        running
            .wait_for(|r| r.status == JobStatus::Running)
            .await
            .unwrap();

        let queued = [
            pool.enqueue(job()).await.unwrap(),
            pool.enqueue(job()).await.unwrap(),
        ];
        pool.shutdown();
        for handle in &queued {
            let report = handle.wait().await;
            assert_eq!(report.status, JobStatus::Cancelled);
            assert_eq!(report.attempts, 0);
        }
        assert_eq!(executor.abandoned.lock().unwrap().len(), 2);

        gate.notify_one();
        assert_eq!(first.wait().await.status, JobStatus::Cancelled);
        assert_eq!(executor.abandoned.lock().unwrap().len(), 3);
        assert!(pool.enqueue(job()).await.is_err());
    }
}
