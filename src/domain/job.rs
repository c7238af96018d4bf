use crate::domain::attendance::AttendanceSummary;
use crate::domain::period::PayPeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of background work.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    CalculateEmployee {
        employee_id: String,
        period: PayPeriod,
        actor: String,
    },
    CalculateBatch {
        batch_id: String,
        actor: String,
    },
    RecalculateBatch {
        batch_id: String,
        actor: String,
    },
    BulkApprove {
        batch_ids: Vec<String>,
        actor: String,
    },
    BulkReject {
        batch_ids: Vec<String>,
        actor: String,
        reason: String,
    },
    IngestAttendance {
        summaries: Vec<AttendanceSummary>,
    },
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::CalculateEmployee { .. } => "calculate_employee",
            JobKind::CalculateBatch { .. } => "calculate_batch",
            JobKind::RecalculateBatch { .. } => "recalculate_batch",
            JobKind::BulkApprove { .. } => "bulk_approve",
            JobKind::BulkReject { .. } => "bulk_reject",
            JobKind::IngestAttendance { .. } => "ingest_attendance",
        }
    }

    /// The batch whose status waits on this job, if any.
    pub fn batch_id(&self) -> Option<&str> {
        match self {
            JobKind::CalculateBatch { batch_id, .. } | JobKind::RecalculateBatch { batch_id, .. } => {
                Some(batch_id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct JobProgress {
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
    /// Whole percent, rounded half up.
    pub percentage: u8,
}

impl JobProgress {
    pub fn new(processed: usize, total: usize, failed: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((processed * 200 + total) / (total * 2)).min(100) as u8
        };
        Self {
            processed,
            total,
            failed,
            percentage,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.failed)
    }
}

/// One item that failed inside a multi-item job.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

/// Per-item result of a bulk operation. Partial success is the normal case.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
}

impl BulkOutcome {
    pub fn succeed(&mut self, id: impl Into<String>) {
        self.succeeded.push(id.into());
    }

    pub fn fail(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(ItemFailure {
            id: id.into(),
            reason: reason.into(),
        });
    }
}

/// Current or terminal state of a job, as seen through its handle.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct JobReport {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub attempts: u32,
    pub errors: Vec<ItemFailure>,
    /// Job-level failure, as opposed to per-item failures in `errors`.
    pub error: Option<String>,
    pub succeeded: Vec<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub fn queued(id: impl Into<String>, kind: &JobKind, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind: kind.label().to_string(),
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            attempts: 0,
            errors: Vec::new(),
            error: None,
            succeeded: Vec::new(),
            queued_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn outcome(&self) -> BulkOutcome {
        BulkOutcome {
            succeeded: self.succeeded.clone(),
            failed: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        assert_eq!(JobProgress::new(0, 0, 0).percentage, 100);
        assert_eq!(JobProgress::new(1, 3, 0).percentage, 33);
        assert_eq!(JobProgress::new(2, 3, 0).percentage, 67);
        assert_eq!(JobProgress::new(1, 200, 0).percentage, 1);
        assert_eq!(JobProgress::new(100, 100, 1).succeeded(), 99);
    }

    #[test]
    fn test_batch_id_only_for_batch_jobs() {
        let calc = JobKind::CalculateBatch {
            batch_id: "b1".into(),
            actor: "alice".into(),
        };
        let approve = JobKind::BulkApprove {
            batch_ids: vec!["b1".into()],
            actor: "alice".into(),
        };
        assert_eq!(calc.batch_id(), Some("b1"));
        assert_eq!(approve.batch_id(), None);
        assert_eq!(approve.label(), "bulk_approve");
    }
}
