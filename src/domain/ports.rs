use super::attendance::{AttendanceSummary, LoanSchedule, PendingArrear};
use super::batch::PayrollBatch;
use super::employee::Employee;
use super::period::PayPeriod;
use super::record::PayrollRecord;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Employee master data as payroll sees it.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn get(&self, employee_id: &str) -> Result<Option<Employee>>;
    /// Every employee, ordered by id.
    async fn list(&self) -> Result<Vec<Employee>>;
    /// Writes back an employee, used for override edits.
    async fn store(&self, employee: Employee) -> Result<()>;
}

/// Period attendance aggregates.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get(&self, employee_id: &str, period: PayPeriod) -> Result<Option<AttendanceSummary>>;
    async fn store(&self, summary: AttendanceSummary) -> Result<()>;
}

/// Loan and salary-advance recoveries due per period.
#[async_trait]
pub trait LoanLedger: Send + Sync {
    async fn schedule(&self, employee_id: &str, period: PayPeriod) -> Result<LoanSchedule>;
}

/// Approved arrears still owed, settled in the period they are paid out.
#[async_trait]
pub trait ArrearsLedger: Send + Sync {
    async fn pending(&self, employee_id: &str, period: PayPeriod) -> Result<Vec<PendingArrear>>;
}

/// Latest record per employee and period, outside of any batch.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn store(&self, record: PayrollRecord) -> Result<()>;
    async fn get(&self, employee_id: &str, period: PayPeriod) -> Result<Option<PayrollRecord>>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn store(&self, batch: PayrollBatch) -> Result<()>;
    async fn get(&self, batch_id: &str) -> Result<Option<PayrollBatch>>;
    async fn all(&self) -> Result<Vec<PayrollBatch>>;
    async fn delete(&self, batch_id: &str) -> Result<bool>;
}

/// Events handed to downstream notification/export services.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    RecordCalculated { employee_id: String, period: PayPeriod },
    BatchReady { batch_id: String },
    BatchApproved { batch_id: String },
    BatchCompleted { batch_id: String },
    BatchFailed { batch_id: String, reason: String },
}

/// Fire-and-forget delivery. Errors are logged by callers and never undo
/// the state change that triggered the notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

pub type EmployeeDirectoryRef = Arc<dyn EmployeeDirectory>;
pub type AttendanceStoreRef = Arc<dyn AttendanceStore>;
pub type LoanLedgerRef = Arc<dyn LoanLedger>;
pub type ArrearsLedgerRef = Arc<dyn ArrearsLedger>;
pub type RecordStoreRef = Arc<dyn RecordStore>;
pub type BatchStoreRef = Arc<dyn BatchStore>;
pub type NotifierRef = Arc<dyn Notifier>;
