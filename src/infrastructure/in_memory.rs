use crate::domain::attendance::{AttendanceSummary, LoanInstallment, LoanSchedule, PendingArrear};
use crate::domain::batch::PayrollBatch;
use crate::domain::employee::Employee;
use crate::domain::period::PayPeriod;
use crate::domain::ports::{
    ArrearsLedger, AttendanceStore, BatchStore, EmployeeDirectory, LoanLedger, Notification, Notifier,
    RecordStore,
};
use crate::domain::record::PayrollRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A thread-safe in-memory employee directory.
///
/// Backed by a `BTreeMap` so `list` comes back in id order.
#[derive(Default, Clone)]
pub struct InMemoryEmployeeDirectory {
    employees: Arc<RwLock<BTreeMap<String, Employee>>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, employee: Employee) {
        self.employees
            .write()
            .await
            .insert(employee.id.clone(), employee);
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn get(&self, employee_id: &str) -> Result<Option<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees.get(employee_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees.values().cloned().collect())
    }

    async fn store(&self, employee: Employee) -> Result<()> {
        self.insert(employee).await;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAttendanceStore {
    summaries: Arc<RwLock<HashMap<(String, PayPeriod), AttendanceSummary>>>,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn get(&self, employee_id: &str, period: PayPeriod) -> Result<Option<AttendanceSummary>> {
        let summaries = self.summaries.read().await;
        Ok(summaries.get(&(employee_id.to_string(), period)).cloned())
    }

    async fn store(&self, summary: AttendanceSummary) -> Result<()> {
        let mut summaries = self.summaries.write().await;
        summaries.insert((summary.employee_id.clone(), summary.period), summary);
        Ok(())
    }
}

/// Loan ledger holding installments due per employee and period.
#[derive(Default, Clone)]
pub struct InMemoryLoanLedger {
    due: Arc<RwLock<HashMap<(String, PayPeriod), LoanSchedule>>>,
}

impl InMemoryLoanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, employee_id: &str, period: PayPeriod, installment: LoanInstallment) {
        let mut due = self.due.write().await;
        due.entry((employee_id.to_string(), period))
            .or_default()
            .installments
            .push(installment);
    }
}

#[async_trait]
impl LoanLedger for InMemoryLoanLedger {
    async fn schedule(&self, employee_id: &str, period: PayPeriod) -> Result<LoanSchedule> {
        let due = self.due.read().await;
        Ok(due
            .get(&(employee_id.to_string(), period))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryArrearsLedger {
    pending: Arc<RwLock<HashMap<(String, PayPeriod), Vec<PendingArrear>>>>,
}

impl InMemoryArrearsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, employee_id: &str, period: PayPeriod, arrear: PendingArrear) {
        let mut pending = self.pending.write().await;
        pending
            .entry((employee_id.to_string(), period))
            .or_default()
            .push(arrear);
    }
}

#[async_trait]
impl ArrearsLedger for InMemoryArrearsLedger {
    async fn pending(&self, employee_id: &str, period: PayPeriod) -> Result<Vec<PendingArrear>> {
        let pending = self.pending.read().await;
        Ok(pending
            .get(&(employee_id.to_string(), period))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<(String, PayPeriod), PayrollRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn store(&self, record: PayrollRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.key(), record);
        Ok(())
    }

    async fn get(&self, employee_id: &str, period: PayPeriod) -> Result<Option<PayrollRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(employee_id.to_string(), period)).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBatchStore {
    batches: Arc<RwLock<BTreeMap<String, PayrollBatch>>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn store(&self, batch: PayrollBatch) -> Result<()> {
        let mut batches = self.batches.write().await;
        batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    async fn get(&self, batch_id: &str) -> Result<Option<PayrollBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.get(batch_id).cloned())
    }

    async fn all(&self) -> Result<Vec<PayrollBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.values().cloned().collect())
    }

    async fn delete(&self, batch_id: &str) -> Result<bool> {
        let mut batches = self.batches.write().await;
        Ok(batches.remove(batch_id).is_some())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(?notification, "notification");
        Ok(())
    }
}
