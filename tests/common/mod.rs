#![allow(dead_code)]

use paycore::application::engine::CalculationOptions;
use paycore::application::service::{PayrollService, Ports};
use paycore::config::{PayrollConfig, WorkerConfig};
use paycore::domain::attendance::AttendanceSummary;
use paycore::domain::batch::{BatchStatus, PayrollBatch};
use paycore::domain::catalog::CatalogSnapshot;
use paycore::domain::component::{Category, PayComponent, PercentageBase, Rule, ScopedRule};
use paycore::domain::employee::{Employee, PaymentDetails};
use paycore::domain::period::PayPeriod;
use paycore::domain::ports::AttendanceStore;
use paycore::infrastructure::in_memory::{
    InMemoryArrearsLedger, InMemoryAttendanceStore, InMemoryBatchStore, InMemoryEmployeeDirectory,
    InMemoryLoanLedger, InMemoryRecordStore, LoggingNotifier,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub fn period() -> PayPeriod {
    "2026-04".parse().unwrap()
}

/// HRA at 10% of basic, 2000 fixed in Sales; PT fixed 200.
pub fn catalog() -> CatalogSnapshot {
    CatalogSnapshot::new(vec![
        PayComponent::new("HRA", "House Rent", Category::Allowance)
            .with_global(Rule::percentage(dec!(10), PercentageBase::Basic).unwrap())
            .with_scoped(ScopedRule::department("Sales", Rule::fixed(dec!(2000)).unwrap())),
        PayComponent::new("PT", "Professional Tax", Category::Deduction)
            .with_global(Rule::fixed(dec!(200)).unwrap()),
    ])
    .unwrap()
}

pub fn employee(id: &str, department: &str, salary: Decimal) -> Employee {
    let mut employee = Employee::new(id, format!("Employee {id}"));
    employee.department = Some(department.to_string());
    employee.base_salary = Some(salary);
    employee.payment = Some(PaymentDetails {
        bank_name: "First Bank".into(),
        account_number: format!("ACC-{id}"),
    });
    employee
}

/// A full month: 22 payable shifts plus 8 weekly offs in a 30-day period.
pub fn full_month(id: &str, period: PayPeriod) -> AttendanceSummary {
    AttendanceSummary {
        payable_shifts: dec!(22),
        present_days: dec!(22),
        weekly_offs: dec!(8),
        ..AttendanceSummary::zeroed(id, period)
    }
}

pub struct Harness {
    pub service: PayrollService,
    pub directory: InMemoryEmployeeDirectory,
    pub attendance: InMemoryAttendanceStore,
    pub records: InMemoryRecordStore,
}

impl Harness {
    pub async fn new(employees: Vec<Employee>) -> Self {
        Self::with_catalog(employees, catalog()).await
    }

    pub async fn with_catalog(employees: Vec<Employee>, catalog: CatalogSnapshot) -> Self {
        let directory = InMemoryEmployeeDirectory::new();
        for employee in employees {
            directory.insert(employee).await;
        }
        let attendance = InMemoryAttendanceStore::new();
        let records = InMemoryRecordStore::new();
        let config = PayrollConfig {
            workers: WorkerConfig {
                retry_base: Duration::from_millis(1),
                ..WorkerConfig::default()
            },
            ..PayrollConfig::default()
        };
        let service = PayrollService::start(
            &config,
            catalog,
            Ports {
                directory: Arc::new(directory.clone()),
                attendance: Arc::new(attendance.clone()),
                loans: Arc::new(InMemoryLoanLedger::new()),
                arrears: Arc::new(InMemoryArrearsLedger::new()),
                records: Arc::new(records.clone()),
                batches: Arc::new(InMemoryBatchStore::new()),
                notifier: Arc::new(LoggingNotifier),
            },
            CalculationOptions::default(),
        );
        Self {
            service,
            directory,
            attendance,
            records,
        }
    }

    pub async fn attend(&self, summary: AttendanceSummary) {
        self.attendance.store(summary).await.unwrap();
    }

    /// Creates a single-period batch and waits for its calculation job.
    pub async fn pending_batch(&self, period: PayPeriod) -> PayrollBatch {
        let (batch, handle) = self
            .service
            .create_batch(
                paycore::domain::period::BatchScope::single(period),
                "preparer",
            )
            .await
            .unwrap();
        handle.wait().await;
        let batch = self.service.batch(&batch.id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::PendingApproval);
        batch
    }
}
