mod common;

use common::{Harness, employee, full_month, period};
use paycore::application::engine::CalculationOptions;
use paycore::domain::attendance::AttendanceSummary;
use paycore::domain::batch::{BatchStatus, SnapshotReason};
use paycore::domain::job::{ItemFailure, JobStatus};
use paycore::domain::money::Money;
use paycore::domain::period::{BatchScope, PayPeriod};
use paycore::domain::ports::RecordStore;
use paycore::error::PayrollError;
use rust_decimal_macros::dec;

async fn staffed() -> Harness {
    let harness = Harness::new(vec![
        employee("E1", "Sales", dec!(30000)),
        employee("E2", "Ops", dec!(24000)),
    ])
    .await;
    harness.attend(full_month("E1", period())).await;
    harness.attend(full_month("E2", period())).await;
    harness
}

#[tokio::test]
async fn test_approve_from_draft_is_a_state_conflict() {
    let harness = staffed().await;
    let batch = harness.pending_batch(period()).await;
    harness
        .service
        .reject_batch(&batch.id, "reviewer", "wrong cut-off")
        .await
        .unwrap();

    let err = harness
        .service
        .approve_batch(&batch.id, "reviewer")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));
    assert_eq!(
        harness.service.batch(&batch.id).await.unwrap().status,
        BatchStatus::Draft
    );
}

#[tokio::test]
async fn test_full_lifecycle() {
    let harness = staffed().await;
    let batch = harness.pending_batch(period()).await;
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.totals.employees, 2);
    assert!(harness.service.validate_batch(&batch.id).await.unwrap().is_clean());

    let approved = harness.service.approve_batch(&batch.id, "reviewer").await.unwrap();
    assert_eq!(approved.approved_by.as_deref(), Some("reviewer"));

    let frozen = harness.service.freeze_batch(&batch.id, "reviewer").await.unwrap();
    assert_eq!(frozen.status, BatchStatus::Frozen);
    assert_eq!(frozen.history.len(), 1);
    assert_eq!(frozen.history[0].reason, SnapshotReason::Freeze);
    assert_eq!(frozen.history[0].status, BatchStatus::Approved);

    let completed = harness.service.complete_batch(&batch.id, "payroll").await.unwrap();
    assert_eq!(completed.status, BatchStatus::Completed);

    let path: Vec<BatchStatus> = completed.status_log.iter().map(|c| c.to).collect();
    assert_eq!(
        path,
        vec![
            BatchStatus::Calculating,
            BatchStatus::PendingApproval,
            BatchStatus::Approved,
            BatchStatus::Frozen,
            BatchStatus::Completed,
        ]
    );

    let err = harness
        .service
        .recalculate_batch(&batch.id, "payroll")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));
}

#[tokio::test]
async fn test_recalculating_frozen_batch_needs_grant() {
    let harness = staffed().await;
    let batch = harness.pending_batch(period()).await;
    harness.service.approve_batch(&batch.id, "reviewer").await.unwrap();
    harness.service.freeze_batch(&batch.id, "reviewer").await.unwrap();

    let err = harness
        .service
        .recalculate_batch(&batch.id, "preparer")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));

    harness
        .service
        .request_recalculation(&batch.id, "preparer", "late attendance correction")
        .await
        .unwrap();
    let err = harness
        .service
        .recalculate_batch(&batch.id, "preparer")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));

    let err = harness
        .service
        .grant_recalculation(&batch.id, "preparer")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));

    harness
        .service
        .grant_recalculation(&batch.id, "controller")
        .await
        .unwrap();
    let report = harness
        .service
        .recalculate_batch(&batch.id, "preparer")
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(report.status, JobStatus::Completed);

    let batch = harness.service.batch(&batch.id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::PendingApproval);
    assert_eq!(batch.history.len(), 2);
    assert_eq!(batch.history[1].reason, SnapshotReason::Recalculation);
    assert!(!batch.recalculation.is_requested());
    assert!(batch.recalculation.granted_by.is_none());
}

#[tokio::test]
async fn test_rollback_restores_snapshot_records() {
    let harness = staffed().await;
    let batch = harness.pending_batch(period()).await;
    harness.service.approve_batch(&batch.id, "reviewer").await.unwrap();
    harness.service.freeze_batch(&batch.id, "reviewer").await.unwrap();
    harness
        .service
        .request_recalculation(&batch.id, "preparer", "unpaid leave missed")
        .await
        .unwrap();
    harness
        .service
        .grant_recalculation(&batch.id, "controller")
        .await
        .unwrap();

    harness
        .attend(AttendanceSummary {
            leave_deduction_days: dec!(2),
            ..full_month("E1", period())
        })
        .await;
    harness
        .service
        .recalculate_batch(&batch.id, "preparer")
        .await
        .unwrap()
        .wait()
        .await;

    let recalculated = harness.service.batch(&batch.id).await.unwrap();
    let frozen_records = recalculated.history[0].records.clone();
    assert_ne!(recalculated.records, frozen_records);
    assert_eq!(
        recalculated.record("E1", period()).unwrap().line("LEAVE_LOP").unwrap().amount,
        Money::new(dec!(2000))
    );

    harness
        .service
        .rollback_batch(&batch.id, 0, "controller")
        .await
        .unwrap();
    let restored = harness.service.batch(&batch.id).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&restored.records).unwrap(),
        serde_json::to_vec(&frozen_records).unwrap()
    );
    assert_eq!(restored.status, BatchStatus::Approved);
    assert_eq!(restored.history.len(), 3);
    assert_eq!(restored.history[2].reason, SnapshotReason::Rollback);

    // The record store follows the batch back to the frozen figures
    let stored = harness.records.get("E1", period()).await.unwrap().unwrap();
    let frozen_e1 = frozen_records.iter().find(|r| r.employee_id == "E1").unwrap();
    assert_eq!(stored.net, frozen_e1.net);
    assert!(stored.line("LEAVE_LOP").is_none());

    let err = harness
        .service
        .rollback_batch(&batch.id, 42, "controller")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::NotFoundError(_)));
}

#[tokio::test]
async fn test_bulk_approve_reports_partial_success() {
    let harness = staffed().await;
    let april: PayPeriod = period();
    let may = april.next();
    let june = may.next();
    for p in [may, june] {
        harness.attend(full_month("E1", p)).await;
        harness.attend(full_month("E2", p)).await;
    }
    let b1 = harness.pending_batch(april).await.id;
    let b2 = harness.pending_batch(may).await.id;
    let b3 = harness.pending_batch(june).await.id;
    harness.service.approve_batch(&b2, "reviewer").await.unwrap();

    let outcome = harness
        .service
        .bulk_approve(&[b1.clone(), b2.clone(), b3.clone()], "reviewer")
        .await;

    assert_eq!(outcome.succeeded, vec![b1.clone(), b3.clone()]);
    assert_eq!(
        outcome.failed,
        vec![ItemFailure {
            id: b2.clone(),
            reason: "already approved".to_string(),
        }]
    );
    for id in [&b1, &b3] {
        assert_eq!(
            harness.service.batch(id).await.unwrap().status,
            BatchStatus::Approved
        );
    }
}

#[tokio::test]
async fn test_bulk_approve_job_variant() {
    let harness = staffed().await;
    let b1 = harness.pending_batch(period()).await.id;

    let report = harness
        .service
        .enqueue_bulk_approve(vec![b1.clone(), "missing".to_string()], "reviewer")
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(report.status, JobStatus::Completed);
    let outcome = report.outcome();
    assert_eq!(outcome.succeeded, vec![b1]);
    assert_eq!(outcome.failed[0].id, "missing");
    assert_eq!(report.progress.processed, 2);
    assert_eq!(report.progress.failed, 1);
}

#[tokio::test]
async fn test_negative_net_blocks_approval() {
    let harness = Harness::new(vec![employee("E1", "Ops", dec!(30000))]).await;
    harness
        .attend(AttendanceSummary::zeroed("E1", period()))
        .await;
    let batch = harness.pending_batch(period()).await;

    let report = harness.service.validate_batch(&batch.id).await.unwrap();
    assert!(!report.is_clean());

    let err = harness
        .service
        .approve_batch(&batch.id, "reviewer")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::ValidationError(_)));
}

#[tokio::test]
async fn test_locked_batch_refuses_direct_calculation() {
    let harness = staffed().await;
    let batch = harness.pending_batch(period()).await;
    harness.service.approve_batch(&batch.id, "reviewer").await.unwrap();

    let err = harness
        .service
        .calculate_payroll("E1", period(), CalculationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));

    let unlocked = CalculationOptions {
        zero_default_attendance: true,
    };
    harness
        .service
        .calculate_payroll("E1", period().next(), unlocked)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_duplicate_scope_and_delete() {
    let harness = staffed().await;
    let batch = harness.pending_batch(period()).await;

    let err = harness
        .service
        .create_batch(BatchScope::single(period()), "preparer")
        .await
        .unwrap_err();
    assert!(matches!(err, PayrollError::StateConflictError(_)));

    harness.service.delete_batch(&batch.id).await.unwrap();
    assert!(matches!(
        harness.service.batch(&batch.id).await,
        Err(PayrollError::NotFoundError(_))
    ));
}
