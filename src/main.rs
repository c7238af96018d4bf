use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use paycore::application::engine::CalculationOptions;
use paycore::application::service::{PayrollService, Ports};
use paycore::config::PayrollConfig;
use paycore::domain::batch::BatchStatus;
use paycore::domain::catalog::CatalogSnapshot;
use paycore::domain::job::BulkOutcome;
use paycore::domain::period::{BatchScope, PayPeriod};
use paycore::domain::ports::{BatchStoreRef, RecordStoreRef};
use paycore::infrastructure::in_memory::{
    InMemoryArrearsLedger, InMemoryAttendanceStore, InMemoryBatchStore, InMemoryEmployeeDirectory,
    InMemoryLoanLedger, InMemoryRecordStore, LoggingNotifier,
};
#[cfg(feature = "storage-rocksdb")]
use paycore::infrastructure::rocksdb::RocksDBStore;
use paycore::interfaces::catalog::read_catalog;
use paycore::interfaces::csv::arrears_reader::ArrearsReader;
use paycore::interfaces::csv::attendance_reader::AttendanceReader;
use paycore::interfaces::csv::employee_reader::EmployeeReader;
use paycore::interfaces::csv::loan_reader::LoanReader;
use paycore::interfaces::csv::override_reader::OverrideReader;
use paycore::interfaces::csv::record_writer::RecordWriter;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Calculate a payroll batch and print the register as CSV
    Run(RunArgs),
    /// Check an override spreadsheet against the catalog and directory
    ImportOverrides(ImportArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Pay component catalog (JSON)
    #[arg(long)]
    catalog: PathBuf,

    /// Employee directory export (CSV)
    #[arg(long)]
    employees: PathBuf,

    /// Attendance aggregates (CSV)
    #[arg(long)]
    attendance: PathBuf,

    /// Loan and advance installments (CSV)
    #[arg(long)]
    loans: Option<PathBuf>,

    /// Pending arrears to pay out (CSV)
    #[arg(long)]
    arrears: Option<PathBuf>,

    /// Single period to calculate, YYYY-MM
    #[arg(long, conflicts_with_all = ["start", "end"], required_unless_present = "start")]
    period: Option<PayPeriod>,

    /// First period of a range, YYYY-MM
    #[arg(long, requires = "end")]
    start: Option<PayPeriod>,

    /// Last period of a range, YYYY-MM
    #[arg(long, requires = "start")]
    end: Option<PayPeriod>,

    #[arg(long)]
    division: Option<String>,

    #[arg(long)]
    department: Option<String>,

    /// Recorded as the batch creator
    #[arg(long, default_value = "cli")]
    actor: String,

    /// Treat employees with no attendance row as absent all month
    #[arg(long)]
    zero_default_attendance: bool,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Args)]
struct ImportArgs {
    /// Pay component catalog (JSON)
    #[arg(long)]
    catalog: PathBuf,

    /// Employee directory export (CSV)
    #[arg(long)]
    employees: PathBuf,

    /// Override rows (CSV)
    #[arg(long)]
    overrides: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PayrollConfig::from_env().into_diagnostic()?;

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::ImportOverrides(args) => import_overrides(config, args).await,
    }
}

async fn run(config: PayrollConfig, args: RunArgs) -> Result<()> {
    let scope = scope(&args)?;
    let catalog = load_catalog(&args.catalog)?;
    let directory = load_directory(&args.employees).await?;

    let ledger = InMemoryLoanLedger::new();
    if let Some(path) = &args.loans {
        let file = File::open(path).into_diagnostic()?;
        for (line, row) in LoanReader::new(file).rows().enumerate() {
            match row {
                Ok(row) => ledger.add(&row.employee_id, row.period, row.installment()).await,
                Err(e) => warn!(line = line + 2, error = %e, "Skipping loan row"),
            }
        }
    }

    let arrears = InMemoryArrearsLedger::new();
    if let Some(path) = &args.arrears {
        let file = File::open(path).into_diagnostic()?;
        for (line, row) in ArrearsReader::new(file).rows().enumerate() {
            match row {
                Ok(row) => arrears.add(&row.employee_id, row.period, row.arrear()).await,
                Err(e) => warn!(line = line + 2, error = %e, "Skipping arrears row"),
            }
        }
    }

    let (batches, records) = stores(&args)?;
    let options = CalculationOptions {
        zero_default_attendance: args.zero_default_attendance,
    };
    let service = PayrollService::start(
        &config,
        catalog,
        Ports {
            directory: Arc::new(directory),
            attendance: Arc::new(InMemoryAttendanceStore::new()),
            loans: Arc::new(ledger),
            arrears: Arc::new(arrears),
            records,
            batches,
            notifier: Arc::new(LoggingNotifier),
        },
        options,
    );

    let file = File::open(&args.attendance).into_diagnostic()?;
    let mut summaries = Vec::new();
    for (line, summary) in AttendanceReader::new(file).summaries().enumerate() {
        match summary {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(line = line + 2, error = %e, "Skipping attendance row"),
        }
    }
    let ingest = service
        .ingest_attendance(summaries)
        .await
        .into_diagnostic()?
        .wait()
        .await;
    for failure in &ingest.errors {
        warn!(item = %failure.id, reason = %failure.reason, "Attendance row rejected");
    }

    let (batch, handle) = service
        .create_batch(scope, &args.actor)
        .await
        .into_diagnostic()?;
    let report = handle.wait().await;
    let batch = service.batch(&batch.id).await.into_diagnostic()?;
    service.shutdown();

    if batch.status == BatchStatus::Failed {
        return Err(miette!(
            "batch {} failed: {}",
            batch.id,
            batch.failure.as_deref().unwrap_or("unknown reason")
        ));
    }

    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_records(&batch.records).into_diagnostic()?;

    for failure in &report.errors {
        eprintln!("failed {}: {}", failure.id, failure.reason);
    }
    eprintln!(
        "batch {} {}: {} employees, gross {}, arrears {}, deductions {}, net {} ({} of {} items processed, {} failed)",
        batch.id,
        batch.status,
        batch.totals.employees,
        batch.totals.gross,
        batch.totals.arrears,
        batch.totals.deductions,
        batch.totals.net,
        report.progress.processed,
        report.progress.total,
        report.progress.failed,
    );
    info!(batch_id = %batch.id, status = %batch.status, "Run finished");
    Ok(())
}

async fn import_overrides(config: PayrollConfig, args: ImportArgs) -> Result<()> {
    let catalog = load_catalog(&args.catalog)?;
    let directory = load_directory(&args.employees).await?;
    let service = PayrollService::start(
        &config,
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
    );

    let file = File::open(&args.overrides).into_diagnostic()?;
    let mut unreadable = BulkOutcome::default();
    let mut requests = Vec::new();
    for (line, request) in OverrideReader::new(file).requests().enumerate() {
        match request {
            Ok(request) => requests.push(request),
            Err(e) => unreadable.fail(format!("row {}", line + 2), e.reason()),
        }
    }

    let mut outcome = service.import_overrides(requests).await;
    outcome.failed.extend(unreadable.failed);
    service.shutdown();

    let json = serde_json::to_string_pretty(&outcome).into_diagnostic()?;
    println!("{json}");
    eprintln!(
        "{} override(s) accepted, {} rejected",
        outcome.succeeded.len(),
        outcome.failed.len()
    );
    Ok(())
}

fn scope(args: &RunArgs) -> Result<BatchScope> {
    let (start, end) = match (args.period, args.start, args.end) {
        (Some(period), _, _) => (period, period),
        (None, Some(start), Some(end)) => (start, end),
        _ => return Err(miette!("either --period or both --start and --end are required")),
    };
    Ok(BatchScope {
        start,
        end,
        division: args.division.clone(),
        department: args.department.clone(),
    })
}

fn load_catalog(path: &Path) -> Result<CatalogSnapshot> {
    let file = File::open(path).into_diagnostic()?;
    read_catalog(file).into_diagnostic()
}

async fn load_directory(path: &Path) -> Result<InMemoryEmployeeDirectory> {
    let file = File::open(path).into_diagnostic()?;
    let directory = InMemoryEmployeeDirectory::new();
    for (line, employee) in EmployeeReader::new(file).employees().enumerate() {
        match employee {
            Ok(employee) => directory.insert(employee).await,
            Err(e) => warn!(line = line + 2, error = %e, "Skipping employee row"),
        }
    }
    Ok(directory)
}

#[cfg(feature = "storage-rocksdb")]
fn stores(args: &RunArgs) -> Result<(BatchStoreRef, RecordStoreRef)> {
    if let Some(db_path) = &args.db_path {
        info!(path = %db_path.display(), "Using RocksDB storage");
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        let batches: BatchStoreRef = Arc::new(store.clone());
        let records: RecordStoreRef = Arc::new(store);
        return Ok((batches, records));
    }
    Ok(in_memory_stores())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn stores(_args: &RunArgs) -> Result<(BatchStoreRef, RecordStoreRef)> {
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (BatchStoreRef, RecordStoreRef) {
    let batches: BatchStoreRef = Arc::new(InMemoryBatchStore::new());
    let records: RecordStoreRef = Arc::new(InMemoryRecordStore::new());
    (batches, records)
}
