use crate::error::{PayrollError, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How many days one threshold crossing costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayUnit {
    HalfDay,
    FullDay,
    /// A fixed amount per crossing, converted to days through the per-day rate.
    CustomAmount,
}

impl FromStr for DayUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "half_day" => Ok(DayUnit::HalfDay),
            "full_day" => Ok(DayUnit::FullDay),
            "custom_amount" => Ok(DayUnit::CustomAmount),
            other => Err(format!("invalid deduction unit: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// Only whole threshold crossings count.
    Floor,
    /// The remainder below the next crossing counts pro rata.
    Proportional,
}

impl FromStr for CountMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "floor" => Ok(CountMode::Floor),
            "proportional" => Ok(CountMode::Proportional),
            other => Err(format!("invalid calculation mode: {other}")),
        }
    }
}

/// Count-threshold deduction policy, used for late-in/early-out and for
/// permissions. A zero threshold disables the deduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountPolicy {
    pub threshold: u32,
    pub unit: DayUnit,
    pub custom_amount: Decimal,
    pub mode: CountMode,
}

impl Default for CountPolicy {
    fn default() -> Self {
        Self {
            threshold: 0,
            unit: DayUnit::HalfDay,
            custom_amount: Decimal::ZERO,
            mode: CountMode::Floor,
        }
    }
}

impl CountPolicy {
    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsentPolicy {
    pub enabled: bool,
    pub free_days: Decimal,
    /// Days of pay lost per absent day. 1 means the unpaid day itself and no more.
    pub lop_days_per_absent: Decimal,
}

impl Default for AbsentPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            free_days: Decimal::ZERO,
            lop_days_per_absent: Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct OvertimePolicy {
    pub pay_per_hour: Decimal,
    pub min_hours: Decimal,
}

/// Attendance-driven pay policy applied by the calculation engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    pub absent: AbsentPolicy,
    pub overtime: OvertimePolicy,
    pub late_early: CountPolicy,
    pub permission: CountPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub queue_size: usize,
    pub max_attempts: u32,
    pub retry_base: Duration,
    /// Employees calculated concurrently inside one batch job.
    pub item_concurrency: usize,
    /// How long a finished job stays visible to `WorkerPool::job`.
    pub job_retention: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_size: 256,
            max_attempts: 3,
            retry_base: Duration::from_millis(500),
            item_concurrency: 8,
            job_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayrollConfig {
    pub workers: WorkerConfig,
    pub policy: PolicyConfig,
    pub grant_ttl: chrono::Duration,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            workers: WorkerConfig::default(),
            policy: PolicyConfig::default(),
            grant_ttl: chrono::Duration::hours(24),
        }
    }
}

impl PayrollConfig {
    /// Reads `.env` if present, then the `PAYROLL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their default;
    /// set but unparseable keys are a `ValidationError`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let workers = WorkerConfig {
            worker_count: parse(&get, "PAYROLL_WORKER_COUNT", defaults.workers.worker_count)?.max(1),
            queue_size: parse(&get, "PAYROLL_QUEUE_SIZE", defaults.workers.queue_size)?.max(1),
            max_attempts: parse(&get, "PAYROLL_MAX_ATTEMPTS", defaults.workers.max_attempts)?.max(1),
            retry_base: Duration::from_millis(parse(&get, "PAYROLL_RETRY_BASE_MS", 500u64)?),
            item_concurrency: parse(
                &get,
                "PAYROLL_ITEM_CONCURRENCY",
                defaults.workers.item_concurrency,
            )?
            .max(1),
            job_retention: Duration::from_secs(parse(
                &get,
                "PAYROLL_JOB_RETENTION_SECS",
                defaults.workers.job_retention.as_secs(),
            )?),
        };

        let policy = PolicyConfig {
            absent: AbsentPolicy {
                enabled: parse(&get, "PAYROLL_ABSENT_DEDUCTION", false)?,
                free_days: parse(&get, "PAYROLL_FREE_ABSENT_DAYS", Decimal::ZERO)?,
                lop_days_per_absent: parse(&get, "PAYROLL_LOP_DAYS_PER_ABSENT", Decimal::ONE)?,
            },
            overtime: OvertimePolicy {
                pay_per_hour: parse(&get, "PAYROLL_OT_PAY_PER_HOUR", Decimal::ZERO)?,
                min_hours: parse(&get, "PAYROLL_OT_MIN_HOURS", Decimal::ZERO)?,
            },
            late_early: count_policy(&get, "PAYROLL_LATE")?,
            permission: count_policy(&get, "PAYROLL_PERMISSION")?,
        };

        let ttl_hours: i64 = parse(&get, "PAYROLL_GRANT_TTL_HOURS", 24)?;

        Ok(Self {
            workers,
            policy,
            grant_ttl: chrono::Duration::hours(ttl_hours.max(1)),
        })
    }
}

fn count_policy<G>(get: &G, prefix: &str) -> Result<CountPolicy>
where
    G: Fn(&str) -> Option<String>,
{
    let defaults = CountPolicy::default();
    Ok(CountPolicy {
        threshold: parse(get, &format!("{prefix}_THRESHOLD"), defaults.threshold)?,
        unit: parse(get, &format!("{prefix}_DEDUCTION"), defaults.unit)?,
        custom_amount: parse(get, &format!("{prefix}_AMOUNT"), defaults.custom_amount)?,
        mode: parse(get, &format!("{prefix}_MODE"), defaults.mode)?,
    })
}

fn parse<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            PayrollError::ValidationError(format!("{key}: cannot parse '{raw}': {e}"))
        }),
        None => Ok(default),
    }
}
