use crate::domain::batch::PayrollBatch;
use crate::domain::period::PayPeriod;
use crate::domain::ports::{BatchStore, RecordStore};
use crate::domain::record::PayrollRecord;
use crate::error::{PayrollError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for payroll batches, history included.
pub const CF_BATCHES: &str = "batches";
/// Column Family for the latest record per employee and period.
pub const CF_RECORDS: &str = "records";

/// Persistent batch and record storage.
///
/// Values are JSON. Record keys are `employee_id/YYYY-MM` so a prefix scan
/// finds every period of one employee. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path` with both column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_batches = ColumnFamilyDescriptor::new(CF_BATCHES, Options::default());
        let cf_records = ColumnFamilyDescriptor::new(CF_RECORDS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_batches, cf_records])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| PayrollError::internal(format!("Serialization error: {e}")))?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| PayrollError::internal(format!("Deserialization error: {e}"))),
            None => Ok(None),
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PayrollError::internal(format!("{name} column family not found")))
    }
}

fn record_key(employee_id: &str, period: PayPeriod) -> String {
    format!("{employee_id}/{period}")
}

#[async_trait]
impl BatchStore for RocksDBStore {
    async fn store(&self, batch: PayrollBatch) -> Result<()> {
        self.put(CF_BATCHES, &batch.id, &batch)
    }

    async fn get(&self, batch_id: &str) -> Result<Option<PayrollBatch>> {
        self.fetch(CF_BATCHES, batch_id)
    }

    async fn all(&self) -> Result<Vec<PayrollBatch>> {
        let cf = self.cf(CF_BATCHES)?;
        let mut batches = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let batch: PayrollBatch = serde_json::from_slice(&value)
                .map_err(|e| PayrollError::internal(format!("Failed to deserialize batch: {e}")))?;
            batches.push(batch);
        }
        Ok(batches)
    }

    async fn delete(&self, batch_id: &str) -> Result<bool> {
        let cf = self.cf(CF_BATCHES)?;
        let existed = self.db.get_pinned_cf(cf, batch_id.as_bytes())?.is_some();
        if existed {
            self.db.delete_cf(cf, batch_id.as_bytes())?;
        }
        Ok(existed)
    }
}

#[async_trait]
impl RecordStore for RocksDBStore {
    async fn store(&self, record: PayrollRecord) -> Result<()> {
        self.put(CF_RECORDS, &record_key(&record.employee_id, record.period), &record)
    }

    async fn get(&self, employee_id: &str, period: PayPeriod) -> Result<Option<PayrollRecord>> {
        self.fetch(CF_RECORDS, &record_key(employee_id, period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attendance::AttendanceSummary;
    use crate::domain::money::Money;
    use crate::domain::period::BatchScope;
    use crate::domain::record::RecordStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn period() -> PayPeriod {
        "2026-05".parse().unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_BATCHES).is_some());
        assert!(store.db.cf_handle(CF_RECORDS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_batch_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let batch = PayrollBatch::new(BatchScope::single(period()), "alice", Utc::now());

        BatchStore::store(&store, batch.clone()).await.unwrap();
        assert_eq!(BatchStore::get(&store, &batch.id).await.unwrap(), Some(batch.clone()));
        assert_eq!(store.all().await.unwrap().len(), 1);

        assert!(store.delete(&batch.id).await.unwrap());
        assert!(BatchStore::get(&store, &batch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_record_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let record = PayrollRecord {
            employee_id: "E1".into(),
            period: period(),
            catalog_version: 4,
            attendance: AttendanceSummary::zeroed("E1", period()),
            per_day_rate: Money::new(dec!(1000)),
            earnings: Vec::new(),
            deductions: Vec::new(),
            recoveries: Vec::new(),
            adjustments: Vec::new(),
            gross: Money::new(dec!(31000)),
            arrears: Money::ZERO,
            total_deductions: Money::ZERO,
            loan_emi: Money::ZERO,
            advance_deduction: Money::ZERO,
            round_off: Money::ZERO,
            net: Money::new(dec!(31000)),
            status: RecordStatus::Calculated,
            warnings: Vec::new(),
        };

        RecordStore::store(&store, record.clone()).await.unwrap();
        let retrieved = RecordStore::get(&store, "E1", period()).await.unwrap();
        assert_eq!(retrieved, Some(record));
        assert!(RecordStore::get(&store, "E1", period().next()).await.unwrap().is_none());
    }
}
