//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use scribe_core::{
    Account, CreditReservation, EntryId, Job, JobId, LedgerEntry, ReservationId, ReservationStatus,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{ClaimOutcome, JobFilter, Store};

/// RocksDB-backed storage implementation.
///
/// Compound read-modify-write operations (reservations, settlement, job
/// transitions) serialize through `write_lock` so a concurrent reservation
/// never observes a stale balance. Plain reads do not take the lock.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Stage an account write into a batch.
    fn stage_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        batch.put_cf(
            &cf,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );
        Ok(())
    }

    /// Stage a ledger entry plus its user index into a batch.
    fn stage_ledger_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        batch.put_cf(&cf_ledger, keys::ledger_key(&entry.id), Self::serialize(entry)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_ledger_key(&entry.user_id, &entry.id),
            [],
        );
        Ok(())
    }

    /// Stage a reservation write into a batch.
    fn stage_reservation(
        &self,
        batch: &mut WriteBatch,
        reservation: &CreditReservation,
    ) -> Result<()> {
        let cf = self.cf(cf::RESERVATIONS)?;
        batch.put_cf(
            &cf,
            keys::reservation_key(&reservation.id),
            Self::serialize(reservation)?,
        );
        Ok(())
    }

    /// Stage a job write plus its user index into a batch.
    fn stage_job(&self, batch: &mut WriteBatch, job: &Job) -> Result<()> {
        let cf_jobs = self.cf(cf::JOBS)?;
        let cf_by_user = self.cf(cf::JOBS_BY_USER)?;
        batch.put_cf(&cf_jobs, keys::job_key(&job.id), Self::serialize(job)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_job_key(&job.user_id, job.created_at, &job.id),
            [],
        );
        Ok(())
    }

    fn load_job(&self, job_id: &JobId) -> Result<Job> {
        self.get_job(job_id)?.ok_or(StoreError::NotFound)
    }

    fn load_reservation(&self, reservation_id: &ReservationId) -> Result<CreditReservation> {
        self.get_reservation(reservation_id)?
            .ok_or(StoreError::NotFound)
    }

    /// Release a held reservation, crediting `refunded` back to the balance
    /// and `used` to lifetime usage, with the given ledger entry.
    fn release_reservation(
        &self,
        mut reservation: CreditReservation,
        status: ReservationStatus,
        refunded: i64,
        used: i64,
        make_entry: impl FnOnce(i64) -> LedgerEntry,
    ) -> Result<i64> {
        let mut account = self
            .get_account(&reservation.user_id)?
            .ok_or(StoreError::NotFound)?;

        account.balance += refunded;
        account.lifetime_used += used;
        account.updated_at = chrono::Utc::now();

        reservation.status = status;
        reservation.released_at = Some(chrono::Utc::now());

        let entry = make_entry(account.balance);

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_reservation(&mut batch, &reservation)?;
        self.stage_ledger_entry(&mut batch, &entry)?;
        self.write(batch)?;

        Ok(refunded)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .get_cf(&cf, keys::account_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn grant_credits(&self, user_id: &UserId, amount: i64, description: &str) -> Result<i64> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut account = self
            .get_account(user_id)?
            .unwrap_or_else(|| Account::new(*user_id));

        account.balance += amount;
        account.lifetime_granted += amount;
        account.updated_at = chrono::Utc::now();

        let entry = LedgerEntry::grant(*user_id, amount, account.balance, description.to_string());

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_ledger_entry(&mut batch, &entry)?;
        self.write(batch)?;

        tracing::info!(user_id = %user_id, amount, balance = account.balance, "credits granted");
        Ok(account.balance)
    }

    fn balance(&self, user_id: &UserId) -> Result<i64> {
        self.get_account(user_id)?
            .map(|a| a.balance)
            .ok_or(StoreError::NotFound)
    }

    // =========================================================================
    // Reservation Operations
    // =========================================================================

    fn reserve(&self, job: &Job) -> Result<CreditReservation> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let amount = job.estimated_credits;
        let mut account = self
            .get_account(&job.user_id)?
            .ok_or(StoreError::NotFound)?;

        if !account.has_sufficient_credits(amount) {
            return Err(StoreError::InsufficientCredits {
                balance: account.balance,
                required: amount,
            });
        }

        account.balance -= amount;
        account.updated_at = chrono::Utc::now();

        let reservation = CreditReservation::new(job.user_id, job.id, amount);
        let entry = LedgerEntry::reserve(job.user_id, job.id, amount, account.balance);

        // The job rides in the same batch as the hold: either both exist
        // after a crash or neither does.
        let cf_by_job = self.cf(cf::RESERVATIONS_BY_JOB)?;
        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_reservation(&mut batch, &reservation)?;
        batch.put_cf(
            &cf_by_job,
            keys::reservation_by_job_key(&job.id),
            reservation.id.to_bytes(),
        );
        self.stage_ledger_entry(&mut batch, &entry)?;
        self.stage_job(&mut batch, job)?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %job.user_id,
            job_id = %job.id,
            amount,
            balance = account.balance,
            "credits reserved"
        );
        Ok(reservation)
    }

    fn settle(&self, reservation_id: &ReservationId, actual: i64) -> Result<i64> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let reservation = self.load_reservation(reservation_id)?;
        if reservation.status.is_released() {
            return Err(StoreError::AlreadySettled {
                reservation_id: *reservation_id,
            });
        }

        // Usage beyond the reservation is absorbed: only the held amount is
        // ever deducted, the refund can't go negative.
        let used = actual.clamp(0, reservation.amount);
        let refunded = reservation.amount - used;
        let user_id = reservation.user_id;
        let job_id = reservation.job_id;

        self.release_reservation(
            reservation,
            ReservationStatus::Settled,
            refunded,
            used,
            |balance_after| LedgerEntry::settle(user_id, job_id, refunded, balance_after),
        )
    }

    fn refund_full(&self, reservation_id: &ReservationId, reason: &str) -> Result<i64> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let reservation = self.load_reservation(reservation_id)?;
        if reservation.status.is_released() {
            return Err(StoreError::AlreadySettled {
                reservation_id: *reservation_id,
            });
        }

        let refunded = reservation.amount;
        let user_id = reservation.user_id;
        let job_id = reservation.job_id;
        let reason = reason.to_string();

        self.release_reservation(
            reservation,
            ReservationStatus::Refunded,
            refunded,
            0,
            |balance_after| LedgerEntry::refund(user_id, job_id, refunded, balance_after, reason),
        )
    }

    fn get_reservation(
        &self,
        reservation_id: &ReservationId,
    ) -> Result<Option<CreditReservation>> {
        let cf = self.cf(cf::RESERVATIONS)?;
        self.db
            .get_cf(&cf, keys::reservation_key(reservation_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn reservation_for_job(&self, job_id: &JobId) -> Result<Option<CreditReservation>> {
        let cf = self.cf(cf::RESERVATIONS_BY_JOB)?;
        let Some(id_bytes) = self
            .db
            .get_cf(&cf, keys::reservation_by_job_key(job_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if id_bytes.len() != 16 {
            return Err(StoreError::Database(
                "corrupt reservation index entry".to_string(),
            ));
        }
        bytes.copy_from_slice(&id_bytes);
        let reservation_id = ReservationId::from_bytes(bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.get_reservation(&reservation_id)
    }

    fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        let prefix = keys::user_ledger_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULIDs are time-ordered, so the prefix scan yields oldest first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        let mut entries = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if entries.len() >= limit {
                break;
            }
            let entry_id = keys::extract_entry_id_from_user_key(&key);
            if let Some(entry) = self.get_ledger_entry(&entry_id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn get_ledger_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::LEDGER)?;
        self.db
            .get_cf(&cf, keys::ledger_key(entry_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    fn put_job(&self, job: &Job) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_job(&mut batch, job)?;
        self.write(batch)
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let cf = self.cf(cf::JOBS)?;
        self.db
            .get_cf(&cf, keys::job_key(job_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_jobs_by_user(
        &self,
        user_id: &UserId,
        filter: &JobFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        let cf_by_user = self.cf(cf::JOBS_BY_USER)?;
        let prefix = keys::user_jobs_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        // Newest first.
        all_keys.reverse();

        let mut jobs = Vec::new();
        let mut skipped = 0;
        for key in all_keys {
            if jobs.len() >= limit {
                break;
            }
            let job_id = keys::extract_job_id_from_user_key(&key);
            let Some(job) = self.get_job(&job_id)? else {
                continue;
            };
            if let Some(status) = filter.status {
                if job.status != status {
                    continue;
                }
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            jobs.push(job);
        }

        Ok(jobs)
    }

    // =========================================================================
    // Job State Transitions
    // =========================================================================

    fn begin_attempt(&self, job_id: &JobId, attempt: u32) -> Result<ClaimOutcome> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut job = self.load_job(job_id)?;

        if job.status.is_terminal() {
            return Ok(ClaimOutcome::Superseded(job.status));
        }

        if job.status == scribe_core::JobStatus::Processing {
            // Redelivery after a crash mid-attempt: the status never left
            // Processing, so re-claim without a formal transition.
            job.attempts = job.attempts.max(attempt);
            job.processing_started_at = Some(chrono::Utc::now());
        } else {
            job.begin_attempt(attempt)?;
        }

        self.put_job(&job)?;
        Ok(ClaimOutcome::Claimed(job))
    }

    fn complete_job(&self, job_id: &JobId, actual_credits: i64, output_text: &str) -> Result<Job> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut job = self.load_job(job_id)?;
        job.complete(actual_credits, output_text.to_string())?;
        self.put_job(&job)?;
        Ok(job)
    }

    fn record_retry(&self, job_id: &JobId, error: &str) -> Result<Job> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut job = self.load_job(job_id)?;
        job.fail_retryable(error)?;
        self.put_job(&job)?;
        Ok(job)
    }

    fn dead_letter_job(&self, job_id: &JobId, error: &str) -> Result<Job> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut job = self.load_job(job_id)?;
        job.dead_letter(error)?;
        self.put_job(&job)?;
        Ok(job)
    }

    fn cancel_job(&self, job_id: &JobId) -> Result<Job> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut job = self.load_job(job_id)?;
        if !job.status.is_cancellable() {
            return Err(StoreError::NotCancellable {
                job_id: *job_id,
                status: job.status,
            });
        }
        job.cancel()?;
        self.put_job(&job)?;
        Ok(job)
    }

    fn record_late_output(&self, job_id: &JobId, output_text: &str) -> Result<()> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut job = self.load_job(job_id)?;
        job.output_text = Some(output_text.to_string());
        self.put_job(&job)
    }
}
