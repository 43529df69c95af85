//! Partition-scoped transaction
//!
//! A [`Transaction`] wraps one store-native local transaction. It is bound
//! to a single table and a single partition-key value for its whole life,
//! and only supports point reads and writes on rows of that partition.
//!
//! Status transitions are monotonic:
//!
//! ```text
//! Active ──commit──▶ Committed
//!   │ └──rollback / failed commit──▶ Aborted
//!   └──timeout observed──▶ TimedOut
//! ```
//!
//! The timeout is checked lazily before each operation and on `status()`;
//! nothing runs in the background. A transaction must not be shared between
//! threads; every operation takes `&mut self`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use widemap_core::codec::{self, Record};
use widemap_core::{
    BatchOperation, Error, PrimaryKeyPredicate, Result, RowCondition, SchemaDescriptor,
    StoreClient, TransactionId, TransactionStateError, WireValue,
};

use crate::coordinator::TransactionCounters;

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting operations
    Active,
    /// Committed successfully
    Committed,
    /// Rolled back, or commit failed
    Aborted,
    /// Lifetime exceeded before commit
    TimedOut,
}

impl TransactionStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Active
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
            TransactionStatus::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// One write inside [`Transaction::batch_write`]
#[derive(Debug, Clone)]
pub enum TransactionWrite {
    /// Insert; fails if the row exists
    Insert(Record),
    /// Upsert
    Save(Record),
    /// Change attributes of an existing row
    Update {
        /// Exact key of the row
        key: PrimaryKeyPredicate,
        /// Attribute changes; null removes the attribute
        changes: Record,
    },
    /// Delete a row
    Delete(PrimaryKeyPredicate),
}

/// Write-side settings a transaction inherits from its coordinator
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransactionSettings {
    pub(crate) timeout: Duration,
    pub(crate) initial_version: i64,
}

/// Store-native local transaction bound to one partition key
pub struct Transaction {
    id: TransactionId,
    schema: Arc<SchemaDescriptor>,
    partition_key: WireValue,
    status: TransactionStatus,
    start_time: Instant,
    settings: TransactionSettings,
    store: Arc<dyn StoreClient>,
    counters: Arc<TransactionCounters>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("entity", &self.schema.entity())
            .field("partition_key", &self.partition_key)
            .field("status", &self.status)
            .field("elapsed", &self.start_time.elapsed())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        schema: Arc<SchemaDescriptor>,
        partition_key: WireValue,
        settings: TransactionSettings,
        store: Arc<dyn StoreClient>,
        counters: Arc<TransactionCounters>,
    ) -> Self {
        Self {
            id,
            schema,
            partition_key,
            status: TransactionStatus::Active,
            start_time: Instant::now(),
            settings,
            store,
            counters,
        }
    }

    /// Store-issued id
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    /// Partition-key value every operation must target
    pub fn partition_key(&self) -> &WireValue {
        &self.partition_key
    }

    /// Entity this transaction writes
    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    /// Time since the transaction started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Whether the configured lifetime has been exceeded
    pub fn is_expired(&self) -> bool {
        self.start_time.elapsed() > self.settings.timeout
    }

    /// Current status, observing an elapsed timeout first
    pub fn status(&mut self) -> TransactionStatus {
        self.observe_timeout();
        self.status
    }

    /// Whether operations are still accepted
    pub fn is_active(&mut self) -> bool {
        self.status() == TransactionStatus::Active
    }

    fn observe_timeout(&mut self) {
        if self.status != TransactionStatus::Active || !self.is_expired() {
            return;
        }
        self.status = TransactionStatus::TimedOut;
        self.counters.record_timeout();
        warn!(
            target: "widemap::txn",
            id = %self.id,
            elapsed_ms = self.start_time.elapsed().as_millis() as u64,
            timeout_ms = self.settings.timeout.as_millis() as u64,
            "Transaction timed out"
        );
        // Releases the partition lock held by the store
        if let Err(e) = self.store.abort_transaction(&self.id) {
            warn!(target: "widemap::txn", id = %self.id, error = %e, "Abort after timeout failed");
        }
    }

    fn ensure_active(&mut self, operation: &'static str) -> Result<()> {
        self.observe_timeout();
        if self.status == TransactionStatus::Active {
            Ok(())
        } else {
            Err(TransactionStateError {
                transaction_id: self.id.to_string(),
                status: self.status.to_string(),
                operation,
            }
            .into())
        }
    }

    /// Encode an exact key and check it against the bound partition
    fn scoped_key(&self, key: &PrimaryKeyPredicate) -> Result<Vec<WireValue>> {
        let encoded = codec::encode_key(&self.schema, key)?;
        self.check_partition(&encoded)?;
        Ok(encoded)
    }

    fn check_partition(&self, key: &[WireValue]) -> Result<()> {
        match key.first() {
            Some(partition) if *partition == self.partition_key => Ok(()),
            Some(partition) => Err(Error::PartitionMismatch {
                transaction_id: self.id.to_string(),
                expected: self.partition_key.to_string(),
                actual: partition.to_string(),
            }),
            None => Err(Error::InvalidArgument("empty primary key".to_string())),
        }
    }

    fn prepare_put(&self, mut record: Record, condition: RowCondition) -> Result<BatchOperation> {
        codec::prepare_insert(&self.schema, &mut record, Utc::now(), self.settings.initial_version);
        let (key, attributes) = codec::encode_record(&self.schema, &record)?;
        self.check_partition(&key)?;
        Ok(BatchOperation::Put {
            key,
            attributes,
            condition,
        })
    }

    /// Version bumps read the row inside the transaction first
    fn prepare_update(
        &self,
        key: &PrimaryKeyPredicate,
        mut changes: Record,
    ) -> Result<BatchOperation> {
        let encoded = self.scoped_key(key)?;
        // Reject bad changes before the read goes out
        codec::encode_changes(&self.schema, &changes)?;
        let current = if self.schema.attributes().iter().any(|c| c.set_on_update) {
            self.store
                .point_get(self.schema.table(), &encoded, Some(&self.id))?
        } else {
            None
        };
        codec::prepare_update(
            &self.schema,
            &mut changes,
            Utc::now(),
            current.as_ref(),
            self.settings.initial_version,
        )?;
        Ok(BatchOperation::Update {
            key: encoded,
            deltas: codec::encode_changes(&self.schema, &changes)?,
            condition: RowCondition::ExpectExist,
        })
    }

    fn submit(&self, operation: BatchOperation) -> Result<()> {
        let table = self.schema.table();
        let id = Some(&self.id);
        match operation {
            BatchOperation::Put {
                key,
                attributes,
                condition,
            } => self.store.point_put(table, &key, attributes, condition, id),
            BatchOperation::Update {
                key,
                deltas,
                condition,
            } => self.store.point_update(table, &key, deltas, condition, id),
            BatchOperation::Delete { key, condition } => {
                self.store.point_delete(table, &key, condition, id)
            }
        }
    }

    /// Insert a new row; fails with `ConditionFailure` if it exists
    pub fn insert(&mut self, record: Record) -> Result<()> {
        self.ensure_active("insert")?;
        let op = self.prepare_put(record, RowCondition::ExpectNotExist)?;
        self.submit(op)
    }

    /// Write a full row, replacing any existing one
    pub fn save(&mut self, record: Record) -> Result<()> {
        self.ensure_active("save")?;
        let op = self.prepare_put(record, RowCondition::Ignore)?;
        self.submit(op)
    }

    /// Change attributes of an existing row
    pub fn update(&mut self, key: &PrimaryKeyPredicate, changes: Record) -> Result<()> {
        self.ensure_active("update")?;
        let op = self.prepare_update(key, changes)?;
        self.submit(op)
    }

    /// Delete a row
    pub fn delete(&mut self, key: &PrimaryKeyPredicate) -> Result<()> {
        self.ensure_active("delete")?;
        let key = self.scoped_key(key)?;
        self.submit(BatchOperation::Delete {
            key,
            condition: RowCondition::Ignore,
        })
    }

    /// Point read inside the transaction; sees this transaction's writes
    pub fn find_one(&mut self, key: &PrimaryKeyPredicate) -> Result<Option<Record>> {
        self.ensure_active("find_one")?;
        let key = self.scoped_key(key)?;
        self.store
            .point_get(self.schema.table(), &key, Some(&self.id))?
            .map(|row| codec::decode_row(&self.schema, &row))
            .transpose()
    }

    /// Submit several writes as one store batch
    ///
    /// Every write is encoded and partition-checked before anything is sent.
    pub fn batch_write(&mut self, writes: Vec<TransactionWrite>) -> Result<()> {
        self.ensure_active("batch_write")?;
        let mut operations = Vec::with_capacity(writes.len());
        for write in &writes {
            let key = match write {
                TransactionWrite::Insert(record) | TransactionWrite::Save(record) => {
                    codec::encode_key(&self.schema, &codec::key_of(&self.schema, record))?
                }
                TransactionWrite::Update { key, .. } | TransactionWrite::Delete(key) => {
                    codec::encode_key(&self.schema, key)?
                }
            };
            self.check_partition(&key)?;
        }
        for write in writes {
            operations.push(match write {
                TransactionWrite::Insert(record) => {
                    self.prepare_put(record, RowCondition::ExpectNotExist)?
                }
                TransactionWrite::Save(record) => self.prepare_put(record, RowCondition::Ignore)?,
                TransactionWrite::Update { key, changes } => self.prepare_update(&key, changes)?,
                TransactionWrite::Delete(key) => BatchOperation::Delete {
                    key: self.scoped_key(&key)?,
                    condition: RowCondition::Ignore,
                },
            });
        }
        debug!(target: "widemap::txn", id = %self.id, operations = operations.len(), "Batch write");
        self.store.batch_write(&self.id, operations)
    }

    /// Commit; a failed commit leaves the transaction aborted
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active("commit")?;
        match self.store.commit_transaction(&self.id) {
            Ok(()) => {
                self.status = TransactionStatus::Committed;
                self.counters.record_commit();
                info!(
                    target: "widemap::txn",
                    id = %self.id,
                    elapsed_ms = self.start_time.elapsed().as_millis() as u64,
                    "Transaction committed"
                );
                Ok(())
            }
            Err(e) => {
                self.status = TransactionStatus::Aborted;
                self.counters.record_abort();
                warn!(
                    target: "widemap::txn",
                    id = %self.id,
                    error = %e,
                    "Commit failed, transaction aborted"
                );
                Err(e)
            }
        }
    }

    /// Abort; no-op unless active
    ///
    /// Always ends `Aborted` when it was active, whatever the store answers.
    pub fn rollback(&mut self) {
        self.observe_timeout();
        if self.status != TransactionStatus::Active {
            return;
        }
        if let Err(e) = self.store.abort_transaction(&self.id) {
            warn!(target: "widemap::txn", id = %self.id, error = %e, "Abort failed");
        }
        self.status = TransactionStatus::Aborted;
        self.counters.record_abort();
        warn!(target: "widemap::txn", id = %self.id, "Transaction rolled back");
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Active {
            debug!(target: "widemap::txn", id = %self.id, "Dropped while active, rolling back");
            self.rollback();
        }
    }
}
