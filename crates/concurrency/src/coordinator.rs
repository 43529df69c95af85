//! Transaction coordinator for managing transaction lifecycle
//!
//! The TransactionCoordinator opens store-native local transactions and
//! adds:
//! - Partition-key encoding at start
//! - Transaction metrics (started, committed, aborted, timed out)
//! - Commit rate calculation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use widemap_core::codec;
use widemap_core::{Result, SchemaDescriptor, StoreClient, Value};

use crate::transaction::{Transaction, TransactionSettings};

/// Lifecycle counters shared by a coordinator and its transactions
///
/// All counters use Relaxed ordering; they are observational only and do
/// not synchronize any other memory.
#[derive(Debug, Default)]
pub struct TransactionCounters {
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_timed_out: AtomicU64,
}

impl TransactionCounters {
    /// Record transaction start
    pub fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record transaction commit
    pub fn record_commit(&self) {
        self.leave_active();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record rollback or failed commit
    pub fn record_abort(&self) {
        self.leave_active();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an observed timeout
    pub fn record_timeout(&self) {
        self.leave_active();
        self.total_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    // Saturating decrement to prevent underflow
    fn leave_active(&self) {
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    fn snapshot(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_timed_out: self.total_timed_out.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

/// Opens partition-scoped transactions against one store
pub struct TransactionCoordinator {
    store: Arc<dyn StoreClient>,
    settings: TransactionSettings,
    counters: Arc<TransactionCounters>,
}

impl TransactionCoordinator {
    /// Create a coordinator
    ///
    /// # Arguments
    /// * `store` - Store client every transaction talks to
    /// * `timeout` - Wall-clock lifetime of each transaction
    /// * `initial_version` - Value written into version columns on insert
    pub fn new(store: Arc<dyn StoreClient>, timeout: Duration, initial_version: i64) -> Self {
        Self {
            store,
            settings: TransactionSettings {
                timeout,
                initial_version,
            },
            counters: Arc::new(TransactionCounters::default()),
        }
    }

    /// Configured transaction lifetime
    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Start a transaction on `schema`'s table, bound to one partition key
    ///
    /// `partition_value` is the value of the schema's first primary-key
    /// column; it is encoded like any other key component.
    ///
    /// # Errors
    /// * `KeyError` - the value is null, NaN or of the wrong kind
    /// * store errors from `start_transaction`
    pub fn begin(
        &self,
        schema: Arc<SchemaDescriptor>,
        partition_value: &Value,
    ) -> Result<Transaction> {
        let partition_key = codec::encode_key_component(partition_value, schema.partition_key())?;
        let id = self.store.start_transaction(schema.table(), &partition_key)?;
        self.counters.record_start();

        debug!(
            target: "widemap::txn",
            %id,
            entity = schema.entity(),
            partition = %partition_key,
            "Transaction started"
        );

        Ok(Transaction::new(
            id,
            schema,
            partition_key,
            self.settings,
            Arc::clone(&self.store),
            Arc::clone(&self.counters),
        ))
    }

    /// Get transaction metrics
    ///
    /// Returns current snapshot of transaction statistics.
    pub fn metrics(&self) -> TransactionMetrics {
        self.counters.snapshot()
    }

    /// Get current active transaction count
    pub fn active_count(&self) -> u64 {
        self.counters.active_count.load(Ordering::Relaxed)
    }
}

/// Transaction metrics
///
/// Provides statistics about transaction lifecycle.
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    /// Number of currently active transactions
    pub active_count: u64,
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions rolled back or failed at commit
    pub total_aborted: u64,
    /// Total number of transactions that outlived their timeout
    pub total_timed_out: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Total transactions that reached a terminal status
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted + self.total_timed_out
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
