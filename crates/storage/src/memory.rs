//! MemoryStore: in-process wide-column store
//!
//! Implements [`StoreClient`] over ordered in-memory tables:
//! - `BTreeMap<Vec<WireValue>, WireRow>` per table, ordered by full key
//! - `parking_lot::RwLock` for thread-safe access
//! - forward/backward range scans bounded by [`KeyPart`] boundaries
//! - server-side [`StoreFilter`] evaluation during scans
//! - row-existence conditions on every write
//!
//! # Local transactions
//!
//! A transaction is scoped to one table and one partition key. Writes are
//! staged in an overlay and become visible to other readers only on commit;
//! point reads inside the transaction see its own staged writes. Range scans
//! are never transactional.
//!
//! Lock order is `transactions` before `tables`.

use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use widemap_core::{
    compare_to_bound, render_key, AttributeDelta, BatchOperation, Error, Result, RowCondition,
    ScanDirection, ScanRequest, ScanResponse, StoreClient, StoreError, StoredRow, TransactionId,
    WireRow, WireValue,
};

use crate::filter;

type Table = BTreeMap<Vec<WireValue>, WireRow>;

/// Staged writes; `None` marks a delete
type Overlay = BTreeMap<Vec<WireValue>, Option<WireRow>>;

#[derive(Debug)]
struct PendingTransaction {
    table: String,
    partition_key: WireValue,
    writes: Overlay,
}

/// Row change applied by a write
enum Mutation {
    Put(WireRow),
    Update(Vec<AttributeDelta>),
    Delete,
}

impl Mutation {
    fn apply(self, current: Option<&WireRow>) -> Option<WireRow> {
        match self {
            Mutation::Put(row) => Some(row),
            Mutation::Update(deltas) => {
                let mut row = current.cloned().unwrap_or_default();
                for delta in deltas {
                    match delta {
                        AttributeDelta::Put(name, value) => {
                            row.insert(name, value);
                        }
                        AttributeDelta::Delete(name) => {
                            row.remove(&name);
                        }
                    }
                }
                Some(row)
            }
            Mutation::Delete => None,
        }
    }
}

/// In-memory [`StoreClient`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    transactions: Mutex<HashMap<TransactionId, PendingTransaction>>,
}

impl MemoryStore {
    /// Create an empty store with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table; no-op when it already exists
    pub fn create_table(&self, name: impl Into<String>) {
        self.tables.write().entry(name.into()).or_default();
    }

    /// Number of committed rows in `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Number of open local transactions
    pub fn open_transactions(&self) -> usize {
        self.transactions.lock().len()
    }

    fn check_condition(
        table: &str,
        key: &[WireValue],
        condition: RowCondition,
        current: Option<&WireRow>,
    ) -> Result<()> {
        let holds = match condition {
            RowCondition::Ignore => true,
            RowCondition::ExpectExist => current.is_some(),
            RowCondition::ExpectNotExist => current.is_none(),
        };
        if holds {
            Ok(())
        } else {
            Err(Error::ConditionFailure {
                table: table.to_string(),
                key: render_key(key),
            })
        }
    }

    fn check_scope(
        id: &TransactionId,
        pending: &PendingTransaction,
        table: &str,
        key: &[WireValue],
    ) -> Result<()> {
        if pending.table != table {
            return Err(StoreError::Rejected(format!(
                "transaction {id} is bound to table '{}', not '{table}'",
                pending.table
            ))
            .into());
        }
        match key.first() {
            Some(partition) if *partition == pending.partition_key => Ok(()),
            Some(partition) => Err(StoreError::Rejected(format!(
                "transaction {id} is bound to partition {}, write targets {partition}",
                pending.partition_key
            ))
            .into()),
            None => Err(StoreError::Rejected("empty primary key".to_string()).into()),
        }
    }

    /// Stage one write into `writes`, checking its condition against the
    /// transaction's view of the row
    fn stage(
        tables: &HashMap<String, Table>,
        writes: &mut Overlay,
        table: &str,
        key: &[WireValue],
        condition: RowCondition,
        mutation: Mutation,
    ) -> Result<()> {
        let base = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let current = match writes.get(key) {
            Some(staged) => staged.as_ref(),
            None => base.get(key),
        };
        Self::check_condition(table, key, condition, current)?;
        let next = mutation.apply(current);
        writes.insert(key.to_vec(), next);
        Ok(())
    }

    fn write(
        &self,
        table: &str,
        key: &[WireValue],
        condition: RowCondition,
        mutation: Mutation,
        transaction: Option<&TransactionId>,
    ) -> Result<()> {
        match transaction {
            Some(id) => {
                let mut transactions = self.transactions.lock();
                let pending = transactions
                    .get_mut(id)
                    .ok_or_else(|| StoreError::UnknownTransaction(id.to_string()))?;
                Self::check_scope(id, pending, table, key)?;
                let tables = self.tables.read();
                Self::stage(&tables, &mut pending.writes, table, key, condition, mutation)
            }
            None => {
                let mut tables = self.tables.write();
                let rows = tables
                    .get_mut(table)
                    .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
                Self::check_condition(table, key, condition, rows.get(key))?;
                match mutation.apply(rows.get(key)) {
                    Some(row) => {
                        rows.insert(key.to_vec(), row);
                    }
                    None => {
                        rows.remove(key);
                    }
                }
                Ok(())
            }
        }
    }
}

impl StoreClient for MemoryStore {
    fn point_get(
        &self,
        table: &str,
        key: &[WireValue],
        transaction: Option<&TransactionId>,
    ) -> Result<Option<StoredRow>> {
        let staged = match transaction {
            Some(id) => {
                let transactions = self.transactions.lock();
                let pending = transactions
                    .get(id)
                    .ok_or_else(|| StoreError::UnknownTransaction(id.to_string()))?;
                Self::check_scope(id, pending, table, key)?;
                pending.writes.get(key).cloned()
            }
            None => None,
        };

        let attributes = match staged {
            Some(row) => row,
            None => {
                let tables = self.tables.read();
                let rows = tables
                    .get(table)
                    .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
                rows.get(key).cloned()
            }
        };
        Ok(attributes.map(|attributes| StoredRow {
            key: key.to_vec(),
            attributes,
        }))
    }

    fn point_put(
        &self,
        table: &str,
        key: &[WireValue],
        attributes: WireRow,
        condition: RowCondition,
        transaction: Option<&TransactionId>,
    ) -> Result<()> {
        self.write(table, key, condition, Mutation::Put(attributes), transaction)
    }

    fn point_update(
        &self,
        table: &str,
        key: &[WireValue],
        deltas: Vec<AttributeDelta>,
        condition: RowCondition,
        transaction: Option<&TransactionId>,
    ) -> Result<()> {
        self.write(table, key, condition, Mutation::Update(deltas), transaction)
    }

    fn point_delete(
        &self,
        table: &str,
        key: &[WireValue],
        condition: RowCondition,
        transaction: Option<&TransactionId>,
    ) -> Result<()> {
        self.write(table, key, condition, Mutation::Delete, transaction)
    }

    fn range_scan(&self, request: &ScanRequest) -> Result<ScanResponse> {
        use std::cmp::Ordering::{Equal, Greater, Less};

        let tables = self.tables.read();
        let rows = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound(request.table.clone()))?;

        let forward = request.direction == ScanDirection::Forward;
        let iter: Box<dyn Iterator<Item = (&Vec<WireValue>, &WireRow)>> = if forward {
            Box::new(rows.iter())
        } else {
            Box::new(rows.iter().rev())
        };

        // Keys that sort before the start boundary in traversal order
        let (before, past) = if forward { (Less, Greater) } else { (Greater, Less) };

        let mut response = ScanResponse::default();
        let mut visited = 0usize;
        for (key, attributes) in iter {
            let to_start = compare_to_bound(key, &request.start.parts);
            if to_start == before || (to_start == Equal && !request.start.inclusive) {
                continue;
            }
            let to_end = compare_to_bound(key, &request.end.parts);
            if to_end == past || (to_end == Equal && !request.end.inclusive) {
                break;
            }
            visited += 1;

            if let Some(f) = &request.filter {
                if !filter::evaluate(f, attributes)? {
                    continue;
                }
            }
            if request.limit.is_some_and(|limit| response.rows.len() >= limit) {
                response.next_key = response.rows.last().map(|row| row.key.clone());
                break;
            }
            response.rows.push(StoredRow {
                key: key.clone(),
                attributes: attributes.clone(),
            });
        }

        debug!(
            target: "widemap::store",
            table = %request.table,
            direction = ?request.direction,
            visited,
            returned = response.rows.len(),
            more = response.next_key.is_some(),
            "Range scan"
        );
        Ok(response)
    }

    fn start_transaction(&self, table: &str, partition_key: &WireValue) -> Result<TransactionId> {
        if !self.tables.read().contains_key(table) {
            return Err(StoreError::TableNotFound(table.to_string()).into());
        }
        let id = TransactionId::new(Uuid::new_v4().to_string());
        self.transactions.lock().insert(
            id.clone(),
            PendingTransaction {
                table: table.to_string(),
                partition_key: partition_key.clone(),
                writes: Overlay::new(),
            },
        );
        debug!(
            target: "widemap::store",
            %id,
            table,
            partition = %partition_key,
            "Transaction opened"
        );
        Ok(id)
    }

    fn commit_transaction(&self, transaction: &TransactionId) -> Result<()> {
        let pending = self
            .transactions
            .lock()
            .remove(transaction)
            .ok_or_else(|| StoreError::UnknownTransaction(transaction.to_string()))?;

        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(&pending.table)
            .ok_or_else(|| StoreError::TableNotFound(pending.table.clone()))?;
        let staged = pending.writes.len();
        for (key, row) in pending.writes {
            match row {
                Some(row) => {
                    rows.insert(key, row);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        debug!(target: "widemap::store", id = %transaction, staged, "Transaction committed");
        Ok(())
    }

    fn abort_transaction(&self, transaction: &TransactionId) -> Result<()> {
        match self.transactions.lock().remove(transaction) {
            Some(pending) => {
                debug!(
                    target: "widemap::store",
                    id = %transaction,
                    discarded = pending.writes.len(),
                    "Transaction aborted"
                );
                Ok(())
            }
            None => {
                warn!(target: "widemap::store", id = %transaction, "Abort of unknown transaction");
                Err(StoreError::UnknownTransaction(transaction.to_string()).into())
            }
        }
    }

    fn batch_write(
        &self,
        transaction: &TransactionId,
        operations: Vec<BatchOperation>,
    ) -> Result<()> {
        let mut transactions = self.transactions.lock();
        let pending = transactions
            .get_mut(transaction)
            .ok_or_else(|| StoreError::UnknownTransaction(transaction.to_string()))?;
        for op in &operations {
            Self::check_scope(transaction, pending, &pending.table, op.key())?;
        }

        // All or nothing: stage into a copy, swap in on success
        let tables = self.tables.read();
        let mut writes = pending.writes.clone();
        for op in operations {
            let (key, condition, mutation) = match op {
                BatchOperation::Put {
                    key,
                    attributes,
                    condition,
                } => (key, condition, Mutation::Put(attributes)),
                BatchOperation::Update {
                    key,
                    deltas,
                    condition,
                } => (key, condition, Mutation::Update(deltas)),
                BatchOperation::Delete { key, condition } => (key, condition, Mutation::Delete),
            };
            Self::stage(&tables, &mut writes, &pending.table, &key, condition, mutation)?;
        }
        pending.writes = writes;
        Ok(())
    }
}
