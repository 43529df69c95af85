//! Store client boundary
//!
//! The [`StoreClient`] trait is the hard edge of this crate family: the
//! planner and the transaction coordinator only ever call these point,
//! range-scan and transaction primitives. Implementations own the wire
//! protocol; widemap never reimplements it.
//!
//! Thread safety: implementations must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::filter::StoreFilter;
use crate::key::KeyPart;
use crate::value::WireValue;

/// Attribute columns of a stored row
pub type WireRow = BTreeMap<String, WireValue>;

/// A row as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Full primary key in key-column order
    pub key: Vec<WireValue>,
    /// Non-key attributes
    pub attributes: WireRow,
}

/// Store-issued transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a store-issued id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row-existence precondition of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowCondition {
    /// Write unconditionally
    #[default]
    Ignore,
    /// Row must already exist
    ExpectExist,
    /// Row must not exist yet
    ExpectNotExist,
}

/// Single attribute change of a point update
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeDelta {
    /// Set the attribute
    Put(String, WireValue),
    /// Remove the attribute
    Delete(String),
}

/// Traversal direction of a range scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending key order; requires start <= end
    Forward,
    /// Descending key order; requires start >= end
    Backward,
}

/// One end of a range scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBoundary {
    /// Boundary key, one part per primary-key column
    pub parts: Vec<KeyPart>,
    /// Whether a row whose key equals `parts` is included
    pub inclusive: bool,
}

impl ScanBoundary {
    /// Inclusive boundary
    pub fn inclusive(parts: Vec<KeyPart>) -> Self {
        Self {
            parts,
            inclusive: true,
        }
    }

    /// Exclusive boundary
    pub fn exclusive(parts: Vec<KeyPart>) -> Self {
        Self {
            parts,
            inclusive: false,
        }
    }

    /// Exclusive boundary at a concrete stored key
    pub fn after_key(key: &[WireValue]) -> Self {
        Self::exclusive(key.iter().cloned().map(KeyPart::Value).collect())
    }
}

/// Range-scan request
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Table to scan
    pub table: String,
    /// Where traversal begins
    pub start: ScanBoundary,
    /// Where traversal stops
    pub end: ScanBoundary,
    /// Traversal order
    pub direction: ScanDirection,
    /// Maximum rows returned; `None` means unbounded
    pub limit: Option<usize>,
    /// Server-evaluated predicate over non-key columns
    pub filter: Option<StoreFilter>,
}

/// Range-scan response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanResponse {
    /// Rows in traversal order
    pub rows: Vec<StoredRow>,
    /// Key of the last returned row when more rows may exist
    pub next_key: Option<Vec<WireValue>>,
}

/// Write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Full-row put
    Put {
        /// Primary key
        key: Vec<WireValue>,
        /// Attributes
        attributes: WireRow,
        /// Precondition
        condition: RowCondition,
    },
    /// Partial update
    Update {
        /// Primary key
        key: Vec<WireValue>,
        /// Attribute changes
        deltas: Vec<AttributeDelta>,
        /// Precondition
        condition: RowCondition,
    },
    /// Row delete
    Delete {
        /// Primary key
        key: Vec<WireValue>,
        /// Precondition
        condition: RowCondition,
    },
}

impl BatchOperation {
    /// Primary key the operation targets
    pub fn key(&self) -> &[WireValue] {
        match self {
            BatchOperation::Put { key, .. }
            | BatchOperation::Update { key, .. }
            | BatchOperation::Delete { key, .. } => key,
        }
    }
}

/// Wide-column store client
///
/// Point operations accept an optional transaction id; when present the
/// operation runs inside that store-native transaction.
pub trait StoreClient: Send + Sync {
    /// Read one row by full primary key. `Ok(None)` when absent.
    fn point_get(
        &self,
        table: &str,
        key: &[WireValue],
        transaction: Option<&TransactionId>,
    ) -> Result<Option<StoredRow>>;

    /// Write a full row
    ///
    /// # Errors
    ///
    /// `ConditionFailure` when `condition` does not hold.
    fn point_put(
        &self,
        table: &str,
        key: &[WireValue],
        attributes: WireRow,
        condition: RowCondition,
        transaction: Option<&TransactionId>,
    ) -> Result<()>;

    /// Apply attribute changes to one row
    ///
    /// # Errors
    ///
    /// `ConditionFailure` when `condition` does not hold.
    fn point_update(
        &self,
        table: &str,
        key: &[WireValue],
        deltas: Vec<AttributeDelta>,
        condition: RowCondition,
        transaction: Option<&TransactionId>,
    ) -> Result<()>;

    /// Delete one row
    ///
    /// # Errors
    ///
    /// `ConditionFailure` when `condition` does not hold.
    fn point_delete(
        &self,
        table: &str,
        key: &[WireValue],
        condition: RowCondition,
        transaction: Option<&TransactionId>,
    ) -> Result<()>;

    /// Ordered scan between two boundaries
    fn range_scan(&self, request: &ScanRequest) -> Result<ScanResponse>;

    /// Open a local transaction scoped to one partition key
    fn start_transaction(&self, table: &str, partition_key: &WireValue) -> Result<TransactionId>;

    /// Commit a local transaction
    fn commit_transaction(&self, transaction: &TransactionId) -> Result<()>;

    /// Abort a local transaction
    fn abort_transaction(&self, transaction: &TransactionId) -> Result<()>;

    /// Apply several writes inside a local transaction
    fn batch_write(&self, transaction: &TransactionId, operations: Vec<BatchOperation>)
        -> Result<()>;
}
