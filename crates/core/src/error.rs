//! Error types for widemap
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Each concern owns a small enum; the top-level [`Error`] folds them together
//! so callers can either match precisely or use the `is_*` helpers.

use thiserror::Error;

/// Result type alias for widemap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Entity not registered or malformed schema
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Primary-key component missing or invalid for the selected lookup mode
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Filter expression rejected at construction time
    #[error(transparent)]
    Filter(#[from] FilterValidationError),

    /// Pagination cursor could not be decoded or does not fit the query
    #[error(transparent)]
    Cursor(#[from] CursorDecodeError),

    /// Value could not be converted to or from its wire form
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Write precondition not met by the store
    #[error("condition failed on table '{table}' for key {key}")]
    ConditionFailure {
        /// Table the write targeted
        table: String,
        /// Rendered primary key
        key: String,
    },

    /// Operation attempted on a transaction that is no longer active
    #[error(transparent)]
    TransactionState(#[from] TransactionStateError),

    /// Write targets a different partition than the transaction's
    #[error("partition mismatch in transaction {transaction_id}: expected {expected}, got {actual}")]
    PartitionMismatch {
        /// Transaction the write was issued on
        transaction_id: String,
        /// Partition key bound at transaction start
        expected: String,
        /// Partition key of the rejected write
        actual: String,
    },

    /// Failure reported by the store client
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed request parameter
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// True for `ConditionFailure`
    pub fn is_condition_failure(&self) -> bool {
        matches!(self, Error::ConditionFailure { .. })
    }

    /// True for `TransactionState`
    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Error::TransactionState(_))
    }

    /// True for `PartitionMismatch`
    pub fn is_partition_mismatch(&self) -> bool {
        matches!(self, Error::PartitionMismatch { .. })
    }

    /// True for `Key`
    pub fn is_key_error(&self) -> bool {
        matches!(self, Error::Key(_))
    }

    /// True for `Filter`
    pub fn is_filter_error(&self) -> bool {
        matches!(self, Error::Filter(_))
    }

    /// True for `Cursor`
    pub fn is_cursor_error(&self) -> bool {
        matches!(self, Error::Cursor(_))
    }
}

/// Schema lookup and registration failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// No schema registered under this entity name
    #[error("entity not registered: {0}")]
    EntityNotRegistered(String),

    /// An entity with the same name is already registered
    #[error("entity already registered: {0}")]
    EntityAlreadyRegistered(String),

    /// Schema declares no primary-key column
    #[error("entity '{0}' has no primary-key column")]
    NoPrimaryKey(String),

    /// Two columns share a name
    #[error("entity '{entity}' declares column '{column}' twice")]
    DuplicateColumn {
        /// Entity being registered
        entity: String,
        /// Repeated column name
        column: String,
    },

    /// Special role attached to a column of the wrong kind
    #[error("column '{column}' of entity '{entity}' cannot carry role {role}")]
    InvalidRole {
        /// Entity being registered
        entity: String,
        /// Offending column
        column: String,
        /// Role name
        role: String,
    },

    /// A special role may appear on at most one column
    #[error("entity '{entity}' declares role {role} more than once")]
    DuplicateRole {
        /// Entity being registered
        entity: String,
        /// Role name
        role: String,
    },
}

/// Primary-key predicate failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Required primary-key component not bound
    #[error("entity '{entity}' requires primary-key column '{column}'")]
    MissingComponent {
        /// Entity queried
        entity: String,
        /// First unbound key column
        column: String,
    },

    /// Predicate binds a column that is not part of the primary key
    #[error("column '{column}' is not a primary-key column of entity '{entity}'")]
    NotAKeyColumn {
        /// Entity queried
        entity: String,
        /// Offending column
        column: String,
    },

    /// Key component value cannot be ordered by the store
    #[error("invalid value for key column '{column}': {reason}")]
    InvalidComponent {
        /// Offending column
        column: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Filter construction failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterValidationError {
    /// Comparator names a column the entity does not have
    #[error("unknown filter field '{field}' on entity '{entity}'")]
    UnknownField {
        /// Entity the filter was built for
        entity: String,
        /// Offending field
        field: String,
    },

    /// Comparator names a primary-key column; key predicates belong in the key
    #[error("filter field '{field}' is a primary-key column of entity '{entity}'")]
    KeyColumn {
        /// Entity the filter was built for
        entity: String,
        /// Offending field
        field: String,
    },

    /// AND / OR with zero children
    #[error("{0} requires at least one child expression")]
    EmptyComposite(&'static str),
}

/// Cursor decoding failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorDecodeError {
    /// Token was empty or whitespace
    #[error("cursor token is empty")]
    Empty,

    /// Token exceeds the configured maximum length
    #[error("cursor token exceeds max length: {len} chars (max {max})")]
    TooLong {
        /// Observed length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Token is not valid transport encoding
    #[error("cursor token is not valid base64: {0}")]
    Transport(String),

    /// Decoded bytes are not a valid payload
    #[error("cursor payload is malformed: {0}")]
    Payload(String),

    /// Payload version is not understood
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),

    /// Cursor key does not fit the entity or the request predicate
    #[error("cursor does not match query: {0}")]
    Mismatch(String),
}

/// Value conversion failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Value kind does not match the column's declared kind
    #[error("column '{column}' expects {expected}, got {actual}")]
    KindMismatch {
        /// Column being converted
        column: String,
        /// Declared kind
        expected: &'static str,
        /// Observed value type
        actual: &'static str,
    },

    /// Null written to a non-nullable column without default
    #[error("column '{0}' is not nullable")]
    NullNotAllowed(String),

    /// Composite or date text could not be parsed
    #[error("column '{column}' holds unparseable data: {reason}")]
    Malformed {
        /// Column being converted
        column: String,
        /// Parser message
        reason: String,
    },

    /// Custom transformer rejected the value
    #[error("transformer for column '{column}' failed: {reason}")]
    Transformer {
        /// Column being converted
        column: String,
        /// Transformer message
        reason: String,
    },

    /// Record names a column the entity does not have
    #[error("entity '{entity}' has no column '{column}'")]
    UnknownColumn {
        /// Entity being converted
        entity: String,
        /// Offending column
        column: String,
    },
}

/// Operation attempted on an inactive transaction
#[derive(Debug, Error, PartialEq, Eq)]
#[error("transaction {transaction_id} is {status}, cannot {operation}")]
pub struct TransactionStateError {
    /// Transaction the operation targeted
    pub transaction_id: String,
    /// Status observed at the time of the call
    pub status: String,
    /// Operation that was rejected
    pub operation: &'static str,
}

/// Failures surfaced by the store client
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Table does not exist in the store
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Transaction id unknown to the store (expired, committed or never issued)
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// Store-side rejection of a request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Transport or backend failure
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
