//! Core types and traits for widemap
//!
//! This crate defines the foundational types shared by the planner, the
//! pagination layer and the transaction coordinator:
//! - Value / WireValue: application-side and store-side values
//! - SchemaCatalog: per-entity key and attribute layout
//! - PrimaryKeyPredicate / KeyPart: key bindings and scan boundaries
//! - FilterBuilder: schema-validated filter expression trees
//! - codec: value conversion and write-time side effects
//! - StoreClient: the wide-column store boundary
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod filter;
pub mod key;
pub mod schema;
pub mod traits;
pub mod value;

pub use codec::Record;
pub use error::{
    CodecError, CursorDecodeError, Error, FilterValidationError, KeyError, Result, SchemaError,
    StoreError, TransactionStateError,
};
pub use filter::{CompareOp, FilterBuilder, FilterNode, LogicalOp, StoreFilter};
pub use key::{compare_to_bound, KeyMode, KeyPart, PrimaryKeyPredicate};
pub use schema::{
    ColumnDescriptor, DateFormat, SchemaBuilder, SchemaCatalog, SchemaDescriptor, SpecialRole,
    ValueKind, ValueTransformer,
};
pub use traits::{
    AttributeDelta, BatchOperation, RowCondition, ScanBoundary, ScanDirection, ScanRequest,
    ScanResponse, StoreClient, StoredRow, TransactionId, WireRow,
};
pub use value::{render_key, Value, WireValue};
