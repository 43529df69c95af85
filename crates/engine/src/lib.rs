//! Query engine for widemap
//!
//! This crate sits on top of the schema/codec layer and the transaction
//! coordinator:
//! - Planner: point lookup vs. bounded range scan from a key predicate
//! - Pagination: opaque cursors, forward and backward paging
//! - Repository: entity-level reads, writes and soft delete
//! - Config: `widemap.toml` loading and validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod pagination;
pub mod planner;
pub mod repository;

pub use config::{MapperConfig, CONFIG_FILE_NAME};
pub use cursor::{decode_cursor, encode_cursor, CursorCodec, CURSOR_VERSION, MAX_CURSOR_LEN};
pub use pagination::{Page, PageRequest, Paginator};
pub use planner::{key_bounds, PlannedQuery, QueryPlanner, QueryResult, SortOrder};
pub use repository::Repository;
pub use widemap_concurrency::{
    Transaction, TransactionCoordinator, TransactionMetrics, TransactionStatus, TransactionWrite,
};
