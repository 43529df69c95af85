//! Widemap - entity mapping over wide-column, range-scannable stores
//!
//! Widemap turns entity-level queries into store operations: a full primary
//! key becomes a point lookup, a key prefix becomes a bounded range scan,
//! and range scans page with opaque cursors in either key order. Writes can
//! be grouped into transactions scoped to a single partition key.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use widemap::{
//!     ColumnDescriptor, MapperConfig, MemoryStore, PageRequest, PrimaryKeyPredicate,
//!     Repository, SchemaCatalog, SchemaDescriptor,
//! };
//!
//! let mut catalog = SchemaCatalog::new();
//! catalog.register(
//!     SchemaDescriptor::builder("Product", "products")
//!         .key(ColumnDescriptor::string("category"))
//!         .key(ColumnDescriptor::string("id"))
//!         .column(ColumnDescriptor::number("price"))
//!         .build()?,
//! )?;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.create_table("products");
//! let repo = Repository::new(Arc::new(catalog), store, MapperConfig::default())?;
//!
//! let page = repo.paginate(
//!     "Product",
//!     &PageRequest::new()
//!         .key(PrimaryKeyPredicate::new().with("category", "electronics"))
//!         .limit(3),
//! )?;
//! ```
//!
//! # Architecture
//!
//! - `widemap-core`: values, schemas, key predicates, filters, codec, store trait
//! - `widemap-storage`: `MemoryStore`, an in-process store client
//! - `widemap-concurrency`: partition-scoped transactions
//! - `widemap-engine`: planner, pagination, repository, configuration

pub use widemap_core::*;
pub use widemap_engine::*;
pub use widemap_storage::MemoryStore;
