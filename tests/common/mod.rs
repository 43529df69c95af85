//! Shared test utilities for all integration test suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

pub use widemap::codec::Record;
pub use widemap::{
    AttributeDelta, BatchOperation, ColumnDescriptor, Error, MapperConfig, MemoryStore, Page,
    PageRequest, PrimaryKeyPredicate, Repository, Result, RowCondition, ScanRequest,
    ScanResponse, SchemaCatalog, SchemaDescriptor, SortOrder, SpecialRole, StoreClient,
    StoredRow, TransactionId, Value, WireRow, WireValue,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (RUST_LOG filters it)
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// Schemas
// ============================================================================

/// `Product(category, id)` with stamps, version and soft delete
pub fn product_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder("Product", "products")
        .key(ColumnDescriptor::string("category"))
        .key(ColumnDescriptor::string("id"))
        .column(ColumnDescriptor::string("name"))
        .column(ColumnDescriptor::number("price"))
        .column(ColumnDescriptor::boolean("in_stock").default_value(true))
        .column(ColumnDescriptor::composite("tags"))
        .column(ColumnDescriptor::date("created_at").role(SpecialRole::CreatedAt))
        .column(ColumnDescriptor::date("updated_at").role(SpecialRole::UpdatedAt))
        .column(ColumnDescriptor::number("version").role(SpecialRole::Version))
        .column(ColumnDescriptor::date("deleted_at").role(SpecialRole::SoftDelete))
        .build()
        .expect("product schema is valid")
}

/// Catalog holding the product schema
pub fn catalog() -> Arc<SchemaCatalog> {
    let mut catalog = SchemaCatalog::new();
    catalog
        .register(product_schema())
        .expect("fresh catalog accepts product");
    Arc::new(catalog)
}

/// Full product key
pub fn product_key(category: &str, id: &str) -> PrimaryKeyPredicate {
    PrimaryKeyPredicate::new()
        .with("category", category)
        .with("id", id)
}

/// Partition-only product key
pub fn category(category: &str) -> PrimaryKeyPredicate {
    PrimaryKeyPredicate::new().with("category", category)
}

/// Product record with a name and price
pub fn product(category: &str, id: &str, price: i64) -> Record {
    let mut record = Record::new();
    record.insert("category".into(), Value::from(category));
    record.insert("id".into(), Value::from(id));
    record.insert("name".into(), Value::from(format!("{category} {id}")));
    record.insert("price".into(), Value::Int(price));
    record
}

/// Ids of a page, in order
pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["id"].as_str().expect("id is a string").to_string())
        .collect()
}

// ============================================================================
// CountingStore - MemoryStore wrapper that counts calls
// ============================================================================

/// Store double counting requests by kind
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    point_reads: AtomicUsize,
    scans: AtomicUsize,
    writes: AtomicUsize,
    transaction_calls: AtomicUsize,
}

impl CountingStore {
    /// Store with the `products` table created
    pub fn with_products() -> Arc<Self> {
        let store = Self::default();
        store.inner.create_table("products");
        Arc::new(store)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn point_reads(&self) -> usize {
        self.point_reads.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    /// Total requests of any kind
    pub fn total(&self) -> usize {
        self.point_reads() + self.scans() + self.writes() + self.transaction_calls()
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

impl StoreClient for CountingStore {
    fn point_get(
        &self,
        table: &str,
        key: &[WireValue],
        txn: Option<&TransactionId>,
    ) -> Result<Option<StoredRow>> {
        bump(&self.point_reads);
        self.inner.point_get(table, key, txn)
    }

    fn point_put(
        &self,
        table: &str,
        key: &[WireValue],
        attributes: WireRow,
        condition: RowCondition,
        txn: Option<&TransactionId>,
    ) -> Result<()> {
        bump(&self.writes);
        self.inner.point_put(table, key, attributes, condition, txn)
    }

    fn point_update(
        &self,
        table: &str,
        key: &[WireValue],
        deltas: Vec<AttributeDelta>,
        condition: RowCondition,
        txn: Option<&TransactionId>,
    ) -> Result<()> {
        bump(&self.writes);
        self.inner.point_update(table, key, deltas, condition, txn)
    }

    fn point_delete(
        &self,
        table: &str,
        key: &[WireValue],
        condition: RowCondition,
        txn: Option<&TransactionId>,
    ) -> Result<()> {
        bump(&self.writes);
        self.inner.point_delete(table, key, condition, txn)
    }

    fn range_scan(&self, request: &ScanRequest) -> Result<ScanResponse> {
        bump(&self.scans);
        self.inner.range_scan(request)
    }

    fn start_transaction(&self, table: &str, partition_key: &WireValue) -> Result<TransactionId> {
        bump(&self.transaction_calls);
        self.inner.start_transaction(table, partition_key)
    }

    fn commit_transaction(&self, txn: &TransactionId) -> Result<()> {
        bump(&self.transaction_calls);
        self.inner.commit_transaction(txn)
    }

    fn abort_transaction(&self, txn: &TransactionId) -> Result<()> {
        bump(&self.transaction_calls);
        self.inner.abort_transaction(txn)
    }

    fn batch_write(&self, txn: &TransactionId, operations: Vec<BatchOperation>) -> Result<()> {
        bump(&self.writes);
        self.inner.batch_write(txn, operations)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Repository over a counting store, plus the store itself
pub fn repository_with(config: MapperConfig) -> (Repository, Arc<CountingStore>) {
    init_tracing();
    let store = CountingStore::with_products();
    let repo = Repository::new(catalog(), store.clone(), config).expect("valid config");
    (repo, store)
}

/// Repository with default configuration
pub fn repository() -> (Repository, Arc<CountingStore>) {
    repository_with(MapperConfig::default())
}

/// Repository seeded with electronics 001..=007 and garden 001..=002
pub fn seeded_repository() -> (Repository, Arc<CountingStore>) {
    let (repo, store) = repository();
    for i in 1..=7 {
        repo.insert("Product", product("electronics", &format!("{i:03}"), i * 100))
            .expect("seed electronics");
    }
    for i in 1..=2 {
        repo.insert("Product", product("garden", &format!("{i:03}"), i * 10))
            .expect("seed garden");
    }
    (repo, store)
}
