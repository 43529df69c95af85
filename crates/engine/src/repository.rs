//! Repository: the entity-level API
//!
//! Wires the schema catalog, value codec, planner, paginator and
//! transaction coordinator together over one store client. Entities are
//! addressed by their registered name; rows travel as [`Record`]s.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use widemap_concurrency::{Transaction, TransactionCoordinator, TransactionMetrics};
use widemap_core::codec::{self, Record};
use widemap_core::{
    Error, KeyMode, PrimaryKeyPredicate, Result, RowCondition, SchemaCatalog, SchemaDescriptor,
    SpecialRole, StoreClient, Value, WireValue,
};

use crate::config::MapperConfig;
use crate::pagination::{Page, PageRequest, Paginator};
use crate::planner::QueryPlanner;

/// Entity manager over one store
pub struct Repository {
    catalog: Arc<SchemaCatalog>,
    store: Arc<dyn StoreClient>,
    planner: QueryPlanner,
    paginator: Paginator,
    coordinator: TransactionCoordinator,
    config: MapperConfig,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entities", &self.catalog.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Create a repository
    ///
    /// # Errors
    /// * `Error::Config` - `config` fails validation
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        store: Arc<dyn StoreClient>,
        config: MapperConfig,
    ) -> Result<Self> {
        config.validate()?;
        let planner = QueryPlanner::new(Arc::clone(&store));
        let paginator = Paginator::new(planner.clone(), &config);
        let coordinator = TransactionCoordinator::new(
            Arc::clone(&store),
            config.transaction_timeout(),
            config.initial_version,
        );
        info!(
            target: "widemap::repo",
            entities = catalog.len(),
            timeout_ms = config.transaction_timeout_ms,
            "Repository ready"
        );
        Ok(Self {
            catalog,
            store,
            planner,
            paginator,
            coordinator,
            config,
        })
    }

    /// Registered schemas
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Active configuration
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Planner sharing this repository's store
    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    /// Transaction lifecycle metrics
    pub fn transaction_metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    fn schema(&self, entity: &str) -> Result<Arc<SchemaDescriptor>> {
        self.catalog.get(entity)
    }

    fn put(&self, entity: &str, mut record: Record, condition: RowCondition) -> Result<Record> {
        let schema = self.schema(entity)?;
        codec::prepare_insert(&schema, &mut record, Utc::now(), self.config.initial_version);
        let (key, attributes) = codec::encode_record(&schema, &record)?;
        self.store
            .point_put(schema.table(), &key, attributes, condition, None)?;
        debug!(target: "widemap::repo", entity, ?condition, "Row written");
        Ok(record)
    }

    /// Insert a new row
    ///
    /// Defaults and insert-time stamps are applied; the stored record is
    /// returned.
    ///
    /// # Errors
    /// * `ConditionFailure` - a row with this key exists
    pub fn insert(&self, entity: &str, record: Record) -> Result<Record> {
        self.put(entity, record, RowCondition::ExpectNotExist)
    }

    /// Write a full row, replacing any existing one
    pub fn save(&self, entity: &str, record: Record) -> Result<Record> {
        self.put(entity, record, RowCondition::Ignore)
    }

    /// Change attributes of an existing row
    ///
    /// Update-time stamps are recomputed. When the schema has a version
    /// column the current row is read first and its version incremented;
    /// concurrent updates between that read and the write are not detected.
    ///
    /// # Errors
    /// * `KeyError` - `key` is not a full key
    /// * `ConditionFailure` - no such row
    pub fn update(
        &self,
        entity: &str,
        key: &PrimaryKeyPredicate,
        mut changes: Record,
    ) -> Result<()> {
        let schema = self.schema(entity)?;
        let encoded = codec::encode_key(&schema, key)?;
        // Reject bad changes before the read goes out
        codec::encode_changes(&schema, &changes)?;

        let current = match schema.role_column(SpecialRole::Version) {
            Some(column) if column.set_on_update => {
                self.store.point_get(schema.table(), &encoded, None)?
            }
            _ => None,
        };
        codec::prepare_update(
            &schema,
            &mut changes,
            Utc::now(),
            current.as_ref(),
            self.config.initial_version,
        )?;
        let deltas = codec::encode_changes(&schema, &changes)?;
        self.store.point_update(
            schema.table(),
            &encoded,
            deltas,
            RowCondition::ExpectExist,
            None,
        )?;
        debug!(target: "widemap::repo", entity, "Row updated");
        Ok(())
    }

    /// Delete a row; deleting a missing row is not an error
    pub fn delete(&self, entity: &str, key: &PrimaryKeyPredicate) -> Result<()> {
        let schema = self.schema(entity)?;
        let encoded = codec::encode_key(&schema, key)?;
        self.store
            .point_delete(schema.table(), &encoded, RowCondition::Ignore, None)?;
        debug!(target: "widemap::repo", entity, "Row deleted");
        Ok(())
    }

    fn soft_delete_column(schema: &SchemaDescriptor) -> Result<String> {
        schema
            .role_column(SpecialRole::SoftDelete)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "entity '{}' has no soft-delete column",
                    schema.entity()
                ))
            })
    }

    /// Mark a row deleted without removing it
    pub fn soft_delete(&self, entity: &str, key: &PrimaryKeyPredicate) -> Result<()> {
        let column = Self::soft_delete_column(&*self.schema(entity)?)?;
        let mut changes = Record::new();
        changes.insert(column, Value::Date(Utc::now()));
        self.update(entity, key, changes)
    }

    /// Clear a row's soft-delete marker
    pub fn restore(&self, entity: &str, key: &PrimaryKeyPredicate) -> Result<()> {
        let column = Self::soft_delete_column(&*self.schema(entity)?)?;
        let mut changes = Record::new();
        changes.insert(column, Value::Null);
        self.update(entity, key, changes)
    }

    fn is_soft_deleted(schema: &SchemaDescriptor, record: &Record) -> bool {
        schema
            .role_column(SpecialRole::SoftDelete)
            .and_then(|c| record.get(&c.name))
            .is_some_and(|v| !v.is_null())
    }

    /// Read one row by full key
    ///
    /// A missing or soft-deleted row is `Ok(None)`.
    ///
    /// # Errors
    /// * `KeyError` - `key` is not a full key
    pub fn find_one(&self, entity: &str, key: &PrimaryKeyPredicate) -> Result<Option<Record>> {
        let schema = self.schema(entity)?;
        let plan = self.planner.plan_point(&schema, key)?;
        let result = self.planner.execute(&plan)?;
        match result.rows.first() {
            Some(row) => {
                let record = codec::decode_row(&schema, row)?;
                Ok((!Self::is_soft_deleted(&schema, &record)).then_some(record))
            }
            None => Ok(None),
        }
    }

    /// Query by key completeness
    ///
    /// A full key becomes a point lookup, where the request's filter, order
    /// and cursor do not apply. Anything else is one page of a range scan.
    pub fn find(&self, entity: &str, request: &PageRequest) -> Result<Vec<Record>> {
        let schema = self.schema(entity)?;
        request.key_predicate.validate(&schema)?;
        match KeyMode::detect(&schema, &request.key_predicate) {
            KeyMode::Exact => {
                let plan = self.planner.plan_point(&schema, &request.key_predicate)?;
                let result = self.planner.execute(&plan)?;
                let mut records = result
                    .rows
                    .iter()
                    .map(|row| codec::decode_row(&schema, row))
                    .collect::<Result<Vec<_>>>()?;
                if !request.with_deleted {
                    records.retain(|record| !Self::is_soft_deleted(&schema, record));
                }
                Ok(records)
            }
            KeyMode::Partial | KeyMode::Empty => {
                Ok(self.paginator.paginate(&schema, request)?.items)
            }
        }
    }

    /// Fetch one page of a range scan
    pub fn paginate(&self, entity: &str, request: &PageRequest) -> Result<Page> {
        let schema = self.schema(entity)?;
        self.paginator.paginate(&schema, request)
    }

    /// Start a transaction bound to one partition of `entity`
    ///
    /// `partition_value` is the value of the entity's first key column.
    pub fn transaction(
        &self,
        entity: &str,
        partition_value: impl Into<Value>,
    ) -> Result<Transaction> {
        let schema = self.schema(entity)?;
        self.coordinator.begin(schema, &partition_value.into())
    }

    /// Encoded partition key of a record, for routing writes
    pub fn partition_of(&self, entity: &str, record: &Record) -> Result<WireValue> {
        let schema = self.schema(entity)?;
        let column = schema.partition_key();
        let value = record.get(&column.name).ok_or_else(|| {
            widemap_core::KeyError::MissingComponent {
                entity: schema.entity().to_string(),
                column: column.name.clone(),
            }
        })?;
        codec::encode_key_component(value, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widemap_core::{ColumnDescriptor, FilterBuilder};
    use widemap_storage::MemoryStore;

    fn repository() -> Repository {
        let mut catalog = SchemaCatalog::new();
        catalog
            .register(
                SchemaDescriptor::builder("Product", "products")
                    .key(ColumnDescriptor::string("category"))
                    .key(ColumnDescriptor::string("id"))
                    .column(ColumnDescriptor::string("name").not_null())
                    .column(ColumnDescriptor::number("price"))
                    .column(ColumnDescriptor::date("created_at").role(SpecialRole::CreatedAt))
                    .column(ColumnDescriptor::date("updated_at").role(SpecialRole::UpdatedAt))
                    .column(ColumnDescriptor::number("version").role(SpecialRole::Version))
                    .column(ColumnDescriptor::date("deleted_at").role(SpecialRole::SoftDelete))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let store = Arc::new(MemoryStore::new());
        store.create_table("products");
        Repository::new(Arc::new(catalog), store, MapperConfig::default()).unwrap()
    }

    fn product(id: &str, price: i64) -> Record {
        let mut r = Record::new();
        r.insert("category".into(), Value::from("electronics"));
        r.insert("id".into(), Value::from(id));
        r.insert("name".into(), Value::from(format!("item {id}")));
        r.insert("price".into(), Value::Int(price));
        r
    }

    fn key(id: &str) -> PrimaryKeyPredicate {
        PrimaryKeyPredicate::new().with("category", "electronics").with("id", id)
    }

    #[test]
    fn insert_stamps_and_rejects_duplicates() {
        let repo = repository();
        let stored = repo.insert("Product", product("001", 10)).unwrap();
        assert!(stored["created_at"].as_date().is_some());
        assert_eq!(stored["version"], Value::Int(1));

        let err = repo.insert("Product", product("001", 10)).unwrap_err();
        assert!(err.is_condition_failure());
    }

    #[test]
    fn update_bumps_version() {
        let repo = repository();
        repo.insert("Product", product("001", 10)).unwrap();
        let mut changes = Record::new();
        changes.insert("price".into(), Value::Int(12));
        repo.update("Product", &key("001"), changes.clone()).unwrap();
        repo.update("Product", &key("001"), changes).unwrap();

        let row = repo.find_one("Product", &key("001")).unwrap().unwrap();
        assert_eq!(row["price"], Value::Int(12));
        assert_eq!(row["version"], Value::Int(3));
    }

    #[test]
    fn update_missing_row_fails() {
        let repo = repository();
        let err = repo.update("Product", &key("404"), Record::new()).unwrap_err();
        assert!(err.is_condition_failure());
    }

    #[test]
    fn find_one_requires_full_key() {
        let repo = repository();
        let err = repo
            .find_one("Product", &PrimaryKeyPredicate::new().with("category", "electronics"))
            .unwrap_err();
        assert!(err.is_key_error());
    }

    #[test]
    fn unknown_entity_is_schema_error() {
        let repo = repository();
        let err = repo.find_one("Order", &key("001")).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn soft_delete_hides_until_restored() {
        let repo = repository();
        repo.insert("Product", product("001", 10)).unwrap();
        repo.insert("Product", product("002", 20)).unwrap();

        repo.soft_delete("Product", &key("001")).unwrap();
        assert!(repo.find_one("Product", &key("001")).unwrap().is_none());

        let partition = PrimaryKeyPredicate::new().with("category", "electronics");
        let visible = repo
            .find("Product", &PageRequest::new().key(partition.clone()))
            .unwrap();
        assert_eq!(visible.len(), 1);
        let all = repo
            .find("Product", &PageRequest::new().key(partition).with_deleted())
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            repo.find("Product", &PageRequest::new().key(key("001")).with_deleted())
                .unwrap()
                .len(),
            1
        );
        assert!(repo
            .find("Product", &PageRequest::new().key(key("001")))
            .unwrap()
            .is_empty());

        repo.restore("Product", &key("001")).unwrap();
        assert!(repo.find_one("Product", &key("001")).unwrap().is_some());
    }

    #[test]
    fn find_with_full_key_ignores_filter() {
        let repo = repository();
        repo.insert("Product", product("001", 10)).unwrap();
        let catalog = repo.catalog();
        let schema = catalog.get("Product").unwrap();
        let filter = FilterBuilder::new(&schema).greater_than("price", 100).unwrap();

        let rows = repo
            .find("Product", &PageRequest::new().key(key("001")).filter(filter.clone()))
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = repo
            .find(
                "Product",
                &PageRequest::new()
                    .key(PrimaryKeyPredicate::new().with("category", "electronics"))
                    .filter(filter),
            )
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let repo = repository();
        repo.insert("Product", product("001", 10)).unwrap();
        repo.delete("Product", &key("001")).unwrap();
        repo.delete("Product", &key("001")).unwrap();
        assert!(repo.find_one("Product", &key("001")).unwrap().is_none());
    }

    #[test]
    fn transaction_through_repository() {
        let repo = repository();
        let mut txn = repo.transaction("Product", "electronics").unwrap();
        txn.insert(product("001", 10)).unwrap();
        txn.commit().unwrap();
        assert!(repo.find_one("Product", &key("001")).unwrap().is_some());
        assert_eq!(repo.transaction_metrics().total_committed, 1);
    }

    #[test]
    fn invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        let config = MapperConfig {
            default_page_limit: 0,
            ..Default::default()
        };
        let err = Repository::new(Arc::new(SchemaCatalog::new()), store, config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn partition_of_record() {
        let repo = repository();
        let partition = repo.partition_of("Product", &product("001", 1)).unwrap();
        assert_eq!(partition, WireValue::from("electronics"));

        let mut keyless = product("001", 1);
        keyless.remove("category");
        assert!(repo.partition_of("Product", &keyless).unwrap_err().is_key_error());
    }
}
