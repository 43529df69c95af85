//! Schema catalog
//!
//! Per entity type the catalog holds the ordered primary-key columns and the
//! attribute columns, including special-role columns (created-at, updated-at,
//! version counter, soft-delete marker).
//!
//! Descriptors are built once with [`SchemaBuilder`] and registered into an
//! explicit [`SchemaCatalog`]; there is no global registry. After
//! registration a descriptor is immutable and shared via `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CodecError, Result, SchemaError};
use crate::value::{Value, WireValue};

/// Declared value kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// UTF-8 text
    String,
    /// Integral or floating-point number
    Number,
    /// Boolean
    Boolean,
    /// Timestamp
    Date,
    /// Binary
    Bytes,
    /// Array or object, stored as JSON text
    Composite,
}

impl ValueKind {
    /// Stable name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date",
            ValueKind::Bytes => "bytes",
            ValueKind::Composite => "composite",
        }
    }
}

/// Storage representation of a date column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// 64-bit milliseconds since Unix epoch
    #[default]
    EpochMillis,
    /// RFC 3339 / ISO-8601 text
    Iso8601,
}

/// Special column roles with write-time side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialRole {
    /// Stamped with the current time on insert
    CreatedAt,
    /// Stamped with the current time on insert and update
    UpdatedAt,
    /// Initialized on insert, incremented on update
    Version,
    /// Set when the row is soft-deleted, cleared on restore
    SoftDelete,
}

impl SpecialRole {
    fn default_flags(self) -> (bool, bool) {
        match self {
            SpecialRole::CreatedAt => (true, false),
            SpecialRole::UpdatedAt => (true, true),
            SpecialRole::Version => (true, true),
            SpecialRole::SoftDelete => (false, false),
        }
    }

    fn accepts(self, kind: ValueKind) -> bool {
        match self {
            SpecialRole::CreatedAt | SpecialRole::UpdatedAt | SpecialRole::SoftDelete => {
                kind == ValueKind::Date
            }
            SpecialRole::Version => kind == ValueKind::Number,
        }
    }
}

impl fmt::Display for SpecialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpecialRole::CreatedAt => "created-at",
            SpecialRole::UpdatedAt => "updated-at",
            SpecialRole::Version => "version",
            SpecialRole::SoftDelete => "soft-delete",
        };
        f.write_str(name)
    }
}

/// Bidirectional custom conversion for a column
///
/// Takes precedence over the built-in kind rules in the codec.
pub trait ValueTransformer: Send + Sync {
    /// Application value to wire value
    fn to_storage(&self, value: &Value) -> std::result::Result<WireValue, String>;

    /// Wire value back to application value
    fn from_storage(&self, value: &WireValue) -> std::result::Result<Value, String>;
}

/// A single column of an entity
#[derive(Clone)]
pub struct ColumnDescriptor {
    /// Column name, as stored
    pub name: String,
    /// Declared kind
    pub kind: ValueKind,
    /// Whether null is an acceptable stored value
    pub nullable: bool,
    /// Applied on insert when the value is absent or null
    pub default: Option<Value>,
    /// Date storage representation (ignored for non-date kinds)
    pub date_format: DateFormat,
    /// Custom conversion override
    pub transformer: Option<Arc<dyn ValueTransformer>>,
    /// Special write-time role
    pub role: Option<SpecialRole>,
    /// Role side effect runs on insert
    pub set_on_insert: bool,
    /// Role side effect runs on update
    pub set_on_update: bool,
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("default", &self.default)
            .field("date_format", &self.date_format)
            .field("transformer", &self.transformer.is_some())
            .field("role", &self.role)
            .field("set_on_insert", &self.set_on_insert)
            .field("set_on_update", &self.set_on_update)
            .finish()
    }
}

impl ColumnDescriptor {
    /// New nullable column of the given kind
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            default: None,
            date_format: DateFormat::default(),
            transformer: None,
            role: None,
            set_on_insert: false,
            set_on_update: false,
        }
    }

    /// String column
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String)
    }

    /// Number column
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Number)
    }

    /// Boolean column
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Boolean)
    }

    /// Date column stored as epoch milliseconds
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Date)
    }

    /// Bytes column
    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Bytes)
    }

    /// Composite (JSON) column
    pub fn composite(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Composite)
    }

    /// Reject null values
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Default applied on insert
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Store dates as ISO-8601 text
    pub fn iso8601(mut self) -> Self {
        self.date_format = DateFormat::Iso8601;
        self
    }

    /// Attach a custom transformer
    pub fn transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Attach a special role with its default insert/update flags
    pub fn role(mut self, role: SpecialRole) -> Self {
        let (on_insert, on_update) = role.default_flags();
        self.role = Some(role);
        self.set_on_insert = on_insert;
        self.set_on_update = on_update;
        self
    }

    /// Override the insert/update flags of the role
    pub fn role_flags(mut self, on_insert: bool, on_update: bool) -> Self {
        self.set_on_insert = on_insert;
        self.set_on_update = on_update;
        self
    }

    /// Check a null against nullability
    pub fn check_null(&self) -> std::result::Result<(), CodecError> {
        if self.nullable {
            Ok(())
        } else {
            Err(CodecError::NullNotAllowed(self.name.clone()))
        }
    }
}

/// Entity schema
///
/// `columns` always starts with the primary-key columns, in key order; the
/// first of them is the partition key.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    entity: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
    key_len: usize,
    index: HashMap<String, usize>,
}

impl SchemaDescriptor {
    /// Start building a schema for `entity` stored in `table`
    pub fn builder(entity: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            entity: entity.into(),
            table: table.into(),
            key_columns: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Backing table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns, primary-key columns first
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Primary-key columns in key order
    pub fn primary_key(&self) -> &[ColumnDescriptor] {
        &self.columns[..self.key_len]
    }

    /// Non-key columns
    pub fn attributes(&self) -> &[ColumnDescriptor] {
        &self.columns[self.key_len..]
    }

    /// First primary-key column
    pub fn partition_key(&self) -> &ColumnDescriptor {
        &self.columns[0]
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Position of `name` in the primary key, if it is a key column
    pub fn key_position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied().filter(|&i| i < self.key_len)
    }

    /// Whether `name` is a primary-key column
    pub fn is_key_column(&self, name: &str) -> bool {
        self.key_position(name).is_some()
    }

    /// Column carrying `role`, if any
    pub fn role_column(&self, role: SpecialRole) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.role == Some(role))
    }
}

/// Builder for [`SchemaDescriptor`]
#[derive(Debug)]
pub struct SchemaBuilder {
    entity: String,
    table: String,
    key_columns: Vec<ColumnDescriptor>,
    columns: Vec<ColumnDescriptor>,
}

impl SchemaBuilder {
    /// Append a primary-key column; call order defines key order
    pub fn key(mut self, column: ColumnDescriptor) -> Self {
        self.key_columns.push(column.not_null());
        self
    }

    /// Append an attribute column
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Validate and freeze the descriptor
    pub fn build(self) -> Result<SchemaDescriptor> {
        if self.key_columns.is_empty() {
            return Err(SchemaError::NoPrimaryKey(self.entity).into());
        }

        let key_len = self.key_columns.len();
        let mut columns = self.key_columns;
        columns.extend(self.columns);

        let mut index = HashMap::with_capacity(columns.len());
        let mut seen_roles = Vec::new();
        for (i, col) in columns.iter().enumerate() {
            if index.insert(col.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    entity: self.entity,
                    column: col.name.clone(),
                }
                .into());
            }
            if let Some(role) = col.role {
                if i < key_len || !role.accepts(col.kind) {
                    return Err(SchemaError::InvalidRole {
                        entity: self.entity,
                        column: col.name.clone(),
                        role: role.to_string(),
                    }
                    .into());
                }
                if seen_roles.contains(&role) {
                    return Err(SchemaError::DuplicateRole {
                        entity: self.entity,
                        role: role.to_string(),
                    }
                    .into());
                }
                seen_roles.push(role);
            }
        }

        Ok(SchemaDescriptor {
            entity: self.entity,
            table: self.table,
            columns,
            key_len,
            index,
        })
    }
}

/// Registry of entity schemas
///
/// Read-only once the host application has finished registering; share it
/// behind an `Arc` with every planner, codec and transaction.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    entities: HashMap<String, Arc<SchemaDescriptor>>,
}

impl SchemaCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its entity name
    pub fn register(&mut self, schema: SchemaDescriptor) -> Result<Arc<SchemaDescriptor>> {
        if self.entities.contains_key(schema.entity()) {
            return Err(SchemaError::EntityAlreadyRegistered(schema.entity().to_string()).into());
        }
        let schema = Arc::new(schema);
        tracing::debug!(
            target: "widemap::schema",
            entity = schema.entity(),
            table = schema.table(),
            key_columns = schema.primary_key().len(),
            "Registered entity schema"
        );
        self.entities
            .insert(schema.entity().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Look up an entity
    pub fn get(&self, entity: &str) -> Result<Arc<SchemaDescriptor>> {
        self.entities
            .get(entity)
            .cloned()
            .ok_or_else(|| SchemaError::EntityNotRegistered(entity.to_string()).into())
    }

    /// Whether `entity` is registered
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Registered entity names, unordered
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
