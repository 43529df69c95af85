//! Value codec
//!
//! Converts application [`Value`]s to and from [`WireValue`]s column by
//! column. Conversion is driven by a dispatch table keyed on the column's
//! [`ValueKind`]; a column transformer, when present, replaces the table
//! entry entirely.
//!
//! Built-in rules:
//! - number: integral values as 64-bit integers, everything else as doubles
//! - boolean: boolean
//! - date: epoch milliseconds, or RFC 3339 text for `DateFormat::Iso8601`
//! - composite: JSON text, parsed back on read
//!
//! The write-time side effects of special columns also live here:
//! defaults and stamps on insert, stamps and version bumps on update.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::error::{CodecError, Error, FilterValidationError, KeyError, Result};
use crate::filter::{FilterNode, LogicalOp, StoreFilter};
use crate::key::PrimaryKeyPredicate;
use crate::schema::{ColumnDescriptor, DateFormat, SchemaDescriptor, SpecialRole, ValueKind};
use crate::traits::{AttributeDelta, StoredRow, WireRow};
use crate::value::{Value, WireValue};

/// Entity field values by column name
pub type Record = BTreeMap<String, Value>;

type EncodeFn = fn(&Value, &ColumnDescriptor) -> std::result::Result<WireValue, CodecError>;
type DecodeFn = fn(&WireValue, &ColumnDescriptor) -> std::result::Result<Value, CodecError>;

struct KindRule {
    encode: EncodeFn,
    decode: DecodeFn,
}

fn rule_for(kind: ValueKind) -> KindRule {
    match kind {
        ValueKind::String => KindRule {
            encode: encode_string,
            decode: decode_string,
        },
        ValueKind::Number => KindRule {
            encode: encode_number,
            decode: decode_number,
        },
        ValueKind::Boolean => KindRule {
            encode: encode_boolean,
            decode: decode_boolean,
        },
        ValueKind::Date => KindRule {
            encode: encode_date,
            decode: decode_date,
        },
        ValueKind::Bytes => KindRule {
            encode: encode_bytes,
            decode: decode_bytes,
        },
        ValueKind::Composite => KindRule {
            encode: encode_composite,
            decode: decode_composite,
        },
    }
}

/// Convert an application value for storage in `column`
pub fn to_storage(
    value: &Value,
    column: &ColumnDescriptor,
) -> std::result::Result<WireValue, CodecError> {
    if value.is_null() {
        column.check_null()?;
        return Ok(WireValue::Null);
    }
    if let Some(transformer) = &column.transformer {
        return transformer
            .to_storage(value)
            .map_err(|reason| CodecError::Transformer {
                column: column.name.clone(),
                reason,
            });
    }
    (rule_for(column.kind).encode)(value, column)
}

/// Convert a stored value of `column` back to an application value
pub fn from_storage(
    value: &WireValue,
    column: &ColumnDescriptor,
) -> std::result::Result<Value, CodecError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(transformer) = &column.transformer {
        return transformer
            .from_storage(value)
            .map_err(|reason| CodecError::Transformer {
                column: column.name.clone(),
                reason,
            });
    }
    (rule_for(column.kind).decode)(value, column)
}

fn mismatch(column: &ColumnDescriptor, actual: &'static str) -> CodecError {
    CodecError::KindMismatch {
        column: column.name.clone(),
        expected: column.kind.name(),
        actual,
    }
}

fn encode_string(v: &Value, c: &ColumnDescriptor) -> std::result::Result<WireValue, CodecError> {
    match v {
        Value::String(s) => Ok(WireValue::Text(s.clone())),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn decode_string(v: &WireValue, c: &ColumnDescriptor) -> std::result::Result<Value, CodecError> {
    match v {
        WireValue::Text(s) => Ok(Value::String(s.clone())),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn encode_number(v: &Value, c: &ColumnDescriptor) -> std::result::Result<WireValue, CodecError> {
    match v {
        Value::Int(i) => Ok(WireValue::Int(*i)),
        Value::Float(f) => {
            // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
            if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Ok(WireValue::Int(*f as i64))
            } else {
                Ok(WireValue::Float(*f))
            }
        }
        other => Err(mismatch(c, other.type_name())),
    }
}

fn decode_number(v: &WireValue, c: &ColumnDescriptor) -> std::result::Result<Value, CodecError> {
    match v {
        WireValue::Int(i) => Ok(Value::Int(*i)),
        WireValue::Float(f) => Ok(Value::Float(*f)),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn encode_boolean(v: &Value, c: &ColumnDescriptor) -> std::result::Result<WireValue, CodecError> {
    match v {
        Value::Bool(b) => Ok(WireValue::Bool(*b)),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn decode_boolean(v: &WireValue, c: &ColumnDescriptor) -> std::result::Result<Value, CodecError> {
    match v {
        WireValue::Bool(b) => Ok(Value::Bool(*b)),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn encode_date(v: &Value, c: &ColumnDescriptor) -> std::result::Result<WireValue, CodecError> {
    let date = match v {
        Value::Date(d) => *d,
        Value::Int(ms) => millis_to_date(*ms, c)?,
        other => return Err(mismatch(c, other.type_name())),
    };
    Ok(match c.date_format {
        DateFormat::EpochMillis => WireValue::Int(date.timestamp_millis()),
        DateFormat::Iso8601 => WireValue::Text(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
    })
}

fn decode_date(v: &WireValue, c: &ColumnDescriptor) -> std::result::Result<Value, CodecError> {
    match v {
        WireValue::Int(ms) => Ok(Value::Date(millis_to_date(*ms, c)?)),
        WireValue::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| Value::Date(d.with_timezone(&Utc)))
            .map_err(|e| CodecError::Malformed {
                column: c.name.clone(),
                reason: e.to_string(),
            }),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn millis_to_date(ms: i64, c: &ColumnDescriptor) -> std::result::Result<DateTime<Utc>, CodecError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| CodecError::Malformed {
            column: c.name.clone(),
            reason: format!("timestamp {ms} out of range"),
        })
}

fn encode_bytes(v: &Value, c: &ColumnDescriptor) -> std::result::Result<WireValue, CodecError> {
    match v {
        Value::Bytes(b) => Ok(WireValue::Bytes(b.clone())),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn decode_bytes(v: &WireValue, c: &ColumnDescriptor) -> std::result::Result<Value, CodecError> {
    match v {
        WireValue::Bytes(b) => Ok(Value::Bytes(b.clone())),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn encode_composite(v: &Value, c: &ColumnDescriptor) -> std::result::Result<WireValue, CodecError> {
    match v {
        Value::Array(_) | Value::Object(_) => serde_json::to_string(&v.to_json())
            .map(WireValue::Text)
            .map_err(|e| CodecError::Malformed {
                column: c.name.clone(),
                reason: e.to_string(),
            }),
        other => Err(mismatch(c, other.type_name())),
    }
}

fn decode_composite(v: &WireValue, c: &ColumnDescriptor) -> std::result::Result<Value, CodecError> {
    match v {
        WireValue::Text(s) => serde_json::from_str::<serde_json::Value>(s)
            .map(Value::from)
            .map_err(|e| CodecError::Malformed {
                column: c.name.clone(),
                reason: e.to_string(),
            }),
        other => Err(mismatch(c, other.type_name())),
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Encode one primary-key component
///
/// Null and NaN cannot be ordered by the store and are rejected.
pub fn encode_key_component(value: &Value, column: &ColumnDescriptor) -> Result<WireValue> {
    if value.is_null() {
        return Err(KeyError::InvalidComponent {
            column: column.name.clone(),
            reason: "null is not a valid key value".to_string(),
        }
        .into());
    }
    let wire = to_storage(value, column)?;
    if let WireValue::Float(f) = wire {
        if f.is_nan() {
            return Err(KeyError::InvalidComponent {
                column: column.name.clone(),
                reason: "NaN is not a valid key value".to_string(),
            }
            .into());
        }
    }
    Ok(wire)
}

/// Encode an exact key; every key column must be bound
pub fn encode_key(
    schema: &SchemaDescriptor,
    predicate: &PrimaryKeyPredicate,
) -> Result<Vec<WireValue>> {
    predicate.validate(schema)?;
    schema
        .primary_key()
        .iter()
        .map(|col| {
            let value = predicate.get(&col.name).ok_or_else(|| KeyError::MissingComponent {
                entity: schema.entity().to_string(),
                column: col.name.clone(),
            })?;
            encode_key_component(value, col)
        })
        .collect()
}

/// Rebuild a key predicate from a stored key
pub fn decode_key(schema: &SchemaDescriptor, key: &[WireValue]) -> Result<PrimaryKeyPredicate> {
    if key.len() != schema.primary_key().len() {
        return Err(Error::InvalidArgument(format!(
            "stored key has {} components, entity '{}' has {}",
            key.len(),
            schema.entity(),
            schema.primary_key().len()
        )));
    }
    schema
        .primary_key()
        .iter()
        .zip(key)
        .map(|(col, v)| Ok((col.name.clone(), from_storage(v, col)?)))
        .collect()
}

/// Extract the exact key predicate of a record
pub fn key_of(schema: &SchemaDescriptor, record: &Record) -> PrimaryKeyPredicate {
    schema
        .primary_key()
        .iter()
        .filter_map(|col| record.get(&col.name).map(|v| (col.name.clone(), v.clone())))
        .collect()
}

// ============================================================================
// Rows
// ============================================================================

/// Split a record into its encoded key and encoded attributes
pub fn encode_record(
    schema: &SchemaDescriptor,
    record: &Record,
) -> Result<(Vec<WireValue>, WireRow)> {
    for name in record.keys() {
        if schema.column(name).is_none() {
            return Err(CodecError::UnknownColumn {
                entity: schema.entity().to_string(),
                column: name.clone(),
            }
            .into());
        }
    }

    let key = encode_key(schema, &key_of(schema, record))?;
    let mut attributes = WireRow::new();
    for col in schema.attributes() {
        match record.get(&col.name) {
            Some(value) => {
                let wire = to_storage(value, col)?;
                if !wire.is_null() {
                    attributes.insert(col.name.clone(), wire);
                }
            }
            None => col.check_null()?,
        }
    }
    Ok((key, attributes))
}

/// Decode a stored row into a record
///
/// Attributes the schema does not know are ignored.
pub fn decode_row(schema: &SchemaDescriptor, row: &StoredRow) -> Result<Record> {
    let mut record: Record = decode_key(schema, &row.key)?
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    for col in schema.attributes() {
        if let Some(wire) = row.attributes.get(&col.name) {
            record.insert(col.name.clone(), from_storage(wire, col)?);
        }
    }
    Ok(record)
}

/// Encode attribute changes for a point update
///
/// Null becomes an attribute delete. Key columns cannot be changed.
pub fn encode_changes(schema: &SchemaDescriptor, changes: &Record) -> Result<Vec<AttributeDelta>> {
    changes
        .iter()
        .map(|(name, value)| {
            let col = schema.column(name).ok_or_else(|| CodecError::UnknownColumn {
                entity: schema.entity().to_string(),
                column: name.clone(),
            })?;
            if schema.is_key_column(name) {
                return Err(Error::InvalidArgument(format!(
                    "primary-key column '{name}' cannot be updated"
                )));
            }
            Ok(match to_storage(value, col)? {
                WireValue::Null => AttributeDelta::Delete(name.clone()),
                wire => AttributeDelta::Put(name.clone(), wire),
            })
        })
        .collect()
}

// ============================================================================
// Write-time side effects
// ============================================================================

/// Apply defaults and insert-time stamps
///
/// Only absent or null fields are filled.
pub fn prepare_insert(
    schema: &SchemaDescriptor,
    record: &mut Record,
    now: DateTime<Utc>,
    initial_version: i64,
) {
    for col in schema.columns() {
        let unset = record.get(&col.name).map_or(true, Value::is_null);
        if !unset {
            continue;
        }
        if let Some(default) = &col.default {
            record.insert(col.name.clone(), default.clone());
            continue;
        }
        if !col.set_on_insert {
            continue;
        }
        match col.role {
            Some(SpecialRole::CreatedAt) | Some(SpecialRole::UpdatedAt) => {
                record.insert(col.name.clone(), Value::Date(now));
            }
            Some(SpecialRole::Version) => {
                record.insert(col.name.clone(), Value::Int(initial_version));
            }
            Some(SpecialRole::SoftDelete) | None => {}
        }
    }
}

/// Recompute update-time special columns
///
/// `current` is the row as read just before the update. The version column
/// becomes `current + 1`, or `initial_version` when no current row or no
/// current version exists.
pub fn prepare_update(
    schema: &SchemaDescriptor,
    changes: &mut Record,
    now: DateTime<Utc>,
    current: Option<&StoredRow>,
    initial_version: i64,
) -> Result<()> {
    for col in schema.attributes() {
        if !col.set_on_update {
            continue;
        }
        match col.role {
            Some(SpecialRole::CreatedAt) | Some(SpecialRole::UpdatedAt) => {
                changes.insert(col.name.clone(), Value::Date(now));
            }
            Some(SpecialRole::Version) => {
                let next = match current.and_then(|row| row.attributes.get(&col.name)) {
                    Some(WireValue::Int(v)) => v.saturating_add(1),
                    Some(WireValue::Null) | None => initial_version,
                    Some(other) => return Err(mismatch(col, other.type_name()).into()),
                };
                changes.insert(col.name.clone(), Value::Int(next));
            }
            Some(SpecialRole::SoftDelete) | None => {}
        }
    }
    Ok(())
}

// ============================================================================
// Filters
// ============================================================================

/// Lower a filter tree to its wire form
pub fn encode_filter(schema: &SchemaDescriptor, node: &FilterNode) -> Result<StoreFilter> {
    match node {
        FilterNode::Comparator { field, op, value } => {
            let col = schema.column(field).ok_or_else(|| FilterValidationError::UnknownField {
                entity: schema.entity().to_string(),
                field: field.clone(),
            })?;
            let wire = if value.is_null() {
                WireValue::Null
            } else {
                to_storage(value, col)?
            };
            Ok(StoreFilter::Compare {
                column: field.clone(),
                op: *op,
                value: wire,
            })
        }
        FilterNode::Composite { op, children } => {
            let mut lowered = children
                .iter()
                .map(|child| encode_filter(schema, child))
                .collect::<Result<Vec<_>>>()?;
            match op {
                LogicalOp::And => Ok(StoreFilter::And(lowered)),
                LogicalOp::Or => Ok(StoreFilter::Or(lowered)),
                LogicalOp::Not => {
                    if lowered.len() != 1 {
                        return Err(Error::InvalidArgument(format!(
                            "NOT takes exactly one child, got {}",
                            lowered.len()
                        )));
                    }
                    Ok(StoreFilter::Not(Box::new(lowered.remove(0))))
                }
            }
        }
    }
}
