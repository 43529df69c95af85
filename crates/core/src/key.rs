//! Primary-key predicates and scan key parts
//!
//! A [`PrimaryKeyPredicate`] binds some primary-key columns to concrete
//! values. Its completeness against the schema decides the lookup mode:
//! every key column bound is an exact key (point lookup), some bound is a
//! partial key (range scan), none bound is a full-table scan.
//!
//! [`KeyPart`] is one component of a range-scan boundary, where unbound
//! components are replaced by the `Min` / `Max` sentinels.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{KeyError, Result};
use crate::schema::SchemaDescriptor;
use crate::value::{Value, WireValue};

/// Column name to value bindings over primary-key columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyPredicate {
    values: BTreeMap<String, Value>,
}

impl PrimaryKeyPredicate {
    /// Empty predicate (full scan)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style binding
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Bind `column` to `value`, replacing any previous binding
    pub fn bind(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Bound value for `column`
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Number of bound columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bindings in column-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reject bindings on non-key columns
    pub fn validate(&self, schema: &SchemaDescriptor) -> Result<()> {
        for (name, _) in self.iter() {
            if !schema.is_key_column(name) {
                return Err(KeyError::NotAKeyColumn {
                    entity: schema.entity().to_string(),
                    column: name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Number of leading key columns bound without a gap
    pub fn bound_prefix_len(&self, schema: &SchemaDescriptor) -> usize {
        schema
            .primary_key()
            .iter()
            .take_while(|c| self.values.contains_key(&c.name))
            .count()
    }

    /// Name of the first key column without a binding
    pub fn first_missing<'a>(&self, schema: &'a SchemaDescriptor) -> Option<&'a str> {
        schema
            .primary_key()
            .iter()
            .find(|c| !self.values.contains_key(&c.name))
            .map(|c| c.name.as_str())
    }
}

impl FromIterator<(String, Value)> for PrimaryKeyPredicate {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Lookup mode implied by predicate completeness
///
/// The three cases are mutually exclusive and exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Every key column bound
    Exact,
    /// Some but not all key columns bound
    Partial,
    /// No key column bound
    Empty,
}

impl KeyMode {
    /// Classify `predicate` against `schema`
    pub fn detect(schema: &SchemaDescriptor, predicate: &PrimaryKeyPredicate) -> Self {
        let bound = schema
            .primary_key()
            .iter()
            .filter(|c| predicate.get(&c.name).is_some())
            .count();
        if bound == 0 {
            KeyMode::Empty
        } else if bound == schema.primary_key().len() {
            KeyMode::Exact
        } else {
            KeyMode::Partial
        }
    }
}

/// One component of a scan boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPart {
    /// Sorts before every value
    Min,
    /// Concrete component
    Value(WireValue),
    /// Sorts after every value
    Max,
}

impl KeyPart {
    /// Whether this is `Min` or `Max`
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, KeyPart::Value(_))
    }

    /// Compare a stored component against this boundary component
    pub fn cmp_value(&self, value: &WireValue) -> Ordering {
        match self {
            KeyPart::Min => Ordering::Less,
            KeyPart::Max => Ordering::Greater,
            KeyPart::Value(v) => v.cmp(value),
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Min, KeyPart::Min) | (KeyPart::Max, KeyPart::Max) => Ordering::Equal,
            (KeyPart::Min, _) | (_, KeyPart::Max) => Ordering::Less,
            (KeyPart::Max, _) | (_, KeyPart::Min) => Ordering::Greater,
            (KeyPart::Value(a), KeyPart::Value(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare a stored key against a boundary, component by component.
///
/// Returns the ordering of `key` relative to `bound`.
pub fn compare_to_bound(key: &[WireValue], bound: &[KeyPart]) -> Ordering {
    for (value, part) in key.iter().zip(bound) {
        match part.cmp_value(value) {
            Ordering::Equal => continue,
            ord => return ord.reverse(),
        }
    }
    key.len().cmp(&bound.len())
}
