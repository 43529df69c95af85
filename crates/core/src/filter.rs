//! Filter expression trees
//!
//! A [`FilterNode`] is built bottom-up by a [`FilterBuilder`] bound to one
//! entity schema. Construction validates field names; nothing is evaluated
//! client-side. The codec lowers a tree into a [`StoreFilter`] whose operands
//! are wire values, and the store evaluates it over the rows a scan visits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FilterValidationError, Result};
use crate::schema::SchemaDescriptor;
use crate::value::{Value, WireValue};

/// Comparator operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
}

impl CompareOp {
    /// Apply the operator to an ordering, `None` meaning incomparable.
    ///
    /// Incomparable operands satisfy only `NotEqual`.
    pub fn holds(self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            (CompareOp::NotEqual, None) => true,
            (_, None) => false,
            (CompareOp::Equal, Some(o)) => o == Equal,
            (CompareOp::NotEqual, Some(o)) => o != Equal,
            (CompareOp::GreaterThan, Some(o)) => o == Greater,
            (CompareOp::GreaterOrEqual, Some(o)) => o != Less,
            (CompareOp::LessThan, Some(o)) => o == Less,
            (CompareOp::LessOrEqual, Some(o)) => o != Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::LessThan => "<",
            CompareOp::LessOrEqual => "<=",
        };
        f.write_str(s)
    }
}

/// Boolean combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    /// All children hold
    And,
    /// Any child holds
    Or,
    /// The single child does not hold
    Not,
}

/// Application-side filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterNode {
    /// `field op value`
    Comparator {
        /// Column name
        field: String,
        /// Operator
        op: CompareOp,
        /// Operand
        value: Value,
    },
    /// AND / OR / NOT over children
    Composite {
        /// Combinator
        op: LogicalOp,
        /// Children; exactly one for NOT
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    /// Number of comparator leaves
    pub fn leaf_count(&self) -> usize {
        match self {
            FilterNode::Comparator { .. } => 1,
            FilterNode::Composite { children, .. } => {
                children.iter().map(FilterNode::leaf_count).sum()
            }
        }
    }
}

/// Wire-side filter tree handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreFilter {
    /// `column op value`
    Compare {
        /// Column name
        column: String,
        /// Operator
        op: CompareOp,
        /// Operand in wire form
        value: WireValue,
    },
    /// All children hold
    And(Vec<StoreFilter>),
    /// Any child holds
    Or(Vec<StoreFilter>),
    /// Child does not hold
    Not(Box<StoreFilter>),
}

/// Schema-validated constructor for [`FilterNode`] trees
#[derive(Debug, Clone, Copy)]
pub struct FilterBuilder<'a> {
    schema: &'a SchemaDescriptor,
}

impl<'a> FilterBuilder<'a> {
    /// Builder for filters over `schema`
    pub fn new(schema: &'a SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// Generic comparator leaf
    pub fn comparator(
        &self,
        field: &str,
        op: CompareOp,
        value: impl Into<Value>,
    ) -> Result<FilterNode> {
        if self.schema.column(field).is_none() {
            return Err(FilterValidationError::UnknownField {
                entity: self.schema.entity().to_string(),
                field: field.to_string(),
            }
            .into());
        }
        if self.schema.is_key_column(field) {
            return Err(FilterValidationError::KeyColumn {
                entity: self.schema.entity().to_string(),
                field: field.to_string(),
            }
            .into());
        }
        Ok(FilterNode::Comparator {
            field: field.to_string(),
            op,
            value: value.into(),
        })
    }

    /// `field == value`
    pub fn equals(&self, field: &str, value: impl Into<Value>) -> Result<FilterNode> {
        self.comparator(field, CompareOp::Equal, value)
    }

    /// `field != value`
    pub fn not_equals(&self, field: &str, value: impl Into<Value>) -> Result<FilterNode> {
        self.comparator(field, CompareOp::NotEqual, value)
    }

    /// `field > value`
    pub fn greater_than(&self, field: &str, value: impl Into<Value>) -> Result<FilterNode> {
        self.comparator(field, CompareOp::GreaterThan, value)
    }

    /// `field >= value`
    pub fn greater_or_equal(&self, field: &str, value: impl Into<Value>) -> Result<FilterNode> {
        self.comparator(field, CompareOp::GreaterOrEqual, value)
    }

    /// `field < value`
    pub fn less_than(&self, field: &str, value: impl Into<Value>) -> Result<FilterNode> {
        self.comparator(field, CompareOp::LessThan, value)
    }

    /// `field <= value`
    pub fn less_or_equal(&self, field: &str, value: impl Into<Value>) -> Result<FilterNode> {
        self.comparator(field, CompareOp::LessOrEqual, value)
    }

    /// `field == null`
    pub fn is_null(&self, field: &str) -> Result<FilterNode> {
        self.comparator(field, CompareOp::Equal, Value::Null)
    }

    /// Conjunction; fails on zero children
    pub fn and(&self, children: Vec<FilterNode>) -> Result<FilterNode> {
        composite(LogicalOp::And, "AND", children)
    }

    /// Disjunction; fails on zero children
    pub fn or(&self, children: Vec<FilterNode>) -> Result<FilterNode> {
        composite(LogicalOp::Or, "OR", children)
    }

    /// Negation of exactly one child
    pub fn not(&self, child: FilterNode) -> FilterNode {
        FilterNode::Composite {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }
}

fn composite(op: LogicalOp, name: &'static str, children: Vec<FilterNode>) -> Result<FilterNode> {
    if children.is_empty() {
        return Err(FilterValidationError::EmptyComposite(name).into());
    }
    Ok(FilterNode::Composite { op, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::ColumnDescriptor;
    use std::cmp::Ordering;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("Product", "products")
            .key(ColumnDescriptor::string("category"))
            .key(ColumnDescriptor::string("id"))
            .column(ColumnDescriptor::number("price"))
            .column(ColumnDescriptor::string("name"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = schema();
        let f = FilterBuilder::new(&schema);
        let err = f.equals("colour", "red").unwrap_err();
        match err {
            Error::Filter(FilterValidationError::UnknownField { field, .. }) => {
                assert_eq!(field, "colour")
            }
            other => panic!("expected unknown field, got {other:?}"),
        }
    }

    #[test]
    fn test_key_field_rejected() {
        let schema = schema();
        let f = FilterBuilder::new(&schema);
        let err = f.equals("id", "001").unwrap_err();
        assert!(matches!(err, Error::Filter(FilterValidationError::KeyColumn { .. })));
    }

    #[test]
    fn test_empty_and_or_rejected() {
        let schema = schema();
        let f = FilterBuilder::new(&schema);
        assert!(f.and(vec![]).unwrap_err().is_filter_error());
        assert!(f.or(vec![]).unwrap_err().is_filter_error());
    }

    #[test]
    fn test_nested_tree_shape() {
        let schema = schema();
        let f = FilterBuilder::new(&schema);
        let tree = f
            .and(vec![
                f.greater_or_equal("price", 10).unwrap(),
                f.not(f.or(vec![f.equals("name", "a").unwrap(), f.equals("name", "b").unwrap()])
                    .unwrap()),
            ])
            .unwrap();
        assert_eq!(tree.leaf_count(), 3);
        match &tree {
            FilterNode::Composite { op, children } => {
                assert_eq!(*op, LogicalOp::And);
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    &children[1],
                    FilterNode::Composite { op: LogicalOp::Not, children } if children.len() == 1
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_compare_op_holds() {
        assert!(CompareOp::GreaterOrEqual.holds(Some(Ordering::Equal)));
        assert!(!CompareOp::GreaterThan.holds(Some(Ordering::Equal)));
        assert!(CompareOp::LessOrEqual.holds(Some(Ordering::Less)));
        assert!(CompareOp::NotEqual.holds(None));
        assert!(!CompareOp::Equal.holds(None));
        assert!(!CompareOp::LessThan.holds(None));
    }
}
