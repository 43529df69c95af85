//! Server-side evaluation of [`StoreFilter`] trees
//!
//! Attributes absent from a row compare as null. Operands of different
//! kinds are unordered, except that integers and doubles compare
//! numerically. An unordered comparison satisfies only `!=`.

use std::cmp::Ordering;

use widemap_core::{StoreError, StoreFilter, WireRow, WireValue};

/// Deepest filter tree the store accepts
pub const MAX_FILTER_DEPTH: usize = 32;

/// Evaluate `filter` against one row's attributes
pub fn evaluate(filter: &StoreFilter, row: &WireRow) -> Result<bool, StoreError> {
    evaluate_at(filter, row, 0)
}

fn evaluate_at(filter: &StoreFilter, row: &WireRow, depth: usize) -> Result<bool, StoreError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::Rejected(format!(
            "filter depth exceeds maximum of {MAX_FILTER_DEPTH}"
        )));
    }

    match filter {
        StoreFilter::Compare { column, op, value } => {
            let actual = row.get(column).unwrap_or(&WireValue::Null);
            Ok(op.holds(compare_values(actual, value)))
        }
        StoreFilter::And(children) => {
            for child in children {
                if !evaluate_at(child, row, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        StoreFilter::Or(children) => {
            for child in children {
                if evaluate_at(child, row, depth + 1)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        StoreFilter::Not(child) => Ok(!evaluate_at(child, row, depth + 1)?),
    }
}

/// Compare two wire values, `None` when their kinds are not comparable
pub fn compare_values(left: &WireValue, right: &WireValue) -> Option<Ordering> {
    match (left, right) {
        (WireValue::Null, WireValue::Null) => Some(Ordering::Equal),
        (WireValue::Bool(a), WireValue::Bool(b)) => Some(a.cmp(b)),
        (WireValue::Int(a), WireValue::Int(b)) => Some(a.cmp(b)),
        (WireValue::Float(a), WireValue::Float(b)) => a.partial_cmp(b),
        (WireValue::Int(a), WireValue::Float(b)) => (*a as f64).partial_cmp(b),
        (WireValue::Float(a), WireValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (WireValue::Text(a), WireValue::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (WireValue::Bytes(a), WireValue::Bytes(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
