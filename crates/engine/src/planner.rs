//! Query planner
//!
//! Turns a primary-key predicate (plus optional filter, order and limit)
//! into exactly one physical store request:
//!
//! - every key column bound: point lookup; any filter is ignored
//! - otherwise: range scan whose boundaries bind the leading bound columns
//!   and fill the rest with `Min` / `Max` sentinels
//!
//! The planner issues one request per `execute`. Following pages are the
//! caller's business, via cursors.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tracing::debug;

use widemap_core::codec;
use widemap_core::{
    FilterNode, KeyError, KeyMode, KeyPart, PrimaryKeyPredicate, Result, ScanBoundary,
    ScanDirection, ScanRequest, SchemaDescriptor, StoreClient, StoredRow, WireValue,
};

/// Result ordering over the primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Ascending key order
    #[default]
    Asc,
    /// Descending key order
    Desc,
}

impl SortOrder {
    /// Store traversal direction for this order
    pub fn direction(self) -> ScanDirection {
        match self {
            SortOrder::Asc => ScanDirection::Forward,
            SortOrder::Desc => ScanDirection::Backward,
        }
    }
}

/// Physical request chosen by the planner
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedQuery {
    /// Single-row read by full key
    PointLookup {
        /// Table to read
        table: String,
        /// Full encoded key
        key: Vec<WireValue>,
    },
    /// Ordered scan
    RangeScan(ScanRequest),
}

impl PlannedQuery {
    /// Short mode name for logs
    pub fn mode(&self) -> &'static str {
        match self {
            PlannedQuery::PointLookup { .. } => "point",
            PlannedQuery::RangeScan(_) => "range",
        }
    }
}

/// Rows returned by one physical request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Rows in the requested order
    pub rows: Vec<StoredRow>,
    /// Key of the last row when the store reports more
    pub next_key: Option<Vec<WireValue>>,
}

/// Plans and executes single physical requests
#[derive(Clone)]
pub struct QueryPlanner {
    store: Arc<dyn StoreClient>,
}

impl std::fmt::Debug for QueryPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlanner").finish_non_exhaustive()
    }
}

impl QueryPlanner {
    /// Planner over `store`
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Choose point lookup or range scan by key completeness
    pub fn plan(
        &self,
        schema: &SchemaDescriptor,
        predicate: &PrimaryKeyPredicate,
        filter: Option<&FilterNode>,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<PlannedQuery> {
        predicate.validate(schema)?;
        match KeyMode::detect(schema, predicate) {
            KeyMode::Exact => {
                if filter.is_some() {
                    debug!(
                        target: "widemap::planner",
                        entity = schema.entity(),
                        "Filter ignored on point lookup"
                    );
                }
                self.plan_point(schema, predicate)
            }
            KeyMode::Partial | KeyMode::Empty => {
                self.plan_range(schema, predicate, filter, order, limit)
            }
        }
    }

    /// Point lookup; every key column must be bound
    ///
    /// # Errors
    /// * `KeyError::MissingComponent` - a key column is unbound
    pub fn plan_point(
        &self,
        schema: &SchemaDescriptor,
        predicate: &PrimaryKeyPredicate,
    ) -> Result<PlannedQuery> {
        let key = codec::encode_key(schema, predicate)?;
        debug!(target: "widemap::planner", entity = schema.entity(), "Planned point lookup");
        Ok(PlannedQuery::PointLookup {
            table: schema.table().to_string(),
            key,
        })
    }

    /// Range scan over the leading bound key columns
    ///
    /// Start is inclusive and end exclusive. For `Desc` the boundaries are
    /// swapped so that start >= end, as backward traversal expects. A fully
    /// bound predicate has no sentinel to stop on, so its end is inclusive.
    pub fn plan_range(
        &self,
        schema: &SchemaDescriptor,
        predicate: &PrimaryKeyPredicate,
        filter: Option<&FilterNode>,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<PlannedQuery> {
        predicate.validate(schema)?;
        let (lower, upper) = key_bounds(schema, predicate)?;
        let (start, end) = match order {
            SortOrder::Asc => (lower, upper),
            SortOrder::Desc => (upper, lower),
        };
        let filter = filter.map(|node| codec::encode_filter(schema, node)).transpose()?;

        let request = ScanRequest {
            table: schema.table().to_string(),
            start: ScanBoundary::inclusive(start),
            end: if end.iter().any(KeyPart::is_sentinel) {
                ScanBoundary::exclusive(end)
            } else {
                ScanBoundary::inclusive(end)
            },
            direction: order.direction(),
            limit,
            filter,
        };
        debug!(
            target: "widemap::planner",
            entity = schema.entity(),
            order = ?order,
            start = ?request.start.parts,
            end = ?request.end.parts,
            limit = ?limit,
            filtered = request.filter.is_some(),
            "Planned range scan"
        );
        Ok(PlannedQuery::RangeScan(request))
    }

    /// Issue the planned request
    pub fn execute(&self, plan: &PlannedQuery) -> Result<QueryResult> {
        match plan {
            PlannedQuery::PointLookup { table, key } => {
                let row = self.store.point_get(table, key, None)?;
                Ok(QueryResult {
                    rows: row.into_iter().collect(),
                    next_key: None,
                })
            }
            PlannedQuery::RangeScan(request) => {
                let response = self.store.range_scan(request)?;
                Ok(QueryResult {
                    rows: response.rows,
                    next_key: response.next_key,
                })
            }
        }
    }
}

/// Lower and upper scan boundaries for `predicate`
///
/// Leading bound columns carry their value in both; from the first unbound
/// column on, the lower boundary is all `Min` and the upper all `Max`.
/// Bindings after that column are not used.
pub fn key_bounds(
    schema: &SchemaDescriptor,
    predicate: &PrimaryKeyPredicate,
) -> Result<(Vec<KeyPart>, Vec<KeyPart>)> {
    let key_columns = schema.primary_key();
    let bound = predicate.bound_prefix_len(schema);

    let mut lower = Vec::with_capacity(key_columns.len());
    let mut upper = Vec::with_capacity(key_columns.len());
    for column in &key_columns[..bound] {
        let value = predicate.get(&column.name).ok_or_else(|| KeyError::MissingComponent {
            entity: schema.entity().to_string(),
            column: column.name.clone(),
        })?;
        let wire = codec::encode_key_component(value, column)?;
        lower.push(KeyPart::Value(wire.clone()));
        upper.push(KeyPart::Value(wire));
    }

    let ignored: Vec<&str> = key_columns[bound..]
        .iter()
        .filter(|c| predicate.get(&c.name).is_some())
        .map(|c| c.name.as_str())
        .collect();
    if !ignored.is_empty() {
        debug!(
            target: "widemap::planner",
            entity = schema.entity(),
            ?ignored,
            "Key bindings after the first unbound column are not used"
        );
    }

    for _ in bound..key_columns.len() {
        lower.push(KeyPart::Min);
        upper.push(KeyPart::Max);
    }
    Ok((lower, upper))
}
