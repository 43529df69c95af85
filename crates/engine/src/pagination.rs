//! Cursor-based pagination
//!
//! One page is one range scan. The page's cursor is the key of its last
//! row; resuming starts strictly after that key in the page's order.
//! Nothing is kept between calls, so independent traversals of the same
//! predicate never interfere.

use tracing::debug;

use widemap_core::codec::{self, Record};
use widemap_core::{
    CompareOp, Error, FilterNode, LogicalOp, PrimaryKeyPredicate, Result, ScanBoundary,
    SchemaDescriptor, SpecialRole, Value,
};

use crate::config::MapperConfig;
use crate::cursor::CursorCodec;
use crate::planner::{PlannedQuery, QueryPlanner, SortOrder};

/// Paging request
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Rows per page; the configured default when unset
    pub limit: Option<usize>,
    /// Cursor returned by the previous page
    pub cursor: Option<String>,
    /// Key order
    pub order: SortOrder,
    /// Leading key columns to stay within
    pub key_predicate: PrimaryKeyPredicate,
    /// Server-side filter over non-key columns
    pub filter: Option<FilterNode>,
    /// Include soft-deleted rows
    pub with_deleted: bool,
}

impl PageRequest {
    /// Ascending request over the whole table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume from a previous page
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Set the key order
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Restrict to a key prefix
    pub fn key(mut self, predicate: PrimaryKeyPredicate) -> Self {
        self.key_predicate = predicate;
        self
    }

    /// Attach a filter
    pub fn filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Include soft-deleted rows
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Decoded rows in request order
    pub items: Vec<Record>,
    /// Whether the store reported more rows
    pub has_next: bool,
    /// Cursor for the following page, when there is one
    pub next_cursor: Option<String>,
}

/// Runs paging requests through a [`QueryPlanner`]
#[derive(Debug, Clone)]
pub struct Paginator {
    planner: QueryPlanner,
    cursors: CursorCodec,
    default_limit: usize,
    max_limit: usize,
}

impl Paginator {
    /// Paginator using the limits and cursor bound from `config`
    pub fn new(planner: QueryPlanner, config: &MapperConfig) -> Self {
        Self {
            planner,
            cursors: CursorCodec::new(config.max_cursor_len),
            default_limit: config.default_page_limit,
            max_limit: config.max_page_limit,
        }
    }

    /// Cursor codec in use
    pub fn cursors(&self) -> &CursorCodec {
        &self.cursors
    }

    fn effective_limit(&self, requested: Option<usize>) -> Result<usize> {
        match requested {
            Some(0) => Err(Error::InvalidArgument("page limit must be positive".to_string())),
            Some(limit) => Ok(limit.min(self.max_limit)),
            None => Ok(self.default_limit),
        }
    }

    /// Fetch one page
    ///
    /// # Errors
    /// * `InvalidArgument` - limit of zero
    /// * `KeyError` - predicate binds a non-key column
    /// * `CursorDecodeError` - cursor malformed or not from this query
    pub fn paginate(&self, schema: &SchemaDescriptor, request: &PageRequest) -> Result<Page> {
        let limit = self.effective_limit(request.limit)?;
        let filter = effective_filter(schema, request.filter.as_ref(), request.with_deleted);

        let mut plan = self.planner.plan_range(
            schema,
            &request.key_predicate,
            filter.as_ref(),
            request.order,
            Some(limit),
        )?;

        if let Some(token) = &request.cursor {
            let resume = self
                .cursors
                .decode_for(token, schema, &request.key_predicate)?;
            let key = codec::encode_key(schema, &resume)?;
            if let PlannedQuery::RangeScan(scan) = &mut plan {
                scan.start = ScanBoundary::after_key(&key);
            }
        }

        let result = self.planner.execute(&plan)?;
        let items = result
            .rows
            .iter()
            .map(|row| codec::decode_row(schema, row))
            .collect::<Result<Vec<_>>>()?;
        let next_cursor = match &result.next_key {
            Some(key) => Some(self.cursors.encode(&codec::decode_key(schema, key)?)?),
            None => None,
        };

        debug!(
            target: "widemap::page",
            entity = schema.entity(),
            order = ?request.order,
            limit,
            resumed = request.cursor.is_some(),
            returned = items.len(),
            has_next = next_cursor.is_some(),
            "Page fetched"
        );

        Ok(Page {
            has_next: next_cursor.is_some(),
            items,
            next_cursor,
        })
    }
}

/// Request filter plus the implicit soft-delete exclusion
pub(crate) fn effective_filter(
    schema: &SchemaDescriptor,
    filter: Option<&FilterNode>,
    with_deleted: bool,
) -> Option<FilterNode> {
    let marker = schema
        .role_column(SpecialRole::SoftDelete)
        .filter(|_| !with_deleted)
        .map(|column| FilterNode::Comparator {
            field: column.name.clone(),
            op: CompareOp::Equal,
            value: Value::Null,
        });

    match (filter.cloned(), marker) {
        (None, marker) => marker,
        (Some(filter), None) => Some(filter),
        (Some(filter), Some(marker)) => Some(FilterNode::Composite {
            op: LogicalOp::And,
            children: vec![filter, marker],
        }),
    }
}
