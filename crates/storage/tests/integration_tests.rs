//! Integration tests for MemoryStore
//!
//! These tests check MemoryStore as a complete store client:
//! - Range scans agree with a naive reference model, page by page
//! - Local transactions under concurrent access
//! - Edge cases and error handling

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use widemap_core::{
    BatchOperation, CompareOp, Error, KeyPart, RowCondition, ScanBoundary, ScanDirection,
    ScanRequest, StoreClient, StoreError, StoreFilter, WireRow, WireValue,
};
use widemap_storage::MemoryStore;

// ============================================================================
// Helper Functions
// ============================================================================

fn key(category: &str, id: i64) -> Vec<WireValue> {
    vec![WireValue::from(category), WireValue::Int(id)]
}

fn price(value: i64) -> WireRow {
    let mut row = WireRow::new();
    row.insert("price".into(), WireValue::Int(value));
    row
}

fn store_with(rows: &BTreeMap<Vec<WireValue>, WireRow>) -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table("t");
    for (k, attrs) in rows {
        store
            .point_put("t", k, attrs.clone(), RowCondition::Ignore, None)
            .unwrap();
    }
    store
}

/// Scan request over one category, or the whole table
fn scan(category: Option<&str>, direction: ScanDirection, limit: usize) -> ScanRequest {
    let (lower, upper) = match category {
        Some(c) => (
            vec![KeyPart::Value(WireValue::from(c)), KeyPart::Min],
            vec![KeyPart::Value(WireValue::from(c)), KeyPart::Max],
        ),
        None => (vec![KeyPart::Min, KeyPart::Min], vec![KeyPart::Max, KeyPart::Max]),
    };
    let (start, end) = match direction {
        ScanDirection::Forward => (lower, upper),
        ScanDirection::Backward => (upper, lower),
    };
    ScanRequest {
        table: "t".into(),
        start: ScanBoundary::inclusive(start),
        end: ScanBoundary::exclusive(end),
        direction,
        limit: Some(limit),
        filter: None,
    }
}

/// Follow next_key until the store reports the end
fn drain(store: &MemoryStore, mut request: ScanRequest) -> Vec<Vec<WireValue>> {
    let mut keys = Vec::new();
    loop {
        let response = store.range_scan(&request).unwrap();
        keys.extend(response.rows.into_iter().map(|r| r.key));
        match response.next_key {
            Some(next) => request.start = ScanBoundary::after_key(&next),
            None => return keys,
        }
    }
}

// ============================================================================
// Reference model
// ============================================================================

mod reference_model {
    use super::*;

    fn rows() -> impl Strategy<Value = BTreeMap<Vec<WireValue>, WireRow>> {
        proptest::collection::btree_map(
            (prop_oneof![Just("a"), Just("b"), Just("c")], 0i64..40)
                .prop_map(|(c, id)| key(c, id)),
            (0i64..100).prop_map(price),
            0..60,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn paged_scan_matches_model(
            rows in rows(),
            category in prop_oneof![Just(None), Just(Some("a")), Just(Some("b"))],
            backward in any::<bool>(),
            limit in 1usize..10,
            min_price in proptest::option::of(0i64..100),
        ) {
            let store = store_with(&rows);
            let direction = if backward { ScanDirection::Backward } else { ScanDirection::Forward };
            let mut request = scan(category, direction, limit);
            request.filter = min_price.map(|p| StoreFilter::Compare {
                column: "price".into(),
                op: CompareOp::GreaterOrEqual,
                value: WireValue::Int(p),
            });

            let mut expected: Vec<Vec<WireValue>> = rows
                .iter()
                .filter(|(k, _)| category.map_or(true, |c| k[0] == WireValue::from(c)))
                .filter(|(_, attrs)| {
                    min_price.map_or(true, |p| {
                        matches!(attrs.get("price"), Some(WireValue::Int(v)) if *v >= p)
                    })
                })
                .map(|(k, _)| k.clone())
                .collect();
            if backward {
                expected.reverse();
            }

            prop_assert_eq!(drain(&store, request), expected);
        }
    }
}

// ============================================================================
// Edge Case Tests
// ============================================================================

mod edge_cases {
    use super::*;

    #[test]
    fn test_scan_of_empty_table() {
        let store = store_with(&BTreeMap::new());
        let response = store
            .range_scan(&scan(None, ScanDirection::Forward, 10))
            .unwrap();
        assert!(response.rows.is_empty());
        assert!(response.next_key.is_none());
    }

    #[test]
    fn test_unknown_table() {
        let store = MemoryStore::new();
        let err = store.point_get("missing", &key("a", 1), None).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::TableNotFound(_))));
    }

    #[test]
    fn test_filter_skipping_everything_reports_end() {
        let rows: BTreeMap<_, _> = (0..20).map(|i| (key("a", i), price(i))).collect();
        let store = store_with(&rows);
        let mut request = scan(Some("a"), ScanDirection::Forward, 5);
        request.filter = Some(StoreFilter::Compare {
            column: "price".into(),
            op: CompareOp::GreaterThan,
            value: WireValue::Int(1_000),
        });
        let response = store.range_scan(&request).unwrap();
        assert!(response.rows.is_empty());
        assert!(response.next_key.is_none());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = store_with(&BTreeMap::from([(key("a", 1), price(1))]));
        let txn = store.start_transaction("t", &WireValue::from("a")).unwrap();

        let err = store
            .batch_write(
                &txn,
                vec![
                    BatchOperation::Put {
                        key: key("a", 2),
                        attributes: price(2),
                        condition: RowCondition::ExpectNotExist,
                    },
                    BatchOperation::Put {
                        key: key("a", 1),
                        attributes: price(9),
                        condition: RowCondition::ExpectNotExist,
                    },
                ],
            )
            .unwrap_err();
        assert!(err.is_condition_failure());

        store.commit_transaction(&txn).unwrap();
        assert_eq!(store.row_count("t"), 1);
    }

    #[test]
    fn test_transaction_rejects_other_partition() {
        let store = store_with(&BTreeMap::new());
        let txn = store.start_transaction("t", &WireValue::from("a")).unwrap();
        let err = store
            .point_put("t", &key("b", 1), price(1), RowCondition::Ignore, Some(&txn))
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Rejected(_))));
        store.abort_transaction(&txn).unwrap();
        assert!(store.abort_transaction(&txn).is_err());
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn test_parallel_transactions_on_distinct_partitions() {
        let store = Arc::new(store_with(&BTreeMap::new()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let partition = format!("p{t}");
                    let txn = store
                        .start_transaction("t", &WireValue::from(partition.as_str()))
                        .unwrap();
                    for i in 0..50 {
                        store
                            .point_put(
                                "t",
                                &key(&partition, i),
                                price(i),
                                RowCondition::ExpectNotExist,
                                Some(&txn),
                            )
                            .unwrap();
                    }
                    store.commit_transaction(&txn).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.row_count("t"), 400);
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_uncommitted_writes_invisible_to_scans() {
        let store = store_with(&BTreeMap::new());
        let txn = store.start_transaction("t", &WireValue::from("a")).unwrap();
        store
            .point_put("t", &key("a", 1), price(1), RowCondition::Ignore, Some(&txn))
            .unwrap();

        let visible = store
            .range_scan(&scan(Some("a"), ScanDirection::Forward, 10))
            .unwrap();
        assert!(visible.rows.is_empty());
        assert!(store.point_get("t", &key("a", 1), Some(&txn)).unwrap().is_some());

        store.commit_transaction(&txn).unwrap();
        let visible = store
            .range_scan(&scan(Some("a"), ScanDirection::Forward, 10))
            .unwrap();
        assert_eq!(visible.rows.len(), 1);
    }
}
