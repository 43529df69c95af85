//! Query planning and pagination, end to end
//!
//! The catalog holds `Product(category, id)`; the seeded store has
//! electronics 001..=007 and garden 001..=002.

mod common;

use std::sync::Arc;

use common::*;
use widemap::{FilterBuilder, KeyPart, PlannedQuery, ScanDirection};

fn page(repo: &Repository, request: &PageRequest) -> Page {
    repo.paginate("Product", request).expect("page")
}

// ============================================================================
// Mode selection
// ============================================================================

#[test]
fn exact_key_is_one_point_read() {
    let (repo, store) = seeded_repository();
    let before = (store.point_reads(), store.scans());

    let rows = repo
        .find("Product", &PageRequest::new().key(product_key("electronics", "003")))
        .unwrap();

    assert_eq!(ids(&rows), ["003"]);
    assert_eq!(store.point_reads(), before.0 + 1);
    assert_eq!(store.scans(), before.1);
}

#[test]
fn point_miss_is_empty_not_error() {
    let (repo, _) = seeded_repository();
    assert!(repo
        .find_one("Product", &product_key("electronics", "999"))
        .unwrap()
        .is_none());
    assert!(repo
        .find("Product", &PageRequest::new().key(product_key("electronics", "999")))
        .unwrap()
        .is_empty());
}

#[test]
fn partial_key_is_one_range_scan() {
    let (repo, store) = seeded_repository();
    let before = (store.point_reads(), store.scans());

    let rows = repo
        .find("Product", &PageRequest::new().key(category("garden")))
        .unwrap();

    assert_eq!(ids(&rows), ["001", "002"]);
    assert_eq!(store.point_reads(), before.0);
    assert_eq!(store.scans(), before.1 + 1);
}

#[test]
fn partial_key_boundaries_use_sentinels() {
    let (repo, _) = repository();
    let schema = repo.catalog().get("Product").unwrap();

    let asc = repo
        .planner()
        .plan(&schema, &category("electronics"), None, SortOrder::Asc, Some(3))
        .unwrap();
    let PlannedQuery::RangeScan(scan) = asc else {
        panic!("partial key must plan a range scan");
    };
    let electronics = KeyPart::Value(WireValue::from("electronics"));
    assert_eq!(scan.start.parts, vec![electronics.clone(), KeyPart::Min]);
    assert!(scan.start.inclusive);
    assert_eq!(scan.end.parts, vec![electronics.clone(), KeyPart::Max]);
    assert!(!scan.end.inclusive);
    assert_eq!(scan.direction, ScanDirection::Forward);
    assert_eq!(scan.limit, Some(3));

    let desc = repo
        .planner()
        .plan(&schema, &category("electronics"), None, SortOrder::Desc, Some(3))
        .unwrap();
    let PlannedQuery::RangeScan(scan) = desc else {
        panic!("partial key must plan a range scan");
    };
    assert_eq!(scan.start.parts, vec![electronics.clone(), KeyPart::Max]);
    assert_eq!(scan.end.parts, vec![electronics, KeyPart::Min]);
    assert_eq!(scan.direction, ScanDirection::Backward);
}

#[test]
fn empty_predicate_scans_whole_table() {
    let (repo, _) = seeded_repository();
    let rows = repo.find("Product", &PageRequest::new()).unwrap();
    assert_eq!(rows.len(), 9);
    assert_eq!(rows[0]["category"], Value::from("electronics"));
    assert_eq!(rows[8]["category"], Value::from("garden"));
}

#[test]
fn non_key_binding_is_rejected() {
    let (repo, store) = seeded_repository();
    let before = store.total();
    let err = repo
        .find(
            "Product",
            &PageRequest::new().key(PrimaryKeyPredicate::new().with("price", 100)),
        )
        .unwrap_err();
    assert!(err.is_key_error());
    assert_eq!(store.total(), before);
}

// ============================================================================
// Paging
// ============================================================================

#[test]
fn ascending_first_page() {
    let (repo, _) = seeded_repository();
    let first = page(
        &repo,
        &PageRequest::new().key(category("electronics")).limit(3),
    );
    assert_eq!(ids(&first.items), ["001", "002", "003"]);
    assert!(first.has_next);
    assert!(first.next_cursor.is_some());
}

#[test]
fn descending_first_page() {
    let (repo, _) = seeded_repository();
    let first = page(
        &repo,
        &PageRequest::new()
            .key(category("electronics"))
            .order(SortOrder::Desc)
            .limit(3),
    );
    assert_eq!(ids(&first.items), ["007", "006", "005"]);
    assert!(first.has_next);
}

#[test]
fn cursor_resumes_after_last_row() {
    let (repo, _) = seeded_repository();
    let request = PageRequest::new().key(category("electronics")).limit(3);

    let first = page(&repo, &request);
    let second = page(&repo, &request.clone().cursor(first.next_cursor.unwrap()));
    assert_eq!(ids(&second.items), ["004", "005", "006"]);
    assert!(second.has_next);

    let third = page(&repo, &request.cursor(second.next_cursor.unwrap()));
    assert_eq!(ids(&third.items), ["007"]);
    assert!(!third.has_next);
    assert!(third.next_cursor.is_none());
}

#[test]
fn descending_pages_cover_partition_once() {
    let (repo, _) = seeded_repository();
    let base = PageRequest::new()
        .key(category("electronics"))
        .order(SortOrder::Desc)
        .limit(2);

    let mut seen = Vec::new();
    let mut request = base.clone();
    loop {
        let page = page(&repo, &request);
        seen.extend(ids(&page.items));
        match page.next_cursor {
            Some(cursor) => request = base.clone().cursor(cursor),
            None => break,
        }
    }
    assert_eq!(seen, ["007", "006", "005", "004", "003", "002", "001"]);
}

#[test]
fn exact_fit_page_has_no_next() {
    let (repo, _) = seeded_repository();
    let page = page(&repo, &PageRequest::new().key(category("garden")).limit(2));
    assert_eq!(page.items.len(), 2);
    assert!(!page.has_next);
}

#[test]
fn concurrent_traversals_are_independent() {
    let (repo, _) = seeded_repository();
    let asc = PageRequest::new().key(category("electronics")).limit(2);
    let desc = asc.clone().order(SortOrder::Desc);

    let a1 = page(&repo, &asc);
    let d1 = page(&repo, &desc);
    let a2 = page(&repo, &asc.clone().cursor(a1.next_cursor.clone().unwrap()));
    let d2 = page(&repo, &desc.clone().cursor(d1.next_cursor.clone().unwrap()));

    assert_eq!(ids(&a2.items), ["003", "004"]);
    assert_eq!(ids(&d2.items), ["005", "004"]);

    // Re-reading the first cursor yields the same page again
    let again = page(&repo, &asc.cursor(a1.next_cursor.unwrap()));
    assert_eq!(again.items, a2.items);
}

#[test]
fn filter_applies_before_limit() {
    let (repo, _) = seeded_repository();
    let schema = repo.catalog().get("Product").unwrap();
    let filter = FilterBuilder::new(&schema)
        .greater_or_equal("price", 400)
        .unwrap();

    let first = page(
        &repo,
        &PageRequest::new()
            .key(category("electronics"))
            .filter(filter.clone())
            .limit(2),
    );
    assert_eq!(ids(&first.items), ["004", "005"]);
    assert!(first.has_next);

    let second = page(
        &repo,
        &PageRequest::new()
            .key(category("electronics"))
            .filter(filter)
            .limit(2)
            .cursor(first.next_cursor.unwrap()),
    );
    assert_eq!(ids(&second.items), ["006", "007"]);
    assert!(!second.has_next);
}

#[test]
fn composite_filter_over_partition() {
    let (repo, _) = seeded_repository();
    let schema = repo.catalog().get("Product").unwrap();
    let f = FilterBuilder::new(&schema);
    let filter = f
        .or(vec![
            f.less_than("price", 200).unwrap(),
            f.equals("price", 700).unwrap(),
        ])
        .unwrap();

    let rows = repo
        .find(
            "Product",
            &PageRequest::new().key(category("electronics")).filter(filter),
        )
        .unwrap();
    assert_eq!(ids(&rows), ["001", "007"]);
}

#[test]
fn tampered_cursor_is_rejected() {
    let (repo, _) = seeded_repository();
    let request = PageRequest::new().key(category("electronics")).limit(3);
    let first = page(&repo, &request);

    let mut token = first.next_cursor.unwrap();
    token.push('!');
    let err = repo.paginate("Product", &request.cursor(token)).unwrap_err();
    assert!(err.is_cursor_error());
}

#[test]
fn zero_limit_is_invalid() {
    let (repo, _) = seeded_repository();
    let err = repo
        .paginate("Product", &PageRequest::new().limit(0))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn oversized_limit_is_clamped() {
    let (repo, _) = repository_with(MapperConfig {
        default_page_limit: 2,
        max_page_limit: 3,
        ..MapperConfig::default()
    });
    for i in 1..=5 {
        repo.insert("Product", product("electronics", &format!("{i:03}"), i))
            .unwrap();
    }

    let page = page(&repo, &PageRequest::new().limit(1_000));
    assert_eq!(page.items.len(), 3);
    let page2 = repo.paginate("Product", &PageRequest::new()).unwrap();
    assert_eq!(page2.items.len(), 2);
}

// ============================================================================
// Key shapes
// ============================================================================

fn reading_repository(values: &[Value]) -> Repository {
    let mut catalog = SchemaCatalog::new();
    catalog
        .register(
            SchemaDescriptor::builder("Reading", "readings")
                .key(ColumnDescriptor::string("sensor"))
                .key(ColumnDescriptor::number("level"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    store.create_table("readings");
    let repo = Repository::new(Arc::new(catalog), store, MapperConfig::default()).unwrap();
    for level in values {
        let mut record = Record::new();
        record.insert("sensor".into(), Value::from("a"));
        record.insert("level".into(), level.clone());
        repo.insert("Reading", record).unwrap();
    }
    repo
}

fn levels(records: &[Record]) -> Vec<Value> {
    records.iter().map(|r| r["level"].clone()).collect()
}

#[test]
fn number_keys_order_by_value_across_int_and_fraction() {
    let repo = reading_repository(&[
        Value::Int(2),
        Value::Float(1.5),
        Value::Int(1),
        Value::Float(-0.25),
        Value::Int(10),
    ]);
    let base = PageRequest::new()
        .key(PrimaryKeyPredicate::new().with("sensor", "a"))
        .limit(2);

    for (order, expected) in [
        (
            SortOrder::Asc,
            vec![
                Value::Float(-0.25),
                Value::Int(1),
                Value::Float(1.5),
                Value::Int(2),
                Value::Int(10),
            ],
        ),
        (
            SortOrder::Desc,
            vec![
                Value::Int(10),
                Value::Int(2),
                Value::Float(1.5),
                Value::Int(1),
                Value::Float(-0.25),
            ],
        ),
    ] {
        let mut seen = Vec::new();
        let mut request = base.clone().order(order);
        loop {
            let page = repo.paginate("Reading", &request).unwrap();
            seen.extend(levels(&page.items));
            match page.next_cursor {
                Some(cursor) => request = base.clone().order(order).cursor(cursor),
                None => break,
            }
        }
        assert_eq!(seen, expected);
    }
}

#[test]
fn fractional_key_is_found_by_point_lookup() {
    let repo = reading_repository(&[Value::Int(1), Value::Float(1.5), Value::Int(2)]);
    let key = PrimaryKeyPredicate::new()
        .with("sensor", "a")
        .with("level", 1.5);
    let row = repo.find_one("Reading", &key).unwrap().unwrap();
    assert_eq!(row["level"], Value::Float(1.5));
}
