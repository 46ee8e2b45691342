//! Table view tests through the store boundary.

use hyperstore::{
    ArrayError, ArrayStore, Attribute, ByteOrder, Config, Dimension, Encoded, Scalar, ScalarType,
    SortOrder, SortSpec,
};
use serde_json::{json, Value};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_test_store() -> (ArrayStore, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = ArrayStore::new(Config::with_data_dir(temp.path())).unwrap();
    (store, temp)
}

/// Extent-4 table `x` = [1.0, NaN, 3.0, 0.5]
fn create_scenario(store: &ArrayStore) -> String {
    let id = store.create_arrayset(Some("scenario")).unwrap();
    store
        .start_array(
            &id,
            0,
            vec![Dimension::new("row", 0, 4)],
            vec![Attribute::new("x", ScalarType::Float64)],
        )
        .unwrap();
    let payload: Vec<u8> = [1.0f64, f64::NAN, 3.0, 0.5]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    store
        .write(&id, 0, 0, "...", &payload, Some(ByteOrder::Little))
        .unwrap();
    id
}

/// Two-attribute table with duplicate keys
fn create_people(store: &ArrayStore) -> String {
    let id = store.create_arrayset(Some("people")).unwrap();
    store
        .start_array(
            &id,
            0,
            vec![Dimension::new("row", 0, 5)],
            vec![
                Attribute::new("name", ScalarType::String),
                Attribute::new("age", ScalarType::Int32),
            ],
        )
        .unwrap();
    store
        .write_json(&id, 0, 0, "...", &json!(["eve", "bob", "ann", "dan", "cat"]))
        .unwrap();
    store
        .write_json(&id, 0, 1, "...", &json!([41, 29, 35, 29, 52]))
        .unwrap();
    id
}

// ============================================================================
// End-to-end Scenario
// ============================================================================

#[test]
fn test_scenario_statistics() {
    let (store, _temp) = create_test_store();
    let id = create_scenario(&store);

    let metadata = store.metadata(&id, None, Some(&[(0, 0)][..])).unwrap();
    let wire = serde_json::to_value(metadata).unwrap();
    assert_eq!(
        wire["statistics"],
        json!([{"array": 0, "attribute": 0, "min": 0.5, "max": 3.0}])
    );
}

#[test]
fn test_scenario_table_metadata() {
    let (store, _temp) = create_test_store();
    let id = create_scenario(&store);

    let metadata = store.table_metadata(&id, 0, None).unwrap();
    assert_eq!(metadata.row_count, 4);
    assert_eq!(metadata.column_count, 1);
    assert_eq!(metadata.column_names, vec!["x"]);
    assert_eq!(metadata.column_min, vec![Some(Scalar::Float(0.5))]);
    assert_eq!(metadata.column_max, vec![Some(Scalar::Float(3.0))]);

    let wire = serde_json::to_value(&metadata).unwrap();
    assert_eq!(wire["row-count"], json!(4));
    assert_eq!(wire["column-types"], json!(["float64"]));
    assert_eq!(wire["column-min"], json!([0.5]));
    assert_eq!(wire["column-max"], json!([3.0]));
}

#[test]
fn test_scenario_table_chunk_sorted() {
    let (store, _temp) = create_test_store();
    let id = create_scenario(&store);

    let chunk = store
        .table_chunk(&id, 0, "0-4", "0", None, Some("0:ascending"))
        .unwrap();
    assert_eq!(chunk.rows, vec![3, 0, 2, 1]);
    assert_eq!(chunk.columns, vec![0]);
    assert_eq!(chunk.column_names, vec!["x"]);
    assert_eq!(chunk.data, vec![vec![json!(0.5), json!(1.0), json!(3.0), Value::Null]]);
    assert_eq!(chunk.sort, Some(vec![SortSpec(0, SortOrder::Ascending)]));

    let wire = serde_json::to_value(&chunk).unwrap();
    assert_eq!(wire["column-names"], json!(["x"]));
    assert_eq!(wire["sort"], json!([[0, "ascending"]]));
}

#[test]
fn test_scenario_indices() {
    let (store, _temp) = create_test_store();
    let id = create_scenario(&store);

    let unsorted = store
        .table_unsorted_indices(&id, 0, "0-4", None, Some("0:ascending"), None)
        .unwrap();
    assert_eq!(unsorted, Encoded::Json(json!([3, 0, 2, 1])));

    let sorted = store
        .table_sorted_indices(&id, 0, "0-4", None, Some("0:ascending"), None)
        .unwrap();
    assert_eq!(sorted, Encoded::Json(json!([1, 3, 2, 0])));

    let binary = store
        .table_sorted_indices(&id, 0, "0-4", None, Some("0:ascending"), Some(ByteOrder::Big))
        .unwrap();
    let expected: Vec<u8> = [1i32, 3, 2, 0].iter().flat_map(|v| v.to_be_bytes()).collect();
    assert_eq!(binary, Encoded::Binary(expected));
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_unsorted_chunk_keeps_caller_order() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    let chunk = store.table_chunk(&id, 0, "2,0,1", "0-2", None, None).unwrap();
    assert_eq!(chunk.rows, vec![2, 0, 1]);
    assert_eq!(chunk.data[0], vec![json!("ann"), json!("eve"), json!("bob")]);
    assert_eq!(chunk.data[1], vec![json!(35), json!(41), json!(29)]);
    assert_eq!(chunk.sort, None);
}

#[test]
fn test_descending_sort_with_ties() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    let chunk = store
        .table_chunk(&id, 0, "0-5", "1,0", None, Some("1:descending"))
        .unwrap();
    // ascending ages: bob(1)=29, dan(3)=29, ann(2)=35, eve(0)=41, cat(4)=52
    assert_eq!(chunk.rows, vec![4, 0, 2, 3, 1]);
    assert_eq!(chunk.data[0], vec![json!(52), json!(41), json!(35), json!(29), json!(29)]);
    assert_eq!(chunk.data[1], vec![json!("cat"), json!("eve"), json!("ann"), json!("dan"), json!("bob")]);
}

#[test]
fn test_string_sort_and_window() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    let chunk = store
        .table_chunk(&id, 0, "1-3", "0", None, Some("0:ascending"))
        .unwrap();
    assert_eq!(chunk.data[0], vec![json!("bob"), json!("cat")]);
}

#[test]
fn test_index_column() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    let metadata = store.table_metadata(&id, 0, Some("%index")).unwrap();
    assert_eq!(metadata.column_count, 3);
    assert_eq!(metadata.column_types[2], ScalarType::Int64);
    assert_eq!(metadata.column_min[2], Some(Scalar::Int(0)));
    assert_eq!(metadata.column_max[2], Some(Scalar::Int(4)));

    let chunk = store
        .table_chunk(&id, 0, "0-3", "0,2", Some("%index"), Some("0:ascending"))
        .unwrap();
    assert_eq!(chunk.column_names, vec!["name", "%index"]);
    assert_eq!(chunk.data[0], vec![json!("ann"), json!("bob"), json!("cat")]);
    assert_eq!(chunk.data[1], vec![json!(2), json!(1), json!(4)]);

    let by_index = store
        .table_unsorted_indices(&id, 0, "0-5", Some("%index"), Some("2:descending"), None)
        .unwrap();
    assert_eq!(by_index, Encoded::Json(json!([4, 3, 2, 1, 0])));
}

#[test]
fn test_rows_past_end_are_dropped() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    let chunk = store.table_chunk(&id, 0, "3-100", "0", None, None).unwrap();
    assert_eq!(chunk.rows, vec![3, 4]);

    let indices = store
        .table_sorted_indices(&id, 0, "4,9", None, Some("1:ascending"), None)
        .unwrap();
    assert_eq!(indices, Encoded::Json(json!([4])));
}

#[test]
fn test_huge_row_range_is_clamped() {
    let (store, _temp) = create_test_store();
    let id = create_scenario(&store);

    let chunk = store
        .table_chunk(&id, 0, "0-100000000000", "0", None, None)
        .unwrap();
    assert_eq!(chunk.rows, vec![0, 1, 2, 3]);

    let indices = store
        .table_unsorted_indices(&id, 0, "2-100000000000", None, Some("0:ascending"), None)
        .unwrap();
    assert_eq!(indices, Encoded::Json(json!([2, 1])));

    assert!(matches!(
        store.table_chunk(&id, 0, "0", "0-100000000000", None, None),
        Err(ArrayError::OutOfRange(_))
    ));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_malformed_arguments() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    for (rows, columns, sort) in [
        ("x", "0", None),
        ("0-2", "0-", None),
        ("0-2", "0", Some("0")),
        ("0-2", "0", Some("0:ascending,1:ascending")),
        ("0-2", "0", Some("0:sideways")),
    ] {
        let err = store.table_chunk(&id, 0, rows, columns, None, sort).unwrap_err();
        assert!(matches!(err, ArrayError::MalformedQuery { .. }), "{rows} {columns} {sort:?}");
        assert_eq!(err.status_code(), 400);
    }
}

#[test]
fn test_out_of_range_columns() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);

    assert!(matches!(
        store.table_chunk(&id, 0, "0", "2", None, None),
        Err(ArrayError::OutOfRange(_))
    ));
    assert!(matches!(
        store.table_chunk(&id, 0, "0", "0", None, Some("2:ascending")),
        Err(ArrayError::OutOfRange(_))
    ));
    assert!(matches!(
        store.table_unsorted_indices(&id, 0, "0", None, Some("5:ascending"), None),
        Err(ArrayError::OutOfRange(_))
    ));
}

#[test]
fn test_multidimensional_array_is_not_a_table() {
    let (store, _temp) = create_test_store();
    let id = store.create_arrayset(Some("grid")).unwrap();
    store
        .start_array(
            &id,
            0,
            vec![Dimension::new("i", 0, 2), Dimension::new("j", 0, 2)],
            vec![Attribute::new("v", ScalarType::Float32)],
        )
        .unwrap();

    assert!(matches!(
        store.table_metadata(&id, 0, None),
        Err(ArrayError::SchemaError(_))
    ));
    assert!(matches!(
        store.table_metadata(&id, 7, None),
        Err(ArrayError::NotFound(_))
    ));
}

// ============================================================================
// Sort-Index Cache
// ============================================================================

#[test]
fn test_sort_index_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let id = {
        let store = ArrayStore::new(Config::with_data_dir(temp.path())).unwrap();
        let id = create_people(&store);
        store
            .table_unsorted_indices(&id, 0, "0-5", None, Some("1:ascending"), None)
            .unwrap();
        id
    };

    let store = ArrayStore::new(Config::with_data_dir(temp.path())).unwrap();
    // Rewriting the column does not refresh the cached permutation
    store
        .write_json(&id, 0, 1, "...", &json!([1, 2, 3, 4, 5]))
        .unwrap();
    let stale = store
        .table_unsorted_indices(&id, 0, "0-5", None, Some("1:ascending"), None)
        .unwrap();
    assert_eq!(stale, Encoded::Json(json!([1, 3, 2, 0, 4])));
}

#[test]
fn test_restarting_array_drops_sort_index() {
    let (store, _temp) = create_test_store();
    let id = create_people(&store);
    store
        .table_unsorted_indices(&id, 0, "0-5", None, Some("1:ascending"), None)
        .unwrap();

    store
        .start_array(
            &id,
            0,
            vec![Dimension::new("row", 0, 3)],
            vec![
                Attribute::new("name", ScalarType::String),
                Attribute::new("age", ScalarType::Int32),
            ],
        )
        .unwrap();
    store.write_json(&id, 0, 1, "...", &json!([9, 8, 7])).unwrap();

    let fresh = store
        .table_unsorted_indices(&id, 0, "0-3", None, Some("1:ascending"), None)
        .unwrap();
    assert_eq!(fresh, Encoded::Json(json!([2, 1, 0])));
}

#[test]
fn test_unwritable_sort_index_still_serves_chunks() {
    let (store, _temp) = create_test_store();
    let id = create_scenario(&store);

    let index_file = store.open(&id).unwrap().layout().index_file(0, 0);
    let index_dir = index_file.parent().unwrap().to_path_buf();
    std::fs::write(&index_dir, b"not a directory").unwrap();

    for _ in 0..2 {
        let chunk = store
            .table_chunk(&id, 0, "0-4", "0", None, Some("0:ascending"))
            .unwrap();
        assert_eq!(chunk.rows, vec![3, 0, 2, 1]);
        assert_eq!(chunk.data[0], vec![json!(0.5), json!(1.0), json!(3.0), Value::Null]);
    }
    assert!(index_dir.is_file());
    assert!(!index_file.exists());
}
