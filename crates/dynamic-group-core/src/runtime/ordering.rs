// crates/dynamic-group-core/src/runtime/ordering.rs
// ============================================================================
// Module: Record Ordering
// Description: Sort, dedup, and projection helpers for result rows.
// Purpose: Shape execute and search results deterministically.
// Dependencies: crate::core, crate::runtime::operator, serde_json
// ============================================================================

//! ## Overview
//! Rows are sorted with a stable sort so rows that compare equal keep their
//! source order. Missing fields sort before `null`, which sorts before any
//! other value; values of different JSON types order by type rank. The
//! comparison is a total order, so arbitrary user data never breaks a sort.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::Record;
use crate::core::SortKey;
use crate::runtime::operator::sort_cmp;

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Sorts records in place by the given keys.
pub fn sort_records(records: &mut [Record], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    records.sort_by(|left, right| compare_records(left, right, keys));
}

/// Compares two records by the given keys in order.
#[must_use]
pub fn compare_records(left: &Record, right: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = compare_field(left.get(&key.field), right.get(&key.field));
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Compares two optional field values.
fn compare_field(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }
    match (left, right) {
        (Some(left), Some(right)) => sort_cmp(left, right),
        _ => Ordering::Equal,
    }
}

/// Returns the cross-type rank of a field value.
const fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

// ============================================================================
// SECTION: Dedup And Projection
// ============================================================================

/// Removes records whose identifier field repeats an earlier record.
///
/// Records without a scalar identifier are kept as-is.
#[must_use]
pub fn dedup_by_field(records: Vec<Record>, id_field: &str) -> Vec<Record> {
    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter(|record| match record.get(id_field) {
            Some(value) if !value.is_array() && !value.is_object() => {
                seen.insert(value.to_string())
            }
            _ => true,
        })
        .collect()
}

/// Keeps only the requested fields plus the identifier field.
///
/// An empty field list returns the record unchanged.
#[must_use]
pub fn project_record(record: Record, fields: &[String], id_field: &str) -> Record {
    if fields.is_empty() {
        return record;
    }
    record
        .into_iter()
        .filter(|(key, _)| key == id_field || fields.iter().any(|field| field == key))
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::*;
    use crate::core::BasePage;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().map(|record| record["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn multi_key_sort_is_stable_and_directional() {
        let mut rows = vec![
            record(json!({"id": 1, "name": "b", "cpu": 4})),
            record(json!({"id": 2, "name": "a", "cpu": 8})),
            record(json!({"id": 3, "name": "b", "cpu": 8})),
            record(json!({"id": 4, "name": "a", "cpu": 8})),
        ];
        sort_records(&mut rows, &BasePage::new(0, 10, "-cpu,name").sort_keys());
        assert_eq!(ids(&rows), vec![2, 4, 3, 1]);
    }

    #[test]
    fn missing_sorts_before_null_and_values() {
        let mut rows = vec![
            record(json!({"id": 1, "name": "x"})),
            record(json!({"id": 2, "name": null})),
            record(json!({"id": 3})),
        ];
        sort_records(&mut rows, &BasePage::new(0, 10, "name").sort_keys());
        assert_eq!(ids(&rows), vec![3, 2, 1]);
    }

    #[test]
    fn mixed_temporal_and_plain_strings_sort_consistently() {
        let names = [
            json!("2024-01-01T10:00:00+05:00"),
            json!("2024-01-01T06:00:00Z"),
            json!("2024-01-01T07"),
            json!("2024-01-01"),
            json!("web"),
            json!(3),
            Value::Null,
        ];
        let mut rows: Vec<Record> = (0 .. 210_i64)
            .map(|id| {
                let index = usize::try_from(id * 7 % 11).unwrap() % names.len();
                record(json!({"id": id, "name": names[index].clone()}))
            })
            .collect();
        sort_records(&mut rows, &BasePage::new(0, 10, "name").sort_keys());
        for pair in rows.windows(2) {
            let ordering = compare_field(pair[0].get("name"), pair[1].get("name"));
            assert_ne!(ordering, Ordering::Greater, "{pair:?}");
        }
        assert_eq!(rows[0]["name"], Value::Null);
        assert_eq!(rows[rows.len() - 1]["name"], json!("web"));
        let texts: Vec<&str> = rows.iter().filter_map(|row| row["name"].as_str()).collect();
        let first_plain = texts.iter().position(|text| *text == "2024-01-01T07").unwrap();
        assert!(texts[.. first_plain].iter().all(|text| *text != "web"));
        assert_eq!(texts[first_plain - 1], "2024-01-01T06:00:00Z");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let rows = vec![
            record(json!({"id": 1, "v": "first"})),
            record(json!({"id": 2})),
            record(json!({"id": 1, "v": "second"})),
        ];
        let rows = dedup_by_field(rows, "id");
        assert_eq!(ids(&rows), vec![1, 2]);
        assert_eq!(rows[0]["v"], json!("first"));
    }

    #[test]
    fn projection_always_keeps_identifier() {
        let row = record(json!({"id": 1, "name": "a", "cpu": 4}));
        let projected = project_record(row.clone(), &["name".to_string()], "id");
        assert_eq!(Value::Object(projected), json!({"id": 1, "name": "a"}));
        assert_eq!(project_record(row.clone(), &[], "id"), row);
    }
}
