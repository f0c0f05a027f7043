// crates/dynamic-group-core/tests/topology_resolution.rs
// ============================================================================
// Module: Topology Resolution Tests
// Description: Resolver behavior across mainline levels and linked objects.
// Purpose: Validate ancestor narrowing, custom levels, and link clauses.
// ============================================================================

//! ## Overview
//! Drives [`TopologyResolver`] directly so ancestor sets and early exits are
//! observable, using a model with a custom `idc` level between business and
//! set.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;

use dynamic_group_core::AppId;
use dynamic_group_core::Clause;
use dynamic_group_core::ConditionScope;
use dynamic_group_core::ExecuteError;
use dynamic_group_core::ExecutionContext;
use dynamic_group_core::InMemoryInventory;
use dynamic_group_core::InstanceId;
use dynamic_group_core::ObjectId;
use dynamic_group_core::ObjectMetadata;
use dynamic_group_core::Operator;
use dynamic_group_core::ValidationError;
use dynamic_group_core::runtime::TopologyResolver;
use serde_json::Value;
use serde_json::json;

fn custom_inventory() -> InMemoryInventory {
    let document = json!({
        "objects": [
            {"bk_obj_id": "biz", "id_field": "bk_biz_id",
             "attributes": [{"bk_property_id": "bk_biz_name", "bk_property_type": "singlechar"}]},
            {"bk_obj_id": "idc", "id_field": "bk_inst_id", "parent": "biz",
             "attributes": [{"bk_property_id": "bk_inst_name", "bk_property_type": "singlechar"}]},
            {"bk_obj_id": "set", "id_field": "bk_set_id", "parent": "idc",
             "attributes": [{"bk_property_id": "bk_set_name", "bk_property_type": "singlechar"}]},
            {"bk_obj_id": "module", "id_field": "bk_module_id", "parent": "set",
             "parent_field": "bk_set_id",
             "attributes": [{"bk_property_id": "bk_module_name", "bk_property_type": "singlechar"}]},
            {"bk_obj_id": "host", "id_field": "bk_host_id", "parent": "module",
             "parent_field": "bk_module_id",
             "links": [{"bk_obj_id": "plat", "field": "bk_cloud_id"}],
             "attributes": [
                {"bk_property_id": "bk_host_innerip", "bk_property_type": "singlechar"},
                {"bk_property_id": "bk_cloud_id", "bk_property_type": "foreignkey"}
             ]},
            {"bk_obj_id": "plat", "id_field": "bk_cloud_id", "app_scoped": false,
             "attributes": [{"bk_property_id": "bk_cloud_name", "bk_property_type": "singlechar"}]}
        ],
        "instances": {
            "biz": [{"bk_biz_id": 1, "bk_biz_name": "demo"}],
            "idc": [
                {"bk_inst_id": 100, "bk_biz_id": 1, "bk_parent_id": 1, "bk_inst_name": "sh"},
                {"bk_inst_id": 101, "bk_biz_id": 1, "bk_parent_id": 1, "bk_inst_name": "sz"}
            ],
            "set": [
                {"bk_set_id": 10, "bk_biz_id": 1, "bk_parent_id": 100, "bk_set_name": "web"},
                {"bk_set_id": 11, "bk_biz_id": 1, "bk_parent_id": 101, "bk_set_name": "web"},
                {"bk_set_id": 12, "bk_biz_id": 1, "bk_parent_id": 101, "bk_set_name": "db"}
            ],
            "module": [
                {"bk_module_id": 20, "bk_biz_id": 1, "bk_set_id": 10, "bk_module_name": "nginx"},
                {"bk_module_id": 21, "bk_biz_id": 1, "bk_set_id": 11, "bk_module_name": "nginx"},
                {"bk_module_id": 22, "bk_biz_id": 1, "bk_set_id": 12, "bk_module_name": "mysql"}
            ],
            "host": [
                {"bk_host_id": 1, "bk_biz_id": 1, "bk_module_id": [20], "bk_cloud_id": 0},
                {"bk_host_id": 2, "bk_biz_id": 1, "bk_module_id": [21], "bk_cloud_id": 0},
                {"bk_host_id": 3, "bk_biz_id": 1, "bk_module_id": [21, 22], "bk_cloud_id": 5},
                {"bk_host_id": 4, "bk_biz_id": 1, "bk_module_id": [22], "bk_cloud_id": 5}
            ],
            "plat": [
                {"bk_cloud_id": 0, "bk_cloud_name": "default"},
                {"bk_cloud_id": 5, "bk_cloud_name": "edge"}
            ]
        }
    });
    InMemoryInventory::from_json(document.to_string().as_bytes()).expect("custom inventory")
}

fn equal(obj: &str, field: &str, value: Value) -> ConditionScope {
    ConditionScope::new(obj, vec![Clause::new(field, Operator::Equal, value)])
}

fn host_ids(records: &[dynamic_group_core::Record]) -> Vec<u64> {
    records.iter().map(|record| record["bk_host_id"].as_u64().unwrap()).collect()
}

fn ids(values: &[u64]) -> BTreeSet<InstanceId> {
    values.iter().copied().map(InstanceId::new).collect()
}

/// Verifies a custom level narrows descendants and is memoized.
#[test]
fn custom_level_narrows_through_every_mainline_step() {
    let inventory = custom_inventory();
    let model = inventory.model().unwrap();
    let context = ExecutionContext::new();
    let resolver = TopologyResolver::new(&inventory, &model, AppId::from_raw(1).unwrap(), &context);
    let scopes = vec![
        equal("idc", "bk_inst_name", json!("sz")),
        equal("module", "bk_module_name", json!("nginx")),
    ];
    let resolution = resolver.resolve(&ObjectId::new("host"), &scopes).unwrap();
    assert_eq!(host_ids(&resolution.records), vec![2, 3]);
    assert_eq!(resolution.exhausted_at, None);
    assert_eq!(resolution.ancestor_sets.get(&ObjectId::new("idc")), Some(&ids(&[101])));
    assert_eq!(resolution.ancestor_sets.get(&ObjectId::new("set")), Some(&ids(&[11, 12])));
    assert_eq!(resolution.ancestor_sets.get(&ObjectId::new("module")), Some(&ids(&[21])));
    assert!(!resolution.ancestor_sets.contains_key(&ObjectId::new("biz")));
}

/// Verifies an empty ancestor level stops resolution.
#[test]
fn empty_ancestor_level_stops_walk() {
    let inventory = custom_inventory();
    let model = inventory.model().unwrap();
    let context = ExecutionContext::new();
    let resolver = TopologyResolver::new(&inventory, &model, AppId::from_raw(1).unwrap(), &context);
    let scopes = vec![
        equal("idc", "bk_inst_name", json!("sh")),
        equal("set", "bk_set_name", json!("db")),
    ];
    let resolution = resolver.resolve(&ObjectId::new("host"), &scopes).unwrap();
    assert!(resolution.records.is_empty());
    assert_eq!(resolution.exhausted_at, Some(ObjectId::new("set")));
}

/// Verifies linked objects become membership clauses on the target.
#[test]
fn linked_object_restricts_target() {
    let inventory = custom_inventory();
    let model = inventory.model().unwrap();
    let context = ExecutionContext::new();
    let resolver = TopologyResolver::new(&inventory, &model, AppId::from_raw(1).unwrap(), &context);
    let scopes = vec![
        equal("plat", "bk_cloud_name", json!("edge")),
        equal("set", "bk_set_name", json!("web")),
    ];
    let resolution = resolver.resolve(&ObjectId::new("host"), &scopes).unwrap();
    assert_eq!(host_ids(&resolution.records), vec![3]);

    let scopes = vec![equal("plat", "bk_cloud_name", json!("missing"))];
    let resolution = resolver.resolve(&ObjectId::new("host"), &scopes).unwrap();
    assert_eq!(resolution.exhausted_at, Some(ObjectId::new("plat")));
}

/// Verifies an unconstrained target returns only its business population.
#[test]
fn target_without_conditions_returns_business_population() {
    let inventory = custom_inventory();
    let model = inventory.model().unwrap();
    let context = ExecutionContext::new();
    let resolver = TopologyResolver::new(&inventory, &model, AppId::from_raw(1).unwrap(), &context);
    let resolution = resolver.resolve(&ObjectId::new("host"), &[]).unwrap();
    assert_eq!(host_ids(&resolution.records), vec![1, 2, 3, 4]);
    let other = TopologyResolver::new(&inventory, &model, AppId::from_raw(9).unwrap(), &context);
    assert!(other.resolve(&ObjectId::new("host"), &[]).unwrap().records.is_empty());
}

/// Verifies descendant scopes are rejected for upper-level targets.
#[test]
fn unreachable_scope_is_rejected() {
    let inventory = custom_inventory();
    let model = inventory.model().unwrap();
    let context = ExecutionContext::new();
    let resolver = TopologyResolver::new(&inventory, &model, AppId::from_raw(1).unwrap(), &context);
    let scopes = vec![equal("module", "bk_module_name", json!("nginx"))];
    let result = resolver.resolve(&ObjectId::new("set"), &scopes);
    assert!(matches!(
        result,
        Err(ExecuteError::Validation(ValidationError::UnreachableObject { .. }))
    ));
}

/// Verifies an expired deadline aborts before the first level.
#[test]
fn expired_deadline_aborts_resolution() {
    let inventory = custom_inventory();
    let model = inventory.model().unwrap();
    let context = ExecutionContext::with_timeout(std::time::Duration::ZERO);
    let resolver = TopologyResolver::new(&inventory, &model, AppId::from_raw(1).unwrap(), &context);
    let scopes = vec![equal("idc", "bk_inst_name", json!("sz"))];
    let result = resolver.resolve(&ObjectId::new("host"), &scopes);
    assert!(matches!(result, Err(ExecuteError::Cancelled(_))));
}
