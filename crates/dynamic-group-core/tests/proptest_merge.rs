//! Merge narrowing property-based tests.
//!
//! ## Purpose
//! Random host populations and refinements check that a variable condition
//! only ever narrows the base condition's result set.
// crates/dynamic-group-core/tests/proptest_merge.rs
// ============================================================================
// Module: Merge Narrowing Property-Based Tests
// Description: Random refinements never widen execute results.
// Purpose: Hold the narrowing guarantee over arbitrary inventories.
// ============================================================================

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
use dynamic_group_core::BasePage;
use dynamic_group_core::Clause;
use dynamic_group_core::ConditionScope;
use dynamic_group_core::DynamicGroup;
use dynamic_group_core::ExecuteRequest;
use dynamic_group_core::ExecutionContext;
use dynamic_group_core::GroupId;
use dynamic_group_core::GroupInfo;
use dynamic_group_core::GroupLimits;
use dynamic_group_core::InMemoryInventory;
use dynamic_group_core::ObjectId;
use dynamic_group_core::ObjectModel;
use dynamic_group_core::Operator;
use dynamic_group_core::runtime::execute_group;
use proptest::prelude::*;
use serde_json::json;
use time::OffsetDateTime;

const OS_NAMES: [&str; 3] = ["cc_os1", "cc_os2", "linux"];
const MODULE_NAMES: [&str; 3] = ["idle", "web", "db"];

/// Host attributes: (os index, cpu count, module index).
type HostSpec = (usize, u64, usize);

fn inventory(hosts: &[HostSpec]) -> InMemoryInventory {
    let inventory = InMemoryInventory::new(ObjectModel::cmdb_default());
    let add = |obj: &str, record: serde_json::Value| {
        inventory.insert(&ObjectId::new(obj), record.as_object().cloned().unwrap()).unwrap();
    };
    add("biz", json!({"bk_biz_id": 1}));
    add("set", json!({"bk_set_id": 1, "bk_biz_id": 1, "bk_parent_id": 1}));
    for (index, name) in MODULE_NAMES.iter().enumerate() {
        add(
            "module",
            json!({"bk_module_id": index + 1, "bk_biz_id": 1, "bk_set_id": 1, "bk_module_name": name}),
        );
    }
    for (index, (os, cpu, module)) in hosts.iter().enumerate() {
        add(
            "host",
            json!({
                "bk_host_id": index + 1,
                "bk_biz_id": 1,
                "bk_os_name": OS_NAMES[*os],
                "bk_cpu": cpu,
                "bk_module_id": [module + 1],
            }),
        );
    }
    inventory
}

fn clause_strategy() -> impl Strategy<Value = ConditionScope> {
    prop_oneof![
        (0 .. OS_NAMES.len()).prop_map(|os| ConditionScope::new(
            "host",
            vec![Clause::new("bk_os_name", Operator::Equal, json!(OS_NAMES[os]))]
        )),
        (0u64 .. 16).prop_map(|cpu| ConditionScope::new(
            "host",
            vec![Clause::new("bk_cpu", Operator::GreaterThanOrEqual, json!(cpu))]
        )),
        (0 .. MODULE_NAMES.len()).prop_map(|module| ConditionScope::new(
            "module",
            vec![Clause::new("bk_module_name", Operator::NotEqual, json!(MODULE_NAMES[module]))]
        )),
        Just(ConditionScope::new(
            "host",
            vec![Clause::new("bk_os_name", Operator::Contains, json!("OS"))]
        )),
    ]
}

fn execute_ids(
    inventory: &InMemoryInventory,
    condition: &ConditionScope,
    variable: &[ConditionScope],
) -> BTreeSet<u64> {
    let now = OffsetDateTime::UNIX_EPOCH;
    let group = DynamicGroup {
        id: GroupId::new("g"),
        app_id: AppId::from_raw(1).unwrap(),
        obj_id: ObjectId::new("host"),
        name: "g".to_string(),
        info: GroupInfo {
            condition: vec![condition.clone()],
            variable_condition: Vec::new(),
        },
        create_user: "admin".to_string(),
        modify_user: "admin".to_string(),
        create_time: now,
        update_time: now,
    };
    let request = ExecuteRequest {
        variable_condition: variable.to_vec(),
        page: BasePage::new(0, 1000, ""),
        ..ExecuteRequest::default()
    };
    let result = execute_group(
        inventory,
        &group,
        &request,
        &GroupLimits::default(),
        &ExecutionContext::new(),
    )
    .unwrap();
    assert_eq!(u64::try_from(result.info.len()).unwrap(), result.count);
    result.info.iter().map(|record| record["bk_host_id"].as_u64().unwrap()).collect()
}

proptest! {
    #[test]
    fn variable_condition_never_widens_results(
        hosts in prop::collection::vec(
            (0 .. OS_NAMES.len(), 0u64 .. 16, 0 .. MODULE_NAMES.len()),
            0 .. 24,
        ),
        condition in clause_strategy(),
        variable in prop::collection::vec(clause_strategy(), 1 .. 4),
    ) {
        let inventory = inventory(&hosts);
        let base = execute_ids(&inventory, &condition, &[]);
        let narrowed = execute_ids(&inventory, &condition, &variable);
        prop_assert!(narrowed.is_subset(&base));
    }
}
