// crates/dynamic-group-core/src/runtime/resolver.rs
// ============================================================================
// Module: Topology Resolver
// Description: Resolves merged condition scopes to target instance records.
// Purpose: Narrow the target population through mainline ancestors and links.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Resolution walks the mainline from the root down to the target. Levels
//! above the first constrained ancestor are skipped. From there each level's
//! admissible instances are the children of the previous level's set,
//! filtered by that level's clauses; the first empty set stops the walk with
//! an empty result. Linked objects (for example `plat` for hosts) are
//! resolved to identifier lists and become membership clauses on the target.
//! Every level checks the [`ExecutionContext`] before touching the inventory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::AppId;
use crate::core::Clause;
use crate::core::ConditionScope;
use crate::core::InstanceId;
use crate::core::ObjectId;
use crate::core::ObjectModel;
use crate::core::Operator;
use crate::core::Record;
use crate::interfaces::InstanceQuery;
use crate::interfaces::Inventory;
use crate::runtime::executor::ExecuteError;
use crate::runtime::executor::ExecutionContext;
use crate::runtime::validator::ValidationError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Admissible instance identifiers per resolved ancestor level.
pub type AncestorSets = BTreeMap<ObjectId, BTreeSet<InstanceId>>;

/// Outcome of resolving a condition list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Target records in inventory order (may contain duplicates).
    pub records: Vec<Record>,
    /// Admissible sets computed for constrained ancestor levels.
    pub ancestor_sets: AncestorSets,
    /// Object whose admissible set was empty, when resolution stopped early.
    pub exhausted_at: Option<ObjectId>,
}

impl Resolution {
    /// Builds an empty resolution that stopped at the given object.
    fn exhausted(obj_id: &ObjectId, ancestor_sets: AncestorSets) -> Self {
        Self {
            records: Vec::new(),
            ancestor_sets,
            exhausted_at: Some(obj_id.clone()),
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves conditions for one business against an inventory.
pub struct TopologyResolver<'a, I: Inventory + ?Sized> {
    /// Inventory collaborator.
    inventory: &'a I,
    /// Object model snapshot.
    model: &'a ObjectModel,
    /// Business scope.
    app_id: AppId,
    /// Deadline and cancellation state.
    context: &'a ExecutionContext,
}

impl<'a, I: Inventory + ?Sized> TopologyResolver<'a, I> {
    /// Creates a resolver.
    #[must_use]
    pub const fn new(
        inventory: &'a I,
        model: &'a ObjectModel,
        app_id: AppId,
        context: &'a ExecutionContext,
    ) -> Self {
        Self {
            inventory,
            model,
            app_id,
            context,
        }
    }

    /// Resolves merged scopes to target records.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] when a scope object is not reachable from the
    /// target, the inventory fails, or the context is cancelled or expired.
    pub fn resolve(
        &self,
        target: &ObjectId,
        scopes: &[ConditionScope],
    ) -> Result<Resolution, ExecuteError> {
        let target_definition = self
            .model
            .object(target)
            .ok_or_else(|| ValidationError::UnknownObject(target.to_string()))?;
        let ancestors = self
            .model
            .ancestors(target)
            .ok_or_else(|| ValidationError::UnsupportedTarget(target.to_string()))?;
        let grouped = group_clauses(scopes);
        for &obj_id in grouped.keys() {
            let reachable = obj_id == target
                || ancestors.contains(obj_id)
                || target_definition.link_to(obj_id).is_some();
            if !reachable {
                return Err(ValidationError::UnreachableObject {
                    obj_id: obj_id.to_string(),
                    target: target.to_string(),
                }
                .into());
            }
        }

        let mut ancestor_sets = AncestorSets::new();
        let mut frontier: Option<(&ObjectId, BTreeSet<InstanceId>)> = None;
        for level in ancestors {
            self.context.checkpoint()?;
            let clauses = grouped.get(level);
            let admissible = match (frontier.take(), clauses) {
                (None, None) => continue,
                (None, Some(clauses)) => self.matching_ids(level, clauses, None)?,
                (Some((parent, parent_ids)), clauses) => {
                    let children =
                        self.inventory.children(self.app_id, parent, &parent_ids, level)?;
                    match clauses {
                        Some(clauses) if !children.is_empty() => {
                            self.matching_ids(level, clauses, Some(&children))?
                        }
                        _ => children,
                    }
                }
            };
            if admissible.is_empty() {
                return Ok(Resolution::exhausted(level, ancestor_sets));
            }
            ancestor_sets.insert(level.clone(), admissible.clone());
            frontier = Some((level, admissible));
        }

        self.context.checkpoint()?;
        let within = match frontier {
            Some((parent, parent_ids)) => {
                let children = self.inventory.children(self.app_id, parent, &parent_ids, target)?;
                if children.is_empty() {
                    return Ok(Resolution::exhausted(target, ancestor_sets));
                }
                Some(children)
            }
            None => None,
        };

        let mut target_clauses = grouped.get(target).cloned().unwrap_or_default();
        for link in &target_definition.links {
            let Some(clauses) = grouped.get(&link.obj_id) else {
                continue;
            };
            self.context.checkpoint()?;
            let linked = self.matching_ids(&link.obj_id, clauses, None)?;
            if linked.is_empty() {
                return Ok(Resolution::exhausted(&link.obj_id, ancestor_sets));
            }
            let ids = linked.iter().map(|id| Value::from(id.get())).collect();
            target_clauses.push(Clause::new(link.field.clone(), Operator::In, Value::Array(ids)));
        }

        self.context.checkpoint()?;
        let records = self.inventory.find(&InstanceQuery {
            app_id: self.app_id,
            obj_id: target,
            clauses: &target_clauses,
            within: within.as_ref(),
        })?;
        Ok(Resolution {
            records,
            ancestor_sets,
            exhausted_at: None,
        })
    }

    /// Returns identifiers of the object's instances matching the clauses.
    fn matching_ids(
        &self,
        obj_id: &ObjectId,
        clauses: &[Clause],
        within: Option<&BTreeSet<InstanceId>>,
    ) -> Result<BTreeSet<InstanceId>, ExecuteError> {
        let definition = self
            .model
            .object(obj_id)
            .ok_or_else(|| ValidationError::UnknownObject(obj_id.to_string()))?;
        let records = self.inventory.find(&InstanceQuery {
            app_id: self.app_id,
            obj_id,
            clauses,
            within,
        })?;
        let id_field = definition.id_field.as_str();
        records
            .iter()
            .map(|record| {
                record.get(id_field).and_then(Value::as_u64).map(InstanceId::new).ok_or_else(|| {
                    let message = format!("{obj_id} record is missing numeric {id_field}");
                    ExecuteError::Inventory(message)
                })
            })
            .collect()
    }
}

/// Groups clauses by scope object, concatenating repeated scopes.
fn group_clauses(scopes: &[ConditionScope]) -> BTreeMap<&ObjectId, Vec<Clause>> {
    let mut grouped: BTreeMap<&ObjectId, Vec<Clause>> = BTreeMap::new();
    for scope in scopes {
        grouped.entry(&scope.obj_id).or_default().extend(scope.clauses.iter().cloned());
    }
    grouped
}
