// crates/dynamic-group-core/src/runtime/merger.rs
// ============================================================================
// Module: Condition Merger
// Description: Combines a group's base condition with a runtime refinement.
// Purpose: Produce the effective per-object condition list for execution.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Merging is a pure function. Scopes are grouped by object in order of first
//! appearance, base scopes first; clauses for the same object are
//! concatenated and evaluated as a conjunction. A refinement can therefore
//! only narrow the base condition, never widen it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::ConditionScope;

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Chooses the variable condition for an execution.
///
/// A non-empty request refinement replaces the stored one for that call.
#[must_use]
pub fn select_variable<'a>(
    stored: &'a [ConditionScope],
    requested: &'a [ConditionScope],
) -> &'a [ConditionScope] {
    if requested.is_empty() { stored } else { requested }
}

/// Merges base and variable scopes into one scope per object.
#[must_use]
pub fn merge_conditions(
    condition: &[ConditionScope],
    variable: &[ConditionScope],
) -> Vec<ConditionScope> {
    let mut merged: Vec<ConditionScope> = Vec::new();
    for scope in condition.iter().chain(variable) {
        match merged.iter_mut().find(|entry| entry.obj_id == scope.obj_id) {
            Some(entry) => entry.clauses.extend(scope.clauses.iter().cloned()),
            None => merged.push(scope.clone()),
        }
    }
    merged
}

// ============================================================================
// SECTION: Tests
// ============================================================================
