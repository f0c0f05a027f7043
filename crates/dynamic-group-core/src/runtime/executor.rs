// crates/dynamic-group-core/src/runtime/executor.rs
// ============================================================================
// Module: Group Executor
// Description: Executes a stored group against the live inventory.
// Purpose: Orchestrate merge, resolution, dedup, sort, paging, and projection.
// Dependencies: crate::core, crate::interfaces, crate::runtime, thiserror
// ============================================================================

//! ## Overview
//! Execution validates the request, merges the stored condition with the
//! selected refinement, resolves target records through the topology, then
//! dedups by the target identifier, sorts, counts, pages, and projects.
//! The count is taken after dedup and before paging. Execution is read-only
//! and observes the [`ExecutionContext`] deadline and cancellation flag at
//! every resolution level.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::DynamicGroup;
use crate::core::ExecuteRequest;
use crate::core::ExecuteResult;
use crate::interfaces::InventoryError;
use crate::interfaces::Inventory;
use crate::runtime::merger::merge_conditions;
use crate::runtime::merger::select_variable;
use crate::runtime::ordering::dedup_by_field;
use crate::runtime::ordering::project_record;
use crate::runtime::ordering::sort_records;
use crate::runtime::resolver::TopologyResolver;
use crate::runtime::validator::GroupLimits;
use crate::runtime::validator::ValidationError;
use crate::runtime::validator::validate_conditions;
use crate::runtime::validator::validate_fields;
use crate::runtime::validator::validate_page;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Execution failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecuteError {
    /// Request or stored definition is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Inventory collaborator failed.
    #[error("inventory error: {0}")]
    Inventory(String),
    /// Deadline passed or the caller cancelled.
    #[error("execution cancelled: {0}")]
    Cancelled(String),
}

impl From<InventoryError> for ExecuteError {
    fn from(error: InventoryError) -> Self {
        Self::Inventory(error.to_string())
    }
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Deadline and cancellation state shared with the caller.
///
/// Clones share the cancellation flag, so a caller can keep one clone and
/// cancel an execution running on another thread.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Instant after which execution stops.
    deadline: Option<Instant>,
    /// Cooperative cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Creates a context without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true when cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails when the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::Cancelled`] when execution must stop.
    pub fn checkpoint(&self) -> Result<(), ExecuteError> {
        if self.is_cancelled() {
            return Err(ExecuteError::Cancelled("cancelled by caller".to_string()));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ExecuteError::Cancelled("deadline exceeded".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes a group definition against an inventory.
///
/// # Errors
///
/// Returns [`ExecuteError`] when the request is invalid, the inventory fails,
/// or the context is cancelled.
pub fn execute_group<I: Inventory + ?Sized>(
    inventory: &I,
    group: &DynamicGroup,
    request: &ExecuteRequest,
    limits: &GroupLimits,
    context: &ExecutionContext,
) -> Result<ExecuteResult, ExecuteError> {
    validate_page(&request.page, limits)?;
    validate_fields(&request.fields)?;
    context.checkpoint()?;

    let model = inventory.model()?;
    let target = model
        .object(&group.obj_id)
        .ok_or_else(|| ValidationError::UnknownObject(group.obj_id.to_string()))?;
    validate_conditions(
        &model,
        &group.obj_id,
        &request.variable_condition,
        "variable_condition",
        limits,
    )?;
    let variable = select_variable(&group.info.variable_condition, &request.variable_condition);
    let effective = merge_conditions(&group.info.condition, variable);

    let resolution = TopologyResolver::new(inventory, &model, group.app_id, context)
        .resolve(&group.obj_id, &effective)?;
    let mut rows = dedup_by_field(resolution.records, &target.id_field);
    sort_records(&mut rows, &request.page.sort_keys());
    let total = rows.len();
    let (start, end) = request.page.window(total);
    let info = rows
        .drain(start .. end)
        .map(|record| project_record(record, &request.fields, &target.id_field))
        .collect();
    let count = if request.disable_counter { 0 } else { u64::try_from(total).unwrap_or(u64::MAX) };
    Ok(ExecuteResult {
        count,
        info,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
