// crates/dynamic-group-core/src/runtime/validator.rs
// ============================================================================
// Module: Condition Validator
// Description: Validation of group names, targets, conditions, and paging.
// Purpose: Reject invalid definitions before any store mutation or query.
// Dependencies: crate::core, crate::runtime::operator, thiserror
// ============================================================================

//! ## Overview
//! Validation runs against a snapshot of the [`ObjectModel`]. A condition
//! scope may reference the target object, one of its mainline ancestors, or a
//! non-mainline object the target links to. Every clause field must be a
//! declared attribute of its scope object, and the operator and operand must
//! fit the attribute's property type. Validation is all-or-nothing: the first
//! violation is returned and nothing is applied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::BasePage;
use crate::core::Clause;
use crate::core::ConditionScope;
use crate::core::GroupInfo;
use crate::core::ObjectDefinition;
use crate::core::ObjectId;
use crate::core::ObjectModel;
use crate::core::Operator;
use crate::core::ValueKind;
use crate::core::metadata::HOST;
use crate::core::metadata::SET;
use crate::runtime::operator::compile_pattern;
use crate::runtime::operator::is_temporal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum page size.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 1000;
/// Default maximum group name length in characters.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 256;
/// Default maximum number of scopes per condition list.
pub const DEFAULT_MAX_CONDITION_SCOPES: usize = 20;
/// Default maximum number of clauses per scope.
pub const DEFAULT_MAX_CLAUSES_PER_SCOPE: usize = 50;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Limits applied by validation and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLimits {
    /// Maximum page size for search and execute.
    pub max_page_size: u64,
    /// Maximum group name length in characters.
    pub max_name_length: usize,
    /// Maximum number of scopes per condition list.
    pub max_condition_scopes: usize,
    /// Maximum number of clauses per scope.
    pub max_clauses_per_scope: usize,
    /// Target objects that groups may be created for and executed against.
    pub executable_targets: Vec<ObjectId>,
}

impl Default for GroupLimits {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            max_condition_scopes: DEFAULT_MAX_CONDITION_SCOPES,
            max_clauses_per_scope: DEFAULT_MAX_CLAUSES_PER_SCOPE,
            executable_targets: vec![ObjectId::new(HOST), ObjectId::new(SET)],
        }
    }
}

impl GroupLimits {
    /// Returns true when groups may target the object.
    #[must_use]
    pub fn is_executable(&self, obj_id: &ObjectId) -> bool {
        self.executable_targets.iter().any(|target| target == obj_id)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failures surfaced to callers.
///
/// # Invariants
/// - Variants are stable for error-code mapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Business identifier is zero.
    #[error("invalid parameter bk_biz_id: must be greater than zero")]
    InvalidApp,
    /// Group name is empty or too long.
    #[error("invalid parameter name: {0}")]
    InvalidName(String),
    /// Object is not declared in the model.
    #[error("unknown object: {0}")]
    UnknownObject(String),
    /// Object cannot be a group target.
    #[error("unsupported target object: {0}")]
    UnsupportedTarget(String),
    /// Object is declared but not reachable from the target.
    #[error("object {obj_id} is not reachable from target {target}")]
    UnreachableObject {
        /// Scope object.
        obj_id: String,
        /// Group target object.
        target: String,
    },
    /// Field is not a declared attribute of the scope object.
    #[error("unknown field {field} on object {obj_id}")]
    UnknownField {
        /// Scope object.
        obj_id: String,
        /// Clause field.
        field: String,
    },
    /// Operator or operand does not fit the field type.
    #[error("operator {operator} does not fit field {field} on object {obj_id}: {reason}")]
    OperatorMismatch {
        /// Scope object.
        obj_id: String,
        /// Clause field.
        field: String,
        /// Clause operator.
        operator: Operator,
        /// Failure reason.
        reason: String,
    },
    /// Required condition list or scope is empty.
    #[error("invalid parameter {0}: must not be empty")]
    EmptyCondition(String),
    /// List exceeds its configured size.
    #[error("invalid parameter {path}: at most {max} entries allowed")]
    TooManyEntries {
        /// Parameter path.
        path: String,
        /// Maximum allowed entries.
        max: usize,
    },
    /// Page limit is zero or above the maximum.
    #[error("page limit {limit} must be between 1 and {max}")]
    PageLimit {
        /// Requested limit.
        limit: u64,
        /// Maximum page size.
        max: u64,
    },
    /// Parameter is missing or malformed.
    #[error("invalid parameter {0}")]
    InvalidParam(String),
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a group name and returns the trimmed value.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] when the name is blank or too long.
pub fn validate_name(name: &str, limits: &GroupLimits) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidName("must be non-empty".to_string()));
    }
    if trimmed.chars().count() > limits.max_name_length {
        return Err(ValidationError::InvalidName(format!(
            "exceeds {} characters",
            limits.max_name_length
        )));
    }
    Ok(trimmed.to_string())
}

/// Validates that an object can be a group target.
///
/// # Errors
///
/// Returns [`ValidationError`] when the object is unknown, is not a mainline
/// descendant of the root, or is not in the executable target list.
pub fn validate_target<'a>(
    model: &'a ObjectModel,
    target: &ObjectId,
    limits: &GroupLimits,
) -> Result<&'a ObjectDefinition, ValidationError> {
    let definition =
        model.object(target).ok_or_else(|| ValidationError::UnknownObject(target.to_string()))?;
    let position = model
        .mainline_position(target)
        .ok_or_else(|| ValidationError::UnsupportedTarget(target.to_string()))?;
    if position == 0 || !limits.is_executable(target) {
        return Err(ValidationError::UnsupportedTarget(target.to_string()));
    }
    Ok(definition)
}

/// Validates a stored group definition against its target.
///
/// The base condition must be non-empty; the variable condition may be empty.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_info(
    model: &ObjectModel,
    target: &ObjectId,
    info: &GroupInfo,
    limits: &GroupLimits,
) -> Result<(), ValidationError> {
    if info.condition.is_empty() {
        return Err(ValidationError::EmptyCondition("info.condition".to_string()));
    }
    validate_conditions(model, target, &info.condition, "info.condition", limits)?;
    validate_conditions(model, target, &info.variable_condition, "info.variable_condition", limits)
}

/// Validates a condition list against a target object.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_conditions(
    model: &ObjectModel,
    target: &ObjectId,
    scopes: &[ConditionScope],
    path: &str,
    limits: &GroupLimits,
) -> Result<(), ValidationError> {
    if scopes.len() > limits.max_condition_scopes {
        return Err(ValidationError::TooManyEntries {
            path: path.to_string(),
            max: limits.max_condition_scopes,
        });
    }
    let target_definition =
        model.object(target).ok_or_else(|| ValidationError::UnknownObject(target.to_string()))?;
    let ancestors = model.ancestors(target).unwrap_or_default();
    for (index, scope) in scopes.iter().enumerate() {
        let Some(scope_definition) = model.object(&scope.obj_id) else {
            return Err(ValidationError::UnknownObject(scope.obj_id.to_string()));
        };
        let reachable = scope.obj_id == *target
            || ancestors.contains(&scope.obj_id)
            || target_definition.link_to(&scope.obj_id).is_some();
        if !reachable {
            return Err(ValidationError::UnreachableObject {
                obj_id: scope.obj_id.to_string(),
                target: target.to_string(),
            });
        }
        let scope_path = format!("{path}[{index}].condition");
        if scope.clauses.is_empty() {
            return Err(ValidationError::EmptyCondition(scope_path));
        }
        if scope.clauses.len() > limits.max_clauses_per_scope {
            return Err(ValidationError::TooManyEntries {
                path: scope_path,
                max: limits.max_clauses_per_scope,
            });
        }
        for clause in &scope.clauses {
            validate_clause(scope_definition, clause)?;
        }
    }
    Ok(())
}

/// Validates one clause against the scope object definition.
fn validate_clause(definition: &ObjectDefinition, clause: &Clause) -> Result<(), ValidationError> {
    let attribute =
        definition.attribute(&clause.field).ok_or_else(|| ValidationError::UnknownField {
            obj_id: definition.obj_id.to_string(),
            field: clause.field.clone(),
        })?;
    check_operand(attribute.property_type.kind(), clause.operator, &clause.value).map_err(
        |reason| ValidationError::OperatorMismatch {
            obj_id: definition.obj_id.to_string(),
            field: clause.field.clone(),
            operator: clause.operator,
            reason,
        },
    )
}

/// Checks operator and operand compatibility with a value family.
fn check_operand(kind: ValueKind, operator: Operator, value: &Value) -> Result<(), String> {
    match operator {
        Operator::Equal | Operator::NotEqual => {
            if value.is_null() || scalar_fits(kind, value) {
                Ok(())
            } else {
                Err(format!("expected a {} operand", kind_label(kind)))
            }
        }
        Operator::In | Operator::NotIn => {
            let Value::Array(items) = value else {
                return Err("expected an array operand".to_string());
            };
            if items.iter().all(|item| scalar_fits(kind, item)) {
                Ok(())
            } else {
                Err(format!("expected {} array elements", kind_label(kind)))
            }
        }
        Operator::LessThan
        | Operator::LessThanOrEqual
        | Operator::GreaterThan
        | Operator::GreaterThanOrEqual => {
            if !matches!(kind, ValueKind::Integer | ValueKind::Number | ValueKind::Temporal) {
                return Err("field type is not ordered".to_string());
            }
            if scalar_fits(kind, value) {
                Ok(())
            } else {
                Err(format!("expected a {} operand", kind_label(kind)))
            }
        }
        Operator::Regex | Operator::Contains => {
            if kind != ValueKind::Text {
                return Err("field type is not text".to_string());
            }
            compile_pattern(operator, value).map(|_| ())
        }
    }
}

/// Returns true when a scalar operand fits the value family.
fn scalar_fits(kind: ValueKind, value: &Value) -> bool {
    match kind {
        ValueKind::Text => value.is_string(),
        ValueKind::Integer => value.is_i64() || value.is_u64(),
        ValueKind::Number => value.is_number(),
        ValueKind::Temporal => value.as_str().is_some_and(is_temporal),
        ValueKind::Boolean => value.is_boolean(),
    }
}

/// Returns a human-readable label for a value family.
const fn kind_label(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Text => "string",
        ValueKind::Integer => "integer",
        ValueKind::Number => "number",
        ValueKind::Temporal => "date or time",
        ValueKind::Boolean => "boolean",
    }
}

/// Validates paging bounds.
///
/// # Errors
///
/// Returns [`ValidationError::PageLimit`] when the limit is zero or above the
/// maximum page size.
pub const fn validate_page(page: &BasePage, limits: &GroupLimits) -> Result<(), ValidationError> {
    if page.limit == 0 || page.limit > limits.max_page_size {
        return Err(ValidationError::PageLimit {
            limit: page.limit,
            max: limits.max_page_size,
        });
    }
    Ok(())
}

/// Validates an execute projection list.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidParam`] when a field name is blank.
pub fn validate_fields(fields: &[String]) -> Result<(), ValidationError> {
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(ValidationError::InvalidParam("fields".to_string()));
    }
    Ok(())
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
    use crate::core::metadata::MODULE;
    use crate::core::metadata::PLAT;

    fn scope(obj: &str, clauses: Vec<Clause>) -> ConditionScope {
        ConditionScope::new(obj, clauses)
    }

    fn validate(target: &str, scopes: &[ConditionScope]) -> Result<(), ValidationError> {
        let model = ObjectModel::cmdb_default();
        let limits = GroupLimits::default();
        validate_conditions(&model, &ObjectId::new(target), scopes, "info.condition", &limits)
    }

    #[test]
    fn host_target_accepts_ancestor_and_linked_scopes() {
        let scopes = vec![
            scope(HOST, vec![Clause::new("bk_os_name", Operator::Contains, json!("linux"))]),
            scope(MODULE, vec![Clause::new("bk_module_name", Operator::In, json!(["idle"]))]),
            scope(PLAT, vec![Clause::new("bk_cloud_id", Operator::Equal, json!(0))]),
        ];
        assert_eq!(validate(HOST, &scopes), Ok(()));
    }

    #[test]
    fn set_target_rejects_descendant_scope() {
        let clause = Clause::new("bk_module_name", Operator::Equal, json!("a"));
        let scopes = vec![scope(MODULE, vec![clause])];
        assert!(matches!(validate(SET, &scopes), Err(ValidationError::UnreachableObject { .. })));
    }

    #[test]
    fn unknown_object_and_field_are_reported() {
        let scopes = vec![scope("switch", vec![Clause::new("name", Operator::Equal, json!("a"))])];
        let unknown = ValidationError::UnknownObject("switch".to_string());
        assert_eq!(validate(HOST, &scopes), Err(unknown));
        let clause = Clause::new("bk_missing", Operator::Equal, json!("a"));
        let scopes = vec![scope(HOST, vec![clause])];
        assert!(matches!(validate(HOST, &scopes), Err(ValidationError::UnknownField { .. })));
    }

    #[test]
    fn operator_type_mismatches_are_rejected() {
        let cases = vec![
            Clause::new("bk_cpu_architecture", Operator::In, json!("x86")),
            Clause::new("bk_cpu", Operator::Contains, json!("8")),
            Clause::new("bk_os_name", Operator::GreaterThan, json!("a")),
            Clause::new("bk_cloud_id", Operator::Equal, json!("0")),
            Clause::new("bk_cpu", Operator::Equal, json!(1.5)),
            Clause::new("create_time", Operator::LessThan, json!("yesterday")),
            Clause::new("create_time", Operator::GreaterThan, json!("2024-1-9")),
            Clause::new("bk_agent_alive", Operator::In, json!([1])),
        ];
        for clause in cases {
            let result = validate(HOST, &[scope(HOST, vec![clause.clone()])]);
            assert!(
                matches!(result, Err(ValidationError::OperatorMismatch { .. })),
                "expected mismatch for {clause:?}"
            );
        }
    }

    #[test]
    fn compatible_operands_are_accepted() {
        let clauses = vec![
            Clause::new("bk_cpu", Operator::GreaterThanOrEqual, json!(4)),
            Clause::new("bk_host_load", Operator::LessThan, json!(0.75)),
            Clause::new("create_time", Operator::GreaterThan, json!("2024-01-01")),
            Clause::new("bk_os_name", Operator::Regex, json!("^cc_os[0-9]$")),
            Clause::new("bk_agent_alive", Operator::Equal, json!(true)),
            Clause::new("bk_os_name", Operator::NotEqual, Value::Null),
        ];
        assert_eq!(validate(HOST, &[scope(HOST, clauses)]), Ok(()));
    }

    #[test]
    fn empty_scope_and_oversized_lists_are_rejected() {
        assert_eq!(
            validate(HOST, &[scope(HOST, Vec::new())]),
            Err(ValidationError::EmptyCondition("info.condition[0].condition".to_string()))
        );
        let clause = Clause::new("bk_cpu", Operator::Equal, json!(1));
        let scopes = vec![scope(HOST, vec![clause]); DEFAULT_MAX_CONDITION_SCOPES + 1];
        assert!(matches!(validate(HOST, &scopes), Err(ValidationError::TooManyEntries { .. })));
    }

    #[test]
    fn info_requires_base_condition() {
        let model = ObjectModel::cmdb_default();
        let limits = GroupLimits::default();
        let result = validate_info(&model, &ObjectId::new(HOST), &GroupInfo::default(), &limits);
        assert_eq!(result, Err(ValidationError::EmptyCondition("info.condition".to_string())));
    }

    #[test]
    fn targets_must_be_executable_mainline_objects() {
        let model = ObjectModel::cmdb_default();
        let limits = GroupLimits::default();
        assert!(validate_target(&model, &ObjectId::new(HOST), &limits).is_ok());
        assert!(validate_target(&model, &ObjectId::new(SET), &limits).is_ok());
        for target in ["biz", MODULE, PLAT] {
            assert_eq!(
                validate_target(&model, &ObjectId::new(target), &limits).map(|_| ()),
                Err(ValidationError::UnsupportedTarget(target.to_string()))
            );
        }
        assert_eq!(
            validate_target(&model, &ObjectId::new("switch"), &limits).map(|_| ()),
            Err(ValidationError::UnknownObject("switch".to_string()))
        );
    }

    #[test]
    fn names_and_pages_are_bounded() {
        let limits = GroupLimits::default();
        assert_eq!(validate_name("  cc_group1 ", &limits), Ok("cc_group1".to_string()));
        assert!(validate_name("   ", &limits).is_err());
        assert!(validate_name(&"x".repeat(257), &limits).is_err());
        assert!(validate_page(&BasePage::new(0, 0, ""), &limits).is_err());
        assert!(validate_page(&BasePage::new(0, 1001, ""), &limits).is_err());
        assert!(validate_page(&BasePage::new(0, 1000, ""), &limits).is_ok());
    }
}
