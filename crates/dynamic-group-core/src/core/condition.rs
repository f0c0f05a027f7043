// crates/dynamic-group-core/src/core/condition.rs
// ============================================================================
// Module: Dynamic Group Conditions
// Description: Object-scoped filter clauses and their operator vocabulary.
// Purpose: Model stored and runtime conditions with stable wire names.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A condition is an ordered list of [`ConditionScope`] entries. Each scope
//! targets one object type and holds clauses that are ANDed together. Scopes
//! for different objects are combined through the topology when a group is
//! executed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ObjectId;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Clause operator using the CMDB database operator names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Field equals the value.
    #[serde(rename = "$eq")]
    Equal,
    /// Field does not equal the value.
    #[serde(rename = "$ne")]
    NotEqual,
    /// Field equals one of the listed values.
    #[serde(rename = "$in")]
    In,
    /// Field equals none of the listed values.
    #[serde(rename = "$nin")]
    NotIn,
    /// Field is strictly less than the value.
    #[serde(rename = "$lt")]
    LessThan,
    /// Field is less than or equal to the value.
    #[serde(rename = "$lte")]
    LessThanOrEqual,
    /// Field is strictly greater than the value.
    #[serde(rename = "$gt")]
    GreaterThan,
    /// Field is greater than or equal to the value.
    #[serde(rename = "$gte")]
    GreaterThanOrEqual,
    /// Field matches the regular expression.
    #[serde(rename = "$regex")]
    Regex,
    /// Field contains the value, ignoring case.
    #[serde(rename = "contains")]
    Contains,
}

impl Operator {
    /// Returns the wire label for this operator.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Equal => "$eq",
            Self::NotEqual => "$ne",
            Self::In => "$in",
            Self::NotIn => "$nin",
            Self::LessThan => "$lt",
            Self::LessThanOrEqual => "$lte",
            Self::GreaterThan => "$gt",
            Self::GreaterThanOrEqual => "$gte",
            Self::Regex => "$regex",
            Self::Contains => "contains",
        }
    }

    /// Returns true when the operator expects an array of candidate values.
    #[must_use]
    pub const fn is_set_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Returns true when the operator orders values.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::LessThanOrEqual | Self::GreaterThan | Self::GreaterThanOrEqual
        )
    }

    /// Returns true when the operator matches text patterns.
    #[must_use]
    pub const fn is_pattern(self) -> bool {
        matches!(self, Self::Regex | Self::Contains)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Clauses
// ============================================================================

/// Atomic `field operator value` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Attribute name on the scoped object.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Comparison operand, typed per field and operator.
    pub value: Value,
}

impl Clause {
    /// Creates a new clause.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Clauses scoped to one object type, ANDed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionScope {
    /// Object type the clauses apply to.
    #[serde(rename = "bk_obj_id")]
    pub obj_id: ObjectId,
    /// Clauses evaluated against instances of `obj_id`.
    #[serde(rename = "condition", default)]
    pub clauses: Vec<Clause>,
}

impl ConditionScope {
    /// Creates a new scope for the given object.
    #[must_use]
    pub fn new(obj_id: impl Into<ObjectId>, clauses: Vec<Clause>) -> Self {
        Self {
            obj_id: obj_id.into(),
            clauses,
        }
    }
}

/// Stored filter definition of a dynamic group.
///
/// # Invariants
/// - `condition` is validated against the group target before persistence.
/// - `variable_condition` is the default runtime refinement; an execute call
///   may replace it for that call only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Persisted base condition.
    #[serde(default)]
    pub condition: Vec<ConditionScope>,
    /// Default runtime refinement applied when execute supplies none.
    #[serde(default)]
    pub variable_condition: Vec<ConditionScope>,
}
