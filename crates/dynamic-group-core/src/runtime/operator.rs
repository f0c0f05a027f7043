// crates/dynamic-group-core/src/runtime/operator.rs
// ============================================================================
// Module: Clause Operator Evaluation
// Description: Compiled clause filters evaluated against instance records.
// Purpose: Decide whether a record satisfies an ANDed list of clauses.
// Dependencies: crate::core, bigdecimal, regex, time
// ============================================================================

//! ## Overview
//! Clauses are compiled once into a [`ClauseFilter`] and then evaluated
//! against many records. Matching follows document-store semantics: an array
//! field matches a scalar operand when any element matches, and a missing
//! field compares equal only to `null`. Numeric comparison is decimal-aware;
//! string ordering tries RFC3339 timestamps and dates before falling back to
//! lexicographic order. Sorting uses [`sort_cmp`], which keeps that ordering
//! but stays total when temporal and plain strings are mixed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use regex::Regex;
use regex::RegexBuilder;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::core::Clause;
use crate::core::Operator;
use crate::core::Record;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Compiled size limit for pattern operators.
const MAX_PATTERN_SIZE: usize = 1 << 20;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Clause compilation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClauseError {
    /// Operand shape does not fit the operator.
    #[error("invalid operand for {operator} on {field}: {reason}")]
    InvalidOperand {
        /// Clause field.
        field: String,
        /// Clause operator.
        operator: Operator,
        /// Failure reason.
        reason: String,
    },
}

// ============================================================================
// SECTION: Compiled Filters
// ============================================================================

/// Operand prepared for evaluation.
#[derive(Debug, Clone)]
enum Matcher {
    /// Equality against a scalar.
    Equal(Value),
    /// Inequality against a scalar.
    NotEqual(Value),
    /// Membership in a candidate list.
    In(Vec<Value>),
    /// Non-membership in a candidate list.
    NotIn(Vec<Value>),
    /// Ordering comparison against a scalar.
    Ordering(Operator, Value),
    /// Text pattern match.
    Pattern(Regex),
}

/// Clause compiled against its operator.
#[derive(Debug, Clone)]
struct CompiledClause {
    /// Record field to read.
    field: String,
    /// Prepared operand.
    matcher: Matcher,
}

/// ANDed list of compiled clauses.
#[derive(Debug, Clone, Default)]
pub struct ClauseFilter {
    /// Compiled clauses; an empty list matches every record.
    clauses: Vec<CompiledClause>,
}

impl ClauseFilter {
    /// Compiles clauses into a reusable filter.
    ///
    /// # Errors
    ///
    /// Returns [`ClauseError`] when an operand does not fit its operator.
    pub fn compile(clauses: &[Clause]) -> Result<Self, ClauseError> {
        let clauses = clauses
            .iter()
            .map(|clause| {
                Ok(CompiledClause {
                    field: clause.field.clone(),
                    matcher: compile_matcher(clause)?,
                })
            })
            .collect::<Result<Vec<_>, ClauseError>>()?;
        Ok(Self {
            clauses,
        })
    }

    /// Returns true when the record satisfies every clause.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record.get(&clause.field)))
    }

    /// Returns true when the filter has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl CompiledClause {
    /// Evaluates the clause against a field value.
    fn matches(&self, actual: Option<&Value>) -> bool {
        match &self.matcher {
            Matcher::Equal(expected) => field_equals(actual, expected),
            Matcher::NotEqual(expected) => !field_equals(actual, expected),
            Matcher::In(candidates) => field_in(actual, candidates),
            Matcher::NotIn(candidates) => !field_in(actual, candidates),
            Matcher::Ordering(operator, expected) => {
                any_element(actual, |value| ordering_holds(*operator, value, expected))
            }
            Matcher::Pattern(regex) => {
                any_element(actual, |value| value.as_str().is_some_and(|text| regex.is_match(text)))
            }
        }
    }
}

/// Prepares the operand of a single clause.
fn compile_matcher(clause: &Clause) -> Result<Matcher, ClauseError> {
    let invalid = |reason: &str| ClauseError::InvalidOperand {
        field: clause.field.clone(),
        operator: clause.operator,
        reason: reason.to_string(),
    };
    match clause.operator {
        Operator::Equal | Operator::NotEqual => {
            if matches!(clause.value, Value::Array(_) | Value::Object(_)) {
                return Err(invalid("expected a scalar operand"));
            }
            if clause.operator == Operator::Equal {
                Ok(Matcher::Equal(clause.value.clone()))
            } else {
                Ok(Matcher::NotEqual(clause.value.clone()))
            }
        }
        Operator::In | Operator::NotIn => {
            let Value::Array(items) = &clause.value else {
                return Err(invalid("expected an array operand"));
            };
            if items.iter().any(|item| matches!(item, Value::Array(_) | Value::Object(_))) {
                return Err(invalid("expected scalar array elements"));
            }
            if clause.operator == Operator::In {
                Ok(Matcher::In(items.clone()))
            } else {
                Ok(Matcher::NotIn(items.clone()))
            }
        }
        Operator::LessThan
        | Operator::LessThanOrEqual
        | Operator::GreaterThan
        | Operator::GreaterThanOrEqual => match &clause.value {
            Value::Number(_) | Value::String(_) => {
                Ok(Matcher::Ordering(clause.operator, clause.value.clone()))
            }
            _ => Err(invalid("expected a number or string operand")),
        },
        Operator::Regex | Operator::Contains => {
            compile_pattern(clause.operator, &clause.value).map(Matcher::Pattern).map_err(|reason| {
                ClauseError::InvalidOperand {
                    field: clause.field.clone(),
                    operator: clause.operator,
                    reason,
                }
            })
        }
    }
}

/// Compiles the regular expression behind a pattern operator.
///
/// `contains` escapes its operand and matches case-insensitively.
///
/// # Errors
///
/// Returns a reason string when the operand is not a usable pattern.
pub fn compile_pattern(operator: Operator, value: &Value) -> Result<Regex, String> {
    let Value::String(text) = value else {
        return Err("expected a string operand".to_string());
    };
    if text.is_empty() {
        return Err("pattern must be non-empty".to_string());
    }
    let mut builder = match operator {
        Operator::Contains => {
            let mut builder = RegexBuilder::new(&regex::escape(text));
            builder.case_insensitive(true);
            builder
        }
        Operator::Regex => RegexBuilder::new(text),
        _ => return Err(format!("{operator} is not a pattern operator")),
    };
    builder.size_limit(MAX_PATTERN_SIZE).build().map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Value Semantics
// ============================================================================

/// Applies a predicate to a scalar field or to any element of an array field.
fn any_element(actual: Option<&Value>, predicate: impl Fn(&Value) -> bool) -> bool {
    match actual {
        None => false,
        Some(Value::Array(items)) => items.iter().any(predicate),
        Some(value) => predicate(value),
    }
}

/// Equality with array-element and missing-field semantics.
fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
        Some(value) => values_equal(value, expected),
    }
}

/// Membership with array-element and missing-field semantics.
fn field_in(actual: Option<&Value>, candidates: &[Value]) -> bool {
    candidates.iter().any(|candidate| field_equals(actual, candidate))
}

/// Compares JSON values for equality, with decimal-aware numeric handling.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left_num), Value::Number(right_num)) => {
            decimal_cmp(left_num, right_num).is_some_and(Ordering::is_eq)
        }
        _ => left == right,
    }
}

/// Evaluates an ordering operator between a field value and the operand.
fn ordering_holds(operator: Operator, actual: &Value, expected: &Value) -> bool {
    let Some(ordering) = scalar_cmp(actual, expected) else {
        return false;
    };
    match operator {
        Operator::LessThan => ordering.is_lt(),
        Operator::LessThanOrEqual => ordering.is_le(),
        Operator::GreaterThan => ordering.is_gt(),
        Operator::GreaterThanOrEqual => ordering.is_ge(),
        _ => false,
    }
}

/// Orders two scalars of the same family; `None` when they are incomparable.
#[must_use]
pub fn scalar_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => decimal_cmp(left, right),
        (Value::String(left), Value::String(right)) => {
            Some(temporal_cmp(left, right).unwrap_or_else(|| left.cmp(right)))
        }
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// Total order over two values of the same JSON type, used for sorting.
///
/// Strings that parse as RFC3339 timestamps or dates sort first, by instant
/// and then by text; every other string follows in byte order. Arrays and
/// objects compare equal.
#[must_use]
pub fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(left_num), Value::Number(right_num)) => decimal_cmp(left_num, right_num)
            .unwrap_or_else(|| left_num.to_string().cmp(&right_num.to_string())),
        (Value::String(left), Value::String(right)) => {
            string_sort_key(left).cmp(&string_sort_key(right))
        }
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        _ => Ordering::Equal,
    }
}

/// Sort key for strings: temporal values first, then plain text.
fn string_sort_key(value: &str) -> (bool, Option<OffsetDateTime>, &str) {
    let instant = temporal_instant(value);
    (instant.is_none(), instant, value)
}

/// Returns the instant of an RFC3339 timestamp, or midnight UTC of a date.
fn temporal_instant(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .or_else(|| parse_rfc3339_date(value).map(|date| date.midnight().assume_utc()))
}

/// Orders numeric JSON values using decimal-aware comparison.
fn decimal_cmp(left: &Number, right: &Number) -> Option<Ordering> {
    let left = decimal_from_number(left)?;
    let right = decimal_from_number(right)?;
    Some(left.cmp(&right))
}

/// Parses a JSON number into `BigDecimal` with a stable string representation.
fn decimal_from_number(number: &Number) -> Option<BigDecimal> {
    let rendered = number.to_string();
    BigDecimal::from_str(&rendered).ok()
}

/// Compares RFC3339 date-time or date-only strings.
fn temporal_cmp(left: &str, right: &str) -> Option<Ordering> {
    if let (Ok(left), Ok(right)) =
        (OffsetDateTime::parse(left, &Rfc3339), OffsetDateTime::parse(right, &Rfc3339))
    {
        return Some(left.cmp(&right));
    }
    let left = parse_rfc3339_date(left)?;
    let right = parse_rfc3339_date(right)?;
    Some(left.cmp(&right))
}

/// Parses an RFC3339 full-date value (zero-padded `YYYY-MM-DD`).
fn parse_rfc3339_date(value: &str) -> Option<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

/// Returns true when the string parses as an RFC3339 timestamp or date.
#[must_use]
pub fn is_temporal(value: &str) -> bool {
    OffsetDateTime::parse(value, &Rfc3339).is_ok() || parse_rfc3339_date(value).is_some()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
