// 🔢 Numeric Coercion - strict parsing with an explicit missing marker
//
// Source tables mix plain numbers ("83.2"), formatted counts ("1,234") and
// composite strings ("1,234 (1,000–1,500)"). Anything that does not end up as
// a finite number is Missing, never zero.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// VALUE
// ============================================================================

/// A numeric cell after coercion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    #[default]
    Missing,
}

impl Value {
    /// Wrap a float, rejecting NaN and infinities.
    pub fn from_f64(number: f64) -> Self {
        if number.is_finite() {
            Value::Number(number)
        } else {
            Value::Missing
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Missing => None,
        }
    }
}

/// Missing renders as an empty string so it becomes an empty CSV field.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Missing => Ok(()),
        }
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        value.map(Value::from_f64).unwrap_or(Value::Missing)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a whole cell as a number.
///
/// Thousands separators are stripped; surrounding whitespace is ignored.
pub fn parse_number(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Missing;
    }

    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(n) => Value::from_f64(n),
        Err(_) => Value::Missing,
    }
}

/// Parse only the first whitespace-delimited token of a cell.
///
/// Example: `"1,234 (1,000–1,500)"` → `1234`
pub fn parse_leading_number(raw: &str) -> Value {
    match raw.split_whitespace().next() {
        Some(token) => parse_number(token),
        None => Value::Missing,
    }
}

// ============================================================================
// TESTS
// ============================================================================
