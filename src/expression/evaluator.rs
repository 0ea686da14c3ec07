//! Expression evaluator for `${...}` substitutions.
//!
//! Evaluates arithmetic chains over integer-valued properties plus the two
//! built-in functions `count` and `servicePidOrFilter`. Syntactic
//! malformation, trailing input, and numeric failures all produce an absent
//! result ("substitution could not be performed"); declared lookup failures
//! propagate unchanged.

use super::scanner::{ExpressionScanner, NumericOverflow};
use crate::error::{ConfigError, Result};

/// Service-identifier property used in generated filters.
pub const SERVICE_PID_ATTRIBUTE: &str = "service.pid";

/// Filter matching no service identifier.
pub const UNBOUND_FILTER: &str = "(service.pid=unbound)";

/// A resolved property value as seen by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    List(Vec<Value>),
}

impl Value {
    /// String form of a resolved value: lists join with `", "`, escaping
    /// embedded backslashes and commas so the joined form can round-trip.
    pub fn to_property_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::List(items) => items
                .iter()
                .map(|v| escape_list_value(&v.to_property_string()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::Str).collect())
    }
}

/// Escape `\` and `,` in one list item.
fn escape_list_value(value: &str) -> String {
    if !value.contains(['\\', ',']) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if c == '\\' || c == ',' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Property-lookup capability injected into expression evaluation.
///
/// Lookups may mutate resolution state (memoization, cycle stack), hence
/// `&mut self`. Both methods may signal a declared failure that propagates
/// out of the evaluator unchanged.
pub trait PropertyLookup {
    /// The value of the named property as a string, or `None` when absent.
    fn get_property(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.get_property_object(name)?.map(|v| v.to_property_string()))
    }

    /// The raw value of the named property, or `None` when absent.
    fn get_property_object(&mut self, name: &str) -> Result<Option<Value>>;
}

/// An LDAP-style equality filter on the service-identifier property.
pub fn create_property_filter(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("({SERVICE_PID_ATTRIBUTE}={escaped})")
}

/// Internal evaluation failure, kept distinct from declared lookup errors.
enum Failure {
    /// Malformed or non-arithmetic content; the caller substitutes nothing.
    NoMatch,
    /// Overflowing literal, divide-by-zero, or non-numeric operand.
    Numeric,
    /// Declared failure from the lookup capability; propagates.
    Lookup(ConfigError),
}

impl From<NumericOverflow> for Failure {
    fn from(_: NumericOverflow) -> Self {
        Failure::Numeric
    }
}

type EvalResult<T> = std::result::Result<T, Failure>;

/// Evaluate one pre-extracted expression.
///
/// Returns `Ok(Some(text))` with the substitution result, `Ok(None)` when
/// the expression could not be evaluated (the caller leaves the literal
/// `${...}` in place), or a declared lookup error.
pub fn evaluate_expression(lookup: &mut dyn PropertyLookup, expr: &str) -> Result<Option<String>> {
    match evaluate(lookup, expr) {
        Ok(value) => Ok(Some(value)),
        Err(Failure::NoMatch) | Err(Failure::Numeric) => Ok(None),
        Err(Failure::Lookup(e)) => Err(e),
    }
}

fn evaluate(lookup: &mut dyn PropertyLookup, expr: &str) -> EvalResult<String> {
    let mut scanner = ExpressionScanner::new(expr);

    let mut acc = if let Some(name) = scanner.scan_name() {
        if scanner.scan_char('(') {
            let arg = scanner.scan_filter_argument().ok_or(Failure::NoMatch)?;
            if !scanner.scan_char(')') {
                return Err(Failure::NoMatch);
            }
            match name {
                "count" => count(lookup, arg)?,
                // Only valid as the entire expression.
                "servicePidOrFilter" => {
                    if !scanner.at_end() {
                        return Err(Failure::NoMatch);
                    }
                    return service_pid_or_filter(lookup, arg);
                }
                _ => return Err(Failure::NoMatch),
            }
        } else {
            integer_property(lookup, name)?
        }
    } else if let Some(literal) = scanner.scan_long()? {
        literal
    } else {
        return Err(Failure::NoMatch);
    };

    // Left-to-right fold, no operator precedence.
    while !scanner.at_end() {
        let op = scanner.scan_operator().ok_or(Failure::NoMatch)?;
        let operand = scan_operand(lookup, &mut scanner)?;
        acc = apply(op, acc, operand)?;
    }
    Ok(acc.to_string())
}

fn scan_operand(lookup: &mut dyn PropertyLookup, scanner: &mut ExpressionScanner<'_>) -> EvalResult<i64> {
    if let Some(name) = scanner.scan_name() {
        if scanner.scan_char('(') {
            let arg = scanner.scan_filter_argument().ok_or(Failure::NoMatch)?;
            if !scanner.scan_char(')') {
                return Err(Failure::NoMatch);
            }
            if name == "count" {
                return count(lookup, arg);
            }
            // servicePidOrFilter inside an arithmetic chain is rejected.
            return Err(Failure::NoMatch);
        }
        return integer_property(lookup, name);
    }
    if let Some(literal) = scanner.scan_long()? {
        return Ok(literal);
    }
    Err(Failure::NoMatch)
}

fn apply(op: char, left: i64, right: i64) -> EvalResult<i64> {
    // Arithmetic wraps; only literal parsing and division fail numerically.
    Ok(match op {
        '+' => left.wrapping_add(right),
        '-' => left.wrapping_sub(right),
        '*' => left.wrapping_mul(right),
        '/' => {
            if right == 0 {
                return Err(Failure::Numeric);
            }
            left.wrapping_div(right)
        }
        _ => return Err(Failure::NoMatch),
    })
}

fn integer_property(lookup: &mut dyn PropertyLookup, name: &str) -> EvalResult<i64> {
    let value = lookup.get_property(name).map_err(Failure::Lookup)?;
    let Some(value) = value else {
        return Err(Failure::NoMatch);
    };
    value.parse::<i64>().map_err(|_| Failure::Numeric)
}

fn count(lookup: &mut dyn PropertyLookup, name: &str) -> EvalResult<i64> {
    let value = lookup.get_property_object(name).map_err(Failure::Lookup)?;
    Ok(match value {
        None => 0,
        Some(Value::List(items)) => items.len() as i64,
        Some(_) => 1,
    })
}

fn service_pid_or_filter(lookup: &mut dyn PropertyLookup, name: &str) -> EvalResult<String> {
    let value = lookup.get_property_object(name).map_err(Failure::Lookup)?;
    let pids: Vec<String> = match value {
        None => return Ok(UNBOUND_FILTER.to_string()),
        Some(Value::Str(s)) => vec![s],
        Some(Value::List(items)) => {
            let mut pids = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Str(s) => pids.push(s),
                    // A non-string element fails the substitution.
                    _ => return Err(Failure::NoMatch),
                }
            }
            pids
        }
        Some(Value::Int(_)) => return Err(Failure::NoMatch),
    };
    Ok(match pids.len() {
        0 => UNBOUND_FILTER.to_string(),
        1 => create_property_filter(&pids[0]),
        _ => {
            let clauses: String = pids.iter().map(|p| create_property_filter(p)).collect();
            format!("(|{clauses})")
        }
    })
}
