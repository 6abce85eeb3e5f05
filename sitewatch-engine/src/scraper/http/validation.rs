//! Content checks applied to an HTTP response after its status code passed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dot separated path into a JSON document. Numeric segments index arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JsonPath(String);

impl JsonPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0
            .trim_start_matches('$')
            .split('.')
            .filter(|segment| !segment.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.segments().next().is_none()
    }

    pub fn locate<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in self.segments() {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }
}

impl From<&str> for JsonPath {
    fn from(value: &str) -> Self {
        JsonPath::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl Comparison {
    fn holds(self, actual: u64, expected: u64) -> bool {
        match self {
            Comparison::Equals => actual == expected,
            Comparison::NotEquals => actual != expected,
            Comparison::GreaterThan => actual > expected,
            Comparison::LessThan => actual < expected,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Comparison::Equals => "==",
            Comparison::NotEquals => "!=",
            Comparison::GreaterThan => ">",
            Comparison::LessThan => "<",
        }
    }
}

fn default_case_sensitive() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationCondition {
    StatusCode {
        operator: Comparison,
        value: u16,
    },
    /// Milliseconds until the response headers arrived.
    ResponseTime {
        operator: Comparison,
        value: u64,
    },
    BodyContains {
        text: String,
        #[serde(default = "default_case_sensitive")]
        case_sensitive: bool,
    },
    BodyNotContains {
        text: String,
        #[serde(default = "default_case_sensitive")]
        case_sensitive: bool,
    },
    /// The path must resolve in a JSON body, and equal `equals` when given.
    JsonPath {
        path: JsonPath,
        #[serde(default)]
        equals: Option<Value>,
    },
}

/// What the conditions are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ResponseFacts<'a> {
    pub status: u16,
    pub latency_ms: u64,
    pub body: &'a str,
}

impl ValidationCondition {
    /// Startup check for conditions serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ValidationCondition::ResponseTime { operator, .. }
                if matches!(operator, Comparison::Equals | Comparison::NotEquals) =>
            {
                Err("response_time supports only less_than and greater_than".into())
            }
            ValidationCondition::BodyContains { text, .. }
            | ValidationCondition::BodyNotContains { text, .. }
                if text.is_empty() =>
            {
                Err("body condition text must not be empty".into())
            }
            ValidationCondition::JsonPath { path, .. } if path.is_empty() => {
                Err("json_path must name at least one field".into())
            }
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, facts: &ResponseFacts<'_>) -> Result<(), String> {
        match self {
            ValidationCondition::StatusCode { operator, value } => {
                if operator.holds(u64::from(facts.status), u64::from(*value)) {
                    Ok(())
                } else {
                    Err(format!(
                        "status {} fails {} {}",
                        facts.status,
                        operator.describe(),
                        value
                    ))
                }
            }
            ValidationCondition::ResponseTime { operator, value } => {
                if operator.holds(facts.latency_ms, *value) {
                    Ok(())
                } else {
                    Err(format!(
                        "response time {}ms fails {} {}ms",
                        facts.latency_ms,
                        operator.describe(),
                        value
                    ))
                }
            }
            ValidationCondition::BodyContains {
                text,
                case_sensitive,
            } => {
                if contains(facts.body, text, *case_sensitive) {
                    Ok(())
                } else {
                    Err(format!("body does not contain {text:?}"))
                }
            }
            ValidationCondition::BodyNotContains {
                text,
                case_sensitive,
            } => {
                if contains(facts.body, text, *case_sensitive) {
                    Err(format!("body contains {text:?}"))
                } else {
                    Ok(())
                }
            }
            ValidationCondition::JsonPath { path, equals } => {
                let document: Value = serde_json::from_str(facts.body)
                    .map_err(|err| format!("body is not JSON: {err}"))?;
                let actual = path
                    .locate(&document)
                    .ok_or_else(|| format!("json path {} not found", path.as_str()))?;
                match equals {
                    Some(expected) if !values_equal(actual, expected) => Err(format!(
                        "json path {} is {actual}, expected {expected}",
                        path.as_str()
                    )),
                    _ => Ok(()),
                }
            }
        }
    }
}

fn contains(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(lhs), Value::Number(rhs)) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => (l - r).abs() < f64::EPSILON,
            _ => lhs == rhs,
        },
        _ => left == right,
    }
}

/// Evaluates conditions in order and reports the first failure.
pub fn check_all(conditions: &[ValidationCondition], facts: &ResponseFacts<'_>) -> Result<(), String> {
    conditions
        .iter()
        .try_for_each(|condition| condition.evaluate(facts))
}
