// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event pattern matching
//!
//! A pattern has two parts:
//!
//! - a type pattern over dot-separated segments:
//!   - Exact: `"container.db.unhealthy"`
//!   - Single wildcard: `"container.*.unhealthy"` (`*` is exactly one segment)
//!   - Tail wildcard: `"container.**"` (`**` is zero or more segments)
//!   - Negation: `"!container.**"`
//!   - Regex: `"regex:^container\.(db|cache)\."`
//! - attribute filters over dotted payload paths, ANDed together. A filter is
//!   either a plain value (equality) or an operator object such as
//!   `{"$gt": 5, "$lte": 10}`.
//!
//! `**` ends the walk: once reached, the rest of the event type matches and
//! any pattern segments after it are ignored.

use crate::event::Event;
use crate::payload::Payload;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("event type pattern cannot be empty")]
    Empty,
    #[error("empty segment in pattern '{0}'")]
    EmptySegment(String),
    #[error("wildcard must fill a whole segment in pattern '{0}'")]
    PartialWildcard(String),
    #[error("invalid regex in pattern '{pattern}': {message}")]
    Regex { pattern: String, message: String },
    #[error("unknown operator '{op}' for attribute '{path}'")]
    UnknownOperator { path: String, op: String },
    #[error("operator '{op}' for attribute '{path}' expects {expected}")]
    BadOperand {
        path: String,
        op: String,
        expected: &'static str,
    },
    #[error("empty attribute path")]
    EmptyPath,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    One,
    /// `**`
    Rest,
}

#[derive(Clone, Debug)]
enum TypeMatcher {
    Segments(Vec<Segment>),
    Regex(Regex),
    Not(Box<TypeMatcher>),
}

/// Compiled type pattern
#[derive(Clone, Debug)]
pub struct TypePattern {
    raw: String,
    matcher: TypeMatcher,
}

impl TypePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            raw: pattern.to_string(),
            matcher: Self::compile(pattern)?,
        })
    }

    fn compile(pattern: &str) -> Result<TypeMatcher, PatternError> {
        if pattern.trim().is_empty() {
            return Err(PatternError::Empty);
        }

        if let Some(inner) = pattern.strip_prefix('!') {
            return Ok(TypeMatcher::Not(Box::new(Self::compile(inner)?)));
        }

        if let Some(expr) = pattern.strip_prefix("regex:") {
            if expr.is_empty() {
                return Err(PatternError::Empty);
            }
            let re = Regex::new(expr).map_err(|e| PatternError::Regex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            return Ok(TypeMatcher::Regex(re));
        }

        let mut segments = Vec::new();
        for part in pattern.split('.') {
            let segment = match part {
                "" => return Err(PatternError::EmptySegment(pattern.to_string())),
                "*" => Segment::One,
                "**" => Segment::Rest,
                p if p.contains('*') => {
                    return Err(PatternError::PartialWildcard(pattern.to_string()))
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        if let Some(pos) = segments.iter().position(|s| *s == Segment::Rest) {
            if pos + 1 < segments.len() {
                tracing::warn!(
                    pattern,
                    "segments after '**' are ignored; '**' matches the rest of the type"
                );
            }
        }

        Ok(TypeMatcher::Segments(segments))
    }

    /// Check if this pattern matches an event type
    pub fn matches(&self, event_type: &str) -> bool {
        Self::eval(&self.matcher, event_type)
    }

    fn eval(matcher: &TypeMatcher, event_type: &str) -> bool {
        match matcher {
            TypeMatcher::Segments(segments) => {
                let event_parts: Vec<&str> = event_type.split('.').collect();
                Self::match_segments(segments, &event_parts)
            }
            TypeMatcher::Regex(re) => re.is_match(event_type),
            TypeMatcher::Not(inner) => !Self::eval(inner, event_type),
        }
    }

    fn match_segments(pattern: &[Segment], event: &[&str]) -> bool {
        match (pattern.first(), event.first()) {
            (None, None) => true,
            (Some(Segment::Rest), _) => true, // ** matches everything remaining
            (Some(Segment::One), Some(_)) => Self::match_segments(&pattern[1..], &event[1..]),
            (Some(Segment::Literal(p)), Some(e)) if p == e => {
                Self::match_segments(&pattern[1..], &event[1..])
            }
            _ => false,
        }
    }

    /// True if the pattern contains no wildcards, negation or regex
    pub fn is_literal(&self) -> bool {
        matches!(&self.matcher, TypeMatcher::Segments(s)
            if s.iter().all(|seg| matches!(seg, Segment::Literal(_))))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for TypePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for TypePattern {}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Comparison operator for attribute filters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    In,
    Nin,
    Exists,
}

impl Operator {
    pub fn parse(op: &str) -> Option<Self> {
        let op = op.strip_prefix('$').unwrap_or(op);
        Some(match op {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "contains" => Operator::Contains,
            "in" => Operator::In,
            "nin" => Operator::Nin,
            "exists" => Operator::Exists,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Contains => "$contains",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Exists => "$exists",
        }
    }

    /// Evaluate against the resolved value (`None` if the path is absent)
    pub fn eval(self, actual: Option<&Value>, operand: &Value) -> bool {
        if self == Operator::Exists {
            let wanted = operand.as_bool().unwrap_or(true);
            return actual.is_some() == wanted;
        }

        let Some(actual) = actual else {
            return false;
        };

        match self {
            Operator::Eq => values_equal(actual, operand),
            Operator::Ne => !values_equal(actual, operand),
            Operator::Gt => compare_numbers(actual, operand, Ordering::is_gt),
            Operator::Gte => compare_numbers(actual, operand, Ordering::is_ge),
            Operator::Lt => compare_numbers(actual, operand, Ordering::is_lt),
            Operator::Lte => compare_numbers(actual, operand, Ordering::is_le),
            Operator::Contains => match (actual, operand) {
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                _ => false,
            },
            Operator::In => operand
                .as_array()
                .is_some_and(|items| items.iter().any(|i| values_equal(actual, i))),
            Operator::Nin => operand
                .as_array()
                .is_some_and(|items| !items.iter().any(|i| values_equal(actual, i))),
            Operator::Exists => true,
        }
    }
}

/// JSON equality, treating `1` and `1.0` as equal
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_order(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare_numbers(actual: &Value, operand: &Value, cmp: impl Fn(Ordering) -> bool) -> bool {
    match (actual, operand) {
        (Value::Number(a), Value::Number(b)) => number_order(a, b).is_some_and(cmp),
        _ => false,
    }
}

/// Order two JSON numbers, exactly when both are integers
fn number_order(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    // Negative integer against one above i64::MAX
    if a.as_i64().is_some() && b.as_u64().is_some() {
        return Some(Ordering::Less);
    }
    if a.as_u64().is_some() && b.as_i64().is_some() {
        return Some(Ordering::Greater);
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Filter applied to a single payload path
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeFilter {
    /// Plain value: the attribute must equal it
    Equals(Value),
    /// Operator object: every condition must hold
    Conditions(Vec<(Operator, Value)>),
}

impl AttributeFilter {
    /// Parse the JSON encoding. An object whose keys all start with `$` is
    /// read as operators; anything else is an equality value.
    pub fn from_value(path: &str, value: Value) -> Result<Self, PatternError> {
        let map = match value {
            Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
                map
            }
            other => return Ok(AttributeFilter::Equals(other)),
        };

        let mut conditions = Vec::with_capacity(map.len());
        for (op, operand) in map {
            let operator =
                Operator::parse(&op).ok_or_else(|| PatternError::UnknownOperator {
                    path: path.to_string(),
                    op: op.clone(),
                })?;
            let expected = match operator {
                Operator::In | Operator::Nin if !operand.is_array() => Some("an array"),
                Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
                    if !operand.is_number() =>
                {
                    Some("a number")
                }
                Operator::Exists if !operand.is_boolean() => Some("a boolean"),
                _ => None,
            };
            if let Some(expected) = expected {
                return Err(PatternError::BadOperand {
                    path: path.to_string(),
                    op,
                    expected,
                });
            }
            conditions.push((operator, operand));
        }
        Ok(AttributeFilter::Conditions(conditions))
    }

    pub fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            AttributeFilter::Equals(expected) => {
                actual.is_some_and(|a| values_equal(a, expected))
            }
            AttributeFilter::Conditions(conditions) => conditions
                .iter()
                .all(|(op, operand)| op.eval(actual, operand)),
        }
    }

    /// JSON encoding, inverse of [`AttributeFilter::from_value`]
    pub fn to_value(&self) -> Value {
        match self {
            AttributeFilter::Equals(v) => v.clone(),
            AttributeFilter::Conditions(conditions) => Value::Object(
                conditions
                    .iter()
                    .map(|(op, operand)| (op.as_str().to_string(), operand.clone()))
                    .collect(),
            ),
        }
    }
}

/// Subscription pattern: type pattern plus attribute filters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPattern", into = "RawPattern")]
pub struct EventPattern {
    event_type: TypePattern,
    attributes: BTreeMap<String, AttributeFilter>,
}

/// Serialized form used in configuration files
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawPattern {
    event_type: String,
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    attributes: Payload,
}

impl TryFrom<RawPattern> for EventPattern {
    type Error = PatternError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        EventPattern::from_parts(&raw.event_type, raw.attributes)
    }
}

impl From<EventPattern> for RawPattern {
    fn from(pattern: EventPattern) -> Self {
        RawPattern {
            event_type: pattern.event_type.raw.clone(),
            attributes: pattern
                .attributes
                .iter()
                .map(|(k, f)| (k.clone(), f.to_value()))
                .collect(),
        }
    }
}

impl EventPattern {
    /// Pattern on event type alone
    pub fn new(event_type: &str) -> Result<Self, PatternError> {
        Ok(Self {
            event_type: TypePattern::parse(event_type)?,
            attributes: BTreeMap::new(),
        })
    }

    /// Pattern matching every event (`**`)
    pub fn any() -> Self {
        Self {
            event_type: TypePattern {
                raw: "**".to_string(),
                matcher: TypeMatcher::Segments(vec![Segment::Rest]),
            },
            attributes: BTreeMap::new(),
        }
    }

    /// Pattern from a type string and JSON-encoded attribute filters
    pub fn from_parts(event_type: &str, attributes: Payload) -> Result<Self, PatternError> {
        let mut pattern = Self::new(event_type)?;
        for (path, value) in attributes {
            pattern = pattern.with_filter(&path, value)?;
        }
        Ok(pattern)
    }

    /// Add a JSON-encoded filter (plain value or `$` operator object)
    pub fn with_filter(mut self, path: &str, value: Value) -> Result<Self, PatternError> {
        if path.is_empty() {
            return Err(PatternError::EmptyPath);
        }
        let filter = AttributeFilter::from_value(path, value)?;
        self.attributes.insert(path.to_string(), filter);
        Ok(self)
    }

    /// Require `path` to equal `value`
    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .insert(path.into(), AttributeFilter::Equals(value.into()));
        self
    }

    /// Add an operator condition on `path`
    pub fn where_op(mut self, path: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        let path = path.into();
        let condition = (op, value.into());
        match self.attributes.get_mut(&path) {
            Some(AttributeFilter::Conditions(conditions)) => conditions.push(condition),
            _ => {
                self.attributes
                    .insert(path, AttributeFilter::Conditions(vec![condition]));
            }
        }
        self
    }

    pub fn type_pattern(&self) -> &TypePattern {
        &self.event_type
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeFilter> {
        &self.attributes
    }

    pub fn matches_type(&self, event_type: &str) -> bool {
        self.event_type.matches(event_type)
    }

    /// All attribute filters pass against the event payload
    pub fn matches_attributes(&self, event: &Event) -> bool {
        self.attributes
            .iter()
            .all(|(path, filter)| filter.matches(event.payload_value(path)))
    }

    /// Type matches and every attribute filter passes
    pub fn matches(&self, event: &Event) -> bool {
        self.matches_type(event.event_type()) && self.matches_attributes(event)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_type)?;
        if !self.attributes.is_empty() {
            let attrs: Vec<String> = self
                .attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.to_value()))
                .collect();
            write!(f, "[{}]", attrs.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
