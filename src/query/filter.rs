//! Filter expressions and their evaluation against documents.
//!
//! [`Filter`] is a closed set of variants. Per-field comparisons are grouped
//! under [`ComparisonFilter`], which is what an index scan consumes; the
//! planner asks a filter for its comparison part through
//! [`Filter::comparison`].
//!
//! Comparisons against an array field match when any element matches, which
//! is also what a multi-valued index returns.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::data::{Document, Value};
use crate::error::{CairnError, Result};
use crate::index::key::compare_scalars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    /// Whether `ordering` (field value compared to the bound) satisfies the operator.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            RangeOp::Gt => ordering == Ordering::Greater,
            RangeOp::Gte => ordering != Ordering::Less,
            RangeOp::Lt => ordering == Ordering::Less,
            RangeOp::Lte => ordering != Ordering::Greater,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RangeOp::Gt => ">",
            RangeOp::Gte => ">=",
            RangeOp::Lt => "<",
            RangeOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Range(RangeOp, Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Full-text query: words, or a single token with a leading and/or trailing `*`.
    Text(String),
}

/// A condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonFilter {
    pub field: String,
    pub condition: Condition,
}

fn is_key_value(value: &Value) -> bool {
    value.is_null() || value.is_scalar()
}

/// Equality used by filters: scalars compare by ordering class, so `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_scalars(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn candidates(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

impl ComparisonFilter {
    pub fn new(field: impl Into<String>, condition: Condition) -> Self {
        Self {
            field: field.into(),
            condition,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.condition, Condition::Text(_))
    }

    /// Whether an index can answer this condition: its operands must be
    /// usable as index keys.
    pub fn is_indexable(&self) -> bool {
        match &self.condition {
            Condition::Eq(v) | Condition::Ne(v) => is_key_value(v),
            Condition::Range(_, v) => v.is_scalar(),
            Condition::In(vs) | Condition::NotIn(vs) => vs.iter().all(is_key_value),
            Condition::Text(_) => true,
        }
    }

    pub fn matches(&self, document: &Document) -> Result<bool> {
        let value = document.get_path(&self.field).unwrap_or(Value::Null);
        self.matches_value(&value)
    }

    fn matches_value(&self, value: &Value) -> Result<bool> {
        match &self.condition {
            Condition::Eq(expected) => Ok(values_equal(value, expected)
                || (matches!(value, Value::Array(_))
                    && candidates(value).iter().any(|c| values_equal(c, expected)))),
            Condition::Ne(expected) => {
                if matches!(expected, Value::Array(_)) || !matches!(value, Value::Array(_)) {
                    Ok(!values_equal(value, expected))
                } else {
                    Ok(candidates(value).iter().any(|c| !values_equal(c, expected)))
                }
            }
            Condition::In(list) => Ok(candidates(value)
                .iter()
                .any(|c| list.iter().any(|v| values_equal(c, v)))),
            Condition::NotIn(list) => Ok(candidates(value)
                .iter()
                .any(|c| !list.iter().any(|v| values_equal(c, v)))),
            Condition::Range(op, bound) => {
                for candidate in candidates(value) {
                    if matches!(candidate, Value::Document(_) | Value::Array(_)) {
                        return Err(CairnError::filter(format!(
                            "{} value of field '{}' is not comparable",
                            candidate.type_name(),
                            self.field
                        )));
                    }
                    if compare_scalars(candidate, bound).is_some_and(|o| op.accepts(o)) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Text(query) => {
                let needle = query.trim().trim_matches('*').to_lowercase();
                Ok(candidates(value).iter().any(|c| {
                    c.as_str()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                }))
            }
        }
    }
}

impl fmt::Display for ComparisonFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        match &self.condition {
            Condition::Eq(v) => write!(f, "({field} == {})", v.to_json()),
            Condition::Ne(v) => write!(f, "({field} != {})", v.to_json()),
            Condition::Range(op, v) => write!(f, "({field} {} {})", op.symbol(), v.to_json()),
            Condition::In(vs) => write!(f, "({field} in {})", Value::Array(vs.clone()).to_json()),
            Condition::NotIn(vs) => {
                write!(f, "({field} not in {})", Value::Array(vs.clone()).to_json())
            }
            Condition::Text(q) => write!(f, "({field} text '{q}')"),
        }
    }
}

/// A compiled regular expression compared by its source text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Pattern)
            .map_err(|e| CairnError::filter(format!("invalid regex '{pattern}': {e}")))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Compare(ComparisonFilter),
    Regex { field: String, pattern: Pattern },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Conjunction; flattens nested conjunctions and drops `All`.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut terms = Vec::new();
        for filter in filters {
            match filter {
                Filter::All => {}
                Filter::And(nested) => terms.extend(nested),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Filter::All,
            1 => terms.remove(0),
            _ => Filter::And(terms),
        }
    }

    /// Disjunction; flattens nested disjunctions.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut branches = Vec::new();
        for filter in filters {
            match filter {
                Filter::Or(nested) => branches.extend(nested),
                other => branches.push(other),
            }
        }
        if branches.iter().any(|b| matches!(b, Filter::All)) {
            return Filter::All;
        }
        match branches.len() {
            0 => Filter::All,
            1 => branches.remove(0),
            _ => Filter::Or(branches),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    /// The per-field comparison this filter consists of, if it can drive an index scan.
    pub fn comparison(&self) -> Option<&ComparisonFilter> {
        match self {
            Filter::Compare(c) if c.is_indexable() => Some(c),
            _ => None,
        }
    }

    /// Top-level conjuncts of this filter.
    pub fn conjuncts(&self) -> Vec<&Filter> {
        match self {
            Filter::All => Vec::new(),
            Filter::And(terms) => terms.iter().flat_map(|t| t.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Evaluate the filter against a document.
    pub fn apply(&self, document: &Document) -> Result<bool> {
        match self {
            Filter::All => Ok(true),
            Filter::Compare(c) => c.matches(document),
            Filter::Regex { field, pattern } => {
                let value = document.get_path(field).unwrap_or(Value::Null);
                Ok(candidates(&value)
                    .iter()
                    .any(|c| c.as_str().is_some_and(|s| pattern.is_match(s))))
            }
            Filter::And(terms) => {
                for term in terms {
                    if !term.apply(document)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(branches) => {
                for branch in branches {
                    if branch.apply(document)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(inner) => Ok(!inner.apply(document)?),
        }
    }
}

impl From<ComparisonFilter> for Filter {
    fn from(c: ComparisonFilter) -> Self {
        Filter::Compare(c)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "(all)"),
            Filter::Compare(c) => write!(f, "{c}"),
            Filter::Regex { field, pattern } => write!(f, "({field} =~ /{}/)", pattern.as_str()),
            Filter::And(terms) | Filter::Or(terms) => {
                let op = if matches!(self, Filter::And(_)) { " && " } else { " || " };
                let parts: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", parts.join(op))
            }
            Filter::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

/// Start a filter on `name`, e.g. `field("age").gte(18)`.
pub fn field(name: impl Into<String>) -> FieldFilter {
    FieldFilter { field: name.into() }
}

/// Fluent builder returned by [`field`].
#[derive(Debug, Clone)]
pub struct FieldFilter {
    field: String,
}

impl FieldFilter {
    fn compare(self, condition: Condition) -> Filter {
        Filter::Compare(ComparisonFilter::new(self.field, condition))
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(Condition::Eq(value.into()))
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(Condition::Ne(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(Condition::Range(RangeOp::Gt, value.into()))
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.compare(Condition::Range(RangeOp::Gte, value.into()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(Condition::Range(RangeOp::Lt, value.into()))
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.compare(Condition::Range(RangeOp::Lte, value.into()))
    }

    /// Inclusive range `[low, high]`.
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Filter {
        let name = self.field;
        Filter::and([field(name.clone()).gte(low), field(name).lte(high)])
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        self.compare(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        self.compare(Condition::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn text(self, query: impl Into<String>) -> Filter {
        self.compare(Condition::Text(query.into()))
    }

    pub fn regex(self, pattern: &str) -> Result<Filter> {
        Ok(Filter::Regex {
            field: self.field,
            pattern: Pattern::new(pattern)?,
        })
    }
}
