use std::cmp::Ordering;

use serde_json::Value;

use super::{Document, FeatureId, ID_FIELD};

/// Attribute filter over documents.
///
/// Paths are dotted (`properties.name`). Equality against an array field matches if any element is equal,
/// and numbers compare by value regardless of their JSON representation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    /// Field equals the value.
    Eq(String, Value),
    /// Field is missing or not equal to the value.
    Ne(String, Value),
    /// Field is greater than the value.
    Gt(String, Value),
    /// Field is greater than or equal to the value.
    Gte(String, Value),
    /// Field is less than the value.
    Lt(String, Value),
    /// Field is less than or equal to the value.
    Lte(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Field is present (`true`) or absent (`false`).
    Exists(String, bool),
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Equality filter.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    /// Matches the document with the given identifier.
    pub fn id_eq(id: &FeatureId) -> Self {
        Self::Eq(ID_FIELD.to_owned(), id.clone().into())
    }

    /// Matches documents whose identifier is one of `ids`.
    pub fn id_in<'a>(ids: impl IntoIterator<Item = &'a FeatureId>) -> Self {
        Self::In(
            ID_FIELD.to_owned(),
            ids.into_iter().map(|id| id.clone().into()).collect(),
        )
    }

    /// Conjunction of `self` and `other`. [`Filter::All`] operands are dropped.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, other) => other,
            (this, Filter::All) => this,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Returns true if the document satisfies the filter.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => document
                .get_path(path)
                .is_some_and(|value| value_matches(value, expected)),
            Filter::Ne(path, expected) => !document
                .get_path(path)
                .is_some_and(|value| value_matches(value, expected)),
            Filter::Gt(path, bound) => compare_field(document, path, bound) == Some(Ordering::Greater),
            Filter::Gte(path, bound) => matches!(
                compare_field(document, path, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(path, bound) => compare_field(document, path, bound) == Some(Ordering::Less),
            Filter::Lte(path, bound) => matches!(
                compare_field(document, path, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::In(path, candidates) => document.get_path(path).is_some_and(|value| {
                candidates
                    .iter()
                    .any(|expected| value_matches(value, expected))
            }),
            Filter::Exists(path, present) => document.get_path(path).is_some() == *present,
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(document)),
            Filter::Not(filter) => !filter.matches(document),
        }
    }

    /// Field values the filter pins by equality at the top level of a conjunction. Upserts seed new
    /// documents with them.
    pub fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Filter::Eq(path, value) => vec![(path.as_str(), value)],
            Filter::And(filters) => filters.iter().flat_map(Filter::equalities).collect(),
            _ => vec![],
        }
    }
}

/// Order on JSON scalars used by range filters and sorting. Values of different kinds are not
/// comparable.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn value_matches(value: &Value, expected: &Value) -> bool {
    if values_equal(value, expected) {
        return true;
    }

    match (value, expected) {
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        _ => false,
    }
}

fn compare_field(document: &Document, path: &str, bound: &Value) -> Option<Ordering> {
    compare_values(document.get_path(path)?, bound)
}
