//! Composable payload filters in the backend's wire shape.
//!
//! [`Filter`] serializes directly to the JSON the backend evaluates at query
//! time, so the same type scopes similarity search, scroll traversal, counts,
//! and deletes. Independent predicates compose into a single conjunction via
//! [`SearchScope`]; an empty scope composes to `None` and no filter is sent
//! at all, because some backends read `{}` as "match nothing" rather than
//! "match everything".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conjunction/disjunction of field conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    /// Conditions that must all hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    /// Conditions of which at least one must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Condition>,
}

impl Filter {
    /// A conjunction of the given conditions.
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self { must: conditions, should: Vec::new() }
    }

    /// A single field-equality filter.
    pub fn field_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all(vec![Condition::matches(key, value)])
    }

    /// Append a condition to the conjunction.
    pub fn and(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    /// Whether the filter carries no conditions.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty()
    }

    /// A compact description for error context, truncated to keep messages
    /// readable.
    pub fn describe(&self) -> String {
        let text = serde_json::to_string(self).unwrap_or_else(|_| "<filter>".into());
        if text.chars().count() > 120 {
            let truncated: String = text.chars().take(119).collect();
            format!("{truncated}…")
        } else {
            text
        }
    }
}

/// One field condition: an exact match, an any-of match, or a range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// The payload field the condition applies to.
    pub key: String,
    /// Exact or any-of match clause.
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchClause>,
    /// Numeric/date range clause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeClause>,
}

impl Condition {
    /// Exact-match condition: the field equals `value`.
    pub fn matches(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            matching: Some(MatchClause::Value { value: value.into() }),
            range: None,
        }
    }

    /// Any-of condition: the field equals any of `values`.
    pub fn any_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self { key: key.into(), matching: Some(MatchClause::Any { any: values }), range: None }
    }

    /// Range condition over numbers or string-comparable dates.
    pub fn range(key: impl Into<String>, range: RangeClause) -> Self {
        Self { key: key.into(), matching: None, range: Some(range) }
    }
}

/// The match arm of a condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MatchClause {
    /// Exact equality.
    Value {
        /// The value the field must equal.
        value: Value,
    },
    /// Membership in a set of values.
    Any {
        /// The accepted values.
        any: Vec<Value>,
    },
}

/// The range arm of a condition. Bounds are numbers or RFC 3339 strings
/// (which compare correctly as strings).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RangeClause {
    /// Exclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    /// Exclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    /// Inclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
}

/// Independently supplied query predicates, composed into one conjunction.
///
/// Every field is optional; a scope with nothing set composes to `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchScope {
    /// Restrict to one owner/tenant.
    pub user_id: Option<String>,
    /// Restrict to any of these source documents.
    pub document_ids: Option<Vec<String>>,
    /// Restrict to one content category.
    pub category: Option<String>,
}

impl SearchScope {
    /// An unrestricted scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one owner/tenant.
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restrict to any of the given document ids.
    pub fn documents(mut self, ids: Vec<String>) -> Self {
        self.document_ids = Some(ids);
        self
    }

    /// Restrict to one category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Compose the supplied predicates into a single conjunction, or `None`
    /// when no predicate applies.
    pub fn to_filter(&self) -> Option<Filter> {
        let mut conditions = Vec::new();
        if let Some(user_id) = &self.user_id {
            conditions.push(Condition::matches("user_id", user_id.clone()));
        }
        if let Some(ids) = &self.document_ids {
            conditions
                .push(Condition::any_of("doc_id", ids.iter().cloned().map(Value::from).collect()));
        }
        if let Some(category) = &self.category {
            conditions.push(Condition::matches("category", category.clone()));
        }
        if conditions.is_empty() { None } else { Some(Filter::all(conditions)) }
    }
}
