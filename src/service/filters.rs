//! Declarative mapping from query parameters to store predicates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::store::{Condition, Predicate, Range};

/// Turns one raw query value into a predicate fragment. `None` drops the parameter.
pub type Fragment = Arc<dyn Fn(&str) -> Option<Predicate> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FilterSet {
    filters: Vec<(String, Fragment)>,
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters.iter().map(|(param, _)| param)).finish()
    }
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn custom<F>(mut self, param: &str, fragment: F) -> Self
    where
        F: Fn(&str) -> Option<Predicate> + Send + Sync + 'static,
    {
        self.filters.push((param.to_string(), Arc::new(fragment)));
        self
    }

    pub fn equals(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| Some(Predicate::new().equals(&field, v)))
    }

    pub fn contains(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| Some(Predicate::new().with(&field, Condition::Contains(v.to_string()))))
    }

    pub fn starts_with(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| Some(Predicate::new().with(&field, Condition::StartsWith(v.to_string()))))
    }

    /// Inclusive lower bound.
    pub fn min(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| Some(Predicate::new().with(&field, Condition::Range(Range::at_least(scalar(v))))))
    }

    /// Inclusive upper bound.
    pub fn max(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| Some(Predicate::new().with(&field, Condition::Range(Range::at_most(scalar(v))))))
    }

    /// Inclusive lower bound compared as text, for ISO-8601 timestamps.
    pub fn min_text(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| {
            Some(Predicate::new().with(&field, Condition::Range(Range::at_least(Value::String(v.to_string())))))
        })
    }

    /// Inclusive upper bound compared as text.
    pub fn max_text(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| {
            Some(Predicate::new().with(&field, Condition::Range(Range::at_most(Value::String(v.to_string())))))
        })
    }

    /// Comma-separated list of accepted values.
    pub fn one_of(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| {
            let values: Vec<Value> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            if values.is_empty() {
                return None;
            }
            Some(Predicate::new().with(&field, Condition::In(values)))
        })
    }

    /// Accepts `true`/`false`/`1`/`0`; anything else is ignored.
    pub fn boolean(self, param: &str, field: &str) -> Self {
        let field = field.to_string();
        self.custom(param, move |v| {
            let b = match v.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return None,
            };
            Some(Predicate::new().equals(&field, b))
        })
    }

    /// Builds one predicate from every recognised, non-empty parameter in `query`.
    pub fn apply(&self, query: &HashMap<String, String>) -> Predicate {
        let mut predicate = Predicate::new();
        for (param, fragment) in &self.filters {
            let Some(raw) = query.get(param) else { continue };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            if let Some(part) = fragment(raw) {
                predicate.merge(part);
            }
        }
        predicate
    }
}

/// Numeric strings compare as numbers, everything else as text.
fn scalar(v: &str) -> Value {
    if let Ok(i) = v.parse::<i64>() {
        return Value::from(i);
    }
    match v.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(v.to_string()),
    }
}
