use std::collections::btree_map::{self, BTreeMap, Entry};

use serde_json::Value;

/// Bounds of a range condition. Unset bounds are open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Range {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

impl Range {
    pub fn at_least(v: Value) -> Self {
        Self { gte: Some(v), ..Self::default() }
    }

    pub fn at_most(v: Value) -> Self {
        Self { lte: Some(v), ..Self::default() }
    }

    pub fn is_unbounded(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }

    /// Bounds set on `other` replace the same bounds here; others are kept.
    pub fn merge(&mut self, other: Range) {
        if other.gt.is_some() {
            self.gt = other.gt;
        }
        if other.gte.is_some() {
            self.gte = other.gte;
        }
        if other.lt.is_some() {
            self.lt = other.lt;
        }
        if other.lte.is_some() {
            self.lte = other.lte;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    /// Case-insensitive substring match.
    Contains(String),
    StartsWith(String),
    Range(Range),
    /// `true`: field is absent or null. `false`: field has a value.
    IsNull(bool),
}

/// Conjunction of per-field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: BTreeMap<String, Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, condition: Condition) -> Self {
        self.conditions.insert(field.to_string(), condition);
        self
    }

    pub fn equals(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Equals(value.into()))
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Condition> {
        self.conditions.iter()
    }

    /// Merges `other` into `self`.
    ///
    /// Two range conditions on the same field combine into one range
    /// (`min` + `max` becomes `gte..lte`); any other collision is won by `other`.
    pub fn merge(&mut self, other: Predicate) {
        for (field, condition) in other.conditions {
            match self.conditions.entry(field) {
                Entry::Vacant(slot) => {
                    slot.insert(condition);
                }
                Entry::Occupied(mut slot) => match (slot.get_mut(), condition) {
                    (Condition::Range(existing), Condition::Range(incoming)) => existing.merge(incoming),
                    (current, incoming) => *current = incoming,
                },
            }
        }
    }

    pub fn and(mut self, other: Predicate) -> Self {
        self.merge(other);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Result ordering. Defaults to newest first by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self { field: field.to_string(), direction }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::new("id", SortDirection::Desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_range_fragments_deep_merge() {
        let mut p = Predicate::new().with("price", Condition::Range(Range::at_least(json!(10))));
        p.merge(Predicate::new().with("price", Condition::Range(Range::at_most(json!(20)))));

        assert_eq!(p.len(), 1);
        assert_eq!(
            p.get("price"),
            Some(&Condition::Range(Range { gte: Some(json!(10)), lte: Some(json!(20)), ..Range::default() }))
        );
    }

    #[test]
    fn test_same_bound_is_overwritten() {
        let mut r = Range::at_least(json!(1));
        r.merge(Range::at_least(json!(5)));
        assert_eq!(r.gte, Some(json!(5)));
    }

    #[test]
    fn test_non_range_collision_takes_incoming() {
        let mut p = Predicate::new().equals("status", "draft");
        p.merge(Predicate::new().equals("status", "published").equals("author", "ada"));
        assert_eq!(p.get("status"), Some(&Condition::Equals(json!("published"))));
        assert_eq!(p.len(), 2);

        // A range replaced by an equality is not merged
        let mut p = Predicate::new().with("n", Condition::Range(Range::at_least(json!(1))));
        p.merge(Predicate::new().equals("n", 3));
        assert_eq!(p.get("n"), Some(&Condition::Equals(json!(3))));
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("ASC"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("desc"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("sideways"), None);
        assert_eq!(OrderBy::default(), OrderBy::new("id", SortDirection::Desc));
    }
}
