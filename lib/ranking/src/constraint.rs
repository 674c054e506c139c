//! Constraint sets: disjunctions of constraint groups
//!
//! A [`ConstraintSet`] is an ordered list of [`ConstraintGroup`]s. A record
//! matches the set if it matches any group; the constraints inside a group
//! must all hold. Soft (`InSoft`) constraints never filter, they only feed
//! the [`Desiderata`] used for scoring.

use crate::error::{Diagnostic, RankingError, Result};
use serde_json::Value as JsonValue;
use siftrank_core::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    In,
    NotIn,
    Contains,
    InSoft,
    InHard,
}

impl Operator {
    #[inline]
    pub fn is_soft(self) -> bool {
        self == Operator::InSoft
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Contains => "CONTAINS",
            Operator::InSoft => "IN_SOFT",
            Operator::InHard => "IN_HARD",
        };
        f.write_str(name)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Ok(Operator::Eq),
            "neq" | "ne" => Ok(Operator::Neq),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            "contains" => Ok(Operator::Contains),
            "in_soft" => Ok(Operator::InSoft),
            "in_hard" => Ok(Operator::InHard),
            _ => Err(s.to_string()),
        }
    }
}

/// Right-hand side of a constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Values(Vec<Value>),
    /// Range with optional bounds; `None` is an open side
    Range { lo: Option<Value>, hi: Option<Value> },
}

/// One field restriction
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
    /// Soft constraints score records instead of filtering them
    pub soft: bool,
}

impl Constraint {
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            operator,
            operand,
            soft: operator.is_soft(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, Operand::Value(value.into()))
    }

    pub fn neq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Neq, Operand::Value(value.into()))
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::In, Operand::Values(values))
    }

    pub fn none_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::NotIn, Operand::Values(values))
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(field, Operator::Contains, Operand::Value(Value::Text(text.into())))
    }

    pub fn soft_range(field: impl Into<String>, lo: Option<Value>, hi: Option<Value>) -> Self {
        Self::new(field, Operator::InSoft, Operand::Range { lo, hi })
    }

    pub fn hard_range(field: impl Into<String>, lo: Option<Value>, hi: Option<Value>) -> Self {
        Self::new(field, Operator::InHard, Operand::Range { lo, hi })
    }

    pub fn outside_range(field: impl Into<String>, lo: Option<Value>, hi: Option<Value>) -> Self {
        Self::new(field, Operator::NotIn, Operand::Range { lo, hi })
    }

    /// Parse one constraint from `{"op": ..., "value" | "values" | "lo"/"hi": ...}`
    fn from_json(field: &str, body: &JsonValue) -> std::result::Result<Self, Diagnostic> {
        let invalid = |reason: &str| Diagnostic::InvalidOperand {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        let obj = body
            .as_object()
            .ok_or_else(|| invalid("constraint must be an object"))?;
        let token = obj
            .get("op")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| invalid("missing \"op\""))?;
        let operator: Operator = token.parse().map_err(|token| Diagnostic::UnsupportedOperator {
            field: field.to_string(),
            operator: token,
            reason: "unknown operator".to_string(),
        })?;

        let values = obj.get("values").and_then(JsonValue::as_array);
        let is_range = obj.contains_key("lo") || obj.contains_key("hi");
        let operand = match operator {
            Operator::Eq | Operator::Neq | Operator::Contains => {
                let value = obj.get("value").ok_or_else(|| invalid("missing \"value\""))?;
                Operand::Value(Value::from_json(value))
            }
            Operator::In | Operator::NotIn if !is_range => {
                let values = values.ok_or_else(|| invalid("missing \"values\" or range"))?;
                Operand::Values(values.iter().map(Value::from_json).collect())
            }
            Operator::In | Operator::NotIn | Operator::InSoft | Operator::InHard => Operand::Range {
                lo: parse_bound(obj.get("lo")),
                hi: parse_bound(obj.get("hi")),
            },
        };
        Ok(Self::new(field, operator, operand))
    }
}

/// Missing, null and the `"min"`/`"max"` sentinels are open bounds
fn parse_bound(bound: Option<&JsonValue>) -> Option<Value> {
    match bound? {
        JsonValue::Null => None,
        JsonValue::String(s) if s.eq_ignore_ascii_case("min") || s.eq_ignore_ascii_case("max") => None,
        other => Some(Value::from_json(other)),
    }
}

/// Conjunction of constraints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintGroup {
    pub constraints: SmallVec<[Constraint; 4]>,
}

impl ConstraintGroup {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Disjunction of constraint groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    pub groups: Vec<ConstraintGroup>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set with one group holding the given constraints
    pub fn single(constraints: impl IntoIterator<Item = Constraint>) -> Self {
        Self {
            groups: vec![ConstraintGroup {
                constraints: constraints.into_iter().collect(),
            }],
        }
    }

    #[inline]
    #[must_use]
    pub fn group(mut self, group: ConstraintGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(ConstraintGroup::is_empty)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.groups.iter().flat_map(|g| g.constraints.iter())
    }

    /// Parse a constraint set from JSON.
    ///
    /// Accepts either one group object or an array of them. A group maps
    /// field names to a constraint object or an array of constraint
    /// objects. Malformed constraints are skipped and reported as
    /// diagnostics; a malformed document is an error.
    pub fn from_json(json: &JsonValue) -> Result<(Self, Vec<Diagnostic>)> {
        let groups: Vec<&JsonValue> = match json {
            JsonValue::Array(items) => items.iter().collect(),
            JsonValue::Object(_) => vec![json],
            JsonValue::Null => Vec::new(),
            other => {
                return Err(RankingError::Parse(format!(
                    "expected an object or array of objects, found {}",
                    other
                )))
            }
        };

        let mut set = ConstraintSet::new();
        let mut diagnostics = Vec::new();
        for (idx, group_json) in groups.into_iter().enumerate() {
            let obj = group_json
                .as_object()
                .ok_or_else(|| RankingError::Parse(format!("group {} is not an object", idx)))?;
            let mut group = ConstraintGroup::new();
            for (field, body) in obj {
                let bodies: Vec<&JsonValue> = match body {
                    JsonValue::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                for body in bodies {
                    match Constraint::from_json(field, body) {
                        Ok(c) => group.constraints.push(c),
                        Err(d) => diagnostics.push(d),
                    }
                }
            }
            set.groups.push(group);
        }
        Ok((set, diagnostics))
    }

    pub fn from_str_json(text: &str) -> Result<(Self, Vec<Diagnostic>)> {
        let json: JsonValue =
            serde_json::from_str(text).map_err(|e| RankingError::Parse(e.to_string()))?;
        Self::from_json(&json)
    }
}

/// Soft ranges keyed by field.
///
/// Entries exist only for fields with at least one concrete bound. When a
/// field is soft-constrained more than once the entry covers the union of
/// the ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Desiderata {
    ranges: BTreeMap<String, (Option<f64>, Option<f64>)>,
}

impl Desiderata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, lo: Option<f64>, hi: Option<f64>) {
        let (lo, hi) = ordered_bounds(lo, hi);
        if lo.is_none() && hi.is_none() {
            return;
        }
        self.ranges
            .entry(field.into())
            .and_modify(|(cur_lo, cur_hi)| {
                *cur_lo = match (*cur_lo, lo) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    _ => None,
                };
                *cur_hi = match (*cur_hi, hi) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                };
            })
            .or_insert((lo, hi));
    }

    pub fn get(&self, field: &str) -> Option<(Option<f64>, Option<f64>)> {
        self.ranges.get(field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>, Option<f64>)> {
        self.ranges.iter().map(|(f, (lo, hi))| (f.as_str(), *lo, *hi))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Swap concrete bounds given in the wrong order
#[inline]
pub fn ordered_bounds(lo: Option<f64>, hi: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (lo, hi) {
        (Some(l), Some(h)) if l > h => (Some(h), Some(l)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_groups() {
        let (set, diags) = ConstraintSet::from_json(&json!([
            {
                "depth": {"op": "in_soft", "lo": 40, "hi": "max"},
                "kind": [{"op": "eq", "value": "rock"}, {"op": "NEQ", "value": "basalt"}]
            },
            {"kind": {"op": "not_in", "values": ["sand"]}}
        ]))
        .unwrap();
        assert!(diags.is_empty());
        assert_eq!(set.groups.len(), 2);
        assert_eq!(set.groups[0].constraints.len(), 3);

        let depth = set.constraints().find(|c| c.field == "depth").unwrap();
        assert!(depth.soft);
        assert_eq!(
            depth.operand,
            Operand::Range { lo: Some(Value::Int(40)), hi: None }
        );
        assert_eq!(set.groups[1].constraints[0].operand, Operand::Values(vec!["sand".into()]));
    }

    #[test]
    fn test_parse_range_not_in() {
        let (set, _) = ConstraintSet::from_json(&json!({"depth": {"op": "not_in", "lo": "min", "hi": 10}})).unwrap();
        assert_eq!(
            set.groups[0].constraints[0].operand,
            Operand::Range { lo: None, hi: Some(Value::Int(10)) }
        );
    }

    #[test]
    fn test_parse_diagnostics() {
        let (set, diags) = ConstraintSet::from_json(&json!({
            "depth": {"op": "near", "value": 3},
            "kind": {"op": "eq"},
            "name": {"op": "contains", "value": "ore"}
        }))
        .unwrap();
        assert_eq!(set.groups[0].constraints.len(), 1);
        assert_eq!(diags.len(), 2);
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::UnsupportedOperator { operator, .. } if operator == "near")));

        assert!(ConstraintSet::from_json(&json!(42)).is_err());
        assert!(ConstraintSet::from_str_json("[{").is_err());
    }

    #[test]
    fn test_desiderata_union_and_swap() {
        let mut d = Desiderata::new();
        d.insert("depth", Some(60.0), Some(40.0));
        assert_eq!(d.get("depth"), Some((Some(40.0), Some(60.0))));

        d.insert("depth", Some(50.0), Some(80.0));
        assert_eq!(d.get("depth"), Some((Some(40.0), Some(80.0))));

        d.insert("depth", None, Some(10.0));
        assert_eq!(d.get("depth"), Some((None, Some(80.0))));

        d.insert("age", None, None);
        assert!(d.get("age").is_none());
        assert_eq!(d.len(), 1);
    }
}
