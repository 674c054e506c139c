//! Boolean filter expressions evaluated against records.
//!
//! Hard constraints compile into an [`Expr`] tree; the record store applies
//! it while scanning. Comparisons against a null or missing field are false,
//! except for the negative forms `Ne` and `Not(In)`, which hold for nulls.

use crate::record::Record;
use crate::value::Value;
use serde::Serialize;

pub trait Filter {
    fn matches(&self, record: &Record) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    True,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: f64 },
    Ge { field: String, value: f64 },
    Lt { field: String, value: f64 },
    Le { field: String, value: f64 },
    In { field: String, values: Vec<Value> },
    Contains { field: String, value: String },
    IsNull { field: String },
    And { exprs: Vec<Expr> },
    Or { exprs: Vec<Expr> },
    Not { expr: Box<Expr> },
}

impl Expr {
    /// Conjunction; `True` members are dropped and an empty conjunction is `True`
    pub fn and(exprs: Vec<Expr>) -> Expr {
        let mut exprs: Vec<Expr> = exprs.into_iter().filter(|e| *e != Expr::True).collect();
        match exprs.len() {
            0 => Expr::True,
            1 => exprs.remove(0),
            _ => Expr::And { exprs },
        }
    }

    /// Disjunction; any `True` member makes the whole expression `True`.
    /// An empty disjunction is also `True`: no groups means no restriction.
    pub fn or(mut exprs: Vec<Expr>) -> Expr {
        if exprs.is_empty() || exprs.iter().any(|e| *e == Expr::True) {
            return Expr::True;
        }
        if exprs.len() == 1 {
            return exprs.remove(0);
        }
        Expr::Or { exprs }
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::Not { expr: Box::new(expr) }
    }

    /// `lo <= field <= hi`, open sides unbounded
    pub fn between(field: &str, lo: Option<f64>, hi: Option<f64>) -> Expr {
        Self::range(field, lo, true, hi, true)
    }

    /// `field < lo OR field > hi`; a fully open range excludes everything
    /// with a value and keeps nothing
    pub fn outside(field: &str, lo: Option<f64>, hi: Option<f64>) -> Expr {
        let mut sides = Vec::new();
        if let Some(lo) = lo {
            sides.push(Expr::Lt { field: field.to_string(), value: lo });
        }
        if let Some(hi) = hi {
            sides.push(Expr::Gt { field: field.to_string(), value: hi });
        }
        if sides.is_empty() {
            // Both bounds open: every non-null value is inside
            return Expr::IsNull { field: field.to_string() };
        }
        Self::or(sides)
    }

    /// Range with explicit inclusivity on each side; a side without a
    /// bound is open. With no bounds at all the field only needs a value.
    pub fn range(field: &str, lo: Option<f64>, lo_inclusive: bool, hi: Option<f64>, hi_inclusive: bool) -> Expr {
        let field = field.to_string();
        let mut parts = Vec::new();
        if let Some(value) = lo {
            parts.push(if lo_inclusive {
                Expr::Ge { field: field.clone(), value }
            } else {
                Expr::Gt { field: field.clone(), value }
            });
        }
        if let Some(value) = hi {
            parts.push(if hi_inclusive {
                Expr::Le { field: field.clone(), value }
            } else {
                Expr::Lt { field: field.clone(), value }
            });
        }
        if parts.is_empty() {
            return Expr::not(Expr::IsNull { field });
        }
        Self::and(parts)
    }

    pub fn evaluate(&self, record: &Record) -> bool {
        match self {
            Expr::True => true,
            Expr::Eq { field, value } => record
                .get(field)
                .map(|v| v.loose_eq(value))
                .unwrap_or(false),
            Expr::Ne { field, value } => record
                .get(field)
                .map(|v| !v.loose_eq(value))
                .unwrap_or(true),
            Expr::Gt { field, value } => record.ordinal(field).map(|v| v > *value).unwrap_or(false),
            Expr::Ge { field, value } => record.ordinal(field).map(|v| v >= *value).unwrap_or(false),
            Expr::Lt { field, value } => record.ordinal(field).map(|v| v < *value).unwrap_or(false),
            Expr::Le { field, value } => record.ordinal(field).map(|v| v <= *value).unwrap_or(false),
            Expr::In { field, values } => record
                .get(field)
                .map(|v| values.iter().any(|candidate| v.loose_eq(candidate)))
                .unwrap_or(false),
            Expr::Contains { field, value } => record
                .get(field)
                .and_then(Value::as_str)
                .map(|v| v.to_lowercase().contains(&value.to_lowercase()))
                .unwrap_or(false),
            Expr::IsNull { field } => record.get(field).is_none(),
            Expr::And { exprs } => exprs.iter().all(|e| e.evaluate(record)),
            Expr::Or { exprs } => exprs.iter().any(|e| e.evaluate(record)),
            Expr::Not { expr } => !expr.evaluate(record),
        }
    }
}

impl Filter for Expr {
    fn matches(&self, record: &Record) -> bool {
        self.evaluate(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(depth: Option<f64>, kind: &str) -> Record {
        let record = Record::new("Sample", 1u64).with_field("kind", kind);
        match depth {
            Some(d) => record.with_field("depth", d),
            None => record.with_field("depth", Value::Null),
        }
    }

    #[test]
    fn test_between_and_outside() {
        let inside = Expr::between("depth", Some(10.0), Some(20.0));
        let outside = Expr::outside("depth", Some(10.0), Some(20.0));
        assert!(inside.matches(&sample(Some(10.0), "a")));
        assert!(inside.matches(&sample(Some(20.0), "a")));
        assert!(!inside.matches(&sample(Some(20.5), "a")));
        assert!(outside.matches(&sample(Some(20.5), "a")));
        assert!(!outside.matches(&sample(Some(15.0), "a")));
        // Nulls satisfy neither side of a range
        assert!(!inside.matches(&sample(None, "a")));
        assert!(!outside.matches(&sample(None, "a")));
    }

    #[test]
    fn test_open_bounds() {
        let at_least = Expr::between("depth", Some(10.0), None);
        assert!(at_least.matches(&sample(Some(1e9), "a")));
        assert!(!at_least.matches(&sample(Some(9.0), "a")));
        let any = Expr::between("depth", None, None);
        assert!(any.matches(&sample(Some(-5.0), "a")));
        assert!(!any.matches(&sample(None, "a")));
    }

    #[test]
    fn test_disjunction_of_conjunctions() {
        let expr = Expr::or(vec![
            Expr::and(vec![
                Expr::Eq { field: "kind".into(), value: "rock".into() },
                Expr::Ge { field: "depth".into(), value: 5.0 },
            ]),
            Expr::Eq { field: "kind".into(), value: "sand".into() },
        ]);
        assert!(expr.matches(&sample(Some(6.0), "rock")));
        assert!(!expr.matches(&sample(Some(4.0), "rock")));
        assert!(expr.matches(&sample(Some(4.0), "sand")));
    }

    #[test]
    fn test_simplification() {
        assert_eq!(Expr::and(vec![]), Expr::True);
        assert_eq!(Expr::or(vec![]), Expr::True);
        assert_eq!(
            Expr::or(vec![Expr::True, Expr::IsNull { field: "x".into() }]),
            Expr::True
        );
    }

    #[test]
    fn test_contains_and_negations() {
        let contains = Expr::Contains { field: "kind".into(), value: "OC".into() };
        assert!(contains.matches(&sample(None, "rock")));
        let ne = Expr::Ne { field: "depth".into(), value: Value::Float(3.0) };
        assert!(ne.matches(&sample(None, "rock")));
        assert!(!ne.matches(&sample(Some(3.0), "rock")));
    }
}
