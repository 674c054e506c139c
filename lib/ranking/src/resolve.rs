//! Resolution of constraint sets against the schema
//!
//! Each constraint is checked once against its field's [`FieldKind`]:
//! unknown fields and operator/kind mismatches are dropped with a
//! [`Diagnostic`], operand values are coerced to the field's kind and range
//! bounds are put in order. Virtual fields resolve to the column they read
//! on the related entity.

use crate::constraint::{ordered_bounds, ConstraintSet, Desiderata, Operand, Operator};
use crate::error::Diagnostic;
use siftrank_core::{coerce_value, Expr, FieldKind, FieldMeta, SchemaRegistry, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Relation traversed by a virtual field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relational field on the base entity
    pub through: FieldMeta,
    pub target_entity: String,
}

impl Relation {
    #[inline]
    pub fn name(&self) -> &str {
        &self.through.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConstraint {
    /// Field as named in the query
    pub field: String,
    /// Field read from the evaluated record
    pub column: String,
    /// Set when the column lives on a related record
    pub relation: Option<Relation>,
    /// Kind of the value the constraint compares against
    pub kind: FieldKind,
    pub operator: Operator,
    pub operand: Operand,
    /// Numeric range bounds, in order
    pub lo: Option<f64>,
    pub hi: Option<f64>,
}

impl ResolvedConstraint {
    #[inline]
    pub fn is_soft(&self) -> bool {
        self.operator.is_soft()
    }

    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.relation.is_some()
    }

    fn in_scope(&self, relation: Option<&str>) -> bool {
        self.relation.as_ref().map(Relation::name) == relation
    }

    /// Filter form of a hard constraint; soft constraints filter nothing
    pub fn to_expr(&self) -> Expr {
        let column = self.column.clone();
        match (&self.operator, &self.operand) {
            (Operator::InSoft, _) => Expr::True,
            (Operator::Eq, Operand::Value(value)) => Expr::Eq { field: column, value: value.clone() },
            (Operator::Neq, Operand::Value(value)) => Expr::Ne { field: column, value: value.clone() },
            (Operator::Contains, Operand::Value(value)) => Expr::Contains {
                field: column,
                value: value.as_str().unwrap_or_default().to_string(),
            },
            (Operator::In, Operand::Values(values)) => Expr::In { field: column, values: values.clone() },
            (Operator::NotIn, Operand::Values(values)) => {
                Expr::not(Expr::In { field: column, values: values.clone() })
            }
            (Operator::In | Operator::InHard, Operand::Range { .. }) => Expr::between(&column, self.lo, self.hi),
            (Operator::NotIn, Operand::Range { .. }) => Expr::outside(&column, self.lo, self.hi),
            // Shapes rejected during resolution
            _ => Expr::True,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedGroup {
    pub constraints: Vec<ResolvedConstraint>,
}

impl ResolvedGroup {
    /// Conjunction of the group's hard constraints within one scope
    /// (`None` for the base entity, otherwise the relation name)
    pub fn filter(&self, relation: Option<&str>) -> Expr {
        Expr::and(
            self.constraints
                .iter()
                .filter(|c| !c.is_soft() && c.in_scope(relation))
                .map(ResolvedConstraint::to_expr)
                .collect(),
        )
    }
}

/// A constraint set checked against one concrete entity type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub entity: String,
    pub groups: Vec<ResolvedGroup>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolvedQuery {
    pub fn resolve(schema: &dyn SchemaRegistry, entity: &str, set: &ConstraintSet) -> Self {
        let mut diagnostics = Vec::new();
        let groups = set
            .groups
            .iter()
            .map(|group| ResolvedGroup {
                constraints: group
                    .constraints
                    .iter()
                    .filter_map(|c| match resolve_one(schema, entity, &c.field, c.operator, &c.operand) {
                        Ok(resolved) => Some(resolved),
                        Err(diagnostic) => {
                            warn!("Ignoring constraint on {}: {}", entity, diagnostic);
                            if !diagnostics.contains(&diagnostic) {
                                diagnostics.push(diagnostic);
                            }
                            None
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            entity: entity.to_string(),
            groups,
            diagnostics,
        }
    }

    pub fn constraints(&self) -> impl Iterator<Item = &ResolvedConstraint> {
        self.groups.iter().flat_map(|g| g.constraints.iter())
    }

    pub fn has_virtual(&self) -> bool {
        self.constraints().any(ResolvedConstraint::is_virtual)
    }

    /// Disjunction of the groups' hard constraints on the base entity.
    /// Virtual constraints are left out, so with virtual fields present the
    /// filter selects a superset of the matches.
    pub fn native_filter(&self) -> Expr {
        Expr::or(self.groups.iter().map(|g| g.filter(None)).collect())
    }

    /// Relations traversed by virtual constraints, keyed by relation name
    pub fn relations(&self) -> BTreeMap<String, Relation> {
        self.constraints()
            .filter_map(|c| c.relation.clone())
            .map(|r| (r.name().to_string(), r))
            .collect()
    }

    /// Soft ranges within one scope, keyed by column
    pub fn desiderata(&self, relation: Option<&str>) -> Desiderata {
        let mut desiderata = Desiderata::new();
        for c in self.constraints().filter(|c| c.is_soft() && c.in_scope(relation)) {
            desiderata.insert(c.column.clone(), c.lo, c.hi);
        }
        desiderata
    }

    /// Number of soft constraints with a usable range in one scope. A field
    /// constrained twice counts twice even though its ranges merge into one
    /// Desiderata entry.
    pub fn soft_weight(&self, relation: Option<&str>) -> usize {
        self.constraints()
            .filter(|c| c.is_soft() && c.in_scope(relation))
            .filter(|c| c.lo.is_some() || c.hi.is_some())
            .count()
    }

    /// Soft ranges across all scopes, keyed by field as named in the query
    pub fn all_desiderata(&self) -> Desiderata {
        let mut desiderata = Desiderata::new();
        for c in self.constraints().filter(|c| c.is_soft()) {
            desiderata.insert(c.field.clone(), c.lo, c.hi);
        }
        desiderata
    }
}

fn resolve_one(
    schema: &dyn SchemaRegistry,
    entity: &str,
    field: &str,
    operator: Operator,
    operand: &Operand,
) -> Result<ResolvedConstraint, Diagnostic> {
    let unknown = |entity: &str, field: &str| Diagnostic::UnknownField {
        entity: entity.to_string(),
        field: field.to_string(),
    };
    let meta = schema.field(entity, field).ok_or_else(|| unknown(entity, field))?;

    let (column, relation, kind) = match meta.kind {
        FieldKind::Virtual { through, target_entity, target_field } => {
            let through_meta = schema
                .field(entity, &through)
                .filter(|m| matches!(m.kind, FieldKind::Relational { .. }))
                .ok_or_else(|| unknown(entity, &through))?;
            let target = schema
                .field(&target_entity, &target_field)
                .ok_or_else(|| unknown(&target_entity, &target_field))?;
            if target.kind.is_virtual() {
                return Err(Diagnostic::UnsupportedOperator {
                    field: field.to_string(),
                    operator: operator.to_string(),
                    reason: "virtual fields cannot read other virtual fields".to_string(),
                });
            }
            let relation = Relation { through: through_meta, target_entity };
            (target_field, Some(relation), target.kind)
        }
        kind => (field.to_string(), None, kind),
    };

    check_operator(&kind, operator, operand).map_err(|reason| Diagnostic::UnsupportedOperator {
        field: field.to_string(),
        operator: operator.to_string(),
        reason,
    })?;

    let invalid = |reason: &str| Diagnostic::InvalidOperand {
        field: field.to_string(),
        reason: reason.to_string(),
    };
    let coerce = |v: &Value| coerce_value(&kind, v.clone());
    let (operand, lo, hi) = match operand {
        Operand::Value(value) => {
            let value = coerce(value);
            if operator == Operator::Contains && value.as_str().is_none() {
                return Err(invalid("CONTAINS needs a text value"));
            }
            (Operand::Value(value), None, None)
        }
        Operand::Values(values) => (Operand::Values(values.iter().map(coerce).collect()), None, None),
        Operand::Range { lo, hi } => {
            let lo = lo.as_ref().map(coerce).filter(|v| !v.is_null());
            let hi = hi.as_ref().map(coerce).filter(|v| !v.is_null());
            let lo_num = numeric_bound(lo.as_ref()).map_err(|_| invalid("lower bound is not numeric"))?;
            let hi_num = numeric_bound(hi.as_ref()).map_err(|_| invalid("upper bound is not numeric"))?;
            let swapped = matches!((lo_num, hi_num), (Some(l), Some(h)) if l > h);
            let (lo_num, hi_num) = ordered_bounds(lo_num, hi_num);
            let (lo, hi) = if swapped { (hi, lo) } else { (lo, hi) };
            (Operand::Range { lo, hi }, lo_num, hi_num)
        }
    };

    Ok(ResolvedConstraint {
        field: field.to_string(),
        column,
        relation,
        kind,
        operator,
        operand,
        lo,
        hi,
    })
}

fn numeric_bound(bound: Option<&Value>) -> Result<Option<f64>, ()> {
    match bound {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or(()),
    }
}

/// Operators and operand shapes each field kind supports
fn check_operator(kind: &FieldKind, operator: Operator, operand: &Operand) -> Result<(), String> {
    use Operator::*;
    let shape_ok = match operand {
        Operand::Value(_) => matches!(operator, Eq | Neq | Contains),
        Operand::Values(_) => matches!(operator, In | NotIn),
        Operand::Range { .. } => matches!(operator, In | NotIn | InSoft | InHard),
    };
    if !shape_ok {
        return Err("operand does not fit the operator".to_string());
    }
    let ranged = matches!(operand, Operand::Range { .. });
    let supported = match kind {
        FieldKind::Ordinal { .. } => match operator {
            Eq | Neq | InSoft | InHard => true,
            In | NotIn => ranged,
            Contains => false,
        },
        FieldKind::Categorical => matches!(operator, Eq | Neq | Contains) || (matches!(operator, In | NotIn) && !ranged),
        FieldKind::Boolean => matches!(operator, Eq | Neq),
        FieldKind::Relational { .. } => matches!(operator, Eq | Neq) || (matches!(operator, In | NotIn) && !ranged),
        FieldKind::Virtual { .. } => false,
    };
    if supported {
        Ok(())
    } else {
        Err(format!("not supported on {} fields", kind_name(kind)))
    }
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Ordinal { .. } => "ordinal",
        FieldKind::Categorical => "categorical",
        FieldKind::Boolean => "boolean",
        FieldKind::Relational { .. } => "relational",
        FieldKind::Virtual { .. } => "virtual",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use siftrank_core::{EntityDef, InMemorySchema, Record};

    fn schema() -> InMemorySchema {
        InMemorySchema::new()
            .with_entity(
                EntityDef::new("Author")
                    .with_field(FieldMeta::categorical("country"))
                    .with_field(FieldMeta::ordinal("born")),
            )
            .with_entity(
                EntityDef::new("Book")
                    .with_field(FieldMeta::ordinal("pages"))
                    .with_field(FieldMeta::time("published"))
                    .with_field(FieldMeta::categorical("title"))
                    .with_field(FieldMeta::boolean("in_print"))
                    .with_field(FieldMeta::relational("author", "Author"))
                    .with_field(FieldMeta::virtual_field("author_country", "author", "Author", "country"))
                    .with_field(FieldMeta::virtual_field("author_born", "author", "Author", "born")),
            )
    }

    #[test]
    fn test_diagnostics() {
        let set = ConstraintSet::single([
            Constraint::eq("colour", "red"),
            Constraint::contains("pages", "12"),
            Constraint::soft_range("title", Some("a".into()), None),
            Constraint::eq("in_print", true),
        ]);
        let resolved = ResolvedQuery::resolve(&schema(), "Book", &set);
        assert_eq!(resolved.groups[0].constraints.len(), 1);
        assert_eq!(resolved.diagnostics.len(), 3);
        assert!(matches!(&resolved.diagnostics[0], Diagnostic::UnknownField { field, .. } if field == "colour"));
    }

    #[test]
    fn test_swapped_bounds() {
        let set = ConstraintSet::single([Constraint::hard_range("pages", Some(Value::Int(300)), Some(Value::Int(100)))]);
        let resolved = ResolvedQuery::resolve(&schema(), "Book", &set);
        let c = &resolved.groups[0].constraints[0];
        assert_eq!((c.lo, c.hi), (Some(100.0), Some(300.0)));
        assert_eq!(
            c.operand,
            Operand::Range { lo: Some(Value::Int(100)), hi: Some(Value::Int(300)) }
        );
    }

    #[test]
    fn test_time_bounds_coerced() {
        let set = ConstraintSet::single([Constraint::soft_range(
            "published",
            Some("2020-01-01T00:00:00Z".into()),
            Some("2020-01-02T00:00:00Z".into()),
        )]);
        let resolved = ResolvedQuery::resolve(&schema(), "Book", &set);
        assert!(resolved.diagnostics.is_empty());
        let (lo, hi) = resolved.desiderata(None).get("published").unwrap();
        assert_eq!(hi.unwrap() - lo.unwrap(), 86_400.0);
    }

    #[test]
    fn test_virtual_resolution() {
        let set = ConstraintSet::single([
            Constraint::eq("author_country", "NZ"),
            Constraint::soft_range("author_born", Some(Value::Int(1950)), Some(Value::Int(1960))),
            Constraint::soft_range("pages", Some(Value::Int(100)), None),
        ]);
        let resolved = ResolvedQuery::resolve(&schema(), "Book", &set);
        assert!(resolved.has_virtual());
        assert_eq!(resolved.relations().len(), 1);
        assert_eq!(resolved.native_filter(), Expr::True);
        assert_eq!(resolved.desiderata(None).len(), 1);
        assert!(resolved.desiderata(Some("author")).get("born").is_some());
        assert!(resolved.all_desiderata().get("author_born").is_some());
        assert_eq!(resolved.soft_weight(None), 1);
        assert_eq!(resolved.soft_weight(Some("author")), 1);

        let author = Record::new("Author", 1u64).with_field("country", "NZ");
        assert!(resolved.groups[0].filter(Some("author")).evaluate(&author));
    }

    #[test]
    fn test_hard_filter() {
        let set = ConstraintSet::new()
            .group(crate::constraint::ConstraintGroup::new().with(Constraint::outside_range(
                "pages",
                Some(Value::Int(100)),
                Some(Value::Int(200)),
            )))
            .group(crate::constraint::ConstraintGroup::new().with(Constraint::eq("title", "Dune")));
        let filter = ResolvedQuery::resolve(&schema(), "Book", &set).native_filter();

        let book = |pages: f64, title: &str| Record::new("Book", 1u64).with_field("pages", pages).with_field("title", title);
        assert!(filter.evaluate(&book(50.0, "x")));
        assert!(!filter.evaluate(&book(150.0, "x")));
        assert!(filter.evaluate(&book(150.0, "Dune")));
    }
}
