//! Store predicates.
//!
//! A `Predicate` is a pure boolean expression over entity columns and
//! fields. The store evaluates it during list and subscribe; the watch
//! bridge re-evaluates it on every event.

use std::fmt;

use serde::Serialize;

use crate::model::{Entity, Value};

/// Composable filter expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    /// Field equals value. A missing field never matches.
    Eq { field: String, value: Value },
    /// All must match. Empty conjunction is true.
    And(Vec<Predicate>),
    /// Any must match. Empty disjunction is false.
    Or(Vec<Predicate>),
}

/// Shorthand for `Predicate::Eq`.
pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Eq { field: field.into(), value: value.into() }
}

impl Predicate {
    /// Conjoin, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Disjoin, flattening nested disjunctions.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Or(mut a), Predicate::Or(b)) => {
                a.extend(b);
                Predicate::Or(a)
            }
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (p, Predicate::Or(mut b)) => {
                b.insert(0, p);
                Predicate::Or(b)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Predicate::Eq { field, value } => entity.field(field).as_ref() == Some(value),
            Predicate::And(all) => all.iter().all(|p| p.matches(entity)),
            Predicate::Or(any) => any.iter().any(|p| p.matches(entity)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq { field, value } => write!(f, "{field} = {value}"),
            Predicate::And(ps) => write_joined(f, ps, "AND"),
            Predicate::Or(ps) => write_joined(f, ps, "OR"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, ps: &[Predicate], op: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in ps.iter().enumerate() {
        if i > 0 { write!(f, " {op} ")?; }
        write!(f, "{p}")?;
    }
    write!(f, ")")
}
