//! Filter engine
//!
//! Filters are small boolean expressions over attribute columns, compiled
//! once into an [`Expr`] tree and evaluated against attribute values. A column
//! is either unscoped (`c3`) or tagged with a triplet role (`c0_A`, `c1_B`,
//! `c1_X`).
//!
//! A filter is an *item* filter when every column it references is unscoped:
//! it must hold for each of A, B and X, so it prunes items before any block is
//! built. Otherwise it is a *triplet* filter, evaluated on role-tagged values.
//! Mixing both kinds of reference in one filter is rejected.

pub mod ast;
pub mod lexer;
mod parser;

pub use ast::{ColumnRef, CompareOp, Expr, Literal, Operand, Role};

use crate::{Error, Result};
use std::cmp::Ordering;

/// Source of attribute values for filter evaluation
pub trait Bindings {
    /// Value of `attribute` for `role`; `None` for unscoped references
    fn value(&self, role: Option<Role>, attribute: usize) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    Item,
    Triplet,
}

/// A compiled filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    source: String,
    expr: Expr,
    scope: FilterScope,
    roles: [bool; 3],
}

impl Filter {
    /// Compile `source` against the item table attributes
    pub fn compile(source: &str, attributes: &[String]) -> Result<Self> {
        let error = |(position, message): (usize, String)| Error::Filter {
            filter: source.to_string(),
            message: format!("{} (at {})", message, position),
        };

        let tokens = lexer::tokenize(source).map_err(error)?;
        let expr = parser::parse(&tokens, attributes).map_err(error)?;

        let mut unscoped = false;
        let mut roles = [false; 3];
        expr.for_each_column(&mut |column: &ColumnRef| match column.role {
            None => unscoped = true,
            Some(role) => roles[role as usize] = true,
        });

        let scoped = roles.iter().any(|&r| r);
        if unscoped && scoped {
            return Err(Error::Filter {
                filter: source.to_string(),
                message: "cannot mix unscoped columns with _A/_B/_X columns".to_string(),
            });
        }

        Ok(Self {
            source: source.to_string(),
            expr,
            scope: if scoped { FilterScope::Triplet } else { FilterScope::Item },
            roles,
        })
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn scope(&self) -> FilterScope {
        self.scope
    }

    #[inline]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Roles referenced by a triplet filter
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|&r| self.roles[r as usize])
    }

    /// The single role this filter depends on, if any
    pub fn single_role(&self) -> Option<Role> {
        let mut roles = self.roles();
        match (roles.next(), roles.next()) {
            (Some(role), None) => Some(role),
            _ => None,
        }
    }

    /// Attribute columns the filter reads, ascending
    pub fn columns(&self) -> Vec<usize> {
        let mut columns = Vec::new();
        self.expr
            .for_each_column(&mut |column: &ColumnRef| columns.push(column.attribute));
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    pub fn matches(&self, bindings: &dyn Bindings) -> bool {
        eval(&self.expr, bindings)
    }
}

fn eval(expr: &Expr, bindings: &dyn Bindings) -> bool {
    match expr {
        Expr::Compare { left, op, right } => {
            let ordering = compare(&resolve(left, bindings), &resolve(right, bindings));
            op.holds(ordering)
        }
        Expr::In { operand, list, negated } => {
            let value = resolve(operand, bindings);
            let found = list
                .iter()
                .any(|lit| compare(&value, &Scalar::from(lit)) == Ordering::Equal);
            found != *negated
        }
        Expr::Constant(value) => *value,
        Expr::And(l, r) => eval(l, bindings) && eval(r, bindings),
        Expr::Or(l, r) => eval(l, bindings) || eval(r, bindings),
        Expr::Not(e) => !eval(e, bindings),
    }
}

/// A value as seen by comparisons: text plus its numeric reading, if any
struct Scalar<'a> {
    text: &'a str,
    number: Option<f64>,
}

impl<'a> From<&'a Literal> for Scalar<'a> {
    fn from(lit: &'a Literal) -> Self {
        Scalar { text: &lit.text, number: lit.number }
    }
}

fn resolve<'a>(operand: &'a Operand, bindings: &'a dyn Bindings) -> Scalar<'a> {
    match operand {
        Operand::Literal(lit) => Scalar::from(lit),
        Operand::Column(column) => {
            let text = bindings.value(column.role, column.attribute);
            Scalar { text, number: text.parse().ok() }
        }
    }
}

/// Numeric when both sides read as numbers, textual otherwise
fn compare(a: &Scalar, b: &Scalar) -> Ordering {
    match (a.number, b.number) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.text.cmp(b.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> Vec<String> {
        ["c0", "c1", "spk"].iter().map(|s| s.to_string()).collect()
    }

    struct Item(Vec<&'static str>);

    impl Bindings for Item {
        fn value(&self, _role: Option<Role>, attribute: usize) -> &str {
            self.0[attribute]
        }
    }

    struct Triple([Vec<&'static str>; 3]);

    impl Bindings for Triple {
        fn value(&self, role: Option<Role>, attribute: usize) -> &str {
            self.0[role.expect("scoped reference") as usize][attribute]
        }
    }

    #[test]
    fn test_comprehension_is_item_filter() {
        let filter = Filter::compile("[attr == 0 for attr in c1]", &attributes()).unwrap();
        assert_eq!(filter.scope(), FilterScope::Item);
        assert!(filter.matches(&Item(vec!["1", "0", "bob"])));
        assert!(!filter.matches(&Item(vec!["0", "1", "bob"])));
    }

    #[test]
    fn test_comprehension_on_role() {
        let filter = Filter::compile("[attr == 0 for attr in c0_A]", &attributes()).unwrap();
        assert_eq!(filter.scope(), FilterScope::Triplet);
        assert_eq!(filter.single_role(), Some(Role::A));

        let pass = Triple([vec!["0", "0", "x"], vec!["1", "0", "x"], vec!["0", "1", "x"]]);
        let fail = Triple([vec!["1", "0", "x"], vec!["0", "0", "x"], vec!["1", "1", "x"]]);
        assert!(filter.matches(&pass));
        assert!(!filter.matches(&fail));
    }

    #[test]
    fn test_cross_role_comparison() {
        let filter = Filter::compile("spk_A != spk_X and not c1_B == 1", &attributes()).unwrap();
        assert_eq!(filter.single_role(), None);
        assert_eq!(filter.roles().count(), 3);

        let pass = Triple([vec!["0", "0", "bob"], vec!["1", "0", "bob"], vec!["0", "1", "eve"]]);
        let fail = Triple([vec!["0", "0", "bob"], vec!["1", "0", "bob"], vec!["0", "1", "bob"]]);
        assert!(filter.matches(&pass));
        assert!(!filter.matches(&fail));
    }

    #[test]
    fn test_membership_and_numeric_compare() {
        let filter = Filter::compile("spk in ('bob', 'eve') and c0 >= 1.5", &attributes()).unwrap();
        assert!(filter.matches(&Item(vec!["2", "0", "eve"])));
        assert!(!filter.matches(&Item(vec!["10", "0", "al"])));
        assert!(!filter.matches(&Item(vec!["1", "0", "bob"])));

        let negated = Filter::compile("spk not in ('bob')", &attributes()).unwrap();
        assert!(negated.matches(&Item(vec!["0", "0", "eve"])));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        let filter = Filter::compile("c0 < 10", &attributes()).unwrap();
        assert!(filter.matches(&Item(vec!["9", "0", "x"])));
        assert!(!filter.matches(&Item(vec!["10.0", "0", "x"])));
    }

    #[test]
    fn test_columns_are_deduplicated() {
        let filter = Filter::compile("spk_A != spk_X and c0_B == 1", &attributes()).unwrap();
        assert_eq!(filter.columns(), vec![0, 2]);
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let err = Filter::compile("c9 == 0", &attributes()).unwrap_err();
        assert!(matches!(err, Error::Filter { .. }));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = Filter::compile("c0_Y == 0", &attributes()).unwrap_err();
        assert!(err.to_string().contains("role suffix"));
    }

    #[test]
    fn test_mixed_scopes_rejected() {
        assert!(Filter::compile("c0 == 0 and c1_A == 0", &attributes()).is_err());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(Filter::compile("c0 == 0 c1", &attributes()).is_err());
        assert!(Filter::compile("[c0 == 0 for c0]", &attributes()).is_err());
    }
}
