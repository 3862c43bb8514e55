//! Filter AST node types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Role of an item inside an ABX triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    A,
    B,
    X,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::A, Role::B, Role::X];

    pub fn suffix(self) -> &'static str {
        match self {
            Role::A => "A",
            Role::B => "B",
            Role::X => "X",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "A" => Some(Role::A),
            "B" => Some(Role::B),
            "X" => Some(Role::X),
            _ => None,
        }
    }

    /// Split `c0_A` into (`c0`, A). `None` when there is no `_` suffix at all.
    pub fn split_suffix(name: &str) -> Option<(&str, Result<Role, &str>)> {
        let (base, suffix) = name.rsplit_once('_')?;
        Some((base, Role::from_suffix(suffix).ok_or(suffix)))
    }
}

/// A resolved column reference
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub attribute: usize,
    /// `None` for an unscoped reference
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub text: String,
    pub number: Option<f64>,
}

impl Literal {
    pub fn string(text: impl Into<String>) -> Self {
        Self { text: text.into(), number: None }
    }

    pub fn number(text: impl Into<String>, number: f64) -> Self {
        Self { text: text.into(), number: Some(number) }
    }

    pub fn boolean(value: bool) -> Self {
        if value {
            Self::number("True", 1.0)
        } else {
            Self::number("False", 0.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Literal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Neq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        operand: Operand,
        list: Vec<Literal>,
        negated: bool,
    },
    Constant(bool),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Visit every column reference
    pub fn for_each_column(&self, f: &mut impl FnMut(&ColumnRef)) {
        let operand = |o: &Operand, f: &mut dyn FnMut(&ColumnRef)| {
            if let Operand::Column(c) = o {
                f(c);
            }
        };
        match self {
            Expr::Compare { left, right, .. } => {
                operand(left, f);
                operand(right, f);
            }
            Expr::In { operand: o, .. } => operand(o, f),
            Expr::Constant(_) => {}
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.for_each_column(f);
                r.for_each_column(f);
            }
            Expr::Not(e) => e.for_each_column(f),
        }
    }
}
