use crate::value::Value;
use std::{
    ops::{BitAnd, BitOr},
    sync::Arc,
};

///
/// Predicate AST
///
/// Pure, schema-agnostic representation of query filters. This layer has no
/// type validation or backend knowledge; interpretation happens in the
/// per-backend compilers.
///
/// Children are reference counted so builder calls share unchanged subtrees
/// instead of cloning them. A tree handed to multiple call sites can never
/// be corrupted by one of them extending it.
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CompareOp {
    Eq = 0x01,
    Ne = 0x02,
    Lt = 0x03,
    Lte = 0x04,
    Gt = 0x05,
    Gte = 0x06,
    In = 0x07,
    NotIn = 0x08,
    Contains = 0x09,
}

impl CompareOp {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComparePredicate {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

///
/// Predicate
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Predicate {
    And(Vec<Arc<Self>>),
    Or(Vec<Arc<Self>>),
    Not(Arc<Self>),
    Compare(ComparePredicate),
    IsNull { field: String },
}

impl Predicate {
    #[must_use]
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(pred: Self) -> Self {
        Self::Not(Arc::new(pred))
    }

    /// AND this predicate with another, sharing both subtrees.
    #[must_use]
    pub fn and_with(self: &Arc<Self>, other: Self) -> Arc<Self> {
        Arc::new(Self::And(vec![self.clone(), Arc::new(other)]))
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![Arc::new(self), Arc::new(rhs)])
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![Arc::new(self), Arc::new(rhs)])
    }
}

///
/// Fluent constructors
///

#[must_use]
pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Eq, value)
}

#[must_use]
pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Ne, value)
}

#[must_use]
pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Lt, value)
}

#[must_use]
pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Lte, value)
}

#[must_use]
pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Gt, value)
}

#[must_use]
pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Gte, value)
}

#[must_use]
pub fn in_<I, T>(field: impl Into<String>, values: I) -> Predicate
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    Predicate::compare(field, CompareOp::In, Value::list(values))
}

#[must_use]
pub fn not_in<I, T>(field: impl Into<String>, values: I) -> Predicate
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    Predicate::compare(field, CompareOp::NotIn, Value::list(values))
}

/// Substring match on text fields, element containment on list fields.
#[must_use]
pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::compare(field, CompareOp::Contains, value)
}

#[must_use]
pub fn is_null(field: impl Into<String>) -> Predicate {
    Predicate::IsNull {
        field: field.into(),
    }
}
