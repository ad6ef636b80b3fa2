//! The expression union accepted by predicates, projections and assignments.
//!
//! Expressions are plain data. Member chains are resolved against the
//! mapping model only when a query builder translates them, so an
//! expression can be built once and reused across queries.

use crate::base::BaseQueryBuilder;
use crate::fluent::{CanExecute, Query, Start};
use sqlgraph_core::{Entity, Result, TypeRef, Value};
use std::fmt;
use std::sync::Arc;

/// A property path, optionally rooted at a named table scope.
///
/// `Author.Name` walks the `Author` reference of the current table and
/// reads the `Name` column of the joined author. With `key` set, the chain
/// denotes the primary key reached by the path; an empty path with `key`
/// set is the key of the scope itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberChain {
    /// Table scope the path starts from; `None` is the current table
    pub root: Option<String>,
    pub path: Vec<String>,
    pub key: bool,
}

impl MemberChain {
    /// Parse a dotted path such as `"Author.Name"`.
    pub fn parse(path: &str) -> Self {
        Self {
            root: None,
            path: split_path(path),
            key: false,
        }
    }

    pub fn rooted(root: &str, path: &str) -> Self {
        Self {
            root: Some(root.to_string()),
            path: split_path(path),
            key: false,
        }
    }

    /// The key of the table a chain lands on.
    pub fn key_of(mut self) -> Self {
        self.key = true;
        self
    }
}

impl fmt::Display for MemberChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = &self.root {
            write!(f, "{}", root)?;
            if !self.path.is_empty() {
                f.write_str(".")?;
            }
        }
        f.write_str(&self.path.join("."))?;
        if self.key {
            f.write_str(".Key()")?;
        }
        Ok(())
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => " LIKE",
        }
    }

    /// For `=` and `<>` against a null literal, the operand rendered as
    /// `IS [NOT] NULL`. The null literal itself binds nothing.
    pub(crate) fn null_tested<'a>(self, left: &'a Expr, right: &'a Expr) -> Option<&'a Expr> {
        if !matches!(self, CompareOp::Eq | CompareOp::Ne) {
            return None;
        }
        if matches!(right, Expr::Literal(Value::Null)) {
            Some(left)
        } else if matches!(left, Expr::Literal(Value::Null)) {
            Some(right)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// `COUNT(*)`
    CountAll,
    Count(Box<Expr>),
    Sum(Box<Expr>),
    Avg(Box<Expr>),
    Min(Box<Expr>),
    Max(Box<Expr>),
    /// Key generated by the last insert, spelled per dialect
    LastInsertedId,
}

pub(crate) type SubQueryFn =
    Arc<dyn Fn(BaseQueryBuilder) -> Result<BaseQueryBuilder> + Send + Sync>;

/// A nested query used by `EXISTS` and `NOT EXISTS`.
#[derive(Clone)]
pub struct SubQuery {
    pub(crate) element: TypeRef,
    pub(crate) negated: bool,
    pub(crate) build: SubQueryFn,
}

impl fmt::Debug for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubQuery")
            .field("element", &self.element.type_name)
            .field("negated", &self.negated)
            .finish_non_exhaustive()
    }
}

impl PartialEq for SubQuery {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
            && self.negated == other.negated
            && Arc::ptr_eq(&self.build, &other.build)
    }
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Member(MemberChain),
    /// A value bound as the next `@ItemN` parameter
    Literal(Value),
    /// Argument `n` supplied when a prepared query runs
    Param(usize),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    Call(Function),
    SubQuery(SubQuery),
}

impl Expr {
    /// Column of the current table, or a dotted path through references.
    pub fn col(path: &str) -> Self {
        Expr::Member(MemberChain::parse(path))
    }

    /// Column reached from the table scope named `root`.
    pub fn member(root: &str, path: &str) -> Self {
        Expr::Member(MemberChain::rooted(root, path))
    }

    /// Key of the current table.
    pub fn id() -> Self {
        Expr::Member(MemberChain {
            root: None,
            path: Vec::new(),
            key: true,
        })
    }

    /// Key of the table scope named `root`.
    pub fn id_of(root: &str) -> Self {
        Expr::Member(MemberChain::rooted(root, "").key_of())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    /// Placeholder for the `n`th argument of a prepared query.
    pub fn param(n: usize) -> Self {
        Expr::Param(n)
    }

    /// Key of the table this member chain lands on.
    ///
    /// `Expr::col("Author").key()` reads the foreign key column without
    /// requiring a join.
    pub fn key(self) -> Self {
        match self {
            Expr::Member(chain) => Expr::Member(chain.key_of()),
            other => other,
        }
    }

    fn compare(self, op: CompareOp, other: impl Into<Expr>) -> Self {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Ge, other)
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Like, pattern)
    }

    /// `IS NULL`, written as a comparison with a null literal.
    pub fn is_null(self) -> Self {
        self.compare(CompareOp::Eq, Expr::null())
    }

    pub fn is_not_null(self) -> Self {
        self.compare(CompareOp::Ne, Expr::null())
    }

    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn and(self, other: impl Into<Expr>) -> Self {
        Expr::And(Box::new(self), Box::new(other.into()))
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        Expr::Or(Box::new(self), Box::new(other.into()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    fn arith(self, op: ArithOp, other: impl Into<Expr>) -> Self {
        Expr::Arith {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.arith(ArithOp::Add, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.arith(ArithOp::Sub, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.arith(ArithOp::Mul, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.arith(ArithOp::Div, other)
    }

    pub fn count_star() -> Self {
        Expr::Call(Function::CountAll)
    }

    pub fn count(self) -> Self {
        Expr::Call(Function::Count(Box::new(self)))
    }

    pub fn sum(self) -> Self {
        Expr::Call(Function::Sum(Box::new(self)))
    }

    pub fn avg(self) -> Self {
        Expr::Call(Function::Avg(Box::new(self)))
    }

    pub fn min(self) -> Self {
        Expr::Call(Function::Min(Box::new(self)))
    }

    pub fn max(self) -> Self {
        Expr::Call(Function::Max(Box::new(self)))
    }

    pub fn last_inserted_id() -> Self {
        Expr::Call(Function::LastInsertedId)
    }

    /// `EXISTS (subquery)` over `E`.
    ///
    /// The subquery may refer to the enclosing query's table scopes by
    /// name, e.g. `Expr::id_of("t")`.
    pub fn exists<E, S, F>(build: F) -> Self
    where
        E: Entity,
        S: CanExecute,
        F: Fn(Query<E, Start>) -> Result<Query<E, S>> + Send + Sync + 'static,
    {
        Expr::SubQuery(SubQuery::new(false, build))
    }

    pub fn not_exists<E, S, F>(build: F) -> Self
    where
        E: Entity,
        S: CanExecute,
        F: Fn(Query<E, Start>) -> Result<Query<E, S>> + Send + Sync + 'static,
    {
        Expr::SubQuery(SubQuery::new(true, build))
    }

    /// Number of `@ItemN` slots translating this expression binds.
    ///
    /// Literals and prepared-query arguments each take a slot, in the same
    /// branches the translator writes them. `None` when the tree holds a
    /// subquery: what it binds depends on the builder chain it runs.
    pub fn literal_count(&self) -> Option<usize> {
        Some(match self {
            Expr::Literal(_) | Expr::Param(_) => 1,
            Expr::Member(_) => 0,
            Expr::SubQuery(_) => return None,
            Expr::Compare { op, left, right } => match op.null_tested(left, right) {
                Some(tested) => tested.literal_count()?,
                None => left.literal_count()? + right.literal_count()?,
            },
            Expr::Arith { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.literal_count()? + right.literal_count()?
            }
            Expr::Not(e) => e.literal_count()?,
            // an empty list renders a constant and skips the left side
            Expr::In { values, .. } if values.is_empty() => 0,
            Expr::In { expr, values, .. } => {
                let mut count = expr.literal_count()?;
                for value in values {
                    count += value.literal_count()?;
                }
                count
            }
            Expr::Call(f) => match f {
                Function::CountAll | Function::LastInsertedId => 0,
                Function::Count(e)
                | Function::Sum(e)
                | Function::Avg(e)
                | Function::Min(e)
                | Function::Max(e) => e.literal_count()?,
            },
        })
    }
}

impl SubQuery {
    pub(crate) fn new<E, S, F>(negated: bool, build: F) -> Self
    where
        E: Entity,
        S: CanExecute,
        F: Fn(Query<E, Start>) -> Result<Query<E, S>> + Send + Sync + 'static,
    {
        let build: SubQueryFn =
            Arc::new(move |base| build(Query::from_base(base)).map(Query::into_base));
        SubQuery {
            element: TypeRef::of::<E>(),
            negated,
            build,
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Literal(v.into())
                }
            }
        )*
    };
}

literal_from!(&str, String, i32, i64, bool, f64);

impl From<MemberChain> for Expr {
    fn from(chain: MemberChain) -> Self {
        Expr::Member(chain)
    }
}
