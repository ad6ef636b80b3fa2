//! Staged query compiler and result materializer for sqlgraph.
//!
//! `sqlgraph-query` turns builder calls into SQL text plus an ordered
//! `@Item0..@ItemN` parameter list, and turns result rows back into object
//! graphs that share one instance per (type, key).
//!
//! # Role In The Architecture
//!
//! - **SQL text builder**: [`SqlStringBuilder`] with [`Dialect`] hooks for
//!   quoting, paging, auto-increment and DDL.
//! - **Expressions**: [`Expr`] is the closed predicate/value grammar the
//!   translator walks.
//! - **Fluent builder**: [`Query<T, S>`] only exposes the clauses legal in
//!   state `S`, so clause order is checked by the compiler.
//! - **Terminals**: [`CompiledQuery`] runs through a [`Session`] and reads
//!   rows back through its identity cache.
//! - **Prepared queries**: [`PreparedQuery`] compiles once and rebinds.
//! - **Queryable**: [`Queryable`] is the LINQ-style facade.

mod base;
pub mod compiled;
pub mod dialect;
pub mod expr;
pub mod fluent;
pub mod materialize;
pub mod prepared;
pub mod queryable;
pub mod session;
pub mod sql;
#[cfg(test)]
mod testing;

pub use base::ParamSlot;
pub use compiled::CompiledQuery;
pub use dialect::Dialect;
pub use expr::{ArithOp, CompareOp, Expr, Function, MemberChain, SubQuery};
pub use fluent::{
    Assigning, CanExecute, CanGroup, CanLimit, CanOrder, CanRun, Combining, Complete, DeleteFrom,
    DeleteStart, DeleteWhere, Filterable, FromJoin, GroupBy, InsertInto, Limit, Opening, OrderBy,
    Query, QueryRoot, SelectList, Selecting, Start, State, SubWhere, UpdateSet, UpdateStart,
    UpdateWhere, Values, Where,
};
pub use materialize::MappedClass;
pub use prepared::PreparedQuery;
pub use queryable::Queryable;
pub use session::{Session, SessionBuilder, SessionConfig};
pub use sql::SqlStringBuilder;
