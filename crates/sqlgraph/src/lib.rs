//! sqlgraph - typed SQL query building with identity-preserving object
//! graph loading.
//!
//! sqlgraph has two halves:
//!
//! - a staged query compiler: `Query<T, S>` only exposes the clauses legal
//!   in state `S` and compiles to SQL text plus an ordered `@ItemN`
//!   parameter list
//! - a result materializer: rows are read back into `Ref<T>` graphs where
//!   every (type, key) resolves to one shared instance per session
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlgraph::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Author {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Author {
//!     const TABLE_NAME: &'static str = "Author";
//!
//!     fn map(m: &mut MappingBuilder<Self>) {
//!         m.key("Id", |a| &a.id, |a| &mut a.id).automatic();
//!         m.column("Name", |a| &a.name, |a| &mut a.name).max_length(200);
//!     }
//! }
//!
//! fn example(connection: impl Connection) -> Result<()> {
//!     let mut mapper = Mapper::new();
//!     mapper.register::<Author>()?;
//!     let mut session = Session::new(connection, Arc::new(mapper));
//!
//!     let ann = Ref::new(Author { name: "Ann".into(), ..Default::default() });
//!     session.save(&ann)?;
//!
//!     let authors = session
//!         .select::<Author>()?
//!         .select_all()
//!         .from()
//!         .where_(Expr::col("Name").like("A%"))?
//!         .order_by("Name")?
//!         .list(&mut session)?;
//!     assert!(authors.iter().any(|a| Ref::ptr_eq(a, &ann)));
//!     Ok(())
//! }
//! ```

pub use sqlgraph_core::{
    AnyRef, BoxCursor, CardinalityError, CollectionLoader, CollectionMapping, CollectionOwner,
    ColumnValue, Connection, ConsistencyError, Cursor, Cx, DriverError, Entity, Error,
    FromValue, IdentityEntry, IdentityMap, LazyCollection, Mapper, MappingBuilder, MappingError,
    MappingErrorKind, Outcome, PrimaryKey, PropertyBuilder, PropertyKind, PropertyMapping, Ref,
    ReferentialAction, Result, Row, RowCursor, SqlType, StateError, TransactionError,
    TransactionErrorKind, TypeError, TypeInfo, TypeMapping, TypeRef, Value, coerce_value,
};
pub use sqlgraph_query::{
    CompiledQuery, Dialect, Expr, Function, MappedClass, MemberChain, ParamSlot, PreparedQuery,
    Query, QueryRoot, Queryable, Session, SessionBuilder, SessionConfig, SqlStringBuilder,
};

/// Builder states and the capability traits that gate each clause.
pub mod state {
    pub use sqlgraph_query::fluent::{
        Assigning, CanExecute, CanGroup, CanLimit, CanOrder, CanRun, Combining, Complete,
        DeleteFrom, DeleteStart, DeleteWhere, Filterable, FromJoin, GroupBy, InsertInto, Limit,
        Opening, OrderBy, SelectList, Selecting, Start, State, SubWhere, UpdateSet, UpdateStart,
        UpdateWhere, Values, Where,
    };
}

/// Everything needed to map types and run queries.
pub mod prelude {
    pub use crate::{
        Connection, Cx, Dialect, Entity, Error, Expr, LazyCollection, Mapper, MappingBuilder,
        Outcome, PreparedQuery, Query, QueryRoot, Queryable, Ref, Result, Row, Session,
        SessionBuilder, SessionConfig, Value,
    };
    pub use std::sync::Arc;
}
