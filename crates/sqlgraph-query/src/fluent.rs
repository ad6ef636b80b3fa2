//! Typestate fluent builder.
//!
//! `Query<T, S>` wraps a [`BaseQueryBuilder`] with a state marker `S`. Each
//! state only exposes the clauses that may legally follow it, and every
//! transition consumes the builder and returns it in the next state:
//!
//! ```text
//! SELECT: Start -> SelectList -> FromJoin -> Where -> GroupBy -> OrderBy -> Limit
//! INSERT: InsertInto -> Values
//! UPDATE: UpdateStart -> UpdateSet -> UpdateWhere
//! DELETE: DeleteStart -> DeleteFrom -> DeleteWhere
//! ```
//!
//! ```ignore
//! let posts = session
//!     .select::<Post>()?
//!     .select_all()
//!     .from()
//!     .where_(Expr::col("Title").like("Rust%"))?
//!     .order_by("Title")?
//!     .list(&mut session)?;
//! ```

use crate::base::{BaseQueryBuilder, ParamSlot};
use crate::compiled::CompiledQuery;
use crate::dialect::Dialect;
use crate::expr::{Expr, SubQuery};
use crate::session::Session;
use asupersync::{Cx, Outcome};
use sqlgraph_core::{
    Connection, Entity, Error, FromValue, Mapper, Ref, Result, TypeInfo, TypeRef,
};
use std::marker::PhantomData;
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
}

/// A builder state.
pub trait State: sealed::Sealed {}

macro_rules! states {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;
            impl sealed::Sealed for $name {}
            impl State for $name {}
        )*
    };
}

states! {
    /// Nothing emitted yet
    Start,
    /// Inside the select list
    SelectList,
    /// After `FROM` and any joins
    FromJoin,
    /// After at least one predicate
    Where,
    /// Inside a parenthesized predicate group
    SubWhere,
    GroupBy,
    OrderBy,
    Limit,
    InsertInto,
    Values,
    UpdateStart,
    UpdateSet,
    UpdateWhere,
    DeleteStart,
    DeleteFrom,
    DeleteWhere,
}

/// States whose statement is complete and can be compiled.
pub trait Complete: State {}

/// States from which a SELECT can run and materialize rows.
pub trait CanExecute: Complete {}

/// States that accept predicates; `Filtered` is the state after one.
pub trait Filterable: State {
    type Filtered: State;
}

/// States where the next predicate opens the `WHERE` clause.
pub trait Opening: Filterable {}

/// States where the next predicate continues with `AND` or `OR`.
pub trait Combining: Filterable {}

pub trait Selecting: State {
    #[doc(hidden)]
    const FIRST: bool;
}

pub trait CanGroup: State {}
pub trait CanOrder: State {}
pub trait CanLimit: State {}
pub trait Assigning: State {}

/// States that run as a statement rather than a query.
pub trait CanRun: Complete {}

impl Complete for SelectList {}
impl Complete for FromJoin {}
impl Complete for Where {}
impl Complete for GroupBy {}
impl Complete for OrderBy {}
impl Complete for Limit {}
impl Complete for Values {}
impl Complete for UpdateSet {}
impl Complete for UpdateWhere {}
impl Complete for DeleteFrom {}
impl Complete for DeleteWhere {}

impl CanExecute for SelectList {}
impl CanExecute for FromJoin {}
impl CanExecute for Where {}
impl CanExecute for GroupBy {}
impl CanExecute for OrderBy {}
impl CanExecute for Limit {}

impl CanRun for Values {}
impl CanRun for UpdateSet {}
impl CanRun for UpdateWhere {}
impl CanRun for DeleteFrom {}
impl CanRun for DeleteWhere {}

impl Filterable for FromJoin {
    type Filtered = Where;
}
impl Filterable for Where {
    type Filtered = Where;
}
impl Filterable for SubWhere {
    type Filtered = SubWhere;
}
impl Filterable for UpdateSet {
    type Filtered = UpdateWhere;
}
impl Filterable for UpdateWhere {
    type Filtered = UpdateWhere;
}
impl Filterable for DeleteFrom {
    type Filtered = DeleteWhere;
}
impl Filterable for DeleteWhere {
    type Filtered = DeleteWhere;
}

impl Opening for FromJoin {}
impl Opening for UpdateSet {}
impl Opening for DeleteFrom {}

impl Combining for Where {}
impl Combining for SubWhere {}
impl Combining for UpdateWhere {}
impl Combining for DeleteWhere {}

impl Selecting for Start {
    const FIRST: bool = true;
}
impl Selecting for SelectList {
    const FIRST: bool = false;
}

impl CanGroup for FromJoin {}
impl CanGroup for Where {}
impl CanGroup for GroupBy {}

impl CanOrder for FromJoin {}
impl CanOrder for Where {}
impl CanOrder for GroupBy {}

impl CanLimit for FromJoin {}
impl CanLimit for Where {}
impl CanLimit for GroupBy {}
impl CanLimit for OrderBy {}

impl Assigning for UpdateStart {}
impl Assigning for UpdateSet {}

/// Entry point for building statements over `T`.
pub struct QueryRoot<T> {
    mapper: Arc<Mapper>,
    dialect: Dialect,
    default_schema: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> QueryRoot<T> {
    pub fn new(mapper: Arc<Mapper>, dialect: Dialect) -> Self {
        Self {
            mapper,
            dialect,
            default_schema: None,
            _marker: PhantomData,
        }
    }

    /// Schema for tables that do not declare one.
    pub fn with_default_schema(mut self, schema: Option<String>) -> Self {
        self.default_schema = schema;
        self
    }

    fn base(self, alias: Option<&str>) -> Result<BaseQueryBuilder> {
        Ok(
            BaseQueryBuilder::for_type(self.mapper, self.dialect, &TypeRef::of::<T>(), alias)?
                .with_default_schema(self.default_schema),
        )
    }

    /// A SELECT whose root table is aliased `t`.
    pub fn select(self) -> Result<Query<T, Start>> {
        self.select_as("t")
    }

    pub fn select_as(self, alias: &str) -> Result<Query<T, Start>> {
        Ok(Query::from_base(self.base(Some(alias))?))
    }

    pub fn insert_into(self) -> Result<Query<T, InsertInto>> {
        let mut base = self.base(None)?;
        base.begin_insert();
        Ok(Query::from_base(base))
    }

    pub fn update(self) -> Result<Query<T, UpdateStart>> {
        let mut base = self.base(None)?;
        base.begin_update();
        Ok(Query::from_base(base))
    }

    pub fn delete(self) -> Result<Query<T, DeleteStart>> {
        let mut base = self.base(None)?;
        base.begin_delete();
        Ok(Query::from_base(base))
    }

    /// `DROP TABLE` for `T`.
    pub fn drop_table(self) -> Result<CompiledQuery<T>> {
        let mut base = self.base(None)?;
        base.drop_table();
        Ok(CompiledQuery::from_statement(base.finish()?))
    }
}

impl<T> Clone for QueryRoot<T> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            dialect: self.dialect,
            default_schema: self.default_schema.clone(),
            _marker: PhantomData,
        }
    }
}

/// A statement over `T` in state `S`.
pub struct Query<T, S> {
    base: BaseQueryBuilder,
    _marker: PhantomData<fn() -> (T, S)>,
}

impl<T, S> Query<T, S> {
    pub(crate) fn from_base(base: BaseQueryBuilder) -> Self {
        Self {
            base,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_base(self) -> BaseQueryBuilder {
        self.base
    }

    fn cast<S2>(self) -> Query<T, S2> {
        Query::from_base(self.base)
    }

    /// SQL text emitted so far.
    pub fn sql(&self) -> &str {
        self.base.sql()
    }

    /// Parameter slots bound so far, in `@ItemN` order.
    pub fn params(&self) -> &[ParamSlot] {
        self.base.params()
    }
}

impl<T, S> std::fmt::Debug for Query<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.base.sql())
            .field("params", &self.base.params())
            .finish()
    }
}

// ==================== SELECT list ====================

impl<T: Entity, S: Selecting> Query<T, S> {
    fn into_select_list(mut self) -> Query<T, SelectList> {
        if S::FIRST {
            self.base.begin_select();
        }
        self.cast()
    }

    /// Every column of the root table.
    pub fn select_all(self) -> Query<T, SelectList> {
        let mut q = self.into_select_list();
        q.base.select_all();
        q
    }

    /// Every column of the table reached through a reference path.
    ///
    /// The path must be joined before the statement runs, e.g. with
    /// [`Query::left_join_on_id`].
    pub fn all_of(self, path: &str) -> Result<Query<T, SelectList>> {
        let mut q = self.into_select_list();
        q.base.select_all_of(path)?;
        Ok(q)
    }

    /// One column, possibly through references (`"Author.Name"`).
    pub fn column(self, path: &str) -> Result<Query<T, SelectList>> {
        let mut q = self.into_select_list();
        q.base.select_column(path)?;
        Ok(q)
    }

    /// An expression read back as a scalar.
    pub fn values(self, expr: impl Into<Expr>) -> Result<Query<T, SelectList>> {
        let mut q = self.into_select_list();
        q.base.select_value(&expr.into())?;
        Ok(q)
    }

    /// `COUNT(*)`.
    pub fn count(self) -> Query<T, SelectList> {
        let mut q = self.into_select_list();
        q.base.select_count();
        q
    }
}

impl<T: Entity> Query<T, SelectList> {
    pub fn from(mut self) -> Query<T, FromJoin> {
        self.base.from();
        self.cast()
    }
}

// ==================== FROM / JOIN ====================

impl<T: Entity> Query<T, FromJoin> {
    /// `LEFT JOIN` each table along a reference path on its key.
    pub fn left_join_on_id(mut self, path: &str) -> Result<Self> {
        self.base.left_join_on_id(path)?;
        Ok(self)
    }

    /// `INNER JOIN` of `U`, addressable in expressions as `name`.
    pub fn inner_join<U: Entity>(mut self, name: &str, on: impl Into<Expr>) -> Result<Self> {
        self.base
            .join("INNER JOIN", &TypeRef::of::<U>(), name, &on.into())?;
        Ok(self)
    }

    pub fn left_join<U: Entity>(mut self, name: &str, on: impl Into<Expr>) -> Result<Self> {
        self.base
            .join("LEFT JOIN", &TypeRef::of::<U>(), name, &on.into())?;
        Ok(self)
    }
}

// ==================== WHERE ====================

impl<T: Entity, S: Opening> Query<T, S> {
    /// First predicate: emits `WHERE`.
    pub fn where_(mut self, predicate: impl Into<Expr>) -> Result<Query<T, S::Filtered>> {
        self.base.where_(&predicate.into())?;
        Ok(self.cast())
    }
}

impl<T: Entity, S: Combining> Query<T, S> {
    pub fn and_where(mut self, predicate: impl Into<Expr>) -> Result<Self> {
        self.base.where_(&predicate.into())?;
        Ok(self)
    }

    pub fn or_where(mut self, predicate: impl Into<Expr>) -> Result<Self> {
        self.base.or_where(&predicate.into())?;
        Ok(self)
    }

    /// `OR (...)` around the predicates added by `build`.
    pub fn or_where_sub<F>(mut self, build: F) -> Result<Self>
    where
        F: FnOnce(Query<T, SubWhere>) -> Result<Query<T, SubWhere>>,
    {
        self.base.open_group(true)?;
        let mut q = build(self.cast())?;
        q.base.close_group()?;
        Ok(q.cast())
    }
}

impl<T: Entity, S: Filterable> Query<T, S> {
    /// Parenthesized group of predicates, joined to the clause with `AND`
    /// (or opening it with `WHERE`).
    pub fn where_sub<F>(mut self, build: F) -> Result<Query<T, S::Filtered>>
    where
        F: FnOnce(Query<T, SubWhere>) -> Result<Query<T, SubWhere>>,
    {
        self.base.open_group(false)?;
        let mut q = build(self.cast())?;
        q.base.close_group()?;
        Ok(q.cast())
    }

    /// `EXISTS (subquery over E)`.
    pub fn where_exists<E, S2, F>(self, build: F) -> Result<Query<T, S::Filtered>>
    where
        E: Entity,
        S2: CanExecute,
        F: Fn(Query<E, Start>) -> Result<Query<E, S2>> + Send + Sync + 'static,
    {
        self.exists_clause(SubQuery::new(false, build))
    }

    pub fn where_not_exists<E, S2, F>(self, build: F) -> Result<Query<T, S::Filtered>>
    where
        E: Entity,
        S2: CanExecute,
        F: Fn(Query<E, Start>) -> Result<Query<E, S2>> + Send + Sync + 'static,
    {
        self.exists_clause(SubQuery::new(true, build))
    }

    fn exists_clause(mut self, sub: SubQuery) -> Result<Query<T, S::Filtered>> {
        self.base.where_exists(&sub)?;
        Ok(self.cast())
    }
}

// ==================== GROUP BY / ORDER BY / LIMIT ====================

impl<T: Entity, S: CanGroup> Query<T, S> {
    pub fn group_by(mut self, path: &str) -> Result<Query<T, GroupBy>> {
        self.base.group_by(path)?;
        Ok(self.cast())
    }
}

impl<T: Entity, S: CanOrder> Query<T, S> {
    pub fn order_by(mut self, path: &str) -> Result<Query<T, OrderBy>> {
        self.base.order_by(&Expr::col(path), false)?;
        Ok(self.cast())
    }

    pub fn order_by_desc(mut self, path: &str) -> Result<Query<T, OrderBy>> {
        self.base.order_by(&Expr::col(path), true)?;
        Ok(self.cast())
    }
}

impl<T: Entity> Query<T, OrderBy> {
    pub fn then_by(mut self, path: &str) -> Result<Self> {
        self.base.order_by(&Expr::col(path), false)?;
        Ok(self)
    }

    pub fn then_by_desc(mut self, path: &str) -> Result<Self> {
        self.base.order_by(&Expr::col(path), true)?;
        Ok(self)
    }
}

impl<T: Entity, S: CanLimit> Query<T, S> {
    /// Skip `offset` rows and return at most `count`, both bound as parameters.
    pub fn limit(
        mut self,
        offset: impl Into<Expr>,
        count: impl Into<Expr>,
    ) -> Result<Query<T, Limit>> {
        self.base.limit(&offset.into(), &count.into())?;
        Ok(self.cast())
    }

    pub fn take(mut self, count: impl Into<Expr>) -> Result<Query<T, Limit>> {
        self.base.take(&count.into())?;
        Ok(self.cast())
    }
}

// ==================== INSERT / UPDATE / DELETE ====================

impl<T: Entity> Query<T, InsertInto> {
    /// Insert every writable column of `obj`.
    pub fn values_of(mut self, obj: &Ref<T>) -> Result<Query<T, Values>> {
        self.base.insert_object(&obj.erase())?;
        Ok(self.cast())
    }

    /// Insert explicit `(property path, value)` pairs.
    pub fn columns(mut self, columns: Vec<(&str, Expr)>) -> Result<Query<T, Values>> {
        let columns: Vec<(String, Expr)> = columns
            .into_iter()
            .map(|(path, value)| (path.to_string(), value))
            .collect();
        self.base.insert_values(&columns)?;
        Ok(self.cast())
    }
}

impl<T: Entity, S: Assigning> Query<T, S> {
    pub fn set(mut self, path: &str, value: impl Into<Expr>) -> Result<Query<T, UpdateSet>> {
        self.base.set(path, &value.into())?;
        Ok(self.cast())
    }

    /// Assign every writable, non-key column from `obj`.
    pub fn set_all(mut self, obj: &Ref<T>) -> Result<Query<T, UpdateSet>> {
        self.base.set_all(&obj.erase())?;
        Ok(self.cast())
    }
}

impl<T: Entity> Query<T, DeleteStart> {
    pub fn from(mut self) -> Query<T, DeleteFrom> {
        self.base.delete_from();
        self.cast()
    }
}

// ==================== Terminals ====================

impl<T: Entity, S: Complete> Query<T, S> {
    /// Finish the statement: SQL text, parameter slots and read plan.
    pub fn compile(self) -> Result<CompiledQuery<T>> {
        Ok(CompiledQuery::from_statement(self.base.finish()?))
    }
}

impl<T: Entity, S: CanExecute> Query<T, S> {
    /// Compile with an implicit `LIMIT 1` unless a limit was written.
    pub fn compile_first(mut self) -> Result<CompiledQuery<T>> {
        self.base.limit_one();
        Ok(CompiledQuery::from_statement(self.base.finish()?))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(type_name = T::TABLE_NAME))]
    pub fn list<C: Connection>(self, session: &mut Session<C>) -> Result<Vec<Ref<T>>> {
        self.compile()?.list(session, &[])
    }

    /// Exactly one row, or a cardinality error.
    pub fn single<C: Connection>(self, session: &mut Session<C>) -> Result<Ref<T>> {
        self.compile()?.single(session, &[])
    }

    /// At most one row; `None` when there is none.
    pub fn single_or_default<C: Connection>(
        self,
        session: &mut Session<C>,
    ) -> Result<Option<Ref<T>>> {
        self.compile()?.single_or_default(session, &[])
    }

    /// The first row, or a cardinality error when there is none.
    pub fn first<C: Connection>(self, session: &mut Session<C>) -> Result<Ref<T>> {
        self.compile_first()?.first(session, &[])
    }

    pub fn first_or_default<C: Connection>(
        self,
        session: &mut Session<C>,
    ) -> Result<Option<Ref<T>>> {
        self.compile_first()?.first_or_default(session, &[])
    }

    /// Column 0 of the first row, converted by the connection.
    pub fn scalar<V, C>(self, session: &mut Session<C>) -> Result<V>
    where
        V: FromValue + TypeInfo,
        C: Connection,
    {
        self.compile()?.scalar(session, &[])
    }

    pub async fn list_async<C: Connection>(
        self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Vec<Ref<T>>, Error> {
        match self.compile() {
            Ok(compiled) => compiled.list_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn single_async<C: Connection>(
        self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Ref<T>, Error> {
        match self.compile() {
            Ok(compiled) => compiled.single_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn single_or_default_async<C: Connection>(
        self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Option<Ref<T>>, Error> {
        match self.compile() {
            Ok(compiled) => compiled.single_or_default_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn first_async<C: Connection>(
        self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Ref<T>, Error> {
        match self.compile_first() {
            Ok(compiled) => compiled.first_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn first_or_default_async<C: Connection>(
        self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Option<Ref<T>>, Error> {
        match self.compile_first() {
            Ok(compiled) => compiled.first_or_default_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn scalar_async<V, C>(self, cx: &Cx, session: &mut Session<C>) -> Outcome<V, Error>
    where
        V: FromValue + TypeInfo,
        C: Connection,
    {
        match self.compile() {
            Ok(compiled) => compiled.scalar_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }
}

impl<T: Entity, S: CanRun> Query<T, S> {
    /// Run the statement, returning the number of affected rows.
    #[tracing::instrument(level = "debug", skip_all, fields(type_name = T::TABLE_NAME))]
    pub fn execute<C: Connection>(self, session: &mut Session<C>) -> Result<u64> {
        self.compile()?.execute(session, &[])
    }

    pub async fn execute_async<C: Connection>(
        self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<u64, Error> {
        match self.compile() {
            Ok(compiled) => compiled.execute_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }
}
