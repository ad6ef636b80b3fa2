//! Queries compiled once and replayed with new arguments.

use crate::compiled::CompiledQuery;
use crate::fluent::{CanExecute, CanRun, Complete, Query, QueryRoot};
use crate::session::Session;
use asupersync::{Cx, Outcome};
use sqlgraph_core::{Connection, Entity, Error, FromValue, Ref, Result, TypeInfo, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

/// A builder chain compiled lazily on first use and cached.
///
/// `build` writes the statement with [`Expr::param`](crate::Expr::param)
/// placeholders; every run binds `args[n]` to placeholder `n` without
/// walking the chain again. The statement is compiled in the dialect of
/// the first session that runs it.
///
/// ```ignore
/// let by_name = PreparedQuery::new(|q: QueryRoot<Post>| {
///     q.select()?.select_all().from().where_(Expr::col("Title").eq(Expr::param(0)))
/// });
/// let a = by_name.list(&mut session, &["Rust".into()])?;
/// let b = by_name.list(&mut session, &["Zig".into()])?;
/// ```
pub struct PreparedQuery<T, S, F> {
    build: F,
    compiled: OnceLock<CompiledQuery<T>>,
    /// Variant with the implicit `LIMIT 1` of `first_or_default`
    first: OnceLock<CompiledQuery<T>>,
    _state: PhantomData<fn() -> S>,
}

impl<T, S, F> fmt::Debug for PreparedQuery<T, S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("compiled", &self.compiled.get().map(CompiledQuery::sql))
            .field("first", &self.first.get().map(CompiledQuery::sql))
            .finish_non_exhaustive()
    }
}

impl<T, S, F> PreparedQuery<T, S, F>
where
    T: Entity,
    S: Complete,
    F: Fn(QueryRoot<T>) -> Result<Query<T, S>>,
{
    pub fn new(build: F) -> Self {
        Self {
            build,
            compiled: OnceLock::new(),
            first: OnceLock::new(),
            _state: PhantomData,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    fn compiled<C: Connection>(&self, session: &Session<C>) -> Result<&CompiledQuery<T>> {
        if let Some(compiled) = self.compiled.get() {
            return Ok(compiled);
        }
        let compiled = (self.build)(session.query::<T>())?.compile()?;
        tracing::debug!(sql = compiled.sql(), "Prepared statement compiled");
        Ok(self.compiled.get_or_init(|| compiled))
    }

    /// SQL text of the statement, compiling it if needed.
    pub fn sql<C: Connection>(&self, session: &Session<C>) -> Result<&str> {
        Ok(self.compiled(session)?.sql())
    }
}

impl<T, S, F> PreparedQuery<T, S, F>
where
    T: Entity,
    S: CanExecute,
    F: Fn(QueryRoot<T>) -> Result<Query<T, S>>,
{
    fn compiled_first<C: Connection>(&self, session: &Session<C>) -> Result<&CompiledQuery<T>> {
        if let Some(compiled) = self.first.get() {
            return Ok(compiled);
        }
        let compiled = (self.build)(session.query::<T>())?.compile_first()?;
        tracing::debug!(sql = compiled.sql(), "Prepared statement compiled");
        Ok(self.first.get_or_init(|| compiled))
    }

    pub fn list<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Vec<Ref<T>>> {
        self.compiled(session)?.list(session, args)
    }

    pub fn single<C: Connection>(&self, session: &mut Session<C>, args: &[Value]) -> Result<Ref<T>> {
        self.compiled(session)?.single(session, args)
    }

    pub fn single_or_default<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Option<Ref<T>>> {
        self.compiled(session)?.single_or_default(session, args)
    }

    pub fn first<C: Connection>(&self, session: &mut Session<C>, args: &[Value]) -> Result<Ref<T>> {
        self.compiled_first(session)?.first(session, args)
    }

    pub fn first_or_default<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Option<Ref<T>>> {
        self.compiled_first(session)?.first_or_default(session, args)
    }

    pub fn scalar<V, C>(&self, session: &mut Session<C>, args: &[Value]) -> Result<V>
    where
        V: FromValue + TypeInfo,
        C: Connection,
    {
        self.compiled(session)?.scalar(session, args)
    }

    pub async fn list_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Vec<Ref<T>>, Error> {
        match self.compiled(session) {
            Ok(compiled) => compiled.list_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn single_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Ref<T>, Error> {
        match self.compiled(session) {
            Ok(compiled) => compiled.single_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn single_or_default_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Option<Ref<T>>, Error> {
        match self.compiled(session) {
            Ok(compiled) => compiled.single_or_default_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn first_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Ref<T>, Error> {
        match self.compiled_first(session) {
            Ok(compiled) => compiled.first_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn first_or_default_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Option<Ref<T>>, Error> {
        match self.compiled_first(session) {
            Ok(compiled) => compiled.first_or_default_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn scalar_async<V, C>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<V, Error>
    where
        V: FromValue + TypeInfo,
        C: Connection,
    {
        match self.compiled(session) {
            Ok(compiled) => compiled.scalar_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }
}

impl<T, S, F> PreparedQuery<T, S, F>
where
    T: Entity,
    S: CanRun,
    F: Fn(QueryRoot<T>) -> Result<Query<T, S>>,
{
    pub fn execute<C: Connection>(&self, session: &mut Session<C>, args: &[Value]) -> Result<u64> {
        self.compiled(session)?.execute(session, args)
    }

    pub async fn execute_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<u64, Error> {
        match self.compiled(session) {
            Ok(compiled) => compiled.execute_async(cx, session, args).await,
            Err(e) => Outcome::Err(e),
        }
    }
}
