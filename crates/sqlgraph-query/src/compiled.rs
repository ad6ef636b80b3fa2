//! Compiled statements and their terminal operations.

use crate::base::{ParamSlot, Statement};
use crate::materialize::{Fetched, MappedClass};
use crate::session::Session;
use asupersync::{Cx, Outcome};
use sqlgraph_core::{
    CardinalityError, Connection, Cursor, Entity, Error, FromValue, Ref, Result, TypeInfo, Value,
    try_map,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// SQL text, parameter slots and read plan of a finished statement.
///
/// A compiled query is immutable. Running it binds the captured values
/// and any prepared arguments in slot order; the SQL text never changes.
pub struct CompiledQuery<T> {
    sql: String,
    params: Vec<ParamSlot>,
    plan: Option<Arc<MappedClass>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CompiledQuery<T> {
    pub(crate) fn from_statement(statement: Statement) -> Self {
        Self {
            sql: statement.sql,
            params: statement.params,
            plan: statement.plan,
            _marker: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[ParamSlot] {
        &self.params
    }

    /// Read plan, when the statement selects mapped columns.
    pub fn plan(&self) -> Option<&MappedClass> {
        self.plan.as_deref()
    }

    /// Parameter values for one run; `args[n]` fills `Expr::param(n)`.
    pub fn bind(&self, args: &[Value]) -> Result<Vec<Value>> {
        self.params
            .iter()
            .map(|slot| match slot {
                ParamSlot::Value(v) => Ok(v.clone()),
                ParamSlot::Arg(n) => args.get(*n).cloned().ok_or_else(|| {
                    Error::state(
                        "bind",
                        format!(
                            "statement expects argument {} but {} were supplied",
                            n,
                            args.len()
                        ),
                    )
                }),
            })
            .collect()
    }

    fn cardinality(&self, expected: &'static str, actual: usize) -> Error {
        Error::Cardinality(CardinalityError {
            expected,
            actual,
            sql: Some(self.sql.clone()),
        })
    }
}

impl<T> Clone for CompiledQuery<T> {
    fn clone(&self) -> Self {
        Self {
            sql: self.sql.clone(),
            params: self.params.clone(),
            plan: self.plan.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CompiledQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("plan", &self.plan.as_ref().map(|p| p.type_name()))
            .finish()
    }
}

// Cardinality is judged on cursor rows; a NULL-key row yields no object
// but is still a row.

fn exactly_one<T>(query: &CompiledQuery<T>, fetched: Fetched<T>) -> Result<Ref<T>> {
    match (fetched.rows, fetched.objects.into_iter().next()) {
        (1, Some(obj)) => Ok(obj),
        (1, None) => Err(query.cardinality("exactly one row", 0)),
        (rows, _) => Err(query.cardinality("exactly one row", rows)),
    }
}

fn at_most_one<T>(query: &CompiledQuery<T>, fetched: Fetched<T>) -> Result<Option<Ref<T>>> {
    if fetched.rows > 1 {
        return Err(query.cardinality("at most one row", fetched.rows));
    }
    Ok(fetched.objects.into_iter().next())
}

fn at_least_one<T>(query: &CompiledQuery<T>, fetched: Fetched<T>) -> Result<Ref<T>> {
    fetched
        .objects
        .into_iter()
        .next()
        .ok_or_else(|| query.cardinality("at least one row", 0))
}

fn read_scalar<V, C>(connection: &C, cursor: &mut dyn Cursor) -> Result<V>
where
    V: FromValue + TypeInfo,
    C: Connection,
{
    if !cursor.advance()? {
        return V::from_value(&Value::Null);
    }
    let converted = connection.convert_value(cursor.raw_value(0)?, &V::SQL_TYPE)?;
    V::from_value(&converted)
}

impl<T: Entity> CompiledQuery<T> {
    fn require_plan(&self) -> Result<&MappedClass> {
        self.plan.as_deref().ok_or_else(|| {
            Error::state(
                "materialize",
                "statement selects no mapped columns; use scalar or execute",
            )
        })
    }

    /// Run the query and materialize at most `max` rows.
    fn fetch<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
        max: Option<usize>,
        refresh: bool,
    ) -> Result<Fetched<T>> {
        let plan = self.require_plan()?;
        let params = self.bind(args)?;
        let mut cursor = session.run_query(&self.sql, &params)?;
        session.materialize(plan, cursor.as_mut(), max, refresh)
    }

    pub fn list<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Vec<Ref<T>>> {
        Ok(self.fetch(session, args, None, false)?.objects)
    }

    pub fn single<C: Connection>(&self, session: &mut Session<C>, args: &[Value]) -> Result<Ref<T>> {
        let fetched = self.fetch(session, args, Some(2), false)?;
        exactly_one(self, fetched)
    }

    pub fn single_or_default<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Option<Ref<T>>> {
        let fetched = self.fetch(session, args, Some(2), false)?;
        at_most_one(self, fetched)
    }

    /// Like `single`, re-reading cached objects from the row.
    pub(crate) fn single_refreshed<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Ref<T>> {
        let fetched = self.fetch(session, args, Some(2), true)?;
        exactly_one(self, fetched)
    }

    pub fn first<C: Connection>(&self, session: &mut Session<C>, args: &[Value]) -> Result<Ref<T>> {
        let fetched = self.fetch(session, args, Some(1), false)?;
        at_least_one(self, fetched)
    }

    pub fn first_or_default<C: Connection>(
        &self,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Result<Option<Ref<T>>> {
        let fetched = self.fetch(session, args, Some(1), false)?;
        Ok(fetched.objects.into_iter().next())
    }

    /// Column 0 of the first row; a query without rows reads as NULL.
    pub fn scalar<V, C>(&self, session: &mut Session<C>, args: &[Value]) -> Result<V>
    where
        V: FromValue + TypeInfo,
        C: Connection,
    {
        let params = self.bind(args)?;
        let mut cursor = session.run_query(&self.sql, &params)?;
        read_scalar(session.connection(), cursor.as_mut())
    }

    pub fn execute<C: Connection>(&self, session: &mut Session<C>, args: &[Value]) -> Result<u64> {
        let params = self.bind(args)?;
        session.run_execute(&self.sql, &params)
    }

    async fn fetch_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
        max: Option<usize>,
    ) -> Outcome<Fetched<T>, Error> {
        let plan = match self.require_plan() {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        let params = match self.bind(args) {
            Ok(params) => params,
            Err(e) => return Outcome::Err(e),
        };
        session.log_statement("query", &self.sql, &params);
        let cursor = session
            .connection()
            .query_async(cx, &self.sql, &params)
            .await;
        try_map(cursor, |mut cursor| {
            session.materialize(plan, cursor.as_mut(), max, false)
        })
    }

    pub async fn list_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Vec<Ref<T>>, Error> {
        let fetched = self.fetch_async(cx, session, args, None).await;
        try_map(fetched, |fetched| Ok(fetched.objects))
    }

    pub async fn single_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Ref<T>, Error> {
        let fetched = self.fetch_async(cx, session, args, Some(2)).await;
        try_map(fetched, |fetched| exactly_one(self, fetched))
    }

    pub async fn single_or_default_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Option<Ref<T>>, Error> {
        let fetched = self.fetch_async(cx, session, args, Some(2)).await;
        try_map(fetched, |fetched| at_most_one(self, fetched))
    }

    pub async fn first_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Ref<T>, Error> {
        let fetched = self.fetch_async(cx, session, args, Some(1)).await;
        try_map(fetched, |fetched| at_least_one(self, fetched))
    }

    pub async fn first_or_default_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<Option<Ref<T>>, Error> {
        let fetched = self.fetch_async(cx, session, args, Some(1)).await;
        try_map(fetched, |fetched| Ok(fetched.objects.into_iter().next()))
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
        let params = match self.bind(args) {
            Ok(params) => params,
            Err(e) => return Outcome::Err(e),
        };
        session.log_statement("query", &self.sql, &params);
        let connection = session.connection();
        let cursor = connection.query_async(cx, &self.sql, &params).await;
        try_map(cursor, |mut cursor| read_scalar(connection, cursor.as_mut()))
    }

    pub async fn execute_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
        args: &[Value],
    ) -> Outcome<u64, Error> {
        let params = match self.bind(args) {
            Ok(params) => params,
            Err(e) => return Outcome::Err(e),
        };
        session.log_statement("execute", &self.sql, &params);
        session
            .connection()
            .execute_async(cx, &self.sql, &params)
            .await
    }
}
