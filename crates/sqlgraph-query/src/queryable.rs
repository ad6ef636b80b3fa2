//! LINQ-style query facade.
//!
//! [`Queryable`] collects filters, orderings and paging in any order and
//! only writes SQL when a terminal runs, always in clause order:
//!
//! ```ignore
//! let page = session
//!     .queryable::<TestPoco>()
//!     .filter(Expr::col("Name").eq("Toto"))
//!     .order_by("Name")
//!     .skip(10)
//!     .take(15)
//!     .to_list(&mut session)?;
//! ```

use crate::base::BaseQueryBuilder;
use crate::compiled::CompiledQuery;
use crate::expr::Expr;
use crate::fluent::QueryRoot;
use crate::session::Session;
use asupersync::{Cx, Outcome};
use sqlgraph_core::{Connection, Entity, Error, Ref, Result};

/// Root alias of the `COUNT(*)` statement.
const COUNT_ALIAS: &str = "t0";

pub struct Queryable<T> {
    root: QueryRoot<T>,
    filters: Vec<Expr>,
    order: Vec<(Expr, bool)>,
    skip: Option<Expr>,
    take: Option<Expr>,
}

impl<T> Clone for Queryable<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            filters: self.filters.clone(),
            order: self.order.clone(),
            skip: self.skip.clone(),
            take: self.take.clone(),
        }
    }
}

impl<T: Entity> Queryable<T> {
    pub fn new(root: QueryRoot<T>) -> Self {
        Self {
            root,
            filters: Vec::new(),
            order: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// Keep rows matching `predicate`; filters are joined with `AND`.
    pub fn filter(mut self, predicate: impl Into<Expr>) -> Self {
        self.filters.push(predicate.into());
        self
    }

    pub fn order_by(mut self, path: &str) -> Self {
        self.order.push((Expr::col(path), false));
        self
    }

    pub fn order_by_desc(mut self, path: &str) -> Self {
        self.order.push((Expr::col(path), true));
        self
    }

    pub fn skip(mut self, count: impl Into<Expr>) -> Self {
        self.skip = Some(count.into());
        self
    }

    pub fn take(mut self, count: impl Into<Expr>) -> Self {
        self.take = Some(count.into());
        self
    }

    fn filtered(&self, mut base: BaseQueryBuilder) -> Result<BaseQueryBuilder> {
        for predicate in &self.filters {
            base.where_(predicate)?;
        }
        Ok(base)
    }

    fn select(&self) -> Result<BaseQueryBuilder> {
        let query = self.root.clone().select()?.select_all().from();
        let mut base = self.filtered(query.into_base())?;
        for (expr, descending) in &self.order {
            base.order_by(expr, *descending)?;
        }
        match (&self.skip, &self.take) {
            (Some(skip), Some(take)) => base.limit(skip, take)?,
            // no upper bound: the largest count the limit clause accepts
            (Some(skip), None) => base.limit(skip, &Expr::lit(i64::MAX))?,
            (None, Some(take)) => base.take(take)?,
            (None, None) => {}
        }
        Ok(base)
    }

    /// Compile the row query.
    pub fn compile(&self) -> Result<CompiledQuery<T>> {
        Ok(CompiledQuery::from_statement(self.select()?.finish()?))
    }

    /// Compile the row query limited to one row unless `take` was given.
    pub fn compile_first(&self) -> Result<CompiledQuery<T>> {
        let mut base = self.select()?;
        base.limit_one();
        Ok(CompiledQuery::from_statement(base.finish()?))
    }

    /// Compile `SELECT COUNT(*)` over the filters; ordering and paging
    /// do not apply.
    pub fn compile_count(&self) -> Result<CompiledQuery<T>> {
        let query = self.root.clone().select_as(COUNT_ALIAS)?.count().from();
        let base = self.filtered(query.into_base())?;
        Ok(CompiledQuery::from_statement(base.finish()?))
    }

    pub fn to_list<C: Connection>(&self, session: &mut Session<C>) -> Result<Vec<Ref<T>>> {
        self.compile()?.list(session, &[])
    }

    pub fn count<C: Connection>(&self, session: &mut Session<C>) -> Result<i64> {
        self.compile_count()?.scalar(session, &[])
    }

    pub fn first_or_default<C: Connection>(
        &self,
        session: &mut Session<C>,
    ) -> Result<Option<Ref<T>>> {
        self.compile_first()?.first_or_default(session, &[])
    }

    pub async fn to_list_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Vec<Ref<T>>, Error> {
        match self.compile() {
            Ok(compiled) => compiled.list_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn count_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<i64, Error> {
        match self.compile_count() {
            Ok(compiled) => compiled.scalar_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn first_or_default_async<C: Connection>(
        &self,
        cx: &Cx,
        session: &mut Session<C>,
    ) -> Outcome<Option<Ref<T>>, Error> {
        match self.compile_first() {
            Ok(compiled) => compiled.first_or_default_async(cx, session, &[]).await,
            Err(e) => Outcome::Err(e),
        }
    }
}
