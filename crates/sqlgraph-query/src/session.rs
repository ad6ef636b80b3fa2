//! The connection session.
//!
//! A [`Session`] owns one connection, the identity cache every query it
//! runs materializes through, and the transaction nesting counter. It is
//! the entry point for building queries (`session.select::<T>()`) and
//! hosts the entity helpers (`load`, `get`, `save`, `update`, `delete`).
//!
//! A session is used by one flow at a time; concurrent work takes one
//! session per flow so that caches are never shared.
//!
//! # Transactions
//!
//! Transactions nest. Only the outermost `begin_transaction` opens a real
//! transaction and only the matching outermost commit or rollback ends it.
//! A rollback at any depth poisons the transaction: the outermost commit
//! then rolls back instead.

use crate::base::BaseQueryBuilder;
use crate::compiled::CompiledQuery;
use crate::dialect::Dialect;
use crate::expr::Expr;
use crate::fluent::{
    DeleteStart, FromJoin, InsertInto, Query, QueryRoot, Start, UpdateStart, Where,
};
use crate::materialize::{Fetched, MappedClass, Materializer};
use crate::queryable::Queryable;
use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};
use sqlgraph_core::{
    AnyRef, BoxCursor, CollectionLoader, Connection, Cursor, Entity, Error, IdentityMap, Mapper, Ref,
    Result, TransactionError, TransactionErrorKind, TypeMapping, Value, into_outcome,
};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// SQL dialect statements are written in.
    pub dialect: Dialect,
    /// Schema for tables that do not declare one.
    pub default_schema: Option<String>,
    /// Include bound parameter values in debug logs.
    pub log_parameters: bool,
}

impl SessionConfig {
    /// Parse a configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Custom(format!("invalid session configuration: {}", e)))
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder<C> {
    connection: C,
    mapper: Arc<Mapper>,
    config: SessionConfig,
}

impl<C: Connection> SessionBuilder<C> {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.default_schema = Some(schema.into());
        self
    }

    pub fn log_parameters(mut self, enabled: bool) -> Self {
        self.config.log_parameters = enabled;
        self
    }

    /// Replace every setting with `config`.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Session<C> {
        Session {
            connection: self.connection,
            mapper: self.mapper,
            config: self.config,
            identity: IdentityMap::new(),
            transaction_depth: 0,
            rollback_requested: false,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Plan for inserting one object.
struct InsertPlan<T> {
    mapping: Arc<TypeMapping>,
    insert: CompiledQuery<T>,
    /// Reads back a key the database generated
    last_id: Option<CompiledQuery<T>>,
}

pub struct Session<C> {
    connection: C,
    mapper: Arc<Mapper>,
    config: SessionConfig,
    identity: IdentityMap,
    transaction_depth: usize,
    rollback_requested: bool,
}

impl<C> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("cached_objects", &self.identity.len())
            .field("transaction_depth", &self.transaction_depth)
            .field("rollback_requested", &self.rollback_requested)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Session<C> {
    /// A session with the default configuration.
    pub fn new(connection: C, mapper: Arc<Mapper>) -> Self {
        Self::builder(connection, mapper).build()
    }

    pub fn builder(connection: C, mapper: Arc<Mapper>) -> SessionBuilder<C> {
        SessionBuilder {
            connection,
            mapper,
            config: SessionConfig::default(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut IdentityMap {
        &mut self.identity
    }

    /// Consume the session, returning its connection.
    pub fn into_connection(self) -> C {
        self.connection
    }

    // ==================== Query entry points ====================

    /// Statement roots for `T` in this session's dialect and schema.
    pub fn query<T: Entity>(&self) -> QueryRoot<T> {
        QueryRoot::new(self.mapper.clone(), self.config.dialect)
            .with_default_schema(self.config.default_schema.clone())
    }

    pub fn select<T: Entity>(&self) -> Result<Query<T, Start>> {
        self.query::<T>().select()
    }

    pub fn insert_into<T: Entity>(&self) -> Result<Query<T, InsertInto>> {
        self.query::<T>().insert_into()
    }

    pub fn update_query<T: Entity>(&self) -> Result<Query<T, UpdateStart>> {
        self.query::<T>().update()
    }

    pub fn delete_query<T: Entity>(&self) -> Result<Query<T, DeleteStart>> {
        self.query::<T>().delete()
    }

    /// A LINQ-style query over `T`.
    pub fn queryable<T: Entity>(&self) -> Queryable<T> {
        Queryable::new(self.query::<T>())
    }

    /// Every column of `T` and of each fetched reference path, each path
    /// joined on its key.
    pub fn select_all_from<T: Entity>(&self, fetches: &[&str]) -> Result<Query<T, FromJoin>> {
        let mut query = self.select::<T>()?.select_all();
        for path in fetches {
            query = query.all_of(path)?;
        }
        let mut query = query.from();
        for path in fetches {
            query = query.left_join_on_id(path)?;
        }
        Ok(query)
    }

    // ==================== Execution ====================

    pub(crate) fn log_statement(&self, kind: &'static str, sql: &str, params: &[Value]) {
        if self.config.log_parameters {
            tracing::debug!(kind, sql = %sql, param_count = params.len(), params = ?params, "Running statement");
        } else {
            tracing::debug!(kind, sql = %sql, param_count = params.len(), "Running statement");
        }
    }

    pub(crate) fn run_query(&self, sql: &str, params: &[Value]) -> Result<BoxCursor> {
        self.log_statement("query", sql, params);
        self.connection.query(sql, params)
    }

    pub(crate) fn run_execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.log_statement("execute", sql, params);
        let rows = self.connection.execute(sql, params)?;
        tracing::debug!(rows, "Statement executed");
        Ok(rows)
    }

    /// Read objects of `plan` from up to `max` rows of `cursor` through the cache.
    pub(crate) fn materialize<T: Entity>(
        &mut self,
        plan: &MappedClass,
        cursor: &mut dyn Cursor,
        max: Option<usize>,
        refresh: bool,
    ) -> Result<Fetched<T>> {
        let mut materializer = Materializer::new(&self.connection, &mut self.identity);
        let fetched = materializer.read_objects::<T>(plan, cursor, max, refresh)?;
        tracing::debug!(
            table = plan.mapping.table_name.as_str(),
            rows = fetched.rows,
            objects = fetched.objects.len(),
            cached = self.identity.len(),
            "Materialized rows"
        );
        Ok(fetched)
    }

    // ==================== Transactions ====================

    pub fn transaction_depth(&self) -> usize {
        self.transaction_depth
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_depth > 0
    }

    /// Enter a transaction scope, opening a real transaction at depth zero.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction_depth == 0 {
            self.connection.begin_transaction()?;
            self.rollback_requested = false;
        }
        self.transaction_depth += 1;
        tracing::debug!(depth = self.transaction_depth, "Transaction scope entered");
        Ok(())
    }

    /// Leave a transaction scope. Returns whether the real transaction
    /// was committed, which only happens at the outermost scope.
    fn finish_commit(&mut self) -> Result<bool> {
        self.leave_scope("commit")?;
        if self.transaction_depth > 0 {
            return Ok(false);
        }
        if self.rollback_requested {
            tracing::warn!("Nested scope requested rollback; rolling back instead of committing");
            self.rollback_requested = false;
            self.connection.rollback_transaction()?;
            return Ok(false);
        }
        self.connection.commit_transaction()?;
        tracing::debug!("Transaction committed");
        Ok(true)
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        self.finish_commit().map(|_| ())
    }

    /// Leave a transaction scope and poison the transaction.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        self.leave_scope("rollback")?;
        self.rollback_requested = true;
        if self.transaction_depth == 0 {
            self.rollback_requested = false;
            self.connection.rollback_transaction()?;
            tracing::debug!("Transaction rolled back");
        }
        Ok(())
    }

    /// Roll back after a failure and hand the failure back. A rollback
    /// that fails too is logged, never returned in place of `cause`.
    fn abandon(&mut self, cause: Error) -> Error {
        if let Err(rollback) = self.rollback_transaction() {
            tracing::warn!(error = %rollback, cause = %cause, "Rollback after failure failed");
        }
        cause
    }

    fn leave_scope(&mut self, operation: &str) -> Result<()> {
        if self.transaction_depth == 0 {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: format!("{} without a matching begin", operation),
            }));
        }
        self.transaction_depth -= 1;
        Ok(())
    }

    /// Run `work` in a transaction scope: commit on `Ok`, roll back on `Err`.
    ///
    /// When this is the outermost scope and a nested scope rolled back,
    /// the work is discarded and a `RollbackPending` error is returned.
    pub fn transaction<R>(&mut self, work: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.begin_transaction()?;
        let outermost = self.transaction_depth == 1;
        match work(self) {
            Ok(value) => {
                if !self.finish_commit()? && outermost {
                    return Err(Error::Transaction(TransactionError {
                        kind: TransactionErrorKind::RollbackPending,
                        message: "a nested scope rolled back; the transaction was discarded"
                            .to_string(),
                    }));
                }
                Ok(value)
            }
            Err(e) => Err(self.abandon(e)),
        }
    }

    // ==================== Entity helpers ====================

    fn key_of<T: Entity>(&self, obj: &Ref<T>) -> Result<Value> {
        self.mapper
            .mapping::<T>()?
            .require_key()?
            .get_value(&obj.erase())
    }

    fn by_id<T: Entity>(&self, id: Value, fetches: &[&str]) -> Result<Query<T, Where>> {
        self.select_all_from::<T>(fetches)?.where_(Expr::id().eq(id))
    }

    /// The object with key `id`; fails unless exactly one row matches.
    #[tracing::instrument(level = "debug", skip(self, id), fields(table = T::TABLE_NAME))]
    pub fn load<T: Entity>(&mut self, id: impl Into<Value>, fetches: &[&str]) -> Result<Ref<T>> {
        self.by_id::<T>(id.into(), fetches)?.single(self)
    }

    /// The object with key `id`, or `None`.
    #[tracing::instrument(level = "debug", skip(self, id), fields(table = T::TABLE_NAME))]
    pub fn get<T: Entity>(
        &mut self,
        id: impl Into<Value>,
        fetches: &[&str],
    ) -> Result<Option<Ref<T>>> {
        self.by_id::<T>(id.into(), fetches)?.first_or_default(self)
    }

    /// Re-read `obj` from its row, overwriting its fields in place.
    #[tracing::instrument(level = "debug", skip(self, obj), fields(table = T::TABLE_NAME))]
    pub fn refresh<T: Entity>(&mut self, obj: &Ref<T>) -> Result<()> {
        let key = self.key_of(obj)?;
        self.identity.insert_typed(key.clone(), obj);
        let compiled = self.by_id::<T>(key, &[])?.compile()?;
        compiled.single_refreshed(self, &[])?;
        Ok(())
    }

    fn prepare_insert<T: Entity>(&self, obj: &Ref<T>) -> Result<InsertPlan<T>> {
        let mapping = self.mapper.mapping::<T>()?.clone();
        let generated = match mapping.key() {
            Some(key) if key.automatic => {
                if !key.get_value(&obj.erase())?.is_unset_key() {
                    return Err(Error::state(
                        "save",
                        format!(
                            "{} already has a key; use update for stored objects",
                            mapping.name()
                        ),
                    ));
                }
                true
            }
            _ => false,
        };
        let insert = self.insert_into::<T>()?.values_of(obj)?.compile()?;
        let last_id = if generated {
            Some(
                self.select::<T>()?
                    .values(Expr::last_inserted_id())?
                    .compile()?,
            )
        } else {
            None
        };
        Ok(InsertPlan {
            mapping,
            insert,
            last_id,
        })
    }

    /// Store the generated key and enter `obj` into the cache.
    fn complete_insert<T: Entity>(
        &mut self,
        plan: &InsertPlan<T>,
        obj: &Ref<T>,
        generated: Option<i64>,
    ) -> Result<()> {
        let key = plan.mapping.require_key()?;
        let erased = obj.erase();
        if let Some(id) = generated {
            let target = key.sql_type().ok_or_else(|| {
                Error::state("save", format!("{} key is not a scalar", plan.mapping.name()))
            })?;
            let value = self.connection.convert_value(&Value::BigInt(id), target)?;
            key.set_value(&erased, &value)?;
        }
        let value = key.get_value(&erased)?;
        if !value.is_null() {
            self.identity.insert_typed(value, obj);
        }
        Ok(())
    }

    fn insert_object<T: Entity>(&mut self, obj: &Ref<T>) -> Result<()> {
        let plan = self.prepare_insert(obj)?;
        plan.insert.execute(self, &[])?;
        let generated = match &plan.last_id {
            Some(query) => Some(query.scalar::<i64, C>(self, &[])?),
            None => None,
        };
        self.complete_insert(&plan, obj, generated)
    }

    /// Insert `obj`. A database-generated key is read back into it.
    #[tracing::instrument(level = "debug", skip(self, obj), fields(table = T::TABLE_NAME))]
    pub fn save<T: Entity>(&mut self, obj: &Ref<T>) -> Result<()> {
        self.begin_transaction()?;
        match self.insert_object(obj) {
            Ok(()) => self.commit_transaction(),
            Err(e) => Err(self.abandon(e)),
        }
    }

    /// Write every column of `obj` to its row.
    #[tracing::instrument(level = "debug", skip(self, obj), fields(table = T::TABLE_NAME))]
    pub fn update<T: Entity>(&mut self, obj: &Ref<T>) -> Result<u64> {
        let key = self.key_of(obj)?;
        self.update_query::<T>()?
            .set_all(obj)?
            .where_(Expr::id().eq(key))?
            .execute(self)
    }

    /// Delete the row of `obj` and drop it from the cache.
    #[tracing::instrument(level = "debug", skip(self, obj), fields(table = T::TABLE_NAME))]
    pub fn delete<T: Entity>(&mut self, obj: &Ref<T>) -> Result<u64> {
        let key = self.key_of(obj)?;
        let rows = self
            .delete_query::<T>()?
            .from()
            .where_(Expr::id().eq(key.clone()))?
            .execute(self)?;
        self.identity.evict::<T>(&key);
        Ok(rows)
    }

    /// Repoint every reference to `old` at `new`, then delete `old`.
    ///
    /// Referencing columns are found through the registered mappings and
    /// cached objects holding `old` are repointed as well. Runs in one
    /// transaction scope; returns the referencing rows updated.
    #[tracing::instrument(level = "debug", skip(self, old, new), fields(table = T::TABLE_NAME))]
    pub fn merge<T: Entity>(&mut self, old: &Ref<T>, new: &Ref<T>) -> Result<u64> {
        let old_key = self.key_of(old)?;
        let new_key = self.key_of(new)?;
        let mapper = Arc::clone(&self.mapper);
        let referencing = mapper.references_to(TypeId::of::<T>());
        self.transaction(|session| {
            let mut updated = 0;
            for &(mapping, index) in &referencing {
                let column = &mapping.properties()[index].name;
                let mut base = BaseQueryBuilder::new(
                    Arc::clone(&mapper),
                    session.config.dialect,
                    Arc::clone(mapping),
                    None,
                )
                .with_default_schema(session.config.default_schema.clone());
                base.begin_update();
                base.set(column, &Expr::lit(new_key.clone()))?;
                base.where_(&Expr::col(column).key().eq(old_key.clone()))?;
                updated += CompiledQuery::<T>::from_statement(base.finish()?).execute(session, &[])?;
            }
            session.repoint_cached(&referencing, &old.erase(), &new.erase())?;
            session.delete(old)?;
            tracing::debug!(updated, "Merged references");
            Ok(updated)
        })
    }

    fn repoint_cached(
        &self,
        referencing: &[(&Arc<TypeMapping>, usize)],
        old: &AnyRef,
        new: &AnyRef,
    ) -> Result<()> {
        for &(mapping, index) in referencing {
            let property = &mapping.properties()[index];
            for obj in self.identity.objects_of(mapping.ty.type_id) {
                let points_at_old = property
                    .get_reference(obj)?
                    .is_some_and(|target| AnyRef::ptr_eq(&target, old));
                if points_at_old {
                    property.set_reference(obj, Some(new.clone()))?;
                }
            }
        }
        Ok(())
    }

    pub fn drop_table<T: Entity>(&mut self) -> Result<u64> {
        self.query::<T>().drop_table()?.execute(self, &[])
    }

    // ==================== Async entity helpers ====================

    pub async fn load_async<T: Entity>(
        &mut self,
        cx: &Cx,
        id: impl Into<Value>,
        fetches: &[&str],
    ) -> Outcome<Ref<T>, Error> {
        match self.by_id::<T>(id.into(), fetches) {
            Ok(query) => query.single_async(cx, self).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn get_async<T: Entity>(
        &mut self,
        cx: &Cx,
        id: impl Into<Value>,
        fetches: &[&str],
    ) -> Outcome<Option<Ref<T>>, Error> {
        match self.by_id::<T>(id.into(), fetches) {
            Ok(query) => query.first_or_default_async(cx, self).await,
            Err(e) => Outcome::Err(e),
        }
    }

    async fn insert_object_async<T: Entity>(&mut self, cx: &Cx, obj: &Ref<T>) -> Outcome<(), Error> {
        let plan = match self.prepare_insert(obj) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        match plan.insert.execute_async(cx, self, &[]).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        let generated = match &plan.last_id {
            Some(query) => match query.scalar_async::<i64, C>(cx, self, &[]).await {
                Outcome::Ok(id) => Some(id),
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            },
            None => None,
        };
        into_outcome(self.complete_insert(&plan, obj, generated))
    }

    pub async fn save_async<T: Entity>(&mut self, cx: &Cx, obj: &Ref<T>) -> Outcome<(), Error> {
        if let Err(e) = self.begin_transaction() {
            return Outcome::Err(e);
        }
        match self.insert_object_async(cx, obj).await {
            Outcome::Ok(()) => into_outcome(self.commit_transaction()),
            Outcome::Err(e) => Outcome::Err(self.abandon(e)),
            other => {
                if let Err(rollback) = self.rollback_transaction() {
                    tracing::warn!(error = %rollback, "Rollback after interrupted save failed");
                }
                other
            }
        }
    }

    pub async fn update_async<T: Entity>(&mut self, cx: &Cx, obj: &Ref<T>) -> Outcome<u64, Error> {
        let query = self.key_of(obj).and_then(|key| {
            self.update_query::<T>()?
                .set_all(obj)?
                .where_(Expr::id().eq(key))
        });
        match query {
            Ok(query) => query.execute_async(cx, self).await,
            Err(e) => Outcome::Err(e),
        }
    }

    pub async fn delete_async<T: Entity>(&mut self, cx: &Cx, obj: &Ref<T>) -> Outcome<u64, Error> {
        let key = match self.key_of(obj) {
            Ok(key) => key,
            Err(e) => return Outcome::Err(e),
        };
        let query = match self.delete_query::<T>().and_then(|q| {
            q.from().where_(Expr::id().eq(key.clone()))
        }) {
            Ok(query) => query,
            Err(e) => return Outcome::Err(e),
        };
        let outcome = query.execute_async(cx, self).await;
        if let Outcome::Ok(_) = outcome {
            self.identity.evict::<T>(&key);
        }
        outcome
    }
}

impl<C: Connection> CollectionLoader for Session<C> {
    /// Every `E` whose `back_reference` points at the owner key.
    fn load_collection<E: Entity>(
        &mut self,
        back_reference: &str,
        owner_key: &Value,
    ) -> Result<Vec<Ref<E>>> {
        tracing::debug!(table = E::TABLE_NAME, back_reference, "Loading collection");
        self.select::<E>()?
            .select_all()
            .from()
            .where_(Expr::col(back_reference).key().eq(owner_key.clone()))?
            .list(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Author, Post, Scripted, mapper, row};
    use sqlgraph_core::{LazyCollection, Row};

    fn session(results: Vec<Vec<Row>>) -> Session<Scripted> {
        Session::new(Scripted::with_results(results), mapper())
    }

    fn author_row(id: i64, name: &str) -> Row {
        row(vec![Value::BigInt(id), Value::Text(name.to_string())])
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config = SessionConfig::from_json(r#"{"dialect": "postgres"}"#).unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.default_schema, None);
        assert!(!config.log_parameters);

        let config = SessionConfig::from_json(
            r#"{"dialect": "mariadb", "default_schema": "blog", "log_parameters": true}"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.default_schema.as_deref(), Some("blog"));
        assert!(config.log_parameters);
    }

    #[test]
    fn test_config_from_json_rejects_unknown_dialect() {
        let err = SessionConfig::from_json(r#"{"dialect": "oracle"}"#).unwrap_err();
        assert!(matches!(err, Error::Custom(_)));
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = SessionConfig {
            dialect: Dialect::Sqlite,
            default_schema: Some("main".to_string()),
            log_parameters: false,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_builder_applies_config() {
        let session = Session::builder(Scripted::default(), mapper())
            .dialect(Dialect::Postgres)
            .default_schema("blog")
            .build();
        assert_eq!(session.dialect(), Dialect::Postgres);
        let sql = session
            .select::<Author>()
            .unwrap()
            .column("Name")
            .unwrap()
            .from()
            .compile()
            .unwrap();
        assert_eq!(sql.sql(), "SELECT \"t\".\"Name\" FROM \"blog\".\"Author\" AS t");
    }

    #[test]
    fn test_select_all_from_joins_fetch_paths() {
        let session = session(Vec::new());
        let query = session.select_all_from::<Post>(&["Author"]).unwrap();
        assert_eq!(
            query.sql(),
            "SELECT \"t\".\"Id\", \"t\".\"Title\", \"t\".\"Author\", \"t1\".\"Id\", \"t1\".\"Name\" FROM \"Post\" AS t LEFT JOIN \"Author\" AS t1 ON( \"t\".\"Author\"= \"t1\".\"Id\")"
        );
    }

    #[test]
    fn test_nested_scopes_share_one_transaction() {
        let mut session = session(Vec::new());
        session.begin_transaction().unwrap();
        session.begin_transaction().unwrap();
        assert_eq!(session.transaction_depth(), 2);
        session.commit_transaction().unwrap();
        assert!(session.in_transaction());
        session.commit_transaction().unwrap();
        assert!(!session.in_transaction());
        assert_eq!(session.connection().statements(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn test_inner_rollback_poisons_outer_commit() {
        let mut session = session(Vec::new());
        session.begin_transaction().unwrap();
        session.begin_transaction().unwrap();
        session.rollback_transaction().unwrap();
        session.commit_transaction().unwrap();
        assert_eq!(session.connection().statements(), vec!["BEGIN", "ROLLBACK"]);

        session.begin_transaction().unwrap();
        session.commit_transaction().unwrap();
        assert_eq!(
            session.connection().statements(),
            vec!["BEGIN", "ROLLBACK", "BEGIN", "COMMIT"]
        );
    }

    #[test]
    fn test_commit_without_begin_fails() {
        let mut session = session(Vec::new());
        let err = session.commit_transaction().unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(ref e) if e.kind == TransactionErrorKind::NotActive
        ));
        assert!(session.rollback_transaction().is_err());
    }

    #[test]
    fn test_transaction_reports_discarded_work() {
        let mut session = session(Vec::new());
        let result = session.transaction(|s| {
            let inner: Result<()> = s.transaction(|_| Err(Error::state("work", "boom")));
            assert!(inner.is_err());
            Ok(1)
        });
        assert!(matches!(
            result,
            Err(Error::Transaction(ref e)) if e.kind == TransactionErrorKind::RollbackPending
        ));
        assert_eq!(session.connection().statements(), vec!["BEGIN", "ROLLBACK"]);
        assert_eq!(session.transaction(|_| Ok(2)).unwrap(), 2);
    }

    #[test]
    fn test_save_reads_back_generated_key() {
        let mut session = session(vec![vec![row(vec![Value::BigInt(42)])]]);
        let author = Ref::new(Author {
            name: "Ann".to_string(),
            ..Author::default()
        });
        session.save(&author).unwrap();
        assert_eq!(author.read().id, 42);
        assert!(session.identity().contains::<Author>(&Value::BigInt(42)));

        let log = session.connection().log.lock().unwrap().clone();
        let sql: Vec<&str> = log.iter().map(|(sql, _)| sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "BEGIN",
                "INSERT INTO \"Author\" (\"Name\") VALUES( @Item0)",
                "SELECT last_insert_id()",
                "COMMIT",
            ]
        );
        assert_eq!(log[1].1, vec![Value::Text("Ann".to_string())]);
    }

    #[test]
    fn test_save_rejects_stored_object() {
        let mut session = session(Vec::new());
        let author = Ref::new(Author {
            id: 3,
            ..Author::default()
        });
        let err = session.save(&author).unwrap_err();
        assert!(matches!(err, Error::State(ref e) if e.operation == "save"));
        assert!(!session.in_transaction());
        assert_eq!(session.connection().statements(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_load_update_and_delete() {
        let mut session = session(vec![vec![author_row(7, "Ann")]]);
        let author = session.load::<Author>(7_i64, &[]).unwrap();
        assert_eq!(author.read().name, "Ann");

        author.write().name = "Bea".to_string();
        assert_eq!(session.update(&author).unwrap(), 1);
        assert_eq!(session.delete(&author).unwrap(), 1);
        assert!(!session.identity().contains::<Author>(&Value::BigInt(7)));

        let log = session.connection().log.lock().unwrap().clone();
        assert_eq!(
            log[0].0,
            "SELECT \"t\".\"Id\", \"t\".\"Name\" FROM \"Author\" AS t WHERE( \"t\".\"Id\"= @Item0)"
        );
        assert_eq!(
            log[1],
            (
                "UPDATE \"Author\" SET \"Name\"= @Item0 WHERE( \"Id\"= @Item1)".to_string(),
                vec![Value::Text("Bea".to_string()), Value::BigInt(7)]
            )
        );
        assert_eq!(log[2].0, "DELETE FROM \"Author\" WHERE( \"Id\"= @Item0)");
    }

    #[test]
    fn test_get_missing_is_none() {
        let mut session = session(vec![Vec::new()]);
        assert!(session.get::<Author>(1_i64, &[]).unwrap().is_none());
        assert!(session.connection().statements()[0].ends_with("LIMIT @Item1"));
    }

    #[test]
    fn test_refresh_overwrites_in_place() {
        let mut session = session(vec![vec![author_row(7, "Ann")], vec![author_row(7, "Ann 2")]]);
        let author = session.load::<Author>(7_i64, &[]).unwrap();
        author.write().name = "local edit".to_string();
        session.refresh(&author).unwrap();
        assert_eq!(author.read().name, "Ann 2");
        let again = session.identity().get_typed::<Author>(&Value::BigInt(7)).unwrap();
        assert!(Ref::ptr_eq(&author, &again));
    }

    #[test]
    fn test_collection_loads_through_session() {
        let mut session = session(vec![
            vec![author_row(7, "Ann")],
            vec![row(vec![
                Value::BigInt(10),
                Value::Text("Hello".to_string()),
                Value::BigInt(7),
            ])],
        ]);
        let author = session.load::<Author>(7_i64, &[]).unwrap();
        let posts = author.read().posts.clone();
        let loaded = posts.load(&mut session).unwrap();
        assert_eq!(loaded.len(), 1);
        let back = loaded[0].read().author.clone().unwrap();
        assert!(Ref::ptr_eq(&back, &author));
        assert_eq!(
            session.connection().statements()[1],
            "SELECT \"t\".\"Id\", \"t\".\"Title\", \"t\".\"Author\" FROM \"Post\" AS t WHERE( \"t\".\"Author\"= @Item0)"
        );

        let detached = LazyCollection::<Post>::default();
        assert!(detached.load(&mut session).unwrap().is_empty());
        assert_eq!(session.connection().statements().len(), 2);
    }
}
