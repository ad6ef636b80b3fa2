//! The untyped query builder every fluent stage delegates to.
//!
//! It owns the SQL buffer, the ordered parameter slots, the table scopes
//! a statement has introduced and the select-list bookkeeping the
//! materializer needs. The typestate wrapper in [`crate::fluent`] decides
//! which of these operations may be called next; this type only tracks
//! the clause context that decides between `WHERE`, `AND` and `OR`.

use crate::dialect::Dialect;
use crate::expr::{CompareOp, Expr, Function, MemberChain, SubQuery};
use crate::materialize::MappedClass;
use crate::sql::SqlStringBuilder;
use sqlgraph_core::{
    AnyRef, Error, Mapper, MappingError, MappingErrorKind, PropertyMapping, Result, TypeMapping,
    TypeRef, Value,
};
use std::mem;
use std::sync::Arc;

/// One `@ItemN` parameter of a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSlot {
    /// A value captured when the statement was built
    Value(Value),
    /// The `n`th argument supplied when a prepared statement runs
    Arg(usize),
}

/// A table introduced by the statement.
#[derive(Debug, Clone)]
pub(crate) struct TableScope {
    /// SQL alias; UPDATE and DELETE address their table without one
    pub alias: Option<String>,
    /// Name member chains use to start from this scope
    pub name: Option<String>,
    /// Reference property (scope index, property index) this table hangs off
    pub parent: Option<(usize, usize)>,
    pub mapping: Arc<TypeMapping>,
    pub joined: bool,
    /// Scope of an enclosing query, visible to a subquery
    pub inherited: bool,
}

/// Binds a selected property to its result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldAlias {
    pub scope: usize,
    pub property: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseContext {
    None,
    Where,
    /// Just inside a `(` opened by a predicate group
    SubWhereStart,
}

/// Output of a finished builder.
#[derive(Debug, Clone)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<ParamSlot>,
    pub plan: Option<Arc<MappedClass>>,
}

struct Resolved {
    scope: usize,
    property: usize,
}

pub(crate) struct BaseQueryBuilder {
    mapper: Arc<Mapper>,
    sql: SqlStringBuilder,
    params: Vec<ParamSlot>,
    scopes: Vec<TableScope>,
    root: usize,
    next_alias: usize,
    context: ClauseContext,
    fields: Vec<FieldAlias>,
    selected: usize,
    selecting: bool,
    grouped: bool,
    ordered: bool,
    assigned: bool,
    limited: bool,
    default_schema: Option<String>,
}

impl BaseQueryBuilder {
    /// Start a statement over `root`.
    ///
    /// `root_alias` names the root table in SQL and in member chains;
    /// `None` addresses the table by name (UPDATE, DELETE).
    pub(crate) fn new(
        mapper: Arc<Mapper>,
        dialect: Dialect,
        root: Arc<TypeMapping>,
        root_alias: Option<&str>,
    ) -> Self {
        let scope = TableScope {
            alias: root_alias.map(str::to_string),
            name: root_alias.map(str::to_string),
            parent: None,
            mapping: root,
            joined: root_alias.is_none(),
            inherited: false,
        };
        Self {
            mapper,
            sql: SqlStringBuilder::new(dialect),
            params: Vec::new(),
            scopes: vec![scope],
            root: 0,
            next_alias: 1,
            context: ClauseContext::None,
            fields: Vec::new(),
            selected: 0,
            selecting: true,
            grouped: false,
            ordered: false,
            assigned: false,
            limited: false,
            default_schema: None,
        }
    }

    /// Start a statement over the mapping registered for `ty`.
    pub(crate) fn for_type(
        mapper: Arc<Mapper>,
        dialect: Dialect,
        ty: &TypeRef,
        root_alias: Option<&str>,
    ) -> Result<Self> {
        let root = mapper.require(ty.type_id, ty.type_name)?.clone();
        Ok(Self::new(mapper, dialect, root, root_alias))
    }

    pub(crate) fn with_default_schema(mut self, schema: Option<String>) -> Self {
        self.default_schema = schema;
        self
    }

    pub fn sql(&self) -> &str {
        self.sql.as_str()
    }

    pub fn params(&self) -> &[ParamSlot] {
        &self.params
    }

    pub fn dialect(&self) -> Dialect {
        self.sql.dialect()
    }

    pub(crate) fn root_mapping(&self) -> &Arc<TypeMapping> {
        &self.scopes[self.root].mapping
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn schema_of(&self, mapping: &TypeMapping) -> Option<String> {
        mapping.schema.clone().or_else(|| self.default_schema.clone())
    }

    fn append_table(&mut self, scope: usize) {
        let mapping = self.scopes[scope].mapping.clone();
        let schema = self.schema_of(&mapping);
        self.sql
            .append_table_name(schema.as_deref(), &mapping.table_name);
        if let Some(alias) = self.scopes[scope].alias.clone() {
            self.sql.append(" AS ").append(&alias);
        }
    }

    // ==================== Member resolution ====================

    fn find_scope(&self, root: Option<&str>) -> Result<usize> {
        let Some(name) = root else {
            return Ok(self.root);
        };
        self.scopes
            .iter()
            .rposition(|s| s.name.as_deref() == Some(name))
            .ok_or_else(|| {
                Error::Mapping(
                    MappingError::new(
                        MappingErrorKind::UndeclaredAlias,
                        "table alias is not introduced by the enclosing query",
                    )
                    .with_member(name),
                )
            })
    }

    fn property_index(&self, scope: usize, name: &str) -> Result<usize> {
        let mapping = &self.scopes[scope].mapping;
        mapping.index_of(name).ok_or_else(|| {
            Error::Mapping(
                MappingError::new(
                    MappingErrorKind::UnmappedMember,
                    "no mapped property with this name",
                )
                .with_type(mapping.name())
                .with_member(name),
            )
        })
    }

    fn property(&self, scope: usize, property: usize) -> &PropertyMapping {
        &self.scopes[scope].mapping.properties()[property]
    }

    fn find_child(&self, scope: usize, property: usize) -> Option<usize> {
        self.scopes
            .iter()
            .position(|s| s.parent == Some((scope, property)))
    }

    /// The scope a reference property leads to, registering it if allowed.
    fn child_scope(&mut self, scope: usize, property: usize, register: bool) -> Result<usize> {
        if let Some(child) = self.find_child(scope, property) {
            return Ok(child);
        }
        let prop = self.property(scope, property);
        let Some(target) = prop.reference().copied() else {
            return Err(Error::Mapping(
                MappingError::new(
                    MappingErrorKind::InvalidMember,
                    "only reference properties can be traversed",
                )
                .with_type(self.scopes[scope].mapping.name())
                .with_member(prop.name.clone()),
            ));
        };
        if !register {
            return Err(Error::Mapping(
                MappingError::new(
                    MappingErrorKind::UnjoinedReference,
                    "reference is traversed but its table is not joined",
                )
                .with_type(self.scopes[scope].mapping.name())
                .with_member(prop.name.clone()),
            ));
        }
        let mapping = self
            .mapper
            .require(target.type_id, target.type_name)?
            .clone();
        let alias = self.next_alias();
        self.scopes.push(TableScope {
            alias: Some(alias),
            name: None,
            parent: Some((scope, property)),
            mapping,
            joined: false,
            inherited: false,
        });
        Ok(self.scopes.len() - 1)
    }

    fn key_of_scope(&self, scope: usize) -> Result<Resolved> {
        let mapping = &self.scopes[scope].mapping;
        let property = mapping.key_index().ok_or_else(|| {
            Error::Mapping(
                MappingError::new(MappingErrorKind::MissingKey, "type does not declare a key")
                    .with_type(mapping.name()),
            )
        })?;
        Ok(Resolved { scope, property })
    }

    fn resolve(&mut self, chain: &MemberChain) -> Result<Resolved> {
        let mut scope = self.find_scope(chain.root.as_deref())?;
        let Some((last, hops)) = chain.path.split_last() else {
            if chain.key {
                return self.key_of_scope(scope);
            }
            return Err(Error::Mapping(
                MappingError::new(MappingErrorKind::InvalidMember, "empty member path")
                    .with_member(chain.to_string()),
            ));
        };
        for hop in hops {
            let property = self.property_index(scope, hop)?;
            scope = self.child_scope(scope, property, self.selecting)?;
        }
        let property = self.property_index(scope, last)?;
        if chain.key {
            if !self.property(scope, property).is_reference() {
                return Err(Error::Mapping(
                    MappingError::new(
                        MappingErrorKind::InvalidMember,
                        "key of a member chain requires a reference",
                    )
                    .with_member(chain.to_string()),
                ));
            }
            if let Some(child) = self.find_child(scope, property) {
                if self.scopes[child].joined {
                    return self.key_of_scope(child);
                }
            }
        }
        Ok(Resolved { scope, property })
    }

    fn append_resolved(&mut self, resolved: &Resolved) {
        let scope = &self.scopes[resolved.scope];
        let alias = scope.alias.clone();
        let column = scope.mapping.properties()[resolved.property]
            .column_name
            .clone();
        self.sql.append_column(alias.as_deref(), &column);
    }

    /// Walk a path of references only, returning the scope it lands on.
    fn reference_path(&mut self, path: &str, register: bool) -> Result<usize> {
        let chain = MemberChain::parse(path);
        let mut scope = self.root;
        for hop in &chain.path {
            let property = self.property_index(scope, hop)?;
            scope = self.child_scope(scope, property, register)?;
        }
        Ok(scope)
    }

    // ==================== Translation ====================

    fn bind(&mut self, slot: ParamSlot) {
        let index = self.params.len();
        self.params.push(slot);
        self.sql.append_parameter(index);
    }

    /// Translate an expression into SQL, binding every literal in order.
    pub(crate) fn translate(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Member(chain) => {
                let resolved = self.resolve(chain)?;
                self.append_resolved(&resolved);
            }
            Expr::Literal(value) => self.bind(ParamSlot::Value(value.clone())),
            Expr::Param(n) => self.bind(ParamSlot::Arg(*n)),
            Expr::Compare { op, left, right } => {
                self.sql.append("(");
                if let Some(tested) = op.null_tested(left, right) {
                    self.translate(tested)?;
                    self.sql.append(null_suffix(*op));
                } else {
                    self.translate(left)?;
                    self.sql.append(op.as_str());
                    self.translate(right)?;
                }
                self.sql.append(")");
            }
            Expr::And(left, right) => self.binary(left, " AND", right)?,
            Expr::Or(left, right) => self.binary(left, " OR", right)?,
            Expr::Not(inner) => {
                self.sql.append_after_space("NOT");
                self.translate(inner)?;
            }
            Expr::Arith { op, left, right } => self.binary(left, op.as_str(), right)?,
            Expr::In {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    self.sql
                        .append_space()
                        .append(if *negated { "(1=1)" } else { "(1=0)" });
                    return Ok(());
                }
                self.sql.append("(");
                self.translate(expr)?;
                self.sql.append(if *negated { " NOT IN(" } else { " IN(" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.append(",");
                    }
                    self.translate(value)?;
                }
                self.sql.append("))");
            }
            Expr::Call(function) => self.translate_call(function)?,
            Expr::SubQuery(sub) => self.translate_subquery(sub)?,
        }
        Ok(())
    }

    fn binary(&mut self, left: &Expr, op: &str, right: &Expr) -> Result<()> {
        self.sql.append("(");
        self.translate(left)?;
        self.sql.append(op);
        self.translate(right)?;
        self.sql.append(")");
        Ok(())
    }

    fn translate_call(&mut self, function: &Function) -> Result<()> {
        let (name, arg) = match function {
            Function::CountAll => {
                self.sql.append_space().append("COUNT(*)");
                return Ok(());
            }
            Function::LastInsertedId => {
                self.sql.append_last_inserted_id();
                return Ok(());
            }
            Function::Count(e) => ("COUNT(", e),
            Function::Sum(e) => ("SUM(", e),
            Function::Avg(e) => ("AVG(", e),
            Function::Min(e) => ("MIN(", e),
            Function::Max(e) => ("MAX(", e),
        };
        self.sql.append_space().append(name);
        self.translate(arg)?;
        self.sql.append(")");
        Ok(())
    }

    /// A builder for a nested query sharing this one's parameters and aliases.
    ///
    /// Scopes of this query are visible to the subquery by name.
    fn child(&mut self, element: &TypeRef) -> Result<BaseQueryBuilder> {
        let mapping = self
            .mapper
            .require(element.type_id, element.type_name)?
            .clone();
        let mut scopes: Vec<TableScope> = self
            .scopes
            .iter()
            .cloned()
            .map(|mut s| {
                s.inherited = true;
                s
            })
            .collect();
        let alias = self.next_alias();
        scopes.push(TableScope {
            alias: Some(alias.clone()),
            name: Some(alias),
            parent: None,
            mapping,
            joined: false,
            inherited: false,
        });
        let root = scopes.len() - 1;
        Ok(BaseQueryBuilder {
            mapper: self.mapper.clone(),
            sql: SqlStringBuilder::new(self.dialect()),
            params: mem::take(&mut self.params),
            scopes,
            root,
            next_alias: self.next_alias,
            context: ClauseContext::None,
            fields: Vec::new(),
            selected: 0,
            selecting: true,
            grouped: false,
            ordered: false,
            assigned: false,
            limited: false,
            default_schema: self.default_schema.clone(),
        })
    }

    fn translate_subquery(&mut self, sub: &SubQuery) -> Result<()> {
        self.sql
            .append_after_space(if sub.negated { "NOT EXISTS" } else { "EXISTS" });
        let child = self.child(&sub.element)?;
        let child = (sub.build)(child)?;
        child.check_joined()?;
        self.params = child.params;
        self.next_alias = child.next_alias;
        self.sql.append("(").append(child.sql.as_str()).append(")");
        Ok(())
    }

    // ==================== SELECT ====================

    pub(crate) fn begin_select(&mut self) {
        self.sql.append("SELECT");
    }

    fn separate_selection(&mut self) {
        if self.selected > 0 {
            self.sql.append(",");
        }
    }

    fn select_property(&mut self, scope: usize, property: usize) {
        self.separate_selection();
        self.append_resolved(&Resolved { scope, property });
        self.fields.push(FieldAlias {
            scope,
            property,
            index: self.selected,
        });
        self.selected += 1;
    }

    fn select_scope(&mut self, scope: usize) {
        let count = self.scopes[scope].mapping.properties().len();
        for property in 0..count {
            self.select_property(scope, property);
        }
    }

    /// Every column of the root table.
    pub(crate) fn select_all(&mut self) {
        self.select_scope(self.root);
    }

    /// Every column of the table reached through a reference path.
    pub(crate) fn select_all_of(&mut self, path: &str) -> Result<()> {
        let scope = self.reference_path(path, true)?;
        self.select_scope(scope);
        Ok(())
    }

    /// One mapped column, possibly through references.
    pub(crate) fn select_column(&mut self, path: &str) -> Result<()> {
        let resolved = self.resolve(&MemberChain::parse(path))?;
        self.select_property(resolved.scope, resolved.property);
        Ok(())
    }

    pub(crate) fn select_count(&mut self) {
        self.separate_selection();
        self.sql.append_space().append("COUNT(*)");
        self.selected += 1;
    }

    /// An arbitrary expression; not materialized into the object.
    pub(crate) fn select_value(&mut self, expr: &Expr) -> Result<()> {
        self.separate_selection();
        self.translate(expr)?;
        self.selected += 1;
        Ok(())
    }

    pub(crate) fn from(&mut self) {
        self.selecting = false;
        self.scopes[self.root].joined = true;
        self.sql.append_after_space("FROM");
        self.append_table(self.root);
    }

    // ==================== Joins ====================

    /// `LEFT JOIN` every table along a reference path on its key.
    pub(crate) fn left_join_on_id(&mut self, path: &str) -> Result<()> {
        let chain = MemberChain::parse(path);
        let mut scope = self.root;
        for hop in &chain.path {
            let property = self.property_index(scope, hop)?;
            let child = self.child_scope(scope, property, true)?;
            if !self.scopes[child].joined {
                let key = self.key_of_scope(child)?;
                self.sql.append_after_space("LEFT JOIN");
                self.append_table(child);
                self.sql.append_after_space("ON").append("(");
                self.append_resolved(&Resolved { scope, property });
                self.sql.append("=");
                self.append_resolved(&key);
                self.sql.append(")");
                self.scopes[child].joined = true;
            }
            scope = child;
        }
        Ok(())
    }

    /// Join `ty` under `name` with an explicit `ON` condition.
    pub(crate) fn join(&mut self, kind: &str, ty: &TypeRef, name: &str, on: &Expr) -> Result<()> {
        if self.scopes.iter().any(|s| s.name.as_deref() == Some(name)) {
            return Err(Error::Mapping(
                MappingError::new(MappingErrorKind::InvalidMember, "table alias declared twice")
                    .with_member(name),
            ));
        }
        let mapping = self.mapper.require(ty.type_id, ty.type_name)?.clone();
        let alias = self.next_alias();
        self.scopes.push(TableScope {
            alias: Some(alias),
            name: Some(name.to_string()),
            parent: None,
            mapping,
            joined: true,
            inherited: false,
        });
        self.sql.append_after_space(kind);
        self.append_table(self.scopes.len() - 1);
        self.sql.append_after_space("ON");
        self.translate(on)
    }

    // ==================== WHERE ====================

    fn append_where(&mut self) {
        match self.context {
            ClauseContext::None => {
                self.sql.append_after_space("WHERE");
            }
            ClauseContext::Where => {
                self.sql.append_after_space("AND");
            }
            ClauseContext::SubWhereStart => {}
        }
    }

    fn append_or(&mut self, operation: &'static str) -> Result<()> {
        match self.context {
            ClauseContext::Where => {
                self.sql.append_after_space("OR");
                Ok(())
            }
            ClauseContext::SubWhereStart => Ok(()),
            ClauseContext::None => Err(Error::state(
                operation,
                "OR requires a preceding predicate",
            )),
        }
    }

    /// `WHERE` on first use, `AND` afterwards.
    pub(crate) fn where_(&mut self, expr: &Expr) -> Result<()> {
        self.append_where();
        self.translate(expr)?;
        self.context = ClauseContext::Where;
        Ok(())
    }

    pub(crate) fn or_where(&mut self, expr: &Expr) -> Result<()> {
        self.append_or("or_where")?;
        self.translate(expr)?;
        self.context = ClauseContext::Where;
        Ok(())
    }

    /// Open a parenthesized predicate group joined with `AND` (or `OR`).
    pub(crate) fn open_group(&mut self, or: bool) -> Result<()> {
        if or {
            self.append_or("or_where_sub")?;
        } else {
            self.append_where();
        }
        self.sql.append("(");
        self.context = ClauseContext::SubWhereStart;
        Ok(())
    }

    pub(crate) fn close_group(&mut self) -> Result<()> {
        if self.context == ClauseContext::SubWhereStart {
            return Err(Error::state("where_sub", "predicate group is empty"));
        }
        self.sql.append(")");
        self.context = ClauseContext::Where;
        Ok(())
    }

    pub(crate) fn where_exists(&mut self, sub: &SubQuery) -> Result<()> {
        self.append_where();
        self.translate_subquery(sub)?;
        self.context = ClauseContext::Where;
        Ok(())
    }

    // ==================== GROUP BY / ORDER BY / LIMIT ====================

    pub(crate) fn group_by(&mut self, path: &str) -> Result<()> {
        if self.grouped {
            self.sql.append(",");
        } else {
            self.sql.append_after_space("GROUP BY");
            self.grouped = true;
        }
        self.translate(&Expr::col(path))
    }

    pub(crate) fn order_by(&mut self, expr: &Expr, descending: bool) -> Result<()> {
        if self.ordered {
            self.sql.append(",");
        } else {
            self.sql.append_after_space("ORDER BY ");
            self.ordered = true;
        }
        self.translate(expr)?;
        if descending {
            self.sql.append(" DESC");
        }
        Ok(())
    }

    fn bind_bound(&mut self, operation: &'static str, value: &Expr) -> Result<()> {
        match value {
            Expr::Literal(_) | Expr::Param(_) => self.translate(value),
            _ => Err(Error::state(
                operation,
                "offset and count must be values or prepared arguments",
            )),
        }
    }

    pub(crate) fn limit(&mut self, offset: &Expr, count: &Expr) -> Result<()> {
        self.sql.before_limit();
        self.bind_bound("limit", offset)?;
        self.sql.during_limit();
        self.bind_bound("limit", count)?;
        self.sql.after_limit();
        self.limited = true;
        Ok(())
    }

    pub(crate) fn take(&mut self, count: &Expr) -> Result<()> {
        self.sql.before_take();
        self.bind_bound("take", count)?;
        self.limited = true;
        Ok(())
    }

    /// Limit to one row unless a limit was already written.
    pub(crate) fn limit_one(&mut self) {
        if !self.limited {
            self.sql.before_take();
            self.bind(ParamSlot::Value(Value::BigInt(1)));
            self.limited = true;
        }
    }

    // ==================== INSERT / UPDATE / DELETE ====================

    /// Current value of a property, following references to their key.
    pub(crate) fn property_value(&self, property: &PropertyMapping, obj: &AnyRef) -> Result<Value> {
        let Some(target) = property.reference() else {
            return property.get_value(obj);
        };
        match property.get_reference(obj)? {
            Some(referenced) => {
                let mapping = self.mapper.require(target.type_id, target.type_name)?;
                mapping.require_key()?.get_value(&referenced)
            }
            None => Ok(Value::Null),
        }
    }

    pub(crate) fn begin_insert(&mut self) {
        self.selecting = false;
        self.sql.append("INSERT INTO");
        self.append_table(self.root);
    }

    /// Column list and `VALUES` for explicit column/expression pairs.
    pub(crate) fn insert_values(&mut self, columns: &[(String, Expr)]) -> Result<()> {
        let mut names = Vec::with_capacity(columns.len());
        for (path, _) in columns {
            let resolved = self.resolve(&MemberChain::parse(path))?;
            names.push(self.property(resolved.scope, resolved.property).column_name.clone());
        }
        self.sql.append(" (");
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.sql.append(", ");
            }
            self.sql.append_symbol(name);
        }
        self.sql.append(")").append_after_space("VALUES(");
        for (i, (_, value)) in columns.iter().enumerate() {
            if i > 0 {
                self.sql.append(",");
            }
            self.translate(value)?;
        }
        self.sql.append(")");
        Ok(())
    }

    /// Insert every writable column of `obj`.
    pub(crate) fn insert_object(&mut self, obj: &AnyRef) -> Result<()> {
        let mapping = self.root_mapping().clone();
        let mut columns = Vec::new();
        for property in mapping.properties() {
            if property.automatic || property.readonly {
                continue;
            }
            columns.push((
                property.name.clone(),
                Expr::Literal(self.property_value(property, obj)?),
            ));
        }
        self.insert_values(&columns)
    }

    pub(crate) fn begin_update(&mut self) {
        self.selecting = false;
        self.sql.append("UPDATE");
        self.append_table(self.root);
    }

    /// `SET column = value`, comma separated after the first.
    pub(crate) fn set(&mut self, path: &str, value: &Expr) -> Result<()> {
        let resolved = self.resolve(&MemberChain::parse(path))?;
        if self.assigned {
            self.sql.append(",");
        } else {
            self.sql.append_after_space("SET");
            self.assigned = true;
        }
        self.append_resolved(&resolved);
        self.sql.append("=");
        self.translate(value)
    }

    /// Assign every writable, non-key column from `obj`.
    pub(crate) fn set_all(&mut self, obj: &AnyRef) -> Result<()> {
        let mapping = self.root_mapping().clone();
        for property in mapping.properties() {
            if property.is_key || property.automatic || property.readonly {
                continue;
            }
            let value = self.property_value(property, obj)?;
            self.set(&property.name, &Expr::Literal(value))?;
        }
        if !self.assigned {
            return Err(Error::state("set_all", "type has no writable columns"));
        }
        Ok(())
    }

    pub(crate) fn begin_delete(&mut self) {
        self.selecting = false;
        self.sql.append("DELETE");
    }

    pub(crate) fn delete_from(&mut self) {
        self.sql.append_after_space("FROM");
        self.append_table(self.root);
    }

    pub(crate) fn drop_table(&mut self) {
        let mapping = self.root_mapping().clone();
        let schema = self.schema_of(&mapping);
        self.sql
            .append_drop_table(schema.as_deref(), &mapping.table_name);
    }

    // ==================== Finish ====================

    fn check_joined(&self) -> Result<()> {
        // a root without FROM is fine (`SELECT last_insert_id()`)
        let unjoined = self
            .scopes
            .iter()
            .find(|s| !s.inherited && !s.joined && s.parent.is_some());
        match unjoined {
            Some(scope) => Err(Error::Mapping(
                MappingError::new(
                    MappingErrorKind::UnjoinedReference,
                    "selected columns come from a table that is never joined",
                )
                .with_type(scope.mapping.name()),
            )),
            None => Ok(()),
        }
    }

    /// Validate the statement and build its materialization plan.
    pub(crate) fn finish(self) -> Result<Statement> {
        self.check_joined()?;
        let plan = if self.fields.is_empty() {
            None
        } else {
            Some(Arc::new(MappedClass::build(
                &self.scopes,
                &self.fields,
                self.root,
                &self.mapper,
            )?))
        };
        let sql = self.sql.into_string();
        tracing::trace!(sql = %sql, param_count = self.params.len(), "Compiled statement");
        Ok(Statement {
            sql,
            params: self.params,
            plan,
        })
    }
}

const fn null_suffix(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Ne => " IS NOT NULL",
        _ => " IS NULL",
    }
}
