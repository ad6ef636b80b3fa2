//! Rebuilding object graphs from result rows.
//!
//! A [`MappedClass`] is the per-query plan: the mapping tree pruned to the
//! columns the statement selected. [`Materializer::read`] walks it once per
//! row, resolving keys through the session's [`IdentityMap`] so that every
//! (type, key) yields one shared object.
//!
//! Objects enter the identity map before their fields are read. A row whose
//! reference points back at itself therefore finds the half-built object
//! in the map instead of recursing forever.

use crate::base::{FieldAlias, TableScope};
use sqlgraph_core::{
    AnyRef, ConsistencyError, Connection, Cursor, Entity, Error, IdentityMap, Mapper,
    MappingErrorKind, PrimaryKey, Ref, Result, SqlType, TypeMapping, Value,
};
use std::sync::Arc;

/// Where the key of an object comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdField {
    pub property: usize,
    /// Selected result column; `None` when only a referencing row knows it
    pub column: Option<usize>,
}

#[derive(Debug, Clone)]
pub(crate) enum MappedField {
    Scalar {
        property: usize,
        column: usize,
    },
    Reference {
        property: usize,
        /// Foreign key column on this row, if selected
        column: Option<usize>,
        nested: MappedClass,
    },
}

/// Materialization plan for one type within one compiled query.
#[derive(Debug, Clone)]
pub struct MappedClass {
    pub(crate) mapping: Arc<TypeMapping>,
    pub(crate) id: Option<IdField>,
    pub(crate) fields: Vec<MappedField>,
    /// Whether this plan reads any of the object's own columns
    pub(crate) populates: bool,
}

impl MappedClass {
    /// Build the plan for `scope` from the select list.
    pub(crate) fn build(
        scopes: &[TableScope],
        fields: &[FieldAlias],
        scope: usize,
        mapper: &Mapper,
    ) -> Result<Self> {
        let mapping = scopes[scope].mapping.clone();
        let column_of = |property: usize| {
            fields
                .iter()
                .find(|f| f.scope == scope && f.property == property)
                .map(|f| f.index)
        };
        let key = mapping.key_index();
        let id = key.map(|property| IdField {
            property,
            column: column_of(property),
        });

        let mut planned = Vec::new();
        for (property, prop) in mapping.properties().iter().enumerate() {
            if Some(property) == key {
                continue;
            }
            let column = column_of(property);
            let Some(target) = prop.reference() else {
                if let Some(column) = column {
                    planned.push(MappedField::Scalar { property, column });
                }
                continue;
            };
            let child = scopes
                .iter()
                .position(|s| s.parent == Some((scope, property)))
                .filter(|&c| has_selection(scopes, fields, c));
            let nested = match (child, column) {
                (Some(child), _) => Self::build(scopes, fields, child, mapper)?,
                (None, Some(_)) => {
                    Self::stub(mapper.require(target.type_id, target.type_name)?.clone())?
                }
                (None, None) => continue,
            };
            planned.push(MappedField::Reference {
                property,
                column,
                nested,
            });
        }

        let has_fields = mapping.properties().len() > usize::from(key.is_some());
        Ok(Self {
            populates: !planned.is_empty() || !has_fields,
            mapping,
            id,
            fields: planned,
        })
    }

    /// Plan for a referenced object known only by the foreign key.
    fn stub(mapping: Arc<TypeMapping>) -> Result<Self> {
        mapping.require_key()?;
        let id = mapping.key_index().map(|property| IdField {
            property,
            column: None,
        });
        Ok(Self {
            mapping,
            id,
            fields: Vec::new(),
            populates: false,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.mapping.name()
    }

    /// Whether the key column of the root object is selected.
    pub fn selects_key(&self) -> bool {
        self.id.is_some_and(|id| id.column.is_some())
    }

    fn key_type(&self) -> Result<&SqlType> {
        self.mapping
            .require_key()?
            .sql_type()
            .ok_or_else(|| Error::mapping(MappingErrorKind::InvalidMember, "key is not a scalar"))
    }
}

fn has_selection(scopes: &[TableScope], fields: &[FieldAlias], scope: usize) -> bool {
    fields.iter().any(|f| f.scope == scope)
        || scopes.iter().enumerate().any(|(i, s)| {
            s.parent.is_some_and(|(parent, _)| parent == scope) && has_selection(scopes, fields, i)
        })
}

/// Root objects read from a cursor, with the number of rows advanced over.
///
/// Rows whose key column is NULL yield no object but still count.
pub(crate) struct Fetched<T> {
    pub(crate) objects: Vec<Ref<T>>,
    pub(crate) rows: usize,
}

/// Reads rows into objects for one session.
pub(crate) struct Materializer<'a, C> {
    connection: &'a C,
    identity: &'a mut IdentityMap,
}

impl<'a, C: Connection> Materializer<'a, C> {
    pub(crate) fn new(connection: &'a C, identity: &'a mut IdentityMap) -> Self {
        Self {
            connection,
            identity,
        }
    }

    fn convert(&self, cursor: &dyn Cursor, column: usize, target: &SqlType) -> Result<Value> {
        self.connection
            .convert_value(cursor.raw_value(column)?, target)
    }

    /// Read root objects from at most `max` rows, advancing the cursor.
    ///
    /// With `refresh` set, cached root objects are re-read from the row
    /// instead of returned as they are.
    pub(crate) fn read_objects<T: Entity>(
        &mut self,
        plan: &MappedClass,
        cursor: &mut dyn Cursor,
        max: Option<usize>,
        refresh: bool,
    ) -> Result<Fetched<T>> {
        let mut objects = Vec::new();
        let mut rows = 0;
        while max.is_none_or(|m| rows < m) && cursor.advance()? {
            rows += 1;
            let Some(obj) = self.read(plan, &*cursor, None, refresh)? else {
                continue;
            };
            let typed = obj.downcast::<T>().ok_or_else(|| {
                Error::mapping(
                    MappingErrorKind::InvalidMember,
                    format!("plan for {} does not produce the requested type", plan.type_name()),
                )
            })?;
            objects.push(typed);
        }
        Ok(Fetched { objects, rows })
    }

    /// Read one object of `plan` from the current row.
    ///
    /// `expected` is the key already known from a referencing row. Returns
    /// `None` when the selected key column is NULL and no key was expected.
    pub(crate) fn read(
        &mut self,
        plan: &MappedClass,
        cursor: &dyn Cursor,
        expected: Option<Value>,
        refresh: bool,
    ) -> Result<Option<AnyRef>> {
        let mapping = &plan.mapping;
        let id = match plan.id {
            Some(id) if id.column.is_some() || expected.is_some() => id,
            _ => {
                let obj = mapping.construct();
                self.read_fields(plan, cursor, &obj)?;
                return Ok(Some(obj));
            }
        };

        let key = match (id.column, expected) {
            (Some(column), expected) if cursor.is_null(column) => match expected {
                None => return Ok(None),
                Some(expected) => return Err(consistency(mapping, expected, Value::Null)),
            },
            (Some(column), expected) => {
                let key = self.convert(cursor, column, plan.key_type()?)?;
                if let Some(expected) = expected {
                    if PrimaryKey::new(expected.clone()) != PrimaryKey::new(key.clone()) {
                        return Err(consistency(mapping, expected, key));
                    }
                }
                key
            }
            (None, Some(expected)) => expected,
            (None, None) => return Ok(None),
        };

        let type_id = mapping.ty.type_id;
        let pk = PrimaryKey::new(key.clone());
        if let Some(entry) = self.identity.get(type_id, &pk) {
            let obj = entry.object.clone();
            if (entry.hydrated && !refresh) || !plan.populates {
                tracing::trace!(type_name = mapping.name(), key = ?key, "Identity cache hit");
                return Ok(Some(obj));
            }
            tracing::trace!(type_name = mapping.name(), key = ?key, "Populating cached object");
            self.identity.mark_hydrated(type_id, &pk);
            self.read_fields(plan, cursor, &obj)?;
            return Ok(Some(obj));
        }

        tracing::trace!(type_name = mapping.name(), key = ?key, "Identity cache miss");
        let obj = mapping.construct();
        mapping.properties()[id.property].set_value(&obj, &key)?;
        for collection in mapping.collections() {
            collection.attach(&obj, &key)?;
        }
        self.identity
            .insert(type_id, pk, obj.clone(), plan.populates);
        self.read_fields(plan, cursor, &obj)?;
        Ok(Some(obj))
    }

    fn read_fields(&mut self, plan: &MappedClass, cursor: &dyn Cursor, obj: &AnyRef) -> Result<()> {
        let properties = plan.mapping.properties();
        for field in &plan.fields {
            match field {
                MappedField::Scalar { property, column } => {
                    if cursor.is_null(*column) {
                        continue;
                    }
                    let prop = &properties[*property];
                    let Some(target) = prop.sql_type() else {
                        continue;
                    };
                    let value = self.convert(cursor, *column, target)?;
                    prop.set_value(obj, &value)?;
                }
                MappedField::Reference {
                    property,
                    column,
                    nested,
                } => {
                    let expected = match column {
                        Some(column) if cursor.is_null(*column) => continue,
                        Some(column) => Some(self.convert(cursor, *column, nested.key_type()?)?),
                        None => None,
                    };
                    if let Some(target) = self.read(nested, cursor, expected, false)? {
                        properties[*property].set_reference(obj, Some(target))?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn consistency(mapping: &TypeMapping, expected: Value, actual: Value) -> Error {
    Error::Consistency(ConsistencyError {
        type_name: mapping.name().to_string(),
        expected,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::CompiledQuery;
    use crate::dialect::Dialect;
    use crate::fluent::QueryRoot;
    use crate::testing::{Author, Node, Post, Scripted, TestPoco, mapper, row};
    use sqlgraph_core::{Row, RowCursor};

    fn root<T: Entity>() -> QueryRoot<T> {
        QueryRoot::new(mapper(), Dialect::Generic)
    }

    fn read_all<T: Entity>(
        compiled: &CompiledQuery<T>,
        identity: &mut IdentityMap,
        rows: Vec<Row>,
        refresh: bool,
    ) -> Result<Vec<Ref<T>>> {
        let connection = Scripted::default();
        let mut cursor = RowCursor::new(rows);
        let plan = compiled.plan().unwrap();
        Materializer::new(&connection, identity)
            .read_objects(plan, &mut cursor, None, refresh)
            .map(|fetched| fetched.objects)
    }

    fn posts() -> CompiledQuery<Post> {
        root::<Post>()
            .select()
            .unwrap()
            .select_all()
            .from()
            .compile()
            .unwrap()
    }

    fn posts_with_authors() -> CompiledQuery<Post> {
        root::<Post>()
            .select()
            .unwrap()
            .select_all()
            .all_of("Author")
            .unwrap()
            .from()
            .left_join_on_id("Author")
            .unwrap()
            .compile()
            .unwrap()
    }

    fn authors() -> CompiledQuery<Author> {
        root::<Author>()
            .select()
            .unwrap()
            .select_all()
            .from()
            .compile()
            .unwrap()
    }

    #[test]
    fn test_scalar_columns_are_read() {
        let compiled = root::<TestPoco>()
            .select()
            .unwrap()
            .select_all()
            .from()
            .compile()
            .unwrap();
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![
            Value::BigInt(1),
            Value::Text("Toto".to_string()),
            Value::Double(2.5),
        ])];
        let objects = read_all(&compiled, &mut identity, rows, false).unwrap();
        assert_eq!(objects.len(), 1);
        let poco = objects[0].read();
        assert_eq!(poco.id, 1);
        assert_eq!(poco.name, "Toto");
        assert!((poco.decimal - 2.5).abs() < f64::EPSILON);
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn test_rows_sharing_a_foreign_key_share_the_object() {
        let mut identity = IdentityMap::new();
        let rows = vec![
            row(vec![
                Value::BigInt(1),
                Value::Text("a".to_string()),
                Value::BigInt(7),
                Value::BigInt(7),
                Value::Text("Ann".to_string()),
            ]),
            row(vec![
                Value::BigInt(2),
                Value::Text("b".to_string()),
                Value::BigInt(7),
                Value::BigInt(7),
                Value::Text("Ann".to_string()),
            ]),
        ];
        let posts = read_all(&posts_with_authors(), &mut identity, rows, false).unwrap();
        assert_eq!(posts.len(), 2);
        let first = posts[0].read().author.clone().unwrap();
        let second = posts[1].read().author.clone().unwrap();
        assert!(Ref::ptr_eq(&first, &second));
        assert_eq!(first.read().name, "Ann");
        assert_eq!(identity.len(), 3);
    }

    #[test]
    fn test_same_row_key_returns_same_instance_across_reads() {
        let mut identity = IdentityMap::new();
        let make = || {
            vec![row(vec![
                Value::BigInt(3),
                Value::Text("t".to_string()),
                Value::Null,
            ])]
        };
        let a = read_all(&posts(), &mut identity, make(), false).unwrap();
        let b = read_all(&posts(), &mut identity, make(), false).unwrap();
        assert!(Ref::ptr_eq(&a[0], &b[0]));
    }

    #[test]
    fn test_null_foreign_key_leaves_reference_empty() {
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![
            Value::BigInt(1),
            Value::Text("orphan".to_string()),
            Value::Null,
            Value::Null,
            Value::Null,
        ])];
        let posts = read_all(&posts_with_authors(), &mut identity, rows, false).unwrap();
        assert!(posts[0].read().author.is_none());
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn test_self_reference_resolves_to_itself() {
        let compiled = root::<Node>()
            .select()
            .unwrap()
            .select_all()
            .from()
            .compile()
            .unwrap();
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![
            Value::BigInt(1),
            Value::Text("root".to_string()),
            Value::BigInt(1),
        ])];
        let nodes = read_all(&compiled, &mut identity, rows, false).unwrap();
        let parent = nodes[0].read().parent.clone().unwrap();
        assert!(Ref::ptr_eq(&nodes[0], &parent));
    }

    #[test]
    fn test_joined_self_reference_resolves_to_itself() {
        let compiled = root::<Node>()
            .select()
            .unwrap()
            .select_all()
            .all_of("Parent")
            .unwrap()
            .from()
            .left_join_on_id("Parent")
            .unwrap()
            .compile()
            .unwrap();
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![
            Value::BigInt(1),
            Value::Text("root".to_string()),
            Value::BigInt(1),
            Value::BigInt(1),
            Value::Text("root".to_string()),
            Value::BigInt(1),
        ])];
        let nodes = read_all(&compiled, &mut identity, rows, false).unwrap();
        let parent = nodes[0].read().parent.clone().unwrap();
        assert!(Ref::ptr_eq(&nodes[0], &parent));
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn test_foreign_key_disagreeing_with_joined_key_is_an_error() {
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![
            Value::BigInt(1),
            Value::Text("a".to_string()),
            Value::BigInt(7),
            Value::BigInt(8),
            Value::Text("Ann".to_string()),
        ])];
        let err = read_all(&posts_with_authors(), &mut identity, rows, false).unwrap_err();
        match err {
            Error::Consistency(e) => {
                assert_eq!(e.expected, Value::BigInt(7));
                assert_eq!(e.actual, Value::BigInt(8));
            }
            other => panic!("expected consistency error, got {:?}", other),
        }
    }

    #[test]
    fn test_stub_is_populated_by_a_later_full_read() {
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![
            Value::BigInt(1),
            Value::Text("a".to_string()),
            Value::BigInt(7),
        ])];
        let posts = read_all(&posts(), &mut identity, rows, false).unwrap();
        let stub = posts[0].read().author.clone().unwrap();
        assert_eq!(stub.read().id, 7);
        assert!(stub.read().name.is_empty());

        let rows = vec![row(vec![Value::BigInt(7), Value::Text("Ann".to_string())])];
        let authors = read_all(&authors(), &mut identity, rows, false).unwrap();
        assert!(Ref::ptr_eq(&stub, &authors[0]));
        assert_eq!(stub.read().name, "Ann");
    }

    #[test]
    fn test_first_read_wins_unless_refreshed() {
        let mut identity = IdentityMap::new();
        let first = vec![row(vec![Value::BigInt(7), Value::Text("Ann".to_string())])];
        let second = || vec![row(vec![Value::BigInt(7), Value::Text("Bob".to_string())])];
        let a = read_all(&authors(), &mut identity, first, false).unwrap();
        read_all(&authors(), &mut identity, second(), false).unwrap();
        assert_eq!(a[0].read().name, "Ann");

        read_all(&authors(), &mut identity, second(), true).unwrap();
        assert_eq!(a[0].read().name, "Bob");
    }

    #[test]
    fn test_materialized_collection_is_bound_to_its_owner() {
        let mut identity = IdentityMap::new();
        let rows = vec![row(vec![Value::BigInt(7), Value::Text("Ann".to_string())])];
        let authors = read_all(&authors(), &mut identity, rows, false).unwrap();
        let author = authors[0].read();
        let owner = author.posts.owner().unwrap();
        assert_eq!(owner.owner_key, Value::BigInt(7));
        assert!(!author.posts.is_loaded());
    }

    #[test]
    fn test_projection_without_key_is_not_cached() {
        let compiled = root::<TestPoco>()
            .select()
            .unwrap()
            .column("Name")
            .unwrap()
            .from()
            .compile()
            .unwrap();
        assert!(!compiled.plan().unwrap().selects_key());
        let mut identity = IdentityMap::new();
        let rows = vec![
            row(vec![Value::Text("x".to_string())]),
            row(vec![Value::Text("x".to_string())]),
        ];
        let objects = read_all(&compiled, &mut identity, rows, false).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(!Ref::ptr_eq(&objects[0], &objects[1]));
        assert_eq!(objects[0].read().name, "x");
        assert!(identity.is_empty());
    }

    #[test]
    fn test_max_stops_reading() {
        let connection = Scripted::default();
        let mut identity = IdentityMap::new();
        let mut cursor = RowCursor::new(vec![
            row(vec![Value::BigInt(1), Value::Text("a".to_string())]),
            row(vec![Value::BigInt(2), Value::Text("b".to_string())]),
            row(vec![Value::BigInt(3), Value::Text("c".to_string())]),
        ]);
        let compiled = authors();
        let plan = compiled.plan().unwrap();
        let fetched: Fetched<Author> = Materializer::new(&connection, &mut identity)
            .read_objects(plan, &mut cursor, Some(2), false)
            .unwrap();
        assert_eq!(fetched.objects.len(), 2);
        assert_eq!(fetched.rows, 2);
        assert_eq!(identity.len(), 2);
    }

    #[test]
    fn test_null_key_rows_are_counted_but_skipped() {
        let connection = Scripted::default();
        let mut identity = IdentityMap::new();
        let mut cursor = RowCursor::new(vec![
            row(vec![Value::Null, Value::Null]),
            row(vec![Value::BigInt(4), Value::Text("d".to_string())]),
        ]);
        let compiled = authors();
        let plan = compiled.plan().unwrap();
        let fetched: Fetched<Author> = Materializer::new(&connection, &mut identity)
            .read_objects(plan, &mut cursor, None, false)
            .unwrap();
        assert_eq!(fetched.rows, 2);
        assert_eq!(fetched.objects.len(), 1);
        assert_eq!(fetched.objects[0].read().id, 4);
    }
}
