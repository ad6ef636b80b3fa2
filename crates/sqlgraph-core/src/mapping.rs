//! The mapping model: which tables, columns, keys and relations exist.
//!
//! A [`TypeMapping`] is built once per mapped type by a [`MappingBuilder`]
//! driven from [`Entity::map`]. Property access goes through getter/setter
//! closures captured at build time, so the materializer never looks a
//! property up by name on the hot path.

use crate::collection::LazyCollection;
use crate::error::{Error, MappingError, MappingErrorKind, Result, TypeError};
use crate::object::{AnyRef, Ref};
use crate::row::FromValue;
use crate::types::{SqlType, TypeInfo};
use crate::value::Value;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type that maps to a table.
///
/// ```ignore
/// #[derive(Default)]
/// struct Post {
///     id: i64,
///     title: String,
///     author: Option<Ref<User>>,
/// }
///
/// impl Entity for Post {
///     const TABLE_NAME: &'static str = "Post";
///
///     fn map(m: &mut MappingBuilder<Self>) {
///         m.key("Id", |p| &p.id, |p| &mut p.id).automatic();
///         m.column("Title", |p| &p.title, |p| &mut p.title).max_length(200);
///         m.reference("Author", |p| &p.author, |p| &mut p.author);
///     }
/// }
/// ```
pub trait Entity: Default + Send + Sync + 'static {
    /// Table name.
    const TABLE_NAME: &'static str;

    /// Schema the table lives in, if any.
    const SCHEMA: Option<&'static str> = None;

    /// Describe the columns and relations of this type.
    fn map(mapping: &mut MappingBuilder<Self>);
}

/// Values that can be stored in a scalar column.
pub trait ColumnValue: FromValue + TypeInfo + Clone + Into<Value> + Send + Sync + 'static {}

impl<V> ColumnValue for V where V: FromValue + TypeInfo + Clone + Into<Value> + Send + Sync + 'static {}

/// Referential action for foreign key constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No action - error if any referencing rows exist (default).
    #[default]
    NoAction,
    /// Restrict - same as NO ACTION but checked immediately.
    Restrict,
    /// Cascade - delete/update referencing rows.
    Cascade,
    /// Set null - set referencing columns to NULL.
    SetNull,
    /// Set default - set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Identifies a mapped type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl TypeRef {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Whether a property holds a plain value or a reference to another mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(SqlType),
    /// Foreign key. The column type is the key type of the target.
    Reference(TypeRef),
}

type GetValue = Arc<dyn Fn(&AnyRef) -> Result<Value> + Send + Sync>;
type SetValue = Arc<dyn Fn(&AnyRef, &Value) -> Result<()> + Send + Sync>;
type GetRef = Arc<dyn Fn(&AnyRef) -> Result<Option<AnyRef>> + Send + Sync>;
type SetRef = Arc<dyn Fn(&AnyRef, Option<AnyRef>) -> Result<()> + Send + Sync>;
type Attach = Arc<dyn Fn(&AnyRef, &Value) -> Result<()> + Send + Sync>;

#[derive(Clone)]
enum Accessor {
    Scalar { get: GetValue, set: SetValue },
    Reference { get: GetRef, set: SetRef },
}

/// One mapped column.
#[derive(Clone)]
pub struct PropertyMapping {
    /// Property name used in member paths
    pub name: String,
    pub column_name: String,
    pub kind: PropertyKind,
    pub nullable: bool,
    pub max_length: Option<u32>,
    /// Generated by the server (auto-increment keys)
    pub automatic: bool,
    /// Never written by INSERT or UPDATE
    pub readonly: bool,
    pub is_key: bool,
    pub index: Option<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    accessor: Accessor,
}

impl PropertyMapping {
    /// Target type when this property is a foreign key.
    pub fn reference(&self) -> Option<&TypeRef> {
        match &self.kind {
            PropertyKind::Reference(target) => Some(target),
            PropertyKind::Scalar(_) => None,
        }
    }

    /// Column type when this property is a scalar.
    pub fn sql_type(&self) -> Option<&SqlType> {
        match &self.kind {
            PropertyKind::Scalar(ty) => Some(ty),
            PropertyKind::Reference(_) => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, PropertyKind::Reference(_))
    }

    /// Read a scalar property.
    pub fn get_value(&self, obj: &AnyRef) -> Result<Value> {
        match &self.accessor {
            Accessor::Scalar { get, .. } => get(obj),
            Accessor::Reference { .. } => Err(self.kind_error("is a reference, not a scalar")),
        }
    }

    /// Write a scalar property from a converted column value.
    pub fn set_value(&self, obj: &AnyRef, value: &Value) -> Result<()> {
        match &self.accessor {
            Accessor::Scalar { set, .. } => set(obj, value),
            Accessor::Reference { .. } => Err(self.kind_error("is a reference, not a scalar")),
        }
    }

    /// Read the object a reference property points at.
    pub fn get_reference(&self, obj: &AnyRef) -> Result<Option<AnyRef>> {
        match &self.accessor {
            Accessor::Reference { get, .. } => get(obj),
            Accessor::Scalar { .. } => Err(self.kind_error("is a scalar, not a reference")),
        }
    }

    pub fn set_reference(&self, obj: &AnyRef, target: Option<AnyRef>) -> Result<()> {
        match &self.accessor {
            Accessor::Reference { set, .. } => set(obj, target),
            Accessor::Scalar { .. } => Err(self.kind_error("is a scalar, not a reference")),
        }
    }

    fn kind_error(&self, what: &str) -> Error {
        Error::Mapping(
            MappingError::new(MappingErrorKind::InvalidMember, format!("property {}", what))
                .with_member(&self.name),
        )
    }
}

impl fmt::Debug for PropertyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMapping")
            .field("name", &self.name)
            .field("column_name", &self.column_name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("is_key", &self.is_key)
            .field("automatic", &self.automatic)
            .finish_non_exhaustive()
    }
}

/// A one-to-many relation: the element type holds a reference back to the owner.
#[derive(Clone)]
pub struct CollectionMapping {
    pub name: String,
    pub element: TypeRef,
    /// Reference property on the element type that points at the owner
    pub back_reference: String,
    attach: Attach,
}

impl CollectionMapping {
    /// Install a lazy collection bound to `owner_key` on a freshly built owner.
    pub fn attach(&self, owner: &AnyRef, owner_key: &Value) -> Result<()> {
        (self.attach)(owner, owner_key)
    }
}

impl fmt::Debug for CollectionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionMapping")
            .field("name", &self.name)
            .field("element", &self.element.type_name)
            .field("back_reference", &self.back_reference)
            .finish_non_exhaustive()
    }
}

/// Static description of a mapped type.
pub struct TypeMapping {
    pub ty: TypeRef,
    pub table_name: String,
    pub schema: Option<String>,
    properties: Vec<PropertyMapping>,
    by_name: HashMap<String, usize>,
    key: Option<usize>,
    collections: Vec<CollectionMapping>,
    construct: fn() -> AnyRef,
}

impl TypeMapping {
    /// Build the mapping for `T`.
    pub fn of<T: Entity>() -> Result<Self> {
        let mut builder = MappingBuilder::<T>::new();
        T::map(&mut builder);
        builder.finish()
    }

    pub fn name(&self) -> &'static str {
        self.ty.type_name
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyMapping] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMapping> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    /// Look a property up, failing with a mapping error naming this type.
    pub fn require(&self, name: &str) -> Result<&PropertyMapping> {
        self.property(name).ok_or_else(|| {
            Error::Mapping(
                MappingError::new(
                    MappingErrorKind::UnmappedMember,
                    "no mapped property with this name",
                )
                .with_type(self.name())
                .with_member(name),
            )
        })
    }

    /// Position of a property in declaration order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn key(&self) -> Option<&PropertyMapping> {
        self.key.map(|i| &self.properties[i])
    }

    pub fn key_index(&self) -> Option<usize> {
        self.key
    }

    /// The key property, failing when the type declares none.
    pub fn require_key(&self) -> Result<&PropertyMapping> {
        self.key().ok_or_else(|| {
            Error::Mapping(
                MappingError::new(
                    MappingErrorKind::MissingKey,
                    "type does not declare a key",
                )
                .with_type(self.name()),
            )
        })
    }

    pub fn collections(&self) -> &[CollectionMapping] {
        &self.collections
    }

    /// A fresh default instance.
    pub fn construct(&self) -> AnyRef {
        (self.construct)()
    }
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapping")
            .field("name", &self.ty.type_name)
            .field("table_name", &self.table_name)
            .field("schema", &self.schema)
            .field("properties", &self.properties)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

fn construct_default<T: Entity>() -> AnyRef {
    Ref::new(T::default()).erase()
}

fn downcast_owner<T: Entity>(obj: &AnyRef) -> Result<Ref<T>> {
    obj.downcast::<T>().ok_or_else(|| {
        Error::mapping(
            MappingErrorKind::InvalidMember,
            format!("object is not a {}", short_type_name::<T>()),
        )
    })
}

fn name_column(err: Error, column: &str) -> Error {
    match err {
        Error::Type(e) => Error::Type(TypeError {
            column: Some(column.to_string()),
            ..e
        }),
        other => other,
    }
}

/// Typed builder for a [`TypeMapping`].
pub struct MappingBuilder<T> {
    table_name: String,
    schema: Option<String>,
    properties: Vec<PropertyMapping>,
    collections: Vec<CollectionMapping>,
    problems: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> MappingBuilder<T> {
    fn new() -> Self {
        Self {
            table_name: T::TABLE_NAME.to_string(),
            schema: T::SCHEMA.map(str::to_string),
            properties: Vec::new(),
            collections: Vec::new(),
            problems: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Override the table name.
    pub fn table(&mut self, name: &str) -> &mut Self {
        self.table_name = name.to_string();
        self
    }

    pub fn schema(&mut self, name: &str) -> &mut Self {
        self.schema = Some(name.to_string());
        self
    }

    /// Map the primary key.
    pub fn key<V: ColumnValue>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> PropertyBuilder<'_> {
        if self.properties.iter().any(|p| p.is_key) {
            self.problems
                .push(format!("second key '{}' declared; a type has at most one key", name));
        }
        let mut property = Self::scalar(name, get, get_mut);
        property.is_key = true;
        property.nullable = false;
        self.push(property)
    }

    /// Map a scalar column.
    pub fn column<V: ColumnValue>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> PropertyBuilder<'_> {
        let property = Self::scalar(name, get, get_mut);
        self.push(property)
    }

    /// Map a foreign key holding a reference to another mapped type.
    pub fn reference<U: Entity>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Option<Ref<U>>,
        get_mut: fn(&mut T) -> &mut Option<Ref<U>>,
    ) -> PropertyBuilder<'_> {
        let get_ref: GetRef = Arc::new(move |obj: &AnyRef| {
            let owner = downcast_owner::<T>(obj)?;
            let guard = owner.read();
            Ok(get(&guard).as_ref().map(Ref::erase))
        });
        let set_ref: SetRef = Arc::new(move |obj: &AnyRef, target: Option<AnyRef>| {
            let owner = downcast_owner::<T>(obj)?;
            let typed = match target {
                Some(t) => Some(downcast_owner::<U>(&t)?),
                None => None,
            };
            *get_mut(&mut owner.write()) = typed;
            Ok(())
        });
        let property = PropertyMapping {
            name: name.to_string(),
            column_name: name.to_string(),
            kind: PropertyKind::Reference(TypeRef::of::<U>()),
            nullable: true,
            max_length: None,
            automatic: false,
            readonly: false,
            is_key: false,
            index: None,
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
            accessor: Accessor::Reference {
                get: get_ref,
                set: set_ref,
            },
        };
        self.push(property)
    }

    /// Map a one-to-many collection loaded lazily through `back_reference`,
    /// a reference property on `E` pointing at `T`.
    pub fn collection<E: Entity>(
        &mut self,
        name: &str,
        back_reference: &str,
        get_mut: fn(&mut T) -> &mut LazyCollection<E>,
    ) -> &mut Self {
        let owner_type = short_type_name::<T>();
        let back = back_reference.to_string();
        let attach: Attach = Arc::new(move |obj: &AnyRef, owner_key: &Value| {
            let owner = downcast_owner::<T>(obj)?;
            *get_mut(&mut owner.write()) =
                LazyCollection::bound(owner_type, owner_key.clone(), back.clone());
            Ok(())
        });
        self.collections.push(CollectionMapping {
            name: name.to_string(),
            element: TypeRef::of::<E>(),
            back_reference: back_reference.to_string(),
            attach,
        });
        self
    }

    fn scalar<V: ColumnValue>(
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> PropertyMapping {
        let get_value: GetValue = Arc::new(move |obj: &AnyRef| {
            let owner = downcast_owner::<T>(obj)?;
            let guard = owner.read();
            Ok(get(&guard).clone().into())
        });
        let column = name.to_string();
        let set_value: SetValue = Arc::new(move |obj: &AnyRef, value: &Value| {
            let owner = downcast_owner::<T>(obj)?;
            let converted = V::from_value(value).map_err(|e| name_column(e, &column))?;
            *get_mut(&mut owner.write()) = converted;
            Ok(())
        });
        PropertyMapping {
            name: name.to_string(),
            column_name: name.to_string(),
            kind: PropertyKind::Scalar(V::SQL_TYPE),
            nullable: V::NULLABLE,
            max_length: None,
            automatic: false,
            readonly: false,
            is_key: false,
            index: None,
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
            accessor: Accessor::Scalar {
                get: get_value,
                set: set_value,
            },
        }
    }

    fn push(&mut self, property: PropertyMapping) -> PropertyBuilder<'_> {
        if self.properties.iter().any(|p| p.name == property.name) {
            self.problems
                .push(format!("property '{}' mapped twice", property.name));
        }
        self.properties.push(property);
        let last = self.properties.len() - 1;
        PropertyBuilder {
            property: &mut self.properties[last],
        }
    }

    fn finish(self) -> Result<TypeMapping> {
        let mut problems = self.problems;
        let mut columns = HashSet::new();
        for property in &self.properties {
            if !columns.insert(property.column_name.as_str()) {
                problems.push(format!("column '{}' mapped twice", property.column_name));
            }
        }
        if let Some(problem) = problems.into_iter().next() {
            return Err(Error::Mapping(
                MappingError::new(MappingErrorKind::InvalidMember, problem)
                    .with_type(short_type_name::<T>()),
            ));
        }

        let by_name = self
            .properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        let key = self.properties.iter().position(|p| p.is_key);
        Ok(TypeMapping {
            ty: TypeRef::of::<T>(),
            table_name: self.table_name,
            schema: self.schema,
            properties: self.properties,
            by_name,
            key,
            collections: self.collections,
            construct: construct_default::<T>,
        })
    }
}

/// Refines the property just added to a [`MappingBuilder`].
pub struct PropertyBuilder<'a> {
    property: &'a mut PropertyMapping,
}

impl PropertyBuilder<'_> {
    /// Store under a column name different from the property name.
    pub fn column_name(self, name: &str) -> Self {
        self.property.column_name = name.to_string();
        self
    }

    pub fn nullable(self, nullable: bool) -> Self {
        self.property.nullable = nullable;
        self
    }

    pub fn max_length(self, len: u32) -> Self {
        self.property.max_length = Some(len);
        self
    }

    /// The server generates this value (auto-increment).
    pub fn automatic(self) -> Self {
        self.property.automatic = true;
        self
    }

    pub fn readonly(self) -> Self {
        self.property.readonly = true;
        self
    }

    pub fn index(self, name: &str) -> Self {
        self.property.index = Some(name.to_string());
        self
    }

    pub fn on_delete(self, action: ReferentialAction) -> Self {
        self.property.on_delete = action;
        self
    }

    pub fn on_update(self, action: ReferentialAction) -> Self {
        self.property.on_update = action;
        self
    }
}
