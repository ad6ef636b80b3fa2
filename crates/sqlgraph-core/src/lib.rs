//! Core types and traits for sqlgraph.
//!
//! This crate holds everything the query compiler and the materializer
//! share:
//!
//! - `Value`, `SqlType` and `FromValue` for dynamically typed column data
//! - `Cursor` and `Connection`, the execution boundary
//! - the mapping model (`Entity`, `TypeMapping`, `Mapper`)
//! - `Ref`/`AnyRef` object handles and the `IdentityMap`
//! - `LazyCollection` for one-to-many relations
//! - `Outcome` and `Cx` re-exported from asupersync for async terminals

pub use asupersync::{Cx, Outcome};

pub mod collection;
pub mod connection;
pub mod error;
pub mod identity;
pub mod mapper;
pub mod mapping;
pub mod object;
pub mod row;
pub mod types;
pub mod value;

pub use collection::{CollectionLoader, CollectionOwner, LazyCollection};
pub use connection::{BoxCursor, Connection, coerce_value, into_outcome, try_map};
pub use error::{
    CardinalityError, ConsistencyError, DriverError, Error, MappingError, MappingErrorKind,
    Result, StateError, TransactionError, TransactionErrorKind, TypeError,
};
pub use identity::{IdentityEntry, IdentityMap, PrimaryKey};
pub use mapper::Mapper;
pub use mapping::{
    CollectionMapping, ColumnValue, Entity, MappingBuilder, PropertyBuilder, PropertyKind,
    PropertyMapping, ReferentialAction, TypeMapping, TypeRef,
};
pub use object::{AnyRef, Ref};
pub use row::{Cursor, FromValue, Row, RowCursor};
pub use types::{SqlType, TypeInfo};
pub use value::Value;
