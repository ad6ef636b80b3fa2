//! Error types for sqlgraph operations.

use crate::value::Value;
use std::fmt;

/// The primary error type for all sqlgraph operations.
#[derive(Debug)]
pub enum Error {
    /// An expression or plan referenced something the mapping model does not know
    Mapping(MappingError),
    /// A single-result terminal received the wrong number of rows
    Cardinality(CardinalityError),
    /// A materialized row contradicts an identity already known for it
    Consistency(ConsistencyError),
    /// A builder operation was invoked in a state that does not permit it
    State(StateError),
    /// Opaque failure reported by the execution boundary
    Driver(DriverError),
    /// Value conversion errors
    Type(TypeError),
    /// Unbalanced transaction nesting
    Transaction(TransactionError),
    /// Failure raised by caller code, such as a transaction body
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingError {
    pub kind: MappingErrorKind,
    /// Name of the mapped type being inspected, when known
    pub type_name: Option<String>,
    /// Member path or alias that failed to resolve
    pub member: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// The type was never registered with the mapper
    UnmappedType,
    /// The property name does not exist on the mapped type
    UnmappedMember,
    /// A table alias was used that the enclosing query never introduced
    UndeclaredAlias,
    /// A reference path was used without the table being joined
    UnjoinedReference,
    /// A key was required but the type declares none
    MissingKey,
    /// The member exists but cannot be used this way
    InvalidMember,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalityError {
    /// Human readable description of what was expected ("exactly one row")
    pub expected: &'static str,
    /// Rows actually observed (capped at the number read before failing)
    pub actual: usize,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyError {
    pub type_name: String,
    pub expected: Value,
    pub actual: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateError {
    /// The operation that was attempted
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct DriverError {
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit or rollback without a matching begin
    NotActive,
    /// Work was attempted after a nested scope asked for rollback
    RollbackPending,
}

impl MappingError {
    pub fn new(kind: MappingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: None,
            member: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }
}

impl Error {
    /// Mapping and state errors come from malformed queries, never from data.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::Mapping(_) | Error::State(_))
    }

    /// Cardinality and consistency errors describe the shape of returned rows.
    pub fn is_data_shape_error(&self) -> bool {
        matches!(self, Error::Cardinality(_) | Error::Consistency(_))
    }

    /// Shorthand for a mapping error of the given kind.
    pub fn mapping(kind: MappingErrorKind, message: impl Into<String>) -> Self {
        Error::Mapping(MappingError::new(kind, message))
    }

    /// Shorthand for a state error.
    pub fn state(operation: &'static str, message: impl Into<String>) -> Self {
        Error::State(StateError {
            operation,
            message: message.into(),
        })
    }

    /// Get the SQL text attached to this error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Cardinality(e) => e.sql.as_deref(),
            Error::Driver(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Mapping(e) => write!(f, "mapping: {e}"),
            Error::Cardinality(e) => write!(f, "cardinality: {e}"),
            Error::Consistency(e) => write!(f, "consistency: {e}"),
            Error::State(e) => write!(f, "invalid builder state: {e}"),
            Error::Driver(e) => write!(f, "driver: {e}"),
            Error::Type(e) => write!(f, "conversion: {e}"),
            Error::Transaction(e) => write!(f, "transaction: {e}"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Driver(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(member) = &self.member {
            write!(f, " (member '{}'", member)?;
            if let Some(ty) = &self.type_name {
                write!(f, " on {}", ty)?;
            }
            write!(f, ")")?;
        } else if let Some(ty) = &self.type_name {
            write!(f, " (type {})", ty)?;
        }
        Ok(())
    }
}

impl fmt::Display for CardinalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {} row(s)", self.expected, self.actual)
    }
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row id {:?} for {} contradicts expected id {:?}",
            self.actual, self.type_name, self.expected
        )
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wanted {} but got {}", self.expected, self.actual)?;
        match &self.column {
            Some(column) => write!(f, " in column '{column}'"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

macro_rules! wrap_error {
    ($($inner:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$inner> for Error {
                fn from(err: $inner) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

wrap_error! {
    MappingError => Mapping,
    CardinalityError => Cardinality,
    ConsistencyError => Consistency,
    StateError => State,
    DriverError => Driver,
    TypeError => Type,
    TransactionError => Transaction,
}

/// Result type alias for sqlgraph operations.
pub type Result<T> = std::result::Result<T, Error>;
