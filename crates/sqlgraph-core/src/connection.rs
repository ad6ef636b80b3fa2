//! The execution boundary the query core hands compiled statements to.
//!
//! A [`Connection`] runs SQL text with positional parameters and returns a
//! [`Cursor`]. It also owns the value-conversion hook used by the
//! materializer, and the real transaction primitives that the session's
//! nesting counter drives. Drivers implement the synchronous methods; the
//! asynchronous variants take an asupersync `Cx` and default to the
//! synchronous calls.

use crate::error::{Error, Result, TypeError};
use crate::row::Cursor;
use crate::types::SqlType;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A boxed cursor as returned by a connection.
pub type BoxCursor = Box<dyn Cursor + Send>;

/// A database connection capable of executing compiled statements.
///
/// Parameters are bound positionally: `params[n]` is the value for the
/// placeholder `@Item{n}` in `sql`.
pub trait Connection: Send + Sync {
    /// Execute a query and return a cursor over its rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<BoxCursor>;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Open a real transaction.
    fn begin_transaction(&self) -> Result<()>;

    /// Commit the open transaction.
    fn commit_transaction(&self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback_transaction(&self) -> Result<()>;

    /// Convert a raw column value to the representation of `target`.
    ///
    /// Keys go through this hook too, so two rows carrying the same key in
    /// different integer widths land on the same identity.
    fn convert_value(&self, raw: &Value, target: &SqlType) -> Result<Value> {
        coerce_value(raw, target)
    }

    /// Execute a query asynchronously.
    fn query_async(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<BoxCursor, Error>> + Send {
        let result = self.query(sql, params);
        async move { into_outcome(result) }
    }

    /// Execute a statement asynchronously.
    fn execute_async(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute(sql, params);
        async move { into_outcome(result) }
    }
}

/// Lift a synchronous result into an asupersync outcome.
pub fn into_outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

/// Continue a successful outcome with a fallible step.
///
/// Errors, cancellation and panics pass through untouched.
pub fn try_map<T, U>(outcome: Outcome<T, Error>, f: impl FnOnce(T) -> Result<U>) -> Outcome<U, Error> {
    match outcome {
        Outcome::Ok(v) => into_outcome(f(v)),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

fn mismatch(target: &SqlType, raw: &Value) -> Error {
    Error::Type(TypeError {
        expected: target.family(),
        actual: raw.type_name().to_string(),
        column: None,
    })
}

/// Default conversion from a driver value to the canonical variant for `target`.
///
/// NULL passes through untouched.
#[allow(clippy::cast_possible_truncation)]
pub fn coerce_value(raw: &Value, target: &SqlType) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let converted = match target {
        SqlType::TinyInt => raw
            .as_i64()
            .and_then(|v| i8::try_from(v).ok())
            .map(Value::TinyInt),
        SqlType::SmallInt => raw
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .map(Value::SmallInt),
        SqlType::Integer => raw
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int),
        SqlType::BigInt => raw.as_i64().map(Value::BigInt),
        SqlType::Real => raw.as_f64().map(|v| Value::Float(v as f32)),
        SqlType::Double => raw.as_f64().map(Value::Double),
        SqlType::Decimal { .. } => match raw {
            Value::Decimal(s) | Value::Text(s) => Some(Value::Decimal(s.clone())),
            other => other.as_f64().map(|v| Value::Decimal(v.to_string())),
        },
        SqlType::Boolean => raw.as_bool().map(Value::Bool),
        SqlType::VarChar(_) | SqlType::Text => raw.as_str().map(|s| Value::Text(s.to_string())),
        SqlType::Blob => raw.as_bytes().map(|b| Value::Bytes(b.to_vec())),
        SqlType::Date => match raw {
            Value::Date(d) => Some(Value::Date(*d)),
            other => other
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Date),
        },
        SqlType::Time => match raw {
            Value::Time(t) => Some(Value::Time(*t)),
            other => other.as_i64().map(Value::Time),
        },
        SqlType::Timestamp => match raw {
            Value::Timestamp(t) => Some(Value::Timestamp(*t)),
            other => other.as_i64().map(Value::Timestamp),
        },
        SqlType::Uuid => match raw {
            Value::Uuid(u) => Some(Value::Uuid(*u)),
            Value::Bytes(b) => <[u8; 16]>::try_from(b.as_slice()).ok().map(Value::Uuid),
            _ => None,
        },
        SqlType::Json => match raw {
            Value::Json(j) => Some(Value::Json(j.clone())),
            Value::Text(s) => serde_json::from_str(s).ok().map(Value::Json),
            _ => None,
        },
    };
    converted.ok_or_else(|| mismatch(target, raw))
}
