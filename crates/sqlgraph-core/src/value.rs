//! The dynamic value carried by parameters, cursor columns and keys.

use serde::{Deserialize, Serialize};

/// One SQL datum.
///
/// Integer and float widths are kept apart so a driver can bind the exact
/// column type; [`coerce_value`](crate::coerce_value) normalizes them when
/// rows are read back. Temporal variants hold epoch offsets:
/// `Date` counts days, `Time` and `Timestamp` count microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Exact numeric in its textual form
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(i32),
    Time(i64),
    Timestamp(i64),
    Uuid([u8; 16]),
    Json(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Upper-case SQL name of the variant, used in conversion errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOLEAN",
            Self::TinyInt(_) => "TINYINT",
            Self::SmallInt(_) => "SMALLINT",
            Self::Int(_) => "INTEGER",
            Self::BigInt(_) => "BIGINT",
            Self::Float(_) => "REAL",
            Self::Double(_) => "DOUBLE",
            Self::Decimal(_) => "DECIMAL",
            Self::Text(_) => "TEXT",
            Self::Bytes(_) => "BLOB",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::Timestamp(_) => "TIMESTAMP",
            Self::Uuid(_) => "UUID",
            Self::Json(_) => "JSON",
        }
    }

    /// Any integer or boolean widened to `i64`. Decimal text parses.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Self::Bool(b) => i64::from(b),
            Self::TinyInt(n) => n.into(),
            Self::SmallInt(n) => n.into(),
            Self::Int(n) => n.into(),
            Self::BigInt(n) => n,
            Self::Decimal(ref s) => return s.parse().ok(),
            _ => return None,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            Self::Float(x) => x.into(),
            Self::Double(x) => x,
            Self::TinyInt(n) => n.into(),
            Self::SmallInt(n) => n.into(),
            Self::Int(n) => n.into(),
            Self::BigInt(n) => n as f64,
            Self::Decimal(ref s) => return s.parse().ok(),
            _ => return None,
        })
    }

    /// Integers read as truthy when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Decimal(_) => None,
            other => other.as_i64().map(|n| n != 0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Blob contents, or the UTF-8 bytes of text.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// True for what an automatic key holds before its first insert.
    pub fn is_unset_key(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Uuid(bytes) => *bytes == [0; 16],
            other => other.as_i64() == Some(0),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    [u8; 16] => Uuid,
    serde_json::Value => Json,
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::BigInt(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
