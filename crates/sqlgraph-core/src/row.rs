//! Result rows and the sequential cursor the materializer reads from.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;

/// One result row, addressed by column position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Read column `index` as `T`.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        T::from_value(self.get(index).ok_or_else(|| missing_column(index, self.len()))?)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

fn missing_column(index: usize, width: usize) -> Error {
    Error::Type(TypeError {
        expected: "column",
        actual: format!("index {index} out of range for {width} columns"),
        column: None,
    })
}

/// Sequential access to a tabular result.
///
/// `advance` must be called before the first row is read. Column accessors
/// refer to the current row.
pub trait Cursor {
    /// Move to the next row, returning false when the result is exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Whether the column holds a server-side NULL in the current row.
    fn is_null(&self, index: usize) -> bool;

    /// Raw value of a column in the current row.
    fn raw_value(&self, index: usize) -> Result<&Value>;
}

/// A cursor over rows that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct RowCursor {
    rows: Vec<Row>,
    position: Option<usize>,
}

impl RowCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            position: None,
        }
    }

    fn current(&self) -> Option<&Row> {
        self.position.and_then(|p| self.rows.get(p))
    }
}

impl Cursor for RowCursor {
    fn advance(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn is_null(&self, index: usize) -> bool {
        self.current()
            .and_then(|row| row.get(index))
            .is_none_or(Value::is_null)
    }

    fn raw_value(&self, index: usize) -> Result<&Value> {
        let row = self
            .current()
            .ok_or_else(|| Error::state("raw_value", "cursor is not positioned on a row"))?;
        row.get(index).ok_or_else(|| missing_column(index, row.len()))
    }
}

/// Conversion from a column value into a field type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

macro_rules! integer_from_value {
    ($($ty:ident),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = value.as_i64().ok_or_else(|| mismatch(stringify!($ty), value))?;
                    $ty::try_from(wide).map_err(|_| {
                        Error::Type(TypeError {
                            expected: stringify!($ty),
                            actual: format!("value {wide} out of range"),
                            column: None,
                        })
                    })
                }
            }
        )*
    };
}

integer_from_value!(i8, i16, i32, i64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

#[allow(clippy::cast_possible_truncation)]
impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        f64::from_value(value).map(|x| x as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::Bytes(b) => b.as_slice().try_into().map_err(|_| mismatch("[u8; 16]", value)),
            _ => Err(mismatch("[u8; 16]", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|_| mismatch("JSON", value)),
            _ => Err(mismatch("JSON", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
