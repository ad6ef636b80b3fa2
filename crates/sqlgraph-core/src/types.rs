//! Column types and the Rust types that declare them.

/// The storage type of a mapped column.
///
/// Drives [`coerce_value`](crate::coerce_value): each raw cursor value is
/// normalized to the [`Value`](crate::Value) variant matching the column's
/// declared type before it reaches a setter or the identity cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    /// Text with a declared maximum length
    VarChar(u32),
    Text,
    Blob,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
}

impl SqlType {
    /// Family name, matching [`Value::type_name`](crate::Value::type_name)
    /// for the variant this type coerces to.
    pub const fn family(&self) -> &'static str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Decimal { .. } => "DECIMAL",
            Self::Boolean => "BOOLEAN",
            Self::VarChar(_) | Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Uuid => "UUID",
            Self::Json => "JSON",
        }
    }
}

/// Static column type of a Rust field type.
///
/// `Option<T>` keeps `T`'s type and marks it nullable.
pub trait TypeInfo {
    const SQL_TYPE: SqlType;
    const NULLABLE: bool = false;
}

macro_rules! type_info {
    ($($ty:ty => $sql:expr),* $(,)?) => {
        $(
            impl TypeInfo for $ty {
                const SQL_TYPE: SqlType = $sql;
            }
        )*
    };
}

type_info! {
    i8 => SqlType::TinyInt,
    i16 => SqlType::SmallInt,
    i32 => SqlType::Integer,
    i64 => SqlType::BigInt,
    f32 => SqlType::Real,
    f64 => SqlType::Double,
    bool => SqlType::Boolean,
    String => SqlType::Text,
    Vec<u8> => SqlType::Blob,
    [u8; 16] => SqlType::Uuid,
    serde_json::Value => SqlType::Json,
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
}
