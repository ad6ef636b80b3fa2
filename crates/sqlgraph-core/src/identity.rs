//! Identity map: at most one live object per (type, primary key).
//!
//! The session owns one of these and passes it by reference to the
//! materializer. Two rows that reference the same foreign key therefore
//! resolve to the same [`Ref`], and a self-referencing row finds itself in
//! the map before its fields are read.

use crate::object::{AnyRef, Ref};
use crate::value::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// A primary key value usable as a map key.
///
/// Integer widths are normalized so `Int(1)` and `BigInt(1)` are the same
/// key. Floats compare by bit pattern.
#[derive(Debug, Clone)]
pub struct PrimaryKey(Value);

impl PrimaryKey {
    pub fn new(value: Value) -> Self {
        let normalized = match value {
            Value::TinyInt(v) => Value::BigInt(i64::from(v)),
            Value::SmallInt(v) => Value::BigInt(i64::from(v)),
            Value::Int(v) => Value::BigInt(i64::from(v)),
            other => other,
        };
        PrimaryKey(normalized)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for PrimaryKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl Eq for PrimaryKey {}

impl Hash for PrimaryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_single_value(&self.0, state);
    }
}

fn hash_single_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::TinyInt(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::SmallInt(i) => {
            3u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Int(i) => {
            4u8.hash(hasher);
            i.hash(hasher);
        }
        Value::BigInt(i) => {
            5u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Float(f) => {
            6u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Double(f) => {
            7u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Decimal(s) => {
            8u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Text(s) => {
            9u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            10u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Date(d) => {
            11u8.hash(hasher);
            d.hash(hasher);
        }
        Value::Time(t) => {
            12u8.hash(hasher);
            t.hash(hasher);
        }
        Value::Timestamp(ts) => {
            13u8.hash(hasher);
            ts.hash(hasher);
        }
        Value::Uuid(u) => {
            14u8.hash(hasher);
            u.hash(hasher);
        }
        Value::Json(j) => {
            15u8.hash(hasher);
            j.to_string().hash(hasher);
        }
    }
}

/// A cached object and whether its own columns have been read yet.
///
/// An object constructed only from a foreign key seen on another row is a
/// stub: it has its key but none of its fields. The first row that selects
/// its columns populates it; after that the first-seen values win.
#[derive(Debug, Clone)]
pub struct IdentityEntry {
    pub object: AnyRef,
    pub hydrated: bool,
}

/// Per-session map from (type, key) to the materialized object.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(TypeId, PrimaryKey), IdentityEntry>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: TypeId, key: &PrimaryKey) -> Option<&IdentityEntry> {
        self.entries.get(&(type_id, key.clone()))
    }

    pub fn insert(&mut self, type_id: TypeId, key: PrimaryKey, object: AnyRef, hydrated: bool) {
        self.entries
            .insert((type_id, key), IdentityEntry { object, hydrated });
    }

    /// Record that the object's own columns have now been read.
    pub fn mark_hydrated(&mut self, type_id: TypeId, key: &PrimaryKey) {
        if let Some(entry) = self.entries.get_mut(&(type_id, key.clone())) {
            entry.hydrated = true;
        }
    }

    pub fn remove(&mut self, type_id: TypeId, key: &PrimaryKey) -> Option<IdentityEntry> {
        self.entries.remove(&(type_id, key.clone()))
    }

    /// Typed lookup.
    pub fn get_typed<T: Send + Sync + 'static>(&self, key: &Value) -> Option<Ref<T>> {
        self.get(TypeId::of::<T>(), &PrimaryKey::new(key.clone()))
            .and_then(|entry| entry.object.downcast::<T>())
    }

    /// Register a fully populated object.
    pub fn insert_typed<T: Send + Sync + 'static>(&mut self, key: Value, object: &Ref<T>) {
        self.insert(TypeId::of::<T>(), PrimaryKey::new(key), object.erase(), true);
    }

    pub fn evict<T: Send + Sync + 'static>(&mut self, key: &Value) -> bool {
        self.remove(TypeId::of::<T>(), &PrimaryKey::new(key.clone()))
            .is_some()
    }

    pub fn contains<T: Send + Sync + 'static>(&self, key: &Value) -> bool {
        self.get(TypeId::of::<T>(), &PrimaryKey::new(key.clone()))
            .is_some()
    }

    /// Cached objects of one type, in no particular order.
    pub fn objects_of(&self, type_id: TypeId) -> impl Iterator<Item = &AnyRef> {
        self.entries
            .iter()
            .filter(move |((ty, _), _)| *ty == type_id)
            .map(|(_, entry)| &entry.object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
