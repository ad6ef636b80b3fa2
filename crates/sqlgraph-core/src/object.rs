//! Shared handles to materialized objects.
//!
//! Every object the session hands out lives behind an `Arc<RwLock<T>>` so
//! that two rows referencing the same key resolve to the same instance and
//! self-referencing graphs can point back at themselves.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A typed, shared handle to a mapped object.
pub struct Ref<T>(Arc<RwLock<T>>);

impl<T: Send + Sync + 'static> Ref<T> {
    pub fn new(value: T) -> Self {
        Ref(Arc::new(RwLock::new(value)))
    }

    /// Lock the object for reading.
    ///
    /// A poisoned lock still yields the guard; the object is plain data and
    /// stays usable after a panic elsewhere.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the object for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Erase the concrete type.
    pub fn erase(&self) -> AnyRef {
        AnyRef(Arc::clone(&self.0) as Arc<dyn Any + Send + Sync>)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref(Arc::clone(&self.0))
    }
}

// Object graphs may be cyclic, so only the identity is printed.
impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Ref<{}>({:p})", short, Arc::as_ptr(&self.0))
    }
}

/// A type-erased object handle. Actually stores `Arc<RwLock<T>>` for some `T`.
#[derive(Clone)]
pub struct AnyRef(Arc<dyn Any + Send + Sync>);

impl AnyRef {
    /// Recover the typed handle, if the object is a `T`.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Ref<T>> {
        Arc::clone(&self.0).downcast::<RwLock<T>>().ok().map(Ref)
    }

    /// Whether the object behind this handle is a `T`.
    pub fn is<T: Send + Sync + 'static>(&self) -> bool {
        self.0.is::<RwLock<T>>()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyRef({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

impl<T: Send + Sync + 'static> From<Ref<T>> for AnyRef {
    fn from(r: Ref<T>) -> Self {
        AnyRef(r.0 as Arc<dyn Any + Send + Sync>)
    }
}
